//! Switchyard CLI — the main entry point.
//!
//! Commands:
//! - `onboard` — Write a default config file
//! - `chat`    — Interactive chat or single-message mode
//! - `status`  — Show budget and memory status
//! - `memory`  — Search the episodic store

use clap::{Parser, Subcommand};

mod commands;
mod runtime;

#[derive(Parser)]
#[command(
    name = "switchyard",
    about = "Switchyard — cost-tiered request routing with layered memory",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Onboard,

    /// Chat through the routing pipeline
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Session id to converse under
        #[arg(short, long, default_value = "cli")]
        session: String,
    },

    /// Show budget and memory status
    Status,

    /// Search past turns
    Memory {
        /// The search query
        query: String,

        /// Session to search within
        #[arg(short, long, default_value = "cli")]
        session: String,

        /// Maximum results
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Chat { message, session } => commands::chat::run(message, session).await?,
        Commands::Status => commands::status::run().await?,
        Commands::Memory { query, session, limit } => {
            commands::memory::run(query, session, limit).await?
        }
    }

    Ok(())
}

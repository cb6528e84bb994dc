//! `switchyard chat` — converse through the routing pipeline.

use std::io::{BufRead, Write};

use switchyard_config::AppConfig;
use switchyard_core::request::{Request, SessionId};
use switchyard_dispatch::TurnOutcome;

use crate::runtime;

pub async fn run(message: Option<String>, session: String) -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    let rt = runtime::build(&config).await?;
    let session_id = SessionId::from(&session);

    match message {
        Some(text) => {
            let outcome = rt
                .pipeline
                .process(Request::new(session_id, "cli", text))
                .await;
            print_outcome(&outcome);
        }
        None => {
            println!("Switchyard interactive chat. Type 'exit' to quit.");
            let stdin = std::io::stdin();
            loop {
                print!("> ");
                std::io::stdout().flush()?;

                let mut line = String::new();
                if stdin.lock().read_line(&mut line)? == 0 {
                    break;
                }
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "exit" || line == "quit" {
                    break;
                }

                let outcome = rt
                    .pipeline
                    .process(Request::new(session_id.clone(), "cli", line))
                    .await;
                print_outcome(&outcome);
            }
        }
    }

    Ok(())
}

fn print_outcome(outcome: &TurnOutcome) {
    let decision = outcome.decision();
    match outcome {
        TurnOutcome::Answered { response, .. } => {
            println!("{response}");
            println!(
                "  [{} → {} ({:.2})]",
                decision.tier, decision.handler_id, decision.confidence
            );
        }
        TurnOutcome::Denied { reason, .. } => {
            println!("Daily limit reached — try again later. ({reason})");
        }
        TurnOutcome::Failed { fault, .. } => {
            println!("The request could not be served: {fault}");
        }
    }
}

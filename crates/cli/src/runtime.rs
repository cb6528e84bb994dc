//! Runtime assembly — wires config into a running pipeline.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use switchyard_budget::{BudgetLedger, BudgetLimits};
use switchyard_config::AppConfig;
use switchyard_core::classifier::Classifier;
use switchyard_core::event::EventBus;
use switchyard_dispatch::{
    CalculatorHandler, ChatHandler, HandlerRegistry, Pipeline, StaticHandler,
};
use switchyard_memory::{FactStore, MemoryOrchestrator, SqliteEpisodicStore};
use switchyard_remote::HttpClassifier;
use switchyard_router::Router;

/// Generation cap used by the chat handler when no per-request cap is set.
const DEFAULT_GENERATION_TOKENS: u64 = 1024;

pub struct Runtime {
    pub pipeline: Arc<Pipeline>,
    pub budget: Arc<BudgetLedger>,
    pub memory: Arc<MemoryOrchestrator>,
}

/// Build the full pipeline from configuration: ledger, stores, orchestrator,
/// rule tables, handlers.
pub async fn build(config: &AppConfig) -> anyhow::Result<Runtime> {
    let events = Arc::new(EventBus::default());

    let budget = Arc::new(BudgetLedger::open(
        config.budget.resolved_state_path(),
        BudgetLimits {
            daily_limit_tokens: config.budget.daily_limit_tokens,
            per_request_max_tokens: config.budget.per_request_max_tokens,
            warning_threshold: config.budget.warning_threshold,
        },
    ));

    let episodic_path = config.memory.resolved_episodic_path();
    let episodic = Arc::new(
        SqliteEpisodicStore::new(
            &episodic_path.to_string_lossy(),
            config.memory.episodic_max_entries,
        )
        .await
        .with_context(|| format!("opening episodic store at {}", episodic_path.display()))?,
    );

    let semantic = Arc::new(FactStore::open(
        config.memory.resolved_semantic_path(),
        config.memory.semantic_merge_threshold,
    ));

    let memory = Arc::new(MemoryOrchestrator::new(
        episodic,
        semantic,
        config.memory.clone(),
        events.clone(),
    ));

    // The remote backend is optional: without an API key the deterministic
    // tiers still work and unmatched requests get a canned fallback
    let classifier: Option<Arc<dyn Classifier>> = match &config.api_key {
        Some(api_key) => {
            let handler_ids = vec![
                "weather".to_string(),
                "calculator".to_string(),
                "help".to_string(),
                "chat".to_string(),
            ];
            Some(Arc::new(
                HttpClassifier::new(
                    &config.remote.base_url,
                    api_key,
                    &config.remote.model,
                    handler_ids,
                    Duration::from_secs(config.remote.timeout_secs),
                )
                .map_err(|e| anyhow::anyhow!("building remote backend: {e}"))?,
            ))
        }
        None => None,
    };

    let router = Arc::new(
        Router::new(&config.router, classifier.clone(), budget.clone())
            .context("building routing tables")?,
    );

    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(CalculatorHandler));
    registry.register(Arc::new(StaticHandler::new(
        "help",
        "I route requests to the cheapest handler that can serve them: \
         arithmetic runs locally, keyword-matched skills run locally, and \
         anything else goes to the model within the daily token budget.",
    )));
    registry.register(Arc::new(StaticHandler::new(
        "weather",
        "Weather lookups need a weather provider; none is configured.",
    )));
    registry.register(Arc::new(StaticHandler::new(
        "reminder",
        "Reminders need a scheduler backend; none is configured.",
    )));
    match &classifier {
        Some(classifier) => {
            let cap = match config.budget.per_request_max_tokens {
                0 => DEFAULT_GENERATION_TOKENS,
                cap => cap,
            };
            registry.register(Arc::new(ChatHandler::new(
                classifier.clone(),
                budget.clone(),
                cap,
            )));
        }
        None => {
            registry.register(Arc::new(StaticHandler::new(
                "chat",
                "No remote backend configured. Set SWITCHYARD_API_KEY to enable chat.",
            )));
        }
    }

    let pipeline = Arc::new(Pipeline::new(
        memory.clone(),
        router,
        Arc::new(registry),
        events,
        &config.dispatch,
    ));

    Ok(Runtime { pipeline, budget, memory })
}

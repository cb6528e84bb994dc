//! `switchyard status` — budget and memory overview.

use switchyard_config::AppConfig;

use crate::runtime;

pub async fn run() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    let rt = runtime::build(&config).await?;

    let budget = rt.budget.status().await;
    println!("Budget ({})", budget.date);
    println!("  tokens used      {}", budget.tokens_used);
    println!("  tokens reserved  {}", budget.tokens_reserved);
    println!("  tokens remaining {}", budget.tokens_remaining);
    println!("  daily limit      {}", budget.daily_limit);
    println!("  usage ratio      {:.1}%", budget.usage_ratio * 100.0);
    println!("  requests today   {}", budget.request_count);
    if budget.is_exhausted {
        println!("  state            EXHAUSTED");
    } else if budget.is_warning {
        println!("  state            warning");
    }

    let memory = rt.memory.stats().await;
    println!("Memory");
    println!("  episodic entries {}", memory.episodic_entries);
    println!("  semantic facts   {}", memory.semantic_facts);
    println!("  cached responses {}", memory.cached_responses);
    println!("  live sessions    {}", memory.live_sessions);

    Ok(())
}

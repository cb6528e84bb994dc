//! `switchyard memory` — search the episodic store.

use switchyard_config::AppConfig;
use switchyard_core::memory::EpisodicStore;
use switchyard_core::request::SessionId;

use crate::runtime;

pub async fn run(query: String, session: String, limit: usize) -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    let rt = runtime::build(&config).await?;

    let hits = rt
        .memory
        .episodic()
        .search(&SessionId::from(&session), &query, limit)
        .await?;

    if hits.is_empty() {
        println!("No matching turns.");
        return Ok(());
    }

    for hit in hits {
        println!(
            "[{} #{} score={:.2}]",
            hit.timestamp.format("%Y-%m-%d %H:%M"),
            hit.turn_index,
            hit.score
        );
        println!("  Q: {}", hit.input_text);
        println!("  A: {}", hit.output_text);
        if !hit.extracted_tags.is_empty() {
            println!("  tags: {}", hit.extracted_tags.join(", "));
        }
    }

    Ok(())
}

//! In-memory episodic store — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use switchyard_core::error::MemoryError;
use switchyard_core::memory::{EpisodeEntry, EpisodicStore};
use switchyard_core::request::SessionId;

/// An episodic store that keeps entries in a Vec.
/// Useful for testing and sessions where persistence isn't needed.
pub struct InMemoryEpisodicStore {
    entries: Arc<RwLock<Vec<EpisodeEntry>>>,
}

impl InMemoryEpisodicStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryEpisodicStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EpisodicStore for InMemoryEpisodicStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn append(&self, mut entry: EpisodeEntry) -> Result<String, MemoryError> {
        if entry.id.is_empty() {
            entry.id = Uuid::new_v4().to_string();
        }
        let id = entry.id.clone();
        self.entries.write().await.push(entry);
        Ok(id)
    }

    async fn search(
        &self,
        session_id: &SessionId,
        query_text: &str,
        limit: usize,
    ) -> Result<Vec<EpisodeEntry>, MemoryError> {
        let entries = self.entries.read().await;
        let query_lower = query_text.to_lowercase();

        let mut results: Vec<EpisodeEntry> = entries
            .iter()
            .filter(|e| &e.session_id == session_id)
            .filter(|e| {
                query_lower.is_empty()
                    || e.input_text.to_lowercase().contains(&query_lower)
                    || e.output_text.to_lowercase().contains(&query_lower)
                    || query_lower
                        .split_whitespace()
                        .any(|w| e.input_text.to_lowercase().contains(w))
            })
            .cloned()
            .map(|mut e| {
                // Term-frequency relevance over both sides of the turn
                let text = format!("{} {}", e.input_text, e.output_text).to_lowercase();
                let occurrences: usize = query_lower
                    .split_whitespace()
                    .map(|w| text.matches(w).count())
                    .sum();
                e.score = occurrences as f32 / (text.len() as f32 / 100.0).max(1.0);
                e
            })
            .collect();

        // Relevance first, recency as tiebreak
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.timestamp.cmp(&a.timestamp))
        });
        results.truncate(limit);

        Ok(results)
    }

    async fn count(&self) -> Result<u64, MemoryError> {
        Ok(self.entries.read().await.len() as u64)
    }

    async fn session_turns(&self, session_id: &SessionId) -> Result<u64, MemoryError> {
        let entries = self.entries.read().await;
        Ok(entries.iter().filter(|e| &e.session_id == session_id).count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::request::{Request, Turn};

    fn entry(session: &str, index: u64, input: &str, output: &str) -> EpisodeEntry {
        let req = Request::new(SessionId::from(session), "test", input);
        let turn = Turn::completed(&req, "chat", output);
        EpisodeEntry::from_turn(&turn, index, vec![])
    }

    #[tokio::test]
    async fn append_assigns_id() {
        let store = InMemoryEpisodicStore::new();
        let id = store.append(entry("s1", 0, "hello", "hi")).await.unwrap();
        assert!(!id.is_empty());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn search_is_scoped_to_session() {
        let store = InMemoryEpisodicStore::new();
        store.append(entry("s1", 0, "rust is fast", "indeed")).await.unwrap();
        store.append(entry("s2", 0, "rust is safe", "indeed")).await.unwrap();

        let results = store.search(&SessionId::from("s1"), "rust", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].session_id, SessionId::from("s1"));
    }

    #[tokio::test]
    async fn search_empty_result_is_ok() {
        let store = InMemoryEpisodicStore::new();
        let results = store
            .search(&SessionId::from("s1"), "anything", 10)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn search_ranks_by_relevance() {
        let store = InMemoryEpisodicStore::new();
        store
            .append(entry("s1", 0, "weather", "rain tomorrow"))
            .await
            .unwrap();
        store
            .append(entry("s1", 1, "weather weather weather", "still rain"))
            .await
            .unwrap();

        let results = store.search(&SessionId::from("s1"), "weather", 10).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].score >= results[1].score);
        assert_eq!(results[0].input_text, "weather weather weather");
    }

    #[tokio::test]
    async fn session_turns_counts_per_session() {
        let store = InMemoryEpisodicStore::new();
        store.append(entry("s1", 0, "a", "b")).await.unwrap();
        store.append(entry("s1", 1, "c", "d")).await.unwrap();
        store.append(entry("s2", 0, "e", "f")).await.unwrap();

        assert_eq!(store.session_turns(&SessionId::from("s1")).await.unwrap(), 2);
        assert_eq!(store.session_turns(&SessionId::from("s2")).await.unwrap(), 1);
        assert_eq!(store.session_turns(&SessionId::from("s3")).await.unwrap(), 0);
    }
}

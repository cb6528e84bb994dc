//! Semantic fact store — file-backed index with associative links.
//!
//! Facts are held in memory and flushed to a JSONL file on every mutation
//! (one JSON-encoded `SemanticFact` per line), so the store is durable,
//! portable, and human-inspectable. Similarity uses embeddings when both
//! sides carry one, and token overlap otherwise.

use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use switchyard_core::error::MemoryError;
use switchyard_core::memory::{FactEdge, SemanticFact, SemanticStore};

use crate::similarity::{cosine_similarity, token_overlap};

/// How much a re-observed link gains per co-activation.
const LINK_STRENGTHEN: f32 = 0.1;
/// Edge weights are bounded so old pairs cannot dominate forever.
const LINK_MAX_WEIGHT: f32 = 10.0;

/// A semantic store over a JSONL file (or purely in memory when no path is
/// given).
pub struct FactStore {
    path: Option<PathBuf>,
    merge_threshold: f32,
    facts: Arc<RwLock<Vec<SemanticFact>>>,
}

impl FactStore {
    /// Open a file-backed store, loading existing facts from disk.
    pub fn open(path: PathBuf, merge_threshold: f32) -> Self {
        let facts = Self::load_from_disk(&path);
        debug!(path = %path.display(), count = facts.len(), "Fact store loaded");
        Self {
            path: Some(path),
            merge_threshold,
            facts: Arc::new(RwLock::new(facts)),
        }
    }

    /// An ephemeral store with no persistence (tests, throwaway runs).
    pub fn ephemeral(merge_threshold: f32) -> Self {
        Self {
            path: None,
            merge_threshold,
            facts: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Load facts from a JSONL file, skipping corrupt lines.
    fn load_from_disk(path: &PathBuf) -> Vec<SemanticFact> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Vec::new(), // File doesn't exist yet — start empty
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<SemanticFact>(line) {
                Ok(fact) => Some(fact),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted fact entry");
                    None
                }
            })
            .collect()
    }

    /// Flush all facts to disk as JSONL.
    async fn flush(&self) -> Result<(), MemoryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let facts = self.facts.read().await;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MemoryError::Storage(format!("Failed to create fact store directory: {e}"))
            })?;
        }

        let mut content = String::new();
        for fact in facts.iter() {
            let line = serde_json::to_string(fact)
                .map_err(|e| MemoryError::Storage(format!("Failed to serialize fact: {e}")))?;
            content.push_str(&line);
            content.push('\n');
        }

        std::fs::write(path, &content)
            .map_err(|e| MemoryError::Storage(format!("Failed to write fact store: {e}")))?;
        Ok(())
    }

    /// Similarity between a query (text + optional embedding) and a fact.
    fn similarity(query_text: &str, query_embedding: Option<&[f32]>, fact: &SemanticFact) -> f32 {
        if let (Some(query), Some(emb)) = (query_embedding, fact.embedding.as_deref()) {
            return cosine_similarity(query, emb);
        }
        token_overlap(query_text, &fact.text)
    }

    /// Number of stored facts.
    pub async fn len(&self) -> usize {
        self.facts.read().await.len()
    }

    /// Whether the store holds no facts.
    pub async fn is_empty(&self) -> bool {
        self.facts.read().await.is_empty()
    }
}

fn strengthen(edges: &mut Vec<FactEdge>, target: &str) {
    match edges.iter_mut().find(|e| e.target == target) {
        Some(edge) => edge.weight = (edge.weight + LINK_STRENGTHEN).min(LINK_MAX_WEIGHT),
        None => edges.push(FactEdge { target: target.to_string(), weight: LINK_STRENGTHEN }),
    }
}

#[async_trait]
impl SemanticStore for FactStore {
    fn name(&self) -> &str {
        match self.path {
            Some(_) => "file",
            None => "ephemeral",
        }
    }

    async fn upsert_fact(&self, fact: SemanticFact) -> Result<String, MemoryError> {
        let merged_id = {
            let mut facts = self.facts.write().await;

            // Find the most similar existing fact
            let best = facts
                .iter_mut()
                .map(|existing| {
                    let sim = Self::similarity(&fact.text, fact.embedding.as_deref(), existing);
                    (sim, existing)
                })
                .filter(|(sim, _)| *sim >= self.merge_threshold)
                .max_by(|(a, _), (b, _)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

            match best {
                Some((sim, existing)) => {
                    // Merge rather than duplicate
                    debug!(
                        fact = %existing.fact_id,
                        similarity = sim,
                        "Merging fact into existing"
                    );
                    existing.observations += 1;
                    existing.last_seen = Utc::now();
                    if existing.embedding.is_none() {
                        existing.embedding = fact.embedding.clone();
                    }
                    for edge in &fact.edges {
                        strengthen(&mut existing.edges, &edge.target);
                    }
                    existing.fact_id.clone()
                }
                None => {
                    let id = fact.fact_id.clone();
                    facts.push(fact);
                    id
                }
            }
        };

        self.flush().await?;
        Ok(merged_id)
    }

    async fn nearest(&self, query: &str, k: usize) -> Result<Vec<SemanticFact>, MemoryError> {
        let facts = self.facts.read().await;

        let mut scored: Vec<SemanticFact> = facts
            .iter()
            .filter_map(|fact| {
                let sim = Self::similarity(query, None, fact);
                if sim > 0.0 {
                    let mut f = fact.clone();
                    f.score = sim;
                    Some(f)
                } else {
                    None
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn related(&self, fact_id: &str) -> Result<Vec<SemanticFact>, MemoryError> {
        let facts = self.facts.read().await;

        let Some(fact) = facts.iter().find(|f| f.fact_id == fact_id) else {
            return Ok(vec![]);
        };

        let mut edges = fact.edges.clone();
        edges.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(edges
            .iter()
            .filter_map(|edge| {
                facts.iter().find(|f| f.fact_id == edge.target).map(|f| {
                    let mut linked = f.clone();
                    linked.score = edge.weight;
                    linked
                })
            })
            .collect())
    }

    async fn link(&self, a: &str, b: &str) -> Result<(), MemoryError> {
        if a == b {
            return Ok(());
        }
        {
            let mut facts = self.facts.write().await;

            // Both directions: association is symmetric here
            if let Some(fact) = facts.iter_mut().find(|f| f.fact_id == a) {
                strengthen(&mut fact.edges, b);
            }
            if let Some(fact) = facts.iter_mut().find(|f| f.fact_id == b) {
                strengthen(&mut fact.edges, a);
            }
        }
        self.flush().await
    }

    async fn count(&self) -> Result<u64, MemoryError> {
        Ok(self.facts.read().await.len() as u64)
    }
}

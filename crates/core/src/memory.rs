//! Memory store traits — the durable layers behind narrow interfaces.
//!
//! Two of the four memory layers are backed by external storage engines and
//! are therefore defined as traits here:
//! - `EpisodicStore` — durable, full-text-searchable log of every turn
//! - `SemanticStore` — vector/graph index over facts extracted from turns
//!
//! Working memory and the procedural cache are in-process structures and
//! live in the memory crate directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MemoryError;
use crate::request::{SessionId, Turn};

/// A single episodic entry: one turn as durably recorded.
///
/// Entries are never mutated after creation. Corrections become new entries
/// whose turn carries a `corrects` reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeEntry {
    /// Store-assigned id (empty until appended)
    #[serde(default)]
    pub id: String,

    /// The session the turn belongs to
    pub session_id: SessionId,

    /// Position of the turn within its session
    pub turn_index: u64,

    /// The user's input text
    pub input_text: String,

    /// The produced output text
    pub output_text: String,

    /// Tags extracted at write-back (handler id, success/failure, topics)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extracted_tags: Vec<String>,

    /// When the turn completed
    pub timestamp: DateTime<Utc>,

    /// Relevance score (set by search operations)
    #[serde(default)]
    pub score: f32,
}

impl EpisodeEntry {
    /// Build an entry from a completed turn.
    pub fn from_turn(turn: &Turn, turn_index: u64, tags: Vec<String>) -> Self {
        Self {
            id: String::new(),
            session_id: turn.session_id.clone(),
            turn_index,
            input_text: turn.input_text.clone(),
            output_text: turn.output_text.clone(),
            extracted_tags: tags,
            timestamp: turn.timestamp,
            score: 0.0,
        }
    }
}

/// Durable, searchable log of every turn ever processed.
///
/// `append` must be durable before it returns. `search` ranks by term
/// relevance with recency as tiebreak and returns an empty list (not an
/// error) when nothing matches.
#[async_trait]
pub trait EpisodicStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Durably append an entry. Returns the assigned id.
    async fn append(&self, entry: EpisodeEntry) -> std::result::Result<String, MemoryError>;

    /// Full-text search within a session's history.
    async fn search(
        &self,
        session_id: &SessionId,
        query_text: &str,
        limit: usize,
    ) -> std::result::Result<Vec<EpisodeEntry>, MemoryError>;

    /// Total entry count (for retention and status surfaces).
    async fn count(&self) -> std::result::Result<u64, MemoryError>;

    /// How many turns a session has recorded; the next turn's index.
    async fn session_turns(&self, session_id: &SessionId)
        -> std::result::Result<u64, MemoryError>;
}

/// A weighted link between two facts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactEdge {
    /// The linked fact's id
    pub target: String,

    /// Link strength; grows (bounded) when the pair is re-observed together
    pub weight: f32,
}

/// A summarized fact extracted from episodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticFact {
    /// Unique fact id
    pub fact_id: String,

    /// The fact's text
    pub text: String,

    /// Optional embedding vector; similarity falls back to token overlap
    /// when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// Weak reference to the originating turn (lookup only, not ownership)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_turn: Option<String>,

    /// Links to related facts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<FactEdge>,

    /// How many times this fact has been observed (merges increment it)
    #[serde(default = "one")]
    pub observations: u32,

    /// When the fact was first extracted
    pub created_at: DateTime<Utc>,

    /// When the fact was last observed or merged into
    pub last_seen: DateTime<Utc>,

    /// Relevance score (set by search operations)
    #[serde(default)]
    pub score: f32,
}

fn one() -> u32 {
    1
}

impl SemanticFact {
    /// Create a fresh fact.
    pub fn new(text: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            fact_id: Uuid::new_v4().to_string(),
            text: text.into(),
            embedding: None,
            source_turn: None,
            edges: Vec::new(),
            observations: 1,
            created_at: now,
            last_seen: now,
            score: 0.0,
        }
    }

    /// Attach the originating turn reference.
    pub fn with_source(mut self, request_id: impl Into<String>) -> Self {
        self.source_turn = Some(request_id.into());
        self
    }

    /// Attach an embedding vector.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// Durable vector/graph index over extracted facts.
///
/// The most expensive layer to query; the memory orchestrator only consults
/// it when cheaper layers produce insufficient context.
#[async_trait]
pub trait SemanticStore: Send + Sync {
    /// The backend name.
    fn name(&self) -> &str;

    /// Insert a fact, merging into an existing one when similarity exceeds
    /// the store's threshold. Returns the id of the stored (or merged-into)
    /// fact.
    async fn upsert_fact(&self, fact: SemanticFact) -> std::result::Result<String, MemoryError>;

    /// Nearest-neighbor recall, ranked by similarity to the query text.
    async fn nearest(
        &self,
        query: &str,
        k: usize,
    ) -> std::result::Result<Vec<SemanticFact>, MemoryError>;

    /// Facts linked to the given fact, ordered by edge weight.
    async fn related(&self, fact_id: &str) -> std::result::Result<Vec<SemanticFact>, MemoryError>;

    /// Record a co-observation link between two facts, strengthening it if
    /// it already exists.
    async fn link(&self, a: &str, b: &str) -> std::result::Result<(), MemoryError>;

    /// Total fact count (for status surfaces).
    async fn count(&self) -> std::result::Result<u64, MemoryError>;
}

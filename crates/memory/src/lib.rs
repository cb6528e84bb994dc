//! Memory system implementations for Switchyard.
//!
//! Four layers, queried in increasing cost order by the orchestrator:
//! working memory (per-session recency buffer), the procedural cache
//! (fingerprint → response), the episodic store (durable full-text log),
//! and the semantic store (fact index with associative links).

pub mod cache;
pub mod extraction;
pub mod facts;
pub mod in_memory;
pub mod orchestrator;
pub mod similarity;
pub mod working;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use cache::{context_signature, fingerprint, ProceduralCache};
pub use extraction::{extract_salient_terms, ExtractionJob, FactExtractor};
pub use facts::FactStore;
pub use in_memory::InMemoryEpisodicStore;
pub use orchestrator::{MemoryOrchestrator, MemoryStats, ReadPhase};
pub use similarity::{cosine_similarity, token_overlap};
pub use working::WorkingMemory;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteEpisodicStore;

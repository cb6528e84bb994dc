//! # Switchyard Core
//!
//! Domain types, traits, and error definitions for the Switchyard request
//! router. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping store implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod classifier;
pub mod context;
pub mod error;
pub mod event;
pub mod handler;
pub mod memory;
pub mod request;
pub mod routing;

// Re-export key types at crate root for ergonomics
pub use classifier::{Classification, Classifier, Generation};
pub use context::ContextBundle;
pub use error::{Error, Fault, MemoryError, Result};
pub use event::{DomainEvent, EventBus};
pub use handler::{Handler, HandlerResponse};
pub use memory::{EpisodeEntry, EpisodicStore, FactEdge, SemanticFact, SemanticStore};
pub use request::{normalize_text, Request, SessionId, Turn};
pub use routing::{RoutingDecision, Tier, UNAVAILABLE_HANDLER};

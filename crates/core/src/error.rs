//! Error types for the Switchyard domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Switchyard operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Handler / remote-capability faults ---
    #[error("Handler fault: {0}")]
    Fault(#[from] Fault),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// The fault taxonomy for handler invocation and remote capability calls.
///
/// Every terminal failure a caller can see maps onto exactly one of these
/// variants, so channels can distinguish "limit reached" from "try again"
/// from "the handler said no".
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Fault {
    /// The budget ledger refused to authorize the spend. Expected outcome,
    /// not retried.
    #[error("Budget denied: {reason}")]
    BudgetDenied { reason: String },

    /// Network / timeout class failure on a remote dependency.
    /// Eligible for a single retry with backoff.
    #[error("Transient failure: {message}")]
    Transient { message: String },

    /// The handler reported it cannot satisfy the request. Not retried.
    #[error("Handler error: {message}")]
    Logical { message: String },
}

impl Fault {
    /// Whether the dispatch loop may retry this fault.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Fault::Transient { .. })
    }

    /// Short stable code for logs and outbound events.
    pub fn code(&self) -> &'static str {
        match self {
            Fault::BudgetDenied { .. } => "budget_denied",
            Fault::Transient { .. } => "transient",
            Fault::Logical { .. } => "logical",
        }
    }

    /// Convenience constructor for transient faults.
    pub fn transient(message: impl Into<String>) -> Self {
        Fault::Transient { message: message.into() }
    }

    /// Convenience constructor for logical faults.
    pub fn logical(message: impl Into<String>) -> Self {
        Fault::Logical { message: message.into() }
    }

    /// Convenience constructor for budget denials.
    pub fn denied(reason: impl Into<String>) -> Self {
        Fault::BudgetDenied { reason: reason.into() }
    }
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Write-back failed for layer {layer}: {reason}")]
    WriteBack { layer: &'static str, reason: String },

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

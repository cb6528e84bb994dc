//! Three-tier request classification for Switchyard.
//!
//! Tiers are evaluated in strict cost order, short-circuiting on the first
//! confident match:
//!
//! 1. **Keyword** — exact/substring match against a static trigger table
//! 2. **Pattern** — ordered intent patterns, first match wins
//! 3. **Model** — remote classification, gated by the budget ledger
//!
//! The rule tables are built once at startup from configuration and are
//! immutable thereafter.

mod router;
mod rules;

pub use router::Router;
pub use rules::{IntentPattern, KeywordRule, RuleTable};

use thiserror::Error;

/// Errors from building the rule tables.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("Invalid intent pattern for handler '{handler}': {reason}")]
    InvalidPattern { handler: String, reason: String },
}

//! The remote model capability — classification and generation.
//!
//! Both operations are cost-metered: every result reports the tokens it
//! consumed so the caller can commit the spend against the budget ledger.
//! The router's model tier and generation-backed handlers depend on this
//! trait, never on a concrete backend.

use async_trait::async_trait;

use crate::context::ContextBundle;
use crate::error::Fault;

/// The result of a remote classification call.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Classification {
    /// The handler the model picked
    pub handler_id: String,

    /// The model's confidence in [0, 1]
    pub confidence: f32,

    /// Tokens consumed by the call
    pub cost_tokens: u64,
}

/// The result of a remote generation call.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Generation {
    /// The generated text
    pub text: String,

    /// Tokens consumed by the call
    pub cost_tokens: u64,
}

/// A remote model backend that can classify requests and generate text.
///
/// Failures map to [`Fault`]: network/timeout classes are `Transient`,
/// anything the backend reports as unservable is `Logical`.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// A human-readable name for this backend.
    fn name(&self) -> &str;

    /// Ask the model which handler should serve the text.
    async fn classify(
        &self,
        text: &str,
        context: &ContextBundle,
    ) -> std::result::Result<Classification, Fault>;

    /// Generate a free-form response, bounded by `max_cost` tokens.
    async fn generate(
        &self,
        prompt: &str,
        context: &ContextBundle,
        max_cost: u64,
    ) -> std::result::Result<Generation, Fault>;
}

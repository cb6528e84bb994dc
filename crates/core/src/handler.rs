//! Handler trait — the uniform invocation contract for skills and agents.
//!
//! Handlers are opaque to the router: it only knows their id and cost tier.
//! Implementations live outside this core (builtin demo handlers ship with
//! the dispatch crate; real skills are registered by the embedding process).

use async_trait::async_trait;

use crate::context::ContextBundle;
use crate::error::Fault;
use crate::request::Request;

/// The response a handler produces.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HandlerResponse {
    /// The response text
    pub text: String,

    /// Tokens this invocation consumed (0 for local handlers)
    #[serde(default)]
    pub cost_tokens: u64,
}

impl HandlerResponse {
    /// A zero-cost local response.
    pub fn local(text: impl Into<String>) -> Self {
        Self { text: text.into(), cost_tokens: 0 }
    }

    /// A metered response.
    pub fn metered(text: impl Into<String>, cost_tokens: u64) -> Self {
        Self { text: text.into(), cost_tokens }
    }
}

/// The uniform handler invocation contract.
///
/// Faults follow the taxonomy in [`crate::error::Fault`]: `Transient` is
/// eligible for one retry, `Logical` and `BudgetDenied` are terminal.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Stable handler id referenced by routing rules.
    fn id(&self) -> &str;

    /// Serve the request with the assembled context.
    async fn invoke(
        &self,
        request: &Request,
        context: &ContextBundle,
    ) -> std::result::Result<HandlerResponse, Fault>;
}

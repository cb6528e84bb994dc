//! Builtin handlers.
//!
//! Real skills and agents are registered by the embedding process; these
//! cover the defaults the pipeline needs to stand on its own: a static
//! responder, an echo (for tests), and the generation-backed chat handler.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use switchyard_budget::{BudgetLedger, ReserveOutcome};
use switchyard_core::classifier::Classifier;
use switchyard_core::context::ContextBundle;
use switchyard_core::error::Fault;
use switchyard_core::handler::{Handler, HandlerResponse};
use switchyard_core::request::Request;

/// A handler that always answers with a fixed text. Zero cost.
pub struct StaticHandler {
    id: String,
    text: String,
}

impl StaticHandler {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into() }
    }
}

#[async_trait]
impl Handler for StaticHandler {
    fn id(&self) -> &str {
        &self.id
    }

    async fn invoke(
        &self,
        _request: &Request,
        _context: &ContextBundle,
    ) -> Result<HandlerResponse, Fault> {
        Ok(HandlerResponse::local(self.text.clone()))
    }
}

/// Echoes the request text back. Zero cost; mostly for tests and wiring
/// checks.
pub struct EchoHandler;

#[async_trait]
impl Handler for EchoHandler {
    fn id(&self) -> &str {
        "echo"
    }

    async fn invoke(
        &self,
        request: &Request,
        _context: &ContextBundle,
    ) -> Result<HandlerResponse, Fault> {
        Ok(HandlerResponse::local(request.raw_text.clone()))
    }
}

/// The generation-backed fallback handler.
///
/// Reserves budget before every call and commits the actual spend after;
/// a ledger denial surfaces as `Fault::BudgetDenied` through the uniform
/// handler contract.
pub struct ChatHandler {
    backend: Arc<dyn Classifier>,
    budget: Arc<BudgetLedger>,
    /// Reserved (and offered to the backend as the generation cap)
    max_cost_tokens: u64,
}

impl ChatHandler {
    pub fn new(backend: Arc<dyn Classifier>, budget: Arc<BudgetLedger>, max_cost_tokens: u64) -> Self {
        Self { backend, budget, max_cost_tokens }
    }
}

#[async_trait]
impl Handler for ChatHandler {
    fn id(&self) -> &str {
        "chat"
    }

    async fn invoke(
        &self,
        request: &Request,
        context: &ContextBundle,
    ) -> Result<HandlerResponse, Fault> {
        let authorization = match self.budget.reserve(self.max_cost_tokens).await {
            ReserveOutcome::Authorized(auth) => auth,
            ReserveOutcome::Denied(denial) => return Err(denial.into()),
        };

        match self
            .backend
            .generate(&request.raw_text, context, self.max_cost_tokens)
            .await
        {
            Ok(generation) => {
                if let Err(e) = self.budget.commit(authorization, generation.cost_tokens).await {
                    tracing::warn!(error = %e, "Budget commit failed after generation");
                }
                debug!(cost = generation.cost_tokens, "Chat generation complete");
                Ok(HandlerResponse::metered(generation.text, generation.cost_tokens))
            }
            Err(fault) => {
                self.budget.release(authorization).await;
                Err(fault)
            }
        }
    }
}

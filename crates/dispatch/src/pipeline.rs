//! The request lifecycle pipeline.
//!
//! One `process()` call runs the full flow: memory read → routing →
//! handler invocation (with a caller-specified timeout and a single
//! retry-with-backoff on transient faults) → memory write-back → typed
//! outcome. Failure turns are written back too, so future routing can
//! learn from them.
//!
//! Channels should `spawn_process` rather than awaiting inline: a client
//! that disconnects stops awaiting the handle without cancelling the turn,
//! so write-back still completes.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use switchyard_config::DispatchConfig;
use switchyard_core::error::Fault;
use switchyard_core::event::{DomainEvent, EventBus};
use switchyard_core::handler::HandlerResponse;
use switchyard_core::request::{Request, Turn};
use switchyard_core::routing::{RoutingDecision, Tier};
use switchyard_memory::MemoryOrchestrator;
use switchyard_router::Router;

use crate::registry::HandlerRegistry;

/// The typed result of one request lifecycle.
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    /// A response was produced (by a handler or the cache)
    Answered { response: String, decision: RoutingDecision },

    /// The budget ledger refused the spend — expected, user-visible as
    /// "limit reached, try again later"
    Denied { reason: String, decision: RoutingDecision },

    /// A terminal fault after the retry policy was exhausted
    Failed { fault: Fault, decision: RoutingDecision },
}

impl TurnOutcome {
    pub fn is_answered(&self) -> bool {
        matches!(self, TurnOutcome::Answered { .. })
    }

    /// The routing decision this outcome was produced under.
    pub fn decision(&self) -> &RoutingDecision {
        match self {
            TurnOutcome::Answered { decision, .. }
            | TurnOutcome::Denied { decision, .. }
            | TurnOutcome::Failed { decision, .. } => decision,
        }
    }
}

/// The per-request orchestration loop.
pub struct Pipeline {
    memory: Arc<MemoryOrchestrator>,
    router: Arc<Router>,
    handlers: Arc<HandlerRegistry>,
    events: Arc<EventBus>,
    handler_timeout: Duration,
    retry_backoff: Duration,
}

impl Pipeline {
    pub fn new(
        memory: Arc<MemoryOrchestrator>,
        router: Arc<Router>,
        handlers: Arc<HandlerRegistry>,
        events: Arc<EventBus>,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            memory,
            router,
            handlers,
            events,
            handler_timeout: Duration::from_secs(config.handler_timeout_secs),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Run the lifecycle detached, so a disconnecting caller does not
    /// cancel the in-flight turn or its write-back.
    pub fn spawn_process(self: &Arc<Self>, request: Request) -> JoinHandle<TurnOutcome> {
        let pipeline = self.clone();
        tokio::spawn(async move { pipeline.process(request).await })
    }

    /// Run one full request lifecycle.
    pub async fn process(&self, request: Request) -> TurnOutcome {
        let started = Instant::now();
        self.events.publish(DomainEvent::RequestReceived {
            request_id: request.id.clone(),
            session_id: request.session_id.to_string(),
            channel: request.channel.clone(),
            timestamp: chrono::Utc::now(),
        });

        let bundle = self.memory.read(&request).await;
        let decision = self.router.classify(&request, &bundle).await;

        self.events.publish(DomainEvent::RoutingDecided {
            request_id: request.id.clone(),
            tier: decision.tier,
            handler_id: decision.handler_id.clone(),
            confidence: decision.confidence,
            timestamp: chrono::Utc::now(),
        });
        info!(
            request_id = %request.id,
            tier = %decision.tier,
            handler = %decision.handler_id,
            confidence = decision.confidence,
            "Routing decided"
        );

        // Cache tier: the response already exists
        if decision.tier == Tier::Cache {
            if let Some(response) = bundle.cache_hit.clone() {
                let turn = Turn::completed(&request, "cache", &response);
                self.memory.write_back(&turn, &bundle.context_signature).await;
                self.finish(&request, "cache", true, started);
                return TurnOutcome::Answered { response, decision };
            }
            // A cache decision without a hit cannot normally happen; fall
            // through to the registry as a plain miss
            warn!(request_id = %request.id, "Cache decision without cache hit");
        }

        // Budget-denied sentinel: terminal, never a handler lookup
        if decision.is_unavailable() {
            let reason = decision.rationale.clone();
            self.events.publish(DomainEvent::BudgetDenied {
                request_id: request.id.clone(),
                reason: reason.clone(),
                timestamp: chrono::Utc::now(),
            });

            let turn = Turn::failed(&request, "model", format!("budget denied: {reason}"));
            self.memory.write_back(&turn, &bundle.context_signature).await;
            self.finish(&request, "model", false, started);
            return TurnOutcome::Denied { reason, decision };
        }

        let Some(handler) = self.handlers.get(&decision.handler_id) else {
            let fault = Fault::logical(format!("no handler registered: {}", decision.handler_id));
            let turn = Turn::failed(&request, &decision.handler_id, fault.to_string());
            self.memory.write_back(&turn, &bundle.context_signature).await;
            self.finish(&request, &decision.handler_id, false, started);
            return TurnOutcome::Failed { fault, decision };
        };

        // Invoke with a single retry on transient faults only
        let result = match self.invoke_once(&handler, &request, &bundle).await {
            Err(fault) if fault.is_retryable() => {
                debug!(
                    request_id = %request.id,
                    backoff_ms = self.retry_backoff.as_millis() as u64,
                    "Transient fault; retrying once"
                );
                tokio::time::sleep(self.retry_backoff).await;
                self.invoke_once(&handler, &request, &bundle).await
            }
            other => other,
        };

        match result {
            Ok(response) => {
                let turn = Turn::completed(&request, handler.id(), &response.text);
                self.memory.write_back(&turn, &bundle.context_signature).await;
                self.finish(&request, handler.id(), true, started);
                TurnOutcome::Answered { response: response.text, decision }
            }
            Err(fault) => {
                let turn = Turn::failed(&request, handler.id(), fault.to_string());
                self.memory.write_back(&turn, &bundle.context_signature).await;
                self.finish(&request, handler.id(), false, started);

                match fault {
                    Fault::BudgetDenied { ref reason } => {
                        let reason = reason.clone();
                        self.events.publish(DomainEvent::BudgetDenied {
                            request_id: request.id.clone(),
                            reason: reason.clone(),
                            timestamp: chrono::Utc::now(),
                        });
                        TurnOutcome::Denied { reason, decision }
                    }
                    _ => TurnOutcome::Failed { fault, decision },
                }
            }
        }
    }

    async fn invoke_once(
        &self,
        handler: &Arc<dyn switchyard_core::handler::Handler>,
        request: &Request,
        bundle: &switchyard_core::context::ContextBundle,
    ) -> Result<HandlerResponse, Fault> {
        match tokio::time::timeout(self.handler_timeout, handler.invoke(request, bundle)).await {
            Ok(result) => result,
            Err(_) => Err(Fault::transient(format!(
                "handler '{}' timed out after {}s",
                handler.id(),
                self.handler_timeout.as_secs()
            ))),
        }
    }

    fn finish(&self, request: &Request, handler_id: &str, success: bool, started: Instant) {
        self.events.publish(DomainEvent::TurnCompleted {
            request_id: request.id.clone(),
            handler_id: handler_id.to_string(),
            success,
            duration_ms: started.elapsed().as_millis() as u64,
            timestamp: chrono::Utc::now(),
        });
    }
}

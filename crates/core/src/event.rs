//! Domain event system — decoupled observation of the request lifecycle.
//!
//! Events are published as requests move through routing, budget checks,
//! and memory write-back. Channels subscribe to emit outbound decision and
//! response events without coupling to the dispatch internals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::routing::Tier;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A new request entered the pipeline
    RequestReceived {
        request_id: String,
        session_id: String,
        channel: String,
        timestamp: DateTime<Utc>,
    },

    /// The router produced a decision
    RoutingDecided {
        request_id: String,
        tier: Tier,
        handler_id: String,
        confidence: f32,
        timestamp: DateTime<Utc>,
    },

    /// The budget ledger denied a reservation
    BudgetDenied {
        request_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A turn completed (successfully or not)
    TurnCompleted {
        request_id: String,
        handler_id: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A memory layer write failed and was queued for retry
    MemoryWriteRetried {
        layer: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub. Components can
/// subscribe to receive all events and filter for what they care about.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // Ignore send errors (no subscribers = that's fine)
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

//! Working memory — per-session recency buffers.
//!
//! A strict recency buffer, not a general cache: each session holds its
//! most recent turns in receipt order, and inserting past capacity evicts
//! the oldest. Sessions are independent and unbounded in count; each
//! session's buffer is capacity-bounded (default 7).
//!
//! Pushes for one session are serialized through that session's own lock,
//! so receipt order is preserved without blocking unrelated sessions.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use switchyard_core::request::{SessionId, Turn};

/// Fixed-capacity, recency-ordered buffers of recent turns, one per session.
pub struct WorkingMemory {
    capacity: usize,
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<VecDeque<Turn>>>>>,
}

impl WorkingMemory {
    /// Create a working memory with the given per-session capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// The per-session capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get or create the buffer for a session.
    async fn buffer(&self, session_id: &SessionId) -> Arc<Mutex<VecDeque<Turn>>> {
        {
            let sessions = self.sessions.read().await;
            if let Some(buffer) = sessions.get(session_id) {
                return buffer.clone();
            }
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())))
            .clone()
    }

    /// Append a turn to its session's buffer, evicting the oldest entry
    /// once capacity is exceeded.
    pub async fn push(&self, turn: Turn) {
        let buffer = self.buffer(&turn.session_id).await;
        let mut buffer = buffer.lock().await;
        buffer.push_back(turn);
        while buffer.len() > self.capacity {
            buffer.pop_front();
        }
    }

    /// The session's most recent `n` turns, oldest first.
    pub async fn recent(&self, session_id: &SessionId, n: usize) -> Vec<Turn> {
        let sessions = self.sessions.read().await;
        let Some(buffer) = sessions.get(session_id) else {
            return Vec::new();
        };
        let buffer = buffer.lock().await;
        let skip = buffer.len().saturating_sub(n);
        buffer.iter().skip(skip).cloned().collect()
    }

    /// Number of turns currently buffered for a session.
    pub async fn len(&self, session_id: &SessionId) -> usize {
        let sessions = self.sessions.read().await;
        match sessions.get(session_id) {
            Some(buffer) => buffer.lock().await.len(),
            None => 0,
        }
    }

    /// Number of sessions with a live buffer.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop a session's buffer entirely.
    pub async fn clear_session(&self, session_id: &SessionId) {
        self.sessions.write().await.remove(session_id);
    }
}

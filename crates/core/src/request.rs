//! Request and Turn domain types.
//!
//! These are the core value objects that flow through the system:
//! a channel produces a `Request` → the router decides a handler →
//! the completed exchange is written back as a `Turn`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a session (one conversation on one channel).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An inbound user request. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Unique request ID
    pub id: String,

    /// The session this request belongs to
    pub session_id: SessionId,

    /// Which channel produced the request (e.g. "web", "bot", "rest")
    pub channel: String,

    /// The raw user text
    pub raw_text: String,

    /// Optional reference to an uploaded attachment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_ref: Option<String>,

    /// When the request was received
    pub received_at: DateTime<Utc>,
}

impl Request {
    /// Create a new request for a session.
    pub fn new(session_id: SessionId, channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id,
            channel: channel.into(),
            raw_text: text.into(),
            attachment_ref: None,
            received_at: Utc::now(),
        }
    }

    /// Attach an upload reference.
    pub fn with_attachment(mut self, attachment_ref: impl Into<String>) -> Self {
        self.attachment_ref = Some(attachment_ref.into());
        self
    }

    /// Normalized form of the request text: lowercased, whitespace collapsed.
    /// Used for cache fingerprints and trigger matching.
    pub fn normalized_text(&self) -> String {
        normalize_text(&self.raw_text)
    }
}

/// Normalize free-form text: lowercase, whitespace collapsed to single
/// spaces. The same normalization is applied at cache lookup and at
/// write-back so fingerprints line up.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// One completed exchange: the request text plus the response produced for it.
///
/// Turns are what the memory layers store. A turn is never mutated after
/// creation; corrections are modeled as new turns referencing the old one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// The request that produced this turn
    pub request_id: String,

    /// The session the turn belongs to
    pub session_id: SessionId,

    /// The user's input text
    pub input_text: String,

    /// The response text (or a failure note for failed turns)
    pub output_text: String,

    /// Which handler produced the output
    pub handler_id: String,

    /// Whether the turn completed successfully
    pub success: bool,

    /// If this turn corrects an earlier one, the corrected turn's request id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrects: Option<String>,

    /// When the turn completed
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// Record a successful exchange.
    pub fn completed(request: &Request, handler_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            request_id: request.id.clone(),
            session_id: request.session_id.clone(),
            input_text: request.raw_text.clone(),
            output_text: output.into(),
            handler_id: handler_id.into(),
            success: true,
            corrects: None,
            timestamp: Utc::now(),
        }
    }

    /// Record a failed exchange so future routing can learn from it.
    pub fn failed(request: &Request, handler_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            request_id: request.id.clone(),
            session_id: request.session_id.clone(),
            input_text: request.raw_text.clone(),
            output_text: reason.into(),
            handler_id: handler_id.into(),
            success: false,
            corrects: None,
            timestamp: Utc::now(),
        }
    }

    /// Mark this turn as a correction of an earlier turn.
    pub fn correcting(mut self, request_id: impl Into<String>) -> Self {
        self.corrects = Some(request_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_normalization() {
        let req = Request::new(SessionId::from("s1"), "web", "  Weather   in TOKYO ");
        assert_eq!(req.normalized_text(), "weather in tokyo");
    }

    #[test]
    fn turn_from_request() {
        let req = Request::new(SessionId::from("s1"), "web", "hello");
        let turn = Turn::completed(&req, "chat", "hi there");
        assert_eq!(turn.request_id, req.id);
        assert_eq!(turn.session_id, req.session_id);
        assert!(turn.success);
        assert!(turn.corrects.is_none());
    }

    #[test]
    fn failed_turn_keeps_reason() {
        let req = Request::new(SessionId::from("s1"), "web", "hello");
        let turn = Turn::failed(&req, "chat", "timed out");
        assert!(!turn.success);
        assert_eq!(turn.output_text, "timed out");
    }

    #[test]
    fn correction_references_old_turn() {
        let req = Request::new(SessionId::from("s1"), "web", "actually it was 42");
        let turn = Turn::completed(&req, "chat", "noted").correcting("old-req-id");
        assert_eq!(turn.corrects.as_deref(), Some("old-req-id"));
    }

    #[test]
    fn request_serialization_roundtrip() {
        let req = Request::new(SessionId::from("s1"), "rest", "ping");
        let json = serde_json::to_string(&req).unwrap();
        let back: Request = serde_json::from_str(&json).unwrap();
        assert_eq!(back.raw_text, "ping");
        assert_eq!(back.channel, "rest");
    }
}

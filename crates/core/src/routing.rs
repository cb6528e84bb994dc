//! Routing decision types.
//!
//! A `RoutingDecision` names the handler a request resolves to, which cost
//! tier resolved it, and how confident the resolver was. Produced once per
//! request and never mutated.

use serde::{Deserialize, Serialize};

/// The handler id returned when the model tier was needed but the budget
/// ledger denied it. Dispatch treats this as a terminal denial, never as a
/// real handler.
pub const UNAVAILABLE_HANDLER: &str = "__unavailable__";

/// The cost class a routing decision was resolved at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Served from the procedural cache — zero cost.
    Cache,
    /// Matched a static keyword trigger — zero cost.
    Keyword,
    /// Matched an ordered intent pattern — zero cost.
    Pattern,
    /// Classified by the remote model — consumes budget.
    Model,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Tier::Cache => "cache",
            Tier::Keyword => "keyword",
            Tier::Pattern => "pattern",
            Tier::Model => "model",
        };
        write!(f, "{s}")
    }
}

/// The outcome of classifying a request.
///
/// Deterministic tiers (cache/keyword/pattern) report confidence exactly
/// 1.0; only the model tier reports a continuous score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Which tier resolved the request
    pub tier: Tier,

    /// The handler that should serve the request
    pub handler_id: String,

    /// Confidence in [0, 1]
    pub confidence: f32,

    /// Human-readable explanation of the decision
    pub rationale: String,
}

impl RoutingDecision {
    /// A cache hit — the response already exists.
    pub fn cache_hit() -> Self {
        Self {
            tier: Tier::Cache,
            handler_id: "cache".into(),
            confidence: 1.0,
            rationale: "procedural cache hit".into(),
        }
    }

    /// A deterministic keyword-trigger match.
    pub fn keyword(handler_id: impl Into<String>, trigger: &str) -> Self {
        Self {
            tier: Tier::Keyword,
            handler_id: handler_id.into(),
            confidence: 1.0,
            rationale: format!("keyword trigger '{trigger}'"),
        }
    }

    /// A deterministic intent-pattern match.
    pub fn pattern(handler_id: impl Into<String>, pattern: &str) -> Self {
        Self {
            tier: Tier::Pattern,
            handler_id: handler_id.into(),
            confidence: 1.0,
            rationale: format!("intent pattern '{pattern}'"),
        }
    }

    /// A model-tier classification with a continuous confidence score.
    pub fn model(handler_id: impl Into<String>, confidence: f32, rationale: impl Into<String>) -> Self {
        Self {
            tier: Tier::Model,
            handler_id: handler_id.into(),
            confidence: confidence.clamp(0.0, 1.0),
            rationale: rationale.into(),
        }
    }

    /// The fixed decision returned when the model tier was required but the
    /// budget ledger denied the spend.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            tier: Tier::Model,
            handler_id: UNAVAILABLE_HANDLER.into(),
            confidence: 0.0,
            rationale: reason.into(),
        }
    }

    /// Whether this decision is the budget-denied sentinel.
    pub fn is_unavailable(&self) -> bool {
        self.handler_id == UNAVAILABLE_HANDLER
    }

    /// Whether serving this decision consumes budget.
    pub fn consumes_budget(&self) -> bool {
        self.tier == Tier::Model && !self.is_unavailable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_tiers_report_full_confidence() {
        assert_eq!(RoutingDecision::cache_hit().confidence, 1.0);
        assert_eq!(RoutingDecision::keyword("weather", "weather in").confidence, 1.0);
        assert_eq!(RoutingDecision::pattern("calc", r"^\d+ [+*/-] \d+$").confidence, 1.0);
    }

    #[test]
    fn model_confidence_is_clamped() {
        let d = RoutingDecision::model("chat", 1.7, "classifier said so");
        assert_eq!(d.confidence, 1.0);
        let d = RoutingDecision::model("chat", -0.3, "classifier said so");
        assert_eq!(d.confidence, 0.0);
    }

    #[test]
    fn unavailable_is_terminal() {
        let d = RoutingDecision::unavailable("daily limit reached");
        assert!(d.is_unavailable());
        assert!(!d.consumes_budget());
        assert_eq!(d.confidence, 0.0);
        assert_eq!(d.tier, Tier::Model);
    }

    #[test]
    fn tier_display() {
        assert_eq!(Tier::Keyword.to_string(), "keyword");
        assert_eq!(Tier::Model.to_string(), "model");
    }
}

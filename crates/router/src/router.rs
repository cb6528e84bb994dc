//! The three-tier router.

use std::sync::Arc;
use tracing::{debug, info, warn};

use switchyard_budget::{BudgetLedger, ReserveOutcome};
use switchyard_config::RouterConfig;
use switchyard_core::classifier::Classifier;
use switchyard_core::context::ContextBundle;
use switchyard_core::request::Request;
use switchyard_core::routing::RoutingDecision;

use crate::rules::RuleTable;
use crate::RouterError;

/// Classifies requests into routing decisions, cheapest tier first.
///
/// The deterministic tiers never touch the network or the budget. Only the
/// model tier consumes budget, and it asks the ledger before every call;
/// denial produces the fixed "unavailable" decision rather than a silent
/// downgrade to stale deterministic results.
pub struct Router {
    rules: RuleTable,
    classifier: Option<Arc<dyn Classifier>>,
    budget: Arc<BudgetLedger>,
    classify_cost_tokens: u64,
    min_model_confidence: f32,
    default_handler: String,
}

impl Router {
    /// Build a router from configuration.
    pub fn new(
        config: &RouterConfig,
        classifier: Option<Arc<dyn Classifier>>,
        budget: Arc<BudgetLedger>,
    ) -> Result<Self, RouterError> {
        Ok(Self {
            rules: RuleTable::from_config(config)?,
            classifier,
            budget,
            classify_cost_tokens: config.classify_cost_tokens,
            min_model_confidence: config.min_model_confidence,
            default_handler: config.default_handler.clone(),
        })
    }

    /// Decide which handler serves the request.
    pub async fn classify(&self, request: &Request, bundle: &ContextBundle) -> RoutingDecision {
        // Tier 0: a procedural cache hit is authoritative
        if bundle.cache_hit.is_some() {
            return RoutingDecision::cache_hit();
        }

        let normalized = request.normalized_text();

        // Tier 1: keyword triggers. Cheapest match is authoritative once
        // any match exists, so this runs before patterns unconditionally.
        if let Some((rule, trigger)) = self.rules.match_keyword(&normalized) {
            debug!(request_id = %request.id, handler = %rule.handler_id, trigger, "Keyword tier match");
            return RoutingDecision::keyword(&rule.handler_id, trigger);
        }

        // Tier 2: ordered intent patterns
        if let Some(pattern) = self.rules.match_pattern(&normalized) {
            debug!(request_id = %request.id, handler = %pattern.handler_id, "Pattern tier match");
            return RoutingDecision::pattern(&pattern.handler_id, pattern.pattern());
        }

        // Tier 3: the remote model, behind the budget gate
        self.model_tier(request, bundle).await
    }

    async fn model_tier(&self, request: &Request, bundle: &ContextBundle) -> RoutingDecision {
        let Some(classifier) = &self.classifier else {
            debug!(request_id = %request.id, "No remote classifier; defaulting");
            return RoutingDecision::model(
                &self.default_handler,
                0.0,
                "no remote classifier configured",
            );
        };

        let authorization = match self.budget.reserve(self.classify_cost_tokens).await {
            ReserveOutcome::Authorized(auth) => auth,
            ReserveOutcome::Denied(denial) => {
                info!(request_id = %request.id, reason = %denial.reason(), "Model tier denied by budget");
                return RoutingDecision::unavailable(denial.reason());
            }
        };

        match classifier.classify(&request.raw_text, bundle).await {
            Ok(classification) => {
                if let Err(e) = self.budget.commit(authorization, classification.cost_tokens).await {
                    warn!(error = %e, "Budget commit failed after classification");
                }

                // The model's confidence alone decides acceptance; below the
                // floor we route to the default handler, keeping the score
                if classification.confidence < self.min_model_confidence {
                    return RoutingDecision::model(
                        &self.default_handler,
                        classification.confidence,
                        format!(
                            "model confidence {:.2} below floor {:.2}; defaulting",
                            classification.confidence, self.min_model_confidence
                        ),
                    );
                }

                RoutingDecision::model(
                    &classification.handler_id,
                    classification.confidence,
                    "model classification",
                )
            }
            Err(fault) => {
                // The call never completed; hand the reserved capacity back
                self.budget.release(authorization).await;
                warn!(request_id = %request.id, fault = %fault, "Classifier failed; defaulting");
                RoutingDecision::model(
                    &self.default_handler,
                    0.0,
                    format!("classifier failed ({}); defaulting", fault.code()),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use switchyard_budget::BudgetLimits;
    use switchyard_config::{KeywordRuleConfig, PatternRuleConfig};
    use switchyard_core::classifier::{Classification, Generation};
    use switchyard_core::error::Fault;
    use switchyard_core::request::SessionId;
    use switchyard_core::routing::Tier;

    struct MockClassifier {
        handler: String,
        confidence: f32,
        cost: u64,
        calls: AtomicUsize,
        fail: bool,
    }

    impl MockClassifier {
        fn answering(handler: &str, confidence: f32, cost: u64) -> Self {
            Self { handler: handler.into(), confidence, cost, calls: AtomicUsize::new(0), fail: false }
        }

        fn failing() -> Self {
            Self { handler: String::new(), confidence: 0.0, cost: 0, calls: AtomicUsize::new(0), fail: true }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Classifier for MockClassifier {
        fn name(&self) -> &str {
            "mock"
        }

        async fn classify(
            &self,
            _text: &str,
            _context: &ContextBundle,
        ) -> Result<Classification, Fault> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Fault::transient("connection reset"));
            }
            Ok(Classification {
                handler_id: self.handler.clone(),
                confidence: self.confidence,
                cost_tokens: self.cost,
            })
        }

        async fn generate(
            &self,
            _prompt: &str,
            _context: &ContextBundle,
            _max_cost: u64,
        ) -> Result<Generation, Fault> {
            Err(Fault::logical("not used in these tests"))
        }
    }

    fn test_config() -> RouterConfig {
        RouterConfig {
            keywords: vec![KeywordRuleConfig {
                handler: "weather".into(),
                triggers: vec!["weather in".into()],
                exact: false,
            }],
            patterns: vec![PatternRuleConfig {
                // Overlaps the keyword rule on purpose for tie-break tests
                handler: "pattern-weather".into(),
                pattern: r"weather in \w+".into(),
            }],
            classify_cost_tokens: 200,
            min_model_confidence: 0.5,
            default_handler: "chat".into(),
        }
    }

    fn ledger(limit: u64) -> Arc<BudgetLedger> {
        Arc::new(BudgetLedger::ephemeral(BudgetLimits {
            daily_limit_tokens: limit,
            per_request_max_tokens: 0,
            warning_threshold: 0.8,
        }))
    }

    fn request(text: &str) -> Request {
        Request::new(SessionId::from("s1"), "test", text)
    }

    #[tokio::test]
    async fn cache_hit_wins_everything() {
        let router = Router::new(&test_config(), None, ledger(1000)).unwrap();
        let bundle = ContextBundle { cache_hit: Some("cached".into()), ..Default::default() };

        let decision = router.classify(&request("weather in tokyo"), &bundle).await;
        assert_eq!(decision.tier, Tier::Cache);
        assert_eq!(decision.confidence, 1.0);
    }

    #[tokio::test]
    async fn keyword_match_is_deterministic_and_free() {
        let budget = ledger(1000);
        let classifier = Arc::new(MockClassifier::answering("chat", 0.9, 100));
        let router =
            Router::new(&test_config(), Some(classifier.clone()), budget.clone()).unwrap();

        let decision = router
            .classify(&request("weather in Tokyo"), &ContextBundle::default())
            .await;
        assert_eq!(decision.tier, Tier::Keyword);
        assert_eq!(decision.handler_id, "weather");
        assert_eq!(decision.confidence, 1.0);

        // Zero budget consumed, model never called
        assert_eq!(budget.status().await.tokens_used, 0);
        assert_eq!(classifier.call_count(), 0);
    }

    #[tokio::test]
    async fn keyword_beats_pattern_on_double_match() {
        // "weather in tokyo" matches both the keyword trigger and the
        // intent pattern; the cheaper tier is authoritative
        let router = Router::new(&test_config(), None, ledger(1000)).unwrap();
        let decision = router
            .classify(&request("weather in tokyo"), &ContextBundle::default())
            .await;
        assert_eq!(decision.tier, Tier::Keyword);
        assert_eq!(decision.handler_id, "weather");
    }

    #[tokio::test]
    async fn pattern_tier_catches_what_keywords_miss() {
        let mut config = test_config();
        config.keywords.clear();
        let router = Router::new(&config, None, ledger(1000)).unwrap();

        let decision = router
            .classify(&request("weather in osaka"), &ContextBundle::default())
            .await;
        assert_eq!(decision.tier, Tier::Pattern);
        assert_eq!(decision.handler_id, "pattern-weather");
        assert_eq!(decision.confidence, 1.0);
    }

    #[tokio::test]
    async fn unmatched_text_escalates_to_model() {
        let budget = ledger(1000);
        let classifier = Arc::new(MockClassifier::answering("research", 0.9, 200));
        let router =
            Router::new(&test_config(), Some(classifier.clone()), budget.clone()).unwrap();

        let decision = router
            .classify(&request("tell me something surprising"), &ContextBundle::default())
            .await;
        assert_eq!(decision.tier, Tier::Model);
        assert_eq!(decision.handler_id, "research");
        assert!((decision.confidence - 0.9).abs() < f32::EPSILON);
        assert_eq!(classifier.call_count(), 1);

        // The actual cost was committed
        assert_eq!(budget.status().await.tokens_used, 200);
    }

    #[tokio::test]
    async fn budget_denial_yields_unavailable_without_model_call() {
        let budget = ledger(100); // classify_cost_tokens = 200 > 100
        let classifier = Arc::new(MockClassifier::answering("research", 0.9, 200));
        let router =
            Router::new(&test_config(), Some(classifier.clone()), budget.clone()).unwrap();

        let decision = router
            .classify(&request("tell me something surprising"), &ContextBundle::default())
            .await;
        assert!(decision.is_unavailable());
        assert_eq!(decision.confidence, 0.0);
        // The model was never invoked and nothing was spent
        assert_eq!(classifier.call_count(), 0);
        assert_eq!(budget.status().await.tokens_used, 0);
    }

    #[tokio::test]
    async fn low_confidence_defaults_without_blending() {
        let classifier = Arc::new(MockClassifier::answering("research", 0.3, 150));
        let router = Router::new(&test_config(), Some(classifier), ledger(1000)).unwrap();

        let decision = router
            .classify(&request("vague mumbling"), &ContextBundle::default())
            .await;
        assert_eq!(decision.tier, Tier::Model);
        assert_eq!(decision.handler_id, "chat");
        // The model's own score is kept, not blended or inflated
        assert!((decision.confidence - 0.3).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn classifier_failure_releases_reservation() {
        let budget = ledger(200); // room for exactly one classification
        let classifier = Arc::new(MockClassifier::failing());
        let router =
            Router::new(&test_config(), Some(classifier), budget.clone()).unwrap();

        let decision = router
            .classify(&request("unroutable text"), &ContextBundle::default())
            .await;
        assert_eq!(decision.handler_id, "chat");
        assert_eq!(decision.confidence, 0.0);

        // The reservation was handed back: the full allowance remains
        let status = budget.status().await;
        assert_eq!(status.tokens_used, 0);
        assert_eq!(status.tokens_reserved, 0);
    }

    #[tokio::test]
    async fn no_classifier_defaults_cheaply() {
        let budget = ledger(1000);
        let router = Router::new(&test_config(), None, budget.clone()).unwrap();

        let decision = router
            .classify(&request("unroutable text"), &ContextBundle::default())
            .await;
        assert_eq!(decision.handler_id, "chat");
        assert_eq!(budget.status().await.tokens_used, 0);
    }
}

//! Static routing rule tables.
//!
//! Built once from configuration at startup and immutable afterwards. The
//! keyword table is order-insensitive (any trigger hit wins); the pattern
//! list is ordered most-specific-first by the configuration, and the first
//! matching pattern is authoritative.

use regex::Regex;
use tracing::debug;

use switchyard_config::RouterConfig;

use crate::RouterError;

/// A keyword trigger rule: matches normalized request text directly.
#[derive(Debug, Clone)]
pub struct KeywordRule {
    pub handler_id: String,
    pub triggers: Vec<String>,
    /// Exact rules must match the whole text; otherwise substring
    pub exact: bool,
}

impl KeywordRule {
    /// The first trigger that matches, if any.
    pub fn matched_trigger(&self, normalized: &str) -> Option<&str> {
        self.triggers
            .iter()
            .find(|t| {
                let t = t.to_lowercase();
                if self.exact {
                    normalized == t
                } else {
                    normalized.contains(&t)
                }
            })
            .map(String::as_str)
    }
}

/// A compiled intent pattern.
#[derive(Debug, Clone)]
pub struct IntentPattern {
    pub handler_id: String,
    pub regex: Regex,
}

impl IntentPattern {
    /// The raw pattern text (for rationale strings).
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }
}

/// The two static rule tables the deterministic tiers consult.
pub struct RuleTable {
    keywords: Vec<KeywordRule>,
    patterns: Vec<IntentPattern>,
}

impl RuleTable {
    /// Build (and compile) the tables from configuration. Invalid patterns
    /// fail startup rather than silently dropping rules.
    pub fn from_config(config: &RouterConfig) -> Result<Self, RouterError> {
        let keywords = config
            .keywords
            .iter()
            .map(|rule| KeywordRule {
                handler_id: rule.handler.clone(),
                triggers: rule.triggers.clone(),
                exact: rule.exact,
            })
            .collect();

        let patterns = config
            .patterns
            .iter()
            .map(|rule| {
                Regex::new(&rule.pattern)
                    .map(|regex| IntentPattern { handler_id: rule.handler.clone(), regex })
                    .map_err(|e| RouterError::InvalidPattern {
                        handler: rule.handler.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let table = Self { keywords, patterns };
        debug!(
            keywords = table.keywords.len(),
            patterns = table.patterns.len(),
            "Routing rule tables built"
        );
        Ok(table)
    }

    /// Tier 1: the first keyword rule with a matching trigger.
    pub fn match_keyword(&self, normalized: &str) -> Option<(&KeywordRule, &str)> {
        self.keywords
            .iter()
            .find_map(|rule| rule.matched_trigger(normalized).map(|t| (rule, t)))
    }

    /// Tier 2: the first intent pattern that matches. Order is the
    /// registry's specificity order, so first match wins.
    pub fn match_pattern(&self, normalized: &str) -> Option<&IntentPattern> {
        self.patterns.iter().find(|p| p.regex.is_match(normalized))
    }

    pub fn keyword_count(&self) -> usize {
        self.keywords.len()
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_config::{KeywordRuleConfig, PatternRuleConfig};

    fn config(
        keywords: Vec<KeywordRuleConfig>,
        patterns: Vec<PatternRuleConfig>,
    ) -> RouterConfig {
        RouterConfig { keywords, patterns, ..RouterConfig::default() }
    }

    #[test]
    fn substring_trigger_matches() {
        let table = RuleTable::from_config(&config(
            vec![KeywordRuleConfig {
                handler: "weather".into(),
                triggers: vec!["weather in".into()],
                exact: false,
            }],
            vec![],
        ))
        .unwrap();

        let (rule, trigger) = table.match_keyword("what is the weather in tokyo").unwrap();
        assert_eq!(rule.handler_id, "weather");
        assert_eq!(trigger, "weather in");
    }

    #[test]
    fn exact_trigger_requires_whole_text() {
        let table = RuleTable::from_config(&config(
            vec![KeywordRuleConfig {
                handler: "help".into(),
                triggers: vec!["help".into()],
                exact: true,
            }],
            vec![],
        ))
        .unwrap();

        assert!(table.match_keyword("help").is_some());
        assert!(table.match_keyword("help me with this").is_none());
    }

    #[test]
    fn first_matching_pattern_wins() {
        // Most-specific-first ordering is the registry's responsibility;
        // the table honors it blindly
        let table = RuleTable::from_config(&config(
            vec![],
            vec![
                PatternRuleConfig { handler: "specific".into(), pattern: r"^remind me at \d+".into() },
                PatternRuleConfig { handler: "general".into(), pattern: r"^remind me\b".into() },
            ],
        ))
        .unwrap();

        let hit = table.match_pattern("remind me at 5 to stretch").unwrap();
        assert_eq!(hit.handler_id, "specific");

        let hit = table.match_pattern("remind me tomorrow").unwrap();
        assert_eq!(hit.handler_id, "general");
    }

    #[test]
    fn invalid_pattern_fails_startup() {
        let result = RuleTable::from_config(&config(
            vec![],
            vec![PatternRuleConfig { handler: "broken".into(), pattern: "([unclosed".into() }],
        ));
        match result {
            Err(RouterError::InvalidPattern { handler, .. }) => assert_eq!(handler, "broken"),
            Ok(_) => panic!("expected invalid pattern error"),
        }
    }

    #[test]
    fn no_match_returns_none() {
        let table = RuleTable::from_config(&config(vec![], vec![])).unwrap();
        assert!(table.match_keyword("anything").is_none());
        assert!(table.match_pattern("anything").is_none());
    }

    #[test]
    fn default_config_tables_build() {
        let table = RuleTable::from_config(&RouterConfig::default()).unwrap();
        assert!(table.keyword_count() > 0);
        assert!(table.pattern_count() > 0);
        // The default calculator pattern recognizes arithmetic
        assert_eq!(table.match_pattern("2 + 2").unwrap().handler_id, "calculator");
    }
}

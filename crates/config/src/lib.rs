//! Configuration loading, validation, and management for Switchyard.
//!
//! Loads configuration from `~/.switchyard/config.toml` with environment
//! variable overrides. Validates all settings at startup. The routing rule
//! tables and every escalation threshold live here as explicit constants;
//! nothing in the pipeline hardcodes a magic number.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.switchyard/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the remote model backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Budget ledger configuration
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Memory system configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Router configuration (rule tables and thresholds)
    #[serde(default)]
    pub router: RouterConfig,

    /// Dispatch loop configuration
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Remote model backend configuration
    #[serde(default)]
    pub remote: RemoteConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("budget", &self.budget)
            .field("memory", &self.memory)
            .field("router", &self.router)
            .field("dispatch", &self.dispatch)
            .field("remote", &self.remote)
            .finish()
    }
}

/// Daily token budget settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Tokens allowed per UTC day
    #[serde(default = "default_daily_limit")]
    pub daily_limit_tokens: u64,

    /// Largest single reservation (0 = uncapped)
    #[serde(default = "default_per_request_max")]
    pub per_request_max_tokens: u64,

    /// Usage ratio at which status reports a warning
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f64,

    /// Where the durable state record lives (default:
    /// `~/.switchyard/budget_state.json`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_path: Option<PathBuf>,
}

fn default_daily_limit() -> u64 {
    100_000
}
fn default_per_request_max() -> u64 {
    8_000
}
fn default_warning_threshold() -> f64 {
    0.8
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_limit_tokens: default_daily_limit(),
            per_request_max_tokens: default_per_request_max(),
            warning_threshold: default_warning_threshold(),
            state_path: None,
        }
    }
}

impl BudgetConfig {
    /// Resolve the state path, falling back to the config directory.
    pub fn resolved_state_path(&self) -> PathBuf {
        self.state_path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("budget_state.json"))
    }
}

/// Memory system settings — layer capacities, store paths, and the
/// escalation thresholds the orchestrator consults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Working memory capacity per session
    #[serde(default = "default_working_capacity")]
    pub working_capacity: usize,

    /// SQLite database path for the episodic store (default:
    /// `~/.switchyard/episodes.db`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episodic_path: Option<PathBuf>,

    /// Maximum episodic entries kept; oldest pruned past this (0 = unbounded)
    #[serde(default = "default_episodic_max_entries")]
    pub episodic_max_entries: u64,

    /// JSONL file path for the semantic fact store (default:
    /// `~/.switchyard/facts.jsonl`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_path: Option<PathBuf>,

    /// Similarity above which an upserted fact merges into an existing one
    #[serde(default = "default_semantic_merge_threshold")]
    pub semantic_merge_threshold: f32,

    /// Procedural cache time-to-live in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Procedural cache entry cap (LRU eviction past this)
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,

    /// A layer's results below this relevance trigger escalation to the
    /// next (more expensive) layer
    #[serde(default = "default_escalation_min_relevance")]
    pub escalation_min_relevance: f32,

    /// Minimum hits a layer must produce to stop escalation
    #[serde(default = "default_escalation_min_hits")]
    pub escalation_min_hits: usize,

    /// How many hits each store is asked for
    #[serde(default = "default_recall_limit")]
    pub recall_limit: usize,
}

fn default_working_capacity() -> usize {
    7
}
fn default_episodic_max_entries() -> u64 {
    10_000
}
fn default_semantic_merge_threshold() -> f32 {
    0.85
}
fn default_cache_ttl_secs() -> u64 {
    3600
}
fn default_cache_max_entries() -> usize {
    128
}
fn default_escalation_min_relevance() -> f32 {
    0.35
}
fn default_escalation_min_hits() -> usize {
    1
}
fn default_recall_limit() -> usize {
    5
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            working_capacity: default_working_capacity(),
            episodic_path: None,
            episodic_max_entries: default_episodic_max_entries(),
            semantic_path: None,
            semantic_merge_threshold: default_semantic_merge_threshold(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_max_entries: default_cache_max_entries(),
            escalation_min_relevance: default_escalation_min_relevance(),
            escalation_min_hits: default_escalation_min_hits(),
            recall_limit: default_recall_limit(),
        }
    }
}

impl MemoryConfig {
    /// Resolve the episodic database path.
    pub fn resolved_episodic_path(&self) -> PathBuf {
        self.episodic_path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("episodes.db"))
    }

    /// Resolve the semantic store path.
    pub fn resolved_semantic_path(&self) -> PathBuf {
        self.semantic_path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("facts.jsonl"))
    }
}

/// A keyword trigger rule: exact or substring match against normalized text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordRuleConfig {
    /// The handler the rule routes to
    pub handler: String,

    /// Trigger phrases (matched case-insensitively)
    pub triggers: Vec<String>,

    /// Whether triggers must match the whole text exactly
    #[serde(default)]
    pub exact: bool,
}

/// An ordered intent pattern rule.
///
/// Pattern order matters: the registry lists most-specific first, and the
/// first matching pattern wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRuleConfig {
    /// The handler the rule routes to
    pub handler: String,

    /// The regular expression to match against normalized text
    pub pattern: String,
}

/// Router configuration — the static rule tables plus model-tier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Keyword trigger table (tier 1)
    #[serde(default = "default_keywords")]
    pub keywords: Vec<KeywordRuleConfig>,

    /// Ordered intent patterns (tier 2), most-specific first
    #[serde(default = "default_patterns")]
    pub patterns: Vec<PatternRuleConfig>,

    /// Estimated tokens a model-tier classification consumes
    #[serde(default = "default_classify_cost")]
    pub classify_cost_tokens: u64,

    /// Model confidence below which the decision falls back to the default
    /// handler
    #[serde(default = "default_min_model_confidence")]
    pub min_model_confidence: f32,

    /// Handler used when the model's confidence is below the floor
    #[serde(default = "default_fallback_handler")]
    pub default_handler: String,
}

fn default_keywords() -> Vec<KeywordRuleConfig> {
    vec![
        KeywordRuleConfig {
            handler: "weather".into(),
            triggers: vec!["weather in".into(), "forecast for".into()],
            exact: false,
        },
        KeywordRuleConfig {
            handler: "help".into(),
            triggers: vec!["help".into(), "what can you do".into()],
            exact: true,
        },
    ]
}

fn default_patterns() -> Vec<PatternRuleConfig> {
    vec![
        PatternRuleConfig {
            handler: "calculator".into(),
            pattern: r"^[\d\s\.\(\)]+[+\-*/][\d\s\.\(\)+\-*/]+$".into(),
        },
        PatternRuleConfig {
            handler: "reminder".into(),
            pattern: r"^remind me\b".into(),
        },
    ]
}

fn default_classify_cost() -> u64 {
    200
}
fn default_min_model_confidence() -> f32 {
    0.5
}
fn default_fallback_handler() -> String {
    "chat".into()
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            patterns: default_patterns(),
            classify_cost_tokens: default_classify_cost(),
            min_model_confidence: default_min_model_confidence(),
            default_handler: default_fallback_handler(),
        }
    }
}

/// Dispatch loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Per-invocation handler timeout in seconds
    #[serde(default = "default_handler_timeout_secs")]
    pub handler_timeout_secs: u64,

    /// Backoff before the single retry, in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_handler_timeout_secs() -> u64 {
    30
}
fn default_retry_backoff_ms() -> u64 {
    500
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            handler_timeout_secs: default_handler_timeout_secs(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

/// Remote model backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// OpenAI-compatible base URL
    #[serde(default = "default_remote_base_url")]
    pub base_url: String,

    /// Model to use for classification and generation
    #[serde(default = "default_remote_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_remote_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_remote_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_remote_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_remote_timeout_secs() -> u64 {
    60
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_remote_base_url(),
            model: default_remote_model(),
            timeout_secs: default_remote_timeout_secs(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.switchyard/config.toml).
    ///
    /// Environment variables take priority:
    /// - `SWITCHYARD_API_KEY` (falls back to `OPENROUTER_API_KEY`)
    /// - `SWITCHYARD_MODEL`
    /// - `SWITCHYARD_DAILY_LIMIT`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("SWITCHYARD_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENROUTER_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("SWITCHYARD_MODEL") {
            config.remote.model = model;
        }

        if let Ok(limit) = std::env::var("SWITCHYARD_DAILY_LIMIT") {
            if let Ok(parsed) = limit.parse() {
                config.budget.daily_limit_tokens = parsed;
            }
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".switchyard")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory.working_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "memory.working_capacity must be at least 1".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.memory.escalation_min_relevance) {
            return Err(ConfigError::ValidationError(
                "memory.escalation_min_relevance must be in [0, 1]".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.memory.semantic_merge_threshold) {
            return Err(ConfigError::ValidationError(
                "memory.semantic_merge_threshold must be in [0, 1]".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.router.min_model_confidence) {
            return Err(ConfigError::ValidationError(
                "router.min_model_confidence must be in [0, 1]".into(),
            ));
        }

        if self.router.default_handler.is_empty() {
            return Err(ConfigError::ValidationError(
                "router.default_handler must not be empty".into(),
            ));
        }

        for rule in &self.router.keywords {
            if rule.triggers.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "keyword rule for '{}' has no triggers",
                    rule.handler
                )));
            }
        }

        for rule in &self.router.patterns {
            if rule.pattern.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "pattern rule for '{}' has an empty pattern",
                    rule.handler
                )));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            budget: BudgetConfig::default(),
            memory: MemoryConfig::default(),
            router: RouterConfig::default(),
            dispatch: DispatchConfig::default(),
            remote: RemoteConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.memory.working_capacity, 7);
        assert_eq!(config.budget.daily_limit_tokens, 100_000);
        assert!(!config.router.keywords.is_empty());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.memory.working_capacity, config.memory.working_capacity);
        assert_eq!(parsed.router.default_handler, config.router.default_handler);
        assert_eq!(parsed.budget.daily_limit_tokens, config.budget.daily_limit_tokens);
    }

    #[test]
    fn zero_working_capacity_rejected() {
        let mut config = AppConfig::default();
        config.memory.working_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn out_of_range_confidence_rejected() {
        let mut config = AppConfig::default();
        config.router.min_model_confidence = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_trigger_list_rejected() {
        let mut config = AppConfig::default();
        config.router.keywords.push(KeywordRuleConfig {
            handler: "broken".into(),
            triggers: vec![],
            exact: false,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().memory.working_capacity, 7);
    }

    #[test]
    fn rule_tables_parse_from_toml() {
        let toml_str = r#"
[[router.keywords]]
handler = "stock"
triggers = ["stock price", "ticker"]

[[router.patterns]]
handler = "currency"
pattern = '^\d+(\.\d+)? (usd|eur|jpy) (to|in) (usd|eur|jpy)$'
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.router.keywords.len(), 1);
        assert_eq!(config.router.keywords[0].handler, "stock");
        assert_eq!(config.router.patterns.len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("daily_limit_tokens"));
        assert!(toml_str.contains("working_capacity"));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-very-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-very-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}

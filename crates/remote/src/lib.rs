//! OpenAI-compatible remote model backend.
//!
//! Implements the [`Classifier`] capability against any endpoint exposing
//! `/v1/chat/completions` (OpenAI, OpenRouter, Ollama, vLLM, …). Both
//! operations report the tokens they consumed so callers can commit the
//! spend against the budget ledger.
//!
//! Fault mapping follows the dispatch taxonomy: network errors, timeouts,
//! and 429/5xx responses are `Transient` (retryable); authentication and
//! other 4xx responses are `Logical`.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use switchyard_core::classifier::{Classification, Classifier, Generation};
use switchyard_core::context::ContextBundle;
use switchyard_core::error::Fault;

/// A `Classifier` backed by an OpenAI-compatible HTTP endpoint.
pub struct HttpClassifier {
    base_url: String,
    api_key: String,
    model: String,
    /// Handler ids offered to the model during classification
    handlers: Vec<String>,
    client: reqwest::Client,
}

impl HttpClassifier {
    /// Create a new backend. `handlers` is the candidate set presented to
    /// the model during classification.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        handlers: Vec<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, Fault> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Fault::logical(format!("HTTP client construction failed: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            handlers,
            client,
        })
    }

    /// Build the classification instruction for the model.
    fn classification_prompt(&self, text: &str) -> String {
        format!(
            "You route user requests to handlers. Available handlers: {}.\n\
             Respond with ONLY a JSON object: {{\"handler\": \"<id>\", \"confidence\": <0.0-1.0>}}.\n\
             Request: {text}",
            self.handlers.join(", ")
        )
    }

    /// Send one chat completion and return (content, total_tokens).
    async fn chat(&self, messages: Vec<serde_json::Value>, max_tokens: Option<u64>) -> Result<(String, u64), Fault> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.0,
            "stream": false,
        });
        if let Some(max_tokens) = max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        debug!(model = %self.model, "Sending chat completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Fault::transient(format!("request timed out: {e}"))
                } else {
                    Fault::transient(format!("network error: {e}"))
                }
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Remote backend returned error");
            return Err(fault_for_status(status, error_body));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| Fault::logical(format!("unparseable response body: {e}")))?;

        let content = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Fault::logical("no choices in response"))?;

        let cost_tokens = api_response
            .usage
            .map(|u| u.total_tokens)
            // Backends that omit usage get a rough 4-chars-per-token estimate
            .unwrap_or_else(|| (content.len() / 4) as u64);

        Ok((content, cost_tokens))
    }
}

/// Map a non-200 status onto the fault taxonomy.
fn fault_for_status(status: u16, body: String) -> Fault {
    match status {
        429 => Fault::transient(format!("rate limited: {body}")),
        500..=599 => Fault::transient(format!("server error {status}: {body}")),
        401 | 403 => Fault::logical(format!("authentication failed ({status})")),
        _ => Fault::logical(format!("request rejected ({status}): {body}")),
    }
}

/// Parse the model's classification reply.
///
/// Tolerates surrounding prose and markdown fences by extracting the first
/// JSON object from the content.
fn parse_classification(content: &str) -> Result<(String, f32), Fault> {
    let start = content
        .find('{')
        .ok_or_else(|| Fault::logical("classification reply contains no JSON"))?;
    let end = content
        .rfind('}')
        .ok_or_else(|| Fault::logical("classification reply contains no JSON"))?;

    #[derive(Deserialize)]
    struct Reply {
        handler: String,
        #[serde(default)]
        confidence: f32,
    }

    let reply: Reply = serde_json::from_str(&content[start..=end])
        .map_err(|e| Fault::logical(format!("unparseable classification: {e}")))?;

    Ok((reply.handler, reply.confidence.clamp(0.0, 1.0)))
}

#[async_trait]
impl Classifier for HttpClassifier {
    fn name(&self) -> &str {
        "openai_compat"
    }

    async fn classify(
        &self,
        text: &str,
        context: &ContextBundle,
    ) -> Result<Classification, Fault> {
        let mut messages = Vec::new();
        let rendered = context.render();
        if !rendered.is_empty() {
            messages.push(serde_json::json!({ "role": "system", "content": rendered }));
        }
        messages.push(serde_json::json!({
            "role": "user",
            "content": self.classification_prompt(text),
        }));

        let (content, cost_tokens) = self.chat(messages, Some(64)).await?;
        let (handler_id, confidence) = parse_classification(&content)?;

        debug!(handler = %handler_id, confidence, cost_tokens, "Remote classification");
        Ok(Classification { handler_id, confidence, cost_tokens })
    }

    async fn generate(
        &self,
        prompt: &str,
        context: &ContextBundle,
        max_cost: u64,
    ) -> Result<Generation, Fault> {
        let mut messages = Vec::new();
        let rendered = context.render();
        if !rendered.is_empty() {
            messages.push(serde_json::json!({ "role": "system", "content": rendered }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": prompt }));

        let (text, cost_tokens) = self.chat(messages, Some(max_cost)).await?;
        Ok(Generation { text, cost_tokens })
    }
}

// ── API wire types ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    total_tokens: u64,
}

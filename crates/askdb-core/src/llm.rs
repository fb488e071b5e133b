//! Language model seam and the OpenAI-compatible client.

use crate::prompt;
use crate::{AskError, Result};
use askdb_types::{Role, Turn};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// Everything the model needs to write one statement.
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    pub question: &'a str,
    pub schema: &'a str,
    pub view: &'a str,
    pub column_guide: &'a str,
    /// Empty on a fresh start.
    pub history: &'a str,
    pub entity_hint: Option<&'a str>,
    pub row_limit: usize,
}

/// Text generation used by the pipeline. Calls are blocking.
pub trait LanguageModel: Send + Sync {
    fn generate_sql(&self, req: &GenerationRequest<'_>) -> Result<String>;

    fn rewrite_question(
        &self,
        question: &str,
        history: &str,
        entity_hint: Option<&str>,
    ) -> Result<String>;

    fn summarize(&self, question: &str, sql: &str, rows_json: &str) -> Result<String>;

    fn chat(&self, history: &[Turn], message: &str) -> Result<String>;
}

/// Model endpoint settings (`[llm]` in the config file).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub sql_model: String,
    #[serde(default = "default_model")]
    pub insight_model: String,
    #[serde(default)]
    pub sql_temperature: f32,
    #[serde(default = "default_insight_temperature")]
    pub insight_temperature: f32,
    #[serde(default = "default_chat_temperature")]
    pub chat_temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_insight_temperature() -> f32 {
    0.2
}

fn default_chat_temperature() -> f32 {
    0.4
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            sql_model: default_model(),
            insight_model: default_model(),
            sql_temperature: 0.0,
            insight_temperature: default_insight_temperature(),
            chat_temperature: default_chat_temperature(),
            timeout_secs: default_timeout_secs(),
            api_key_env: default_api_key_env(),
        }
    }
}

/// Client for `POST {base_url}/chat/completions`.
///
/// The HTTP client is built on first use so that it is created on the
/// blocking thread that calls it. Requests are never retried.
pub struct OpenAiClient {
    config: LlmConfig,
    api_key: Option<String>,
    http: OnceCell<reqwest::blocking::Client>,
}

impl OpenAiClient {
    /// Build a client, reading the API key from the configured env var.
    pub fn from_env(config: LlmConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            warn!(
                target: "askdb::llm",
                "{} is not set; model calls will fail",
                config.api_key_env
            );
        }
        Self {
            config,
            api_key,
            http: OnceCell::new(),
        }
    }

    fn http(&self) -> Result<&reqwest::blocking::Client> {
        self.http.get_or_try_init(|| {
            reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(self.config.timeout_secs))
                .build()
                .map_err(|e| AskError::Generation(format!("failed to build HTTP client: {}", e)))
        })
    }

    fn complete(&self, model: &str, temperature: f32, messages: Vec<Value>) -> Result<String> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            AskError::Generation(format!("{} is not set", self.config.api_key_env))
        })?;
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = json!({
            "model": model,
            "temperature": temperature,
            "messages": messages,
        });

        debug!(target: "askdb::llm", "POST {} (model: {})", url, model);
        let resp = self
            .http()?
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .map_err(|e| AskError::Generation(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(AskError::Generation(format!(
                "model endpoint returned {}: {}",
                status,
                truncate(&text, 300)
            )));
        }

        let payload: Value = resp
            .json()
            .map_err(|e| AskError::Generation(format!("invalid response body: {}", e)))?;
        parse_chat_completion(&payload)
    }
}

fn message(role: &str, content: &str) -> Value {
    json!({ "role": role, "content": content })
}

impl LanguageModel for OpenAiClient {
    fn generate_sql(&self, req: &GenerationRequest<'_>) -> Result<String> {
        let raw = self.complete(
            &self.config.sql_model,
            self.config.sql_temperature,
            vec![
                message("system", &prompt::sql_system(req.view)),
                message("user", &prompt::sql_user(req)),
            ],
        )?;
        let sql = clean_generated_sql(&raw);
        if sql.is_empty() {
            return Err(AskError::Generation("model returned no SQL".to_string()));
        }
        Ok(sql)
    }

    fn rewrite_question(
        &self,
        question: &str,
        history: &str,
        entity_hint: Option<&str>,
    ) -> Result<String> {
        self.complete(
            &self.config.insight_model,
            self.config.insight_temperature,
            vec![
                message("system", prompt::REWRITE_SYSTEM),
                message("user", &prompt::rewrite_user(question, history, entity_hint)),
            ],
        )
    }

    fn summarize(&self, question: &str, sql: &str, rows_json: &str) -> Result<String> {
        self.complete(
            &self.config.insight_model,
            self.config.insight_temperature,
            vec![
                message("system", prompt::INSIGHT_SYSTEM),
                message("user", &prompt::insight_user(question, sql, rows_json)),
            ],
        )
    }

    fn chat(&self, history: &[Turn], text: &str) -> Result<String> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(message("system", prompt::CHAT_SYSTEM));
        for turn in history {
            let role = match turn.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            messages.push(message(role, &turn.content));
        }
        messages.push(message("user", text));
        self.complete(&self.config.sql_model, self.config.chat_temperature, messages)
    }
}

/// Extract `choices[0].message.content` from a chat-completions response.
pub fn parse_chat_completion(payload: &Value) -> Result<String> {
    payload
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .ok_or_else(|| AskError::Generation("response has no message content".to_string()))
}

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)```").expect("valid fence regex"));

/// Strip markdown fences and a leading `sql` language tag.
pub fn clean_generated_sql(raw: &str) -> String {
    let trimmed = raw.trim();
    let body = match FENCE_RE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => trimmed.trim_matches('`'),
    };
    let body = body.trim();
    let body = match body.get(..4) {
        Some(tag) if tag.eq_ignore_ascii_case("sql\n") => &body[4..],
        _ => body,
    };
    body.trim().to_string()
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

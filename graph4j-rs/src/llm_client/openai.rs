//! Chat-completions client for OpenAI and compatible servers.
//!
//! Requests go out as raw JSON (`byot`) so the same body can carry a
//! `json_schema` response format for servers the typed builders do not
//! model. Responses are cached in memory keyed by a digest of the request
//! body, so replaying an episode does not pay for extraction twice.

use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::Client;
use backoff::future::retry_notify;
use backoff::ExponentialBackoffBuilder;
use md5::{Digest, Md5};
use moka::future::Cache;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::errors::{LlmError, Result};

use super::{LlmClient, Message};

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_capacity: u64,
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 1_000,
            ttl: Duration::from_secs(60 * 60),
        }
    }
}

pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    retry_budget: Duration,
    responses: Cache<String, String>,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, cache: CacheConfig) -> Self {
        Self::build(OpenAIConfig::new().with_api_key(api_key), model.into(), cache)
    }

    /// Target a self-hosted or proxied endpoint, e.g. `http://localhost:11434/v1`.
    pub fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        cache: CacheConfig,
    ) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key).with_api_base(base_url);
        Self::build(config, model.into(), cache)
    }

    fn build(config: OpenAIConfig, model: String, cache: CacheConfig) -> Self {
        Self {
            client: Client::with_config(config),
            model,
            temperature: 0.0,
            max_tokens: 8_192,
            retry_budget: Duration::from_secs(300),
            responses: Cache::builder()
                .max_capacity(cache.max_capacity)
                .time_to_live(cache.ttl)
                .build(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Total time spent retrying one request before giving up.
    pub fn with_retry_budget(mut self, budget: Duration) -> Self {
        self.retry_budget = budget;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn body(&self, messages: &[Message]) -> Value {
        json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        })
    }

    /// Return the assistant text for `body`, from the cache when possible.
    async fn complete(&self, body: Value) -> Result<String> {
        let key = digest(&body);
        if let Some(hit) = self.responses.get(&key).await {
            debug!(model = %self.model, "chat completion served from cache");
            return Ok(hit);
        }

        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_interval(Duration::from_secs(60))
            .with_max_elapsed_time(Some(self.retry_budget))
            .build();
        let op = || {
            let body = body.clone();
            async move {
                self.client
                    .chat()
                    .create_byot::<Value, Value>(body)
                    .await
                    .map_err(|e| match classify(e) {
                        LlmError::RateLimit => backoff::Error::transient(LlmError::RateLimit),
                        other => backoff::Error::permanent(other),
                    })
            }
        };
        let notify = |err: LlmError, wait: Duration| {
            warn!(model = %self.model, error = %err, wait_ms = wait.as_millis() as u64, "chat completion failed, retrying");
        };

        let response = retry_notify(policy, op, notify).await?;
        let text = assistant_text(&response)?;
        self.responses.insert(key, text.clone()).await;
        Ok(text)
    }
}

impl LlmClient for OpenAiClient {
    async fn generate(&self, messages: &[Message]) -> Result<String> {
        self.complete(self.body(messages)).await
    }

    async fn generate_structured<T>(&self, messages: &[Message]) -> Result<T>
    where
        T: DeserializeOwned + schemars::JsonSchema,
    {
        let schema = schemars::schema_for!(T);
        let mut body = self.body(messages);
        body["response_format"] = json!({
            "type": "json_schema",
            "json_schema": {
                "name": "response",
                "strict": true,
                "schema": schema,
            }
        });
        let text = self.complete(body).await?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Cache key for a request body. The schema is part of the body, so two
/// target types asked the same question never share an entry.
fn digest(body: &Value) -> String {
    format!("{:x}", Md5::digest(body.to_string().as_bytes()))
}

fn assistant_text(response: &Value) -> Result<String> {
    let message = &response["choices"][0]["message"];
    if let Some(refusal) = message["refusal"].as_str() {
        if !refusal.is_empty() {
            return Err(LlmError::Refusal.into());
        }
    }
    match message["content"].as_str() {
        Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
        _ => Err(LlmError::EmptyResponse.into()),
    }
}

/// Error bodies carry no HTTP status, so classification goes by the `code`
/// and `type` fields compatible servers fill in.
fn classify(err: OpenAIError) -> LlmError {
    let api = match err {
        OpenAIError::ApiError(api) => api,
        other => {
            return LlmError::Api {
                status: 0,
                message: other.to_string(),
            }
        }
    };
    let code = api.code.as_deref().unwrap_or_default();
    let kind = api.r#type.as_deref().unwrap_or_default();
    if code == "rate_limit_exceeded" || kind == "requests" || kind == "tokens" {
        LlmError::RateLimit
    } else if code == "invalid_api_key" || kind == "authentication_error" {
        LlmError::Authentication
    } else {
        LlmError::Api {
            status: 0,
            message: api.message,
        }
    }
}

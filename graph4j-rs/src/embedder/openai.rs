//! Embedder for any endpoint speaking the OpenAI `/embeddings` protocol:
//! OpenAI itself, Ollama's `/v1`, vLLM, or a proxy in front of them.
//!
//! Inputs are sent in chunks, blank and oversized inputs are normalised
//! first, and rate limits, 5xx responses and network failures are retried
//! with exponential backoff.

use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::CreateEmbeddingRequestArgs;
use async_openai::Client;
use async_trait::async_trait;
use backoff::future::retry_notify;
use backoff::ExponentialBackoffBuilder;
use tracing::{debug, warn};

use crate::embedder::{Embedding, EmbedderClient};
use crate::errors::{Graph4jError, Result};
use crate::types::DEFAULT_EMBEDDING_MODEL;
use crate::utils::truncate_with_ellipsis;

/// Inputs per request.
const CHUNK_SIZE: usize = 512;

/// Longer inputs are cut before sending; no supported model accepts more.
const MAX_INPUT_CHARS: usize = 8_000;

/// Where and how to embed.
#[derive(Debug, Clone)]
pub struct EmbeddingEndpoint {
    pub api_key: String,
    /// `None` targets api.openai.com.
    pub base_url: Option<String>,
    pub model: String,
    /// Overrides the dimension inferred from the model name.
    pub dim: Option<usize>,
}

impl EmbeddingEndpoint {
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dim: None,
        }
    }
}

/// Known output sizes; unknown models are assumed to match `text-embedding-3-small`.
fn inferred_dim(model: &str) -> usize {
    let name = model.rsplit('/').next().unwrap_or(model);
    let name = name.split(':').next().unwrap_or(name);
    match name {
        "text-embedding-3-large" => 3072,
        "nomic-embed-text" => 768,
        "mxbai-embed-large" | "bge-large" => 1024,
        "all-minilm" => 384,
        _ => 1536,
    }
}

/// Rate limits, server errors and dropped connections are worth retrying.
fn is_retryable(err: &OpenAIError) -> bool {
    match err {
        OpenAIError::Reqwest(e) => e.is_timeout() || e.is_connect(),
        OpenAIError::ApiError(api) => {
            matches!(api.code.as_deref(), Some("rate_limit_exceeded"))
                || matches!(api.r#type.as_deref(), Some("requests" | "tokens" | "server_error"))
        }
        _ => false,
    }
}

fn prepare(text: &str) -> String {
    if text.trim().is_empty() {
        // Blank input is rejected by the API.
        return " ".to_string();
    }
    truncate_with_ellipsis(text, MAX_INPUT_CHARS)
}

pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    dim: usize,
    retry_budget: Duration,
}

impl OpenAiEmbedder {
    pub fn new(endpoint: EmbeddingEndpoint) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(endpoint.api_key);
        if let Some(url) = endpoint.base_url {
            config = config.with_api_base(url);
        }
        Self {
            client: Client::with_config(config),
            dim: endpoint.dim.unwrap_or_else(|| inferred_dim(&endpoint.model)),
            model: endpoint.model,
            retry_budget: Duration::from_secs(60),
        }
    }

    /// Total time spent retrying one request before giving up.
    pub fn with_retry_budget(mut self, budget: Duration) -> Self {
        self.retry_budget = budget;
        self
    }

    async fn request(&self, inputs: Vec<String>) -> Result<Vec<Embedding>> {
        let expected = inputs.len();
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_interval(Duration::from_secs(10))
            .with_max_elapsed_time(Some(self.retry_budget))
            .build();

        let op = || {
            let inputs = inputs.clone();
            async move {
                let request = CreateEmbeddingRequestArgs::default()
                    .model(self.model.as_str())
                    .input(inputs)
                    .build()
                    .map_err(|e| backoff::Error::permanent(Graph4jError::Embedder(e.to_string())))?;

                match self.client.embeddings().create(request).await {
                    Ok(response) => Ok(response.data),
                    Err(e) if is_retryable(&e) => {
                        Err(backoff::Error::transient(Graph4jError::Embedder(e.to_string())))
                    }
                    Err(e) => Err(backoff::Error::permanent(Graph4jError::Embedder(e.to_string()))),
                }
            }
        };
        let notify = |err: Graph4jError, wait: Duration| {
            warn!(model = %self.model, error = %err, wait_ms = wait.as_millis() as u64, "embedding request failed, retrying");
        };

        let mut data = retry_notify(policy, op, notify).await?;
        if data.len() != expected {
            return Err(Graph4jError::Embedder(format!(
                "{} returned {} embeddings for {expected} inputs",
                self.model,
                data.len()
            )));
        }
        // Some servers do not preserve input order.
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbedderClient for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.request(vec![prepare(text)])
            .await?
            .pop()
            .ok_or_else(|| Graph4jError::Embedder(format!("{} returned no embedding", self.model)))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(CHUNK_SIZE) {
            out.extend(self.request(chunk.iter().map(|t| prepare(t)).collect()).await?);
        }
        debug!(model = %self.model, count = out.len(), "embedded batch");
        Ok(out)
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn model(&self) -> &str {
        &self.model
    }
}

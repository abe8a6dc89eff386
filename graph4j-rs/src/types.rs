//! Shared configuration, routing modes and binding names.

use std::fmt;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::{Graph4jError, Result};

/// Default quality embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Name of one of the two store bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingName {
    Fast,
    Quality,
}

impl BindingName {
    pub fn as_str(&self) -> &'static str {
        match self {
            BindingName::Fast => "fast",
            BindingName::Quality => "quality",
        }
    }
}

impl fmt::Display for BindingName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request routing mode accepted by every ingestion and search call.
///
/// `"quality"` is accepted as an alias of `"default"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingMode {
    Fast,
    #[default]
    #[serde(alias = "quality")]
    Default,
    Dual,
}

impl EmbeddingMode {
    /// The single binding this mode targets, or `None` for [`EmbeddingMode::Dual`].
    pub fn single_binding(&self) -> Option<BindingName> {
        match self {
            EmbeddingMode::Fast => Some(BindingName::Fast),
            EmbeddingMode::Default => Some(BindingName::Quality),
            EmbeddingMode::Dual => None,
        }
    }
}

/// Which graph store implementation backs the bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Neo4j,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = Graph4jError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "neo4j" => Ok(StoreBackend::Neo4j),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(Graph4jError::Validation(format!(
                "STORE_BACKEND must be 'neo4j' or 'memory', got '{other}'"
            ))),
        }
    }
}

/// Bounded exponential backoff applied to transient store failures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub initial_interval: Duration,
    pub max_elapsed: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(200),
            max_elapsed: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    /// A policy that gives up on the first transient failure.
    pub fn none() -> Self {
        Self {
            initial_interval: Duration::from_millis(1),
            max_elapsed: Duration::ZERO,
        }
    }

    /// Fresh retry state for one logical store operation.
    pub fn policy(&self) -> RetryPolicy {
        let backoff = (!self.max_elapsed.is_zero()).then(|| {
            ExponentialBackoffBuilder::new()
                .with_initial_interval(self.initial_interval)
                .with_max_interval(self.max_elapsed.max(self.initial_interval))
                .with_max_elapsed_time(Some(self.max_elapsed))
                .build()
        });
        RetryPolicy { backoff }
    }
}

/// Retry state for one store operation. Only [`Graph4jError::is_transient`]
/// failures are retried.
#[derive(Debug)]
pub struct RetryPolicy {
    backoff: Option<ExponentialBackoff>,
}

impl RetryPolicy {
    /// How long to wait before retrying after `err`, or `None` to give up.
    pub fn delay_for(&mut self, err: &Graph4jError) -> Option<Duration> {
        if !err.is_transient() {
            return None;
        }
        self.backoff.as_mut()?.next_backoff()
    }
}

/// Central configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Graph4jConfig {
    /// API key for the OpenAI-compatible LLM and embedding endpoints.
    #[validate(length(min = 1))]
    pub openai_api_key: String,

    /// Base URL of the LLM endpoint (`None` → api.openai.com).
    pub openai_base_url: Option<String>,

    /// LLM model used for extraction.
    #[validate(length(min = 1))]
    pub model_name: String,

    /// Base URL of the quality embedding endpoint.
    pub embedding_base_url: Option<String>,

    /// Quality embedding model.
    #[validate(length(min = 1))]
    pub embedding_model: String,

    /// Quality embedding dimension override.
    pub embedding_dim: Option<usize>,

    /// Base URL of the fast embedding endpoint.
    pub fast_base_url: Option<String>,

    /// Fast embedding model.
    #[validate(length(min = 1))]
    pub fast_embedding_model: String,

    /// Fast embedding dimension override.
    pub fast_embedding_dim: Option<usize>,

    /// Neo4j URI of the quality store.
    #[validate(length(min = 1))]
    pub neo4j_uri: String,

    /// Neo4j URI of the fast store.
    #[validate(length(min = 1))]
    pub neo4j_fast_uri: String,

    pub neo4j_user: String,

    pub neo4j_password: String,

    pub store_backend: StoreBackend,

    pub retry: RetryConfig,
}

impl Default for Graph4jConfig {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            openai_base_url: None,
            model_name: "gpt-4o".to_string(),
            embedding_base_url: None,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dim: None,
            fast_base_url: None,
            fast_embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            fast_embedding_dim: None,
            neo4j_uri: "bolt://localhost:7687".to_string(),
            neo4j_fast_uri: "bolt://localhost:7787".to_string(),
            neo4j_user: "neo4j".to_string(),
            neo4j_password: String::new(),
            store_backend: StoreBackend::Neo4j,
            retry: RetryConfig::default(),
        }
    }
}

impl Graph4jConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` first (non-fatal if `.env` is absent).
    /// Unset embedding endpoints cascade: `EMBEDDING_BASE_URL` falls back to
    /// `OPENAI_BASE_URL`, and the fast embedder falls back to the quality
    /// embedder's URL and model. `NEO4J_PASSWORD` is only required for the
    /// neo4j backend.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let openai_api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            Graph4jError::Validation("OPENAI_API_KEY is required".to_string())
        })?;
        let openai_base_url = non_empty_var("OPENAI_BASE_URL");
        let model_name = std::env::var("MODEL_NAME").unwrap_or_else(|_| "gpt-4o".to_string());

        let embedding_base_url = non_empty_var("EMBEDDING_BASE_URL").or(openai_base_url.clone());
        let embedding_model = std::env::var("EMBEDDING_MODEL")
            .unwrap_or_else(|_| DEFAULT_EMBEDDING_MODEL.to_string());
        let embedding_dim = parse_dim("EMBEDDING_DIM")?;

        let fast_base_url = non_empty_var("FAST_BASE_URL").or(embedding_base_url.clone());
        let fast_embedding_model =
            std::env::var("FAST_EMBEDDING_MODEL").unwrap_or_else(|_| embedding_model.clone());
        let fast_embedding_dim = parse_dim("FAST_EMBEDDING_DIM")?;

        let neo4j_uri =
            std::env::var("NEO4J_URI").unwrap_or_else(|_| "bolt://localhost:7687".to_string());
        let neo4j_fast_uri = std::env::var("NEO4J_FAST_URI")
            .unwrap_or_else(|_| "bolt://localhost:7787".to_string());
        let neo4j_user = std::env::var("NEO4J_USER").unwrap_or_else(|_| "neo4j".to_string());

        let store_backend = match std::env::var("STORE_BACKEND") {
            Ok(val) => val.parse()?,
            Err(_) => StoreBackend::Neo4j,
        };

        let neo4j_password = match (std::env::var("NEO4J_PASSWORD"), store_backend) {
            (Ok(pw), _) => pw,
            (Err(_), StoreBackend::Memory) => String::new(),
            (Err(_), StoreBackend::Neo4j) => {
                return Err(Graph4jError::Validation(
                    "NEO4J_PASSWORD is required".to_string(),
                ))
            }
        };

        let defaults = RetryConfig::default();
        let retry = RetryConfig {
            initial_interval: parse_millis("STORE_RETRY_INITIAL_MS", defaults.initial_interval)?,
            max_elapsed: parse_millis("STORE_RETRY_MAX_ELAPSED_MS", defaults.max_elapsed)?,
        };

        let config = Self {
            openai_api_key,
            openai_base_url,
            model_name,
            embedding_base_url,
            embedding_model,
            embedding_dim,
            fast_base_url,
            fast_embedding_model,
            fast_embedding_dim,
            neo4j_uri,
            neo4j_fast_uri,
            neo4j_user,
            neo4j_password,
            store_backend,
            retry,
        };

        config
            .validate()
            .map_err(|e| Graph4jError::Validation(e.to_string()))?;

        Ok(config)
    }

    /// Whether the fast and quality bindings point at distinct Neo4j instances.
    pub fn is_dual_database(&self) -> bool {
        self.neo4j_fast_uri != self.neo4j_uri
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_dim(name: &str) -> Result<Option<usize>> {
    match std::env::var(name) {
        Ok(val) => match val.parse::<usize>() {
            Ok(0) | Err(_) => Err(Graph4jError::Validation(format!(
                "{name} must be a positive integer"
            ))),
            Ok(dim) => Ok(Some(dim)),
        },
        Err(_) => Ok(None),
    }
}

fn parse_millis(name: &str, default: Duration) -> Result<Duration> {
    match std::env::var(name) {
        Ok(val) => val.parse::<u64>().map(Duration::from_millis).map_err(|_| {
            Graph4jError::Validation(format!("{name} must be a number of milliseconds"))
        }),
        Err(_) => Ok(default),
    }
}

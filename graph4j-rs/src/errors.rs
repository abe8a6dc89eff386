//! Error types for graph4j-rs.

/// Alias for Results returning [`Graph4jError`].
pub type Result<T> = std::result::Result<T, Graph4jError>;

/// Top-level error type for graph4j-rs.
#[derive(Debug, thiserror::Error)]
pub enum Graph4jError {
    /// Extraction failed (malformed content or upstream LLM failure).
    /// Never retried by the coordinators; no persistence is attempted.
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// The embedding provider of a binding failed.
    #[error("Embedder error: {0}")]
    Embedder(String),

    /// The graph store could not be reached. Eligible for bounded retry.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The graph store rejected the write (schema or constraint violation).
    #[error("Store constraint violated: {0}")]
    StoreConstraint(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Edge not found: {0}")]
    EdgeNotFound(String),
}

impl Graph4jError {
    /// Whether a store operation that failed with this error may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Graph4jError::StoreUnavailable(_))
    }
}

/// LLM-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Rate limited")]
    RateLimit,

    #[error("Model refused to respond")]
    Refusal,

    #[error("Empty response from LLM")]
    EmptyResponse,

    #[error("Authentication failed")]
    Authentication,

    #[error("API error: HTTP {status}: {message}")]
    Api { status: u16, message: String },
}

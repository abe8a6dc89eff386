//! Embedder client abstraction.
//!
//! Provides an object-safe trait for generating vector embeddings from text.
//! Each store binding owns one embedder; a vector is only ever compared with
//! vectors produced by the same embedder.
//!
//! # Implementations
//! - [`openai::OpenAiEmbedder`]: any OpenAI-compatible `/embeddings` endpoint (OpenAI, Ollama, vLLM).
//! - [`hash::HashEmbedder`]: deterministic feature hashing, for tests and offline runs.

pub mod hash;
pub mod openai;

use async_trait::async_trait;

use crate::errors::Result;

/// A vector embedding (f32 components).
pub type Embedding = Vec<f32>;

/// Trait for text-to-vector embedding clients.
#[async_trait]
pub trait EmbedderClient: Send + Sync {
    /// Generate an embedding for a single text string.
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Generate embeddings for a batch of texts, one per input, in order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>>;

    /// Returns the dimensionality of embeddings produced by this client.
    fn dim(&self) -> usize;

    /// Model identifier, used in logs.
    fn model(&self) -> &str;
}

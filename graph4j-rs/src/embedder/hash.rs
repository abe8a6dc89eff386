//! Deterministic feature-hashing embedder.
//!
//! Tokens are hashed (with a per-instance seed) into a fixed number of signed
//! buckets and the result is L2-normalised. Two instances with different
//! seeds behave like two different embedding providers: the same text gets
//! different vectors, which is what the dual-store tests rely on.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::embedder::{Embedding, EmbedderClient};
use crate::errors::Result;
use crate::utils::{normalize_l2, normalize_whitespace};

pub struct HashEmbedder {
    model: String,
    seed: u64,
    dim: usize,
    calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new(model: impl Into<String>, seed: u64, dim: usize) -> Self {
        Self {
            model: model.into(),
            seed,
            dim: dim.max(1),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of texts embedded so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vectorize(&self, text: &str) -> Embedding {
        let mut v = vec![0.0_f32; self.dim];
        for token in normalize_whitespace(text).to_lowercase().split(' ') {
            if token.is_empty() {
                continue;
            }
            let mut h = DefaultHasher::new();
            self.seed.hash(&mut h);
            token.hash(&mut h);
            let bits = h.finish();
            let bucket = (bits % self.dim as u64) as usize;
            let sign = if bits >> 63 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        normalize_l2(&v)
    }
}

#[async_trait]
impl EmbedderClient for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vectorize(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        self.calls.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn model(&self) -> &str {
        &self.model
    }
}

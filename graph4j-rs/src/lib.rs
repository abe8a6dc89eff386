//! # graph4j-rs
//!
//! Coordinated ingestion and search over two knowledge-graph stores that are
//! populated with different embedding providers.
//!
//! ## Architecture
//!
//! - **Bindings**: a `fast` and a `quality` store, each paired with its own embedder
//! - **Single extraction**: one LLM pass per episode, persisted to one or both stores
//! - **Partial-failure reporting**: `dual` writes and reads report per-store outcomes
//! - **Hybrid retrieval**: keyword + vector cosine per store, RRF or node-distance reranking,
//!   then an order-preserving merge across stores

pub mod edges;
pub mod errors;
pub mod nodes;
pub mod types;

pub mod bindings;
pub mod driver;
pub mod embedder;
pub mod llm_client;
pub mod outcome;

pub mod prompts;
pub mod search;

pub mod pipeline;
pub mod utils;

pub use bindings::{Bindings, StoreBinding};
pub use errors::{Graph4jError, LlmError, Result};
pub use outcome::{BindingFailure, DualResult};
pub use pipeline::{GraphFragment, IngestOutcome, IngestionCoordinator, PersistResult};
pub use search::{FactSearch, NodeSearch, SearchCoordinator, SearchOutcome};
pub use types::{BindingName, EmbeddingMode, Graph4jConfig, RetryConfig};

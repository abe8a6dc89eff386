//! Store bindings: the `fast` and `quality` pairings of a graph store with an
//! embedding provider.
//!
//! [`Bindings`] is built once at startup and shared read-only afterwards.

use std::sync::Arc;

use tracing::{info, warn};

use crate::driver::memory::MemoryDriver;
use crate::driver::neo4j::Neo4jDriver;
use crate::driver::GraphDriver;
use crate::embedder::openai::{EmbeddingEndpoint, OpenAiEmbedder};
use crate::embedder::EmbedderClient;
use crate::errors::Result;
use crate::types::{BindingName, EmbeddingMode, Graph4jConfig, StoreBackend};

/// One named pairing of a graph store and the provider that embeds into it.
pub struct StoreBinding {
    pub name: BindingName,
    pub driver: Arc<dyn GraphDriver>,
    pub embedder: Arc<dyn EmbedderClient>,
}

impl StoreBinding {
    pub fn new(
        name: BindingName,
        driver: Arc<dyn GraphDriver>,
        embedder: Arc<dyn EmbedderClient>,
    ) -> Self {
        Self {
            name,
            driver,
            embedder,
        }
    }
}

impl std::fmt::Debug for StoreBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreBinding")
            .field("name", &self.name)
            .field("backend", &self.driver.backend())
            .field("embedder", &self.embedder.model())
            .finish()
    }
}

/// The two bindings. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Bindings {
    fast: Arc<StoreBinding>,
    quality: Arc<StoreBinding>,
}

impl Bindings {
    pub fn new(fast: StoreBinding, quality: StoreBinding) -> Self {
        Self {
            fast: Arc::new(fast),
            quality: Arc::new(quality),
        }
    }

    /// Connect to the stores and embedding endpoints named by `config`.
    ///
    /// When both store URIs are equal the bindings share one driver.
    pub async fn connect(config: &Graph4jConfig) -> Result<Self> {
        let quality_embedder = build_embedder(
            &config.openai_api_key,
            &config.embedding_model,
            config.embedding_base_url.as_deref(),
            config.embedding_dim,
        );
        let fast_embedder = build_embedder(
            &config.openai_api_key,
            &config.fast_embedding_model,
            config.fast_base_url.as_deref(),
            config.fast_embedding_dim,
        );

        let (fast_driver, quality_driver): (Arc<dyn GraphDriver>, Arc<dyn GraphDriver>) =
            match config.store_backend {
                StoreBackend::Neo4j => {
                    let quality: Arc<dyn GraphDriver> = Arc::new(
                        Neo4jDriver::new(&config.neo4j_uri, &config.neo4j_user, &config.neo4j_password)
                            .await?,
                    );
                    let fast: Arc<dyn GraphDriver> = if config.is_dual_database() {
                        Arc::new(
                            Neo4jDriver::new(
                                &config.neo4j_fast_uri,
                                &config.neo4j_user,
                                &config.neo4j_password,
                            )
                            .await?,
                        )
                    } else {
                        Arc::clone(&quality)
                    };
                    (fast, quality)
                }
                StoreBackend::Memory => {
                    let quality: Arc<dyn GraphDriver> = Arc::new(MemoryDriver::new());
                    let fast: Arc<dyn GraphDriver> = if config.is_dual_database() {
                        Arc::new(MemoryDriver::new())
                    } else {
                        Arc::clone(&quality)
                    };
                    (fast, quality)
                }
            };

        info!(
            backend = ?config.store_backend,
            fast_uri = %config.neo4j_fast_uri,
            quality_uri = %config.neo4j_uri,
            fast_model = %config.fast_embedding_model,
            quality_model = %config.embedding_model,
            dual_store = config.is_dual_database(),
            "store bindings resolved"
        );

        Ok(Self::new(
            StoreBinding::new(BindingName::Fast, fast_driver, fast_embedder),
            StoreBinding::new(BindingName::Quality, quality_driver, quality_embedder),
        ))
    }

    pub fn fast(&self) -> &StoreBinding {
        &self.fast
    }

    pub fn quality(&self) -> &StoreBinding {
        &self.quality
    }

    pub fn get(&self, name: BindingName) -> &StoreBinding {
        match name {
            BindingName::Fast => &self.fast,
            BindingName::Quality => &self.quality,
        }
    }

    /// Whether both bindings write to the same physical store.
    pub fn is_single_store(&self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.fast.driver), Arc::as_ptr(&self.quality.driver))
    }

    /// The mode actually served for a requested one.
    ///
    /// `dual` against a single store would leave vectors from two providers
    /// in one index, so it is served as `default`.
    pub fn effective_mode(&self, requested: EmbeddingMode) -> EmbeddingMode {
        if requested == EmbeddingMode::Dual && self.is_single_store() {
            warn!("dual mode requested but both bindings share one store, serving default");
            return EmbeddingMode::Default;
        }
        requested
    }

    /// Bindings with distinct stores, quality first. Used for maintenance
    /// operations that must touch every store exactly once.
    pub fn distinct_stores(&self) -> Vec<&StoreBinding> {
        if self.is_single_store() {
            vec![self.quality()]
        } else {
            vec![self.quality(), self.fast()]
        }
    }
}

fn build_embedder(
    api_key: &str,
    model: &str,
    base_url: Option<&str>,
    dim: Option<usize>,
) -> Arc<dyn EmbedderClient> {
    Arc::new(OpenAiEmbedder::new(EmbeddingEndpoint {
        api_key: api_key.to_string(),
        base_url: base_url.map(str::to_string),
        model: model.to_string(),
        dim,
    }))
}

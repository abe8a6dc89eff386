//! Application state shared across route handlers.

use std::sync::Arc;

use graph4j_rs::{Bindings, IngestionCoordinator, SearchCoordinator};

use crate::worker::IngestQueue;

/// Shared application state. Every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub bindings: Bindings,
    pub ingestion: Arc<IngestionCoordinator>,
    pub search: Arc<SearchCoordinator>,
    pub queue: IngestQueue,
}

impl AppState {
    pub fn new(
        ingestion: Arc<IngestionCoordinator>,
        search: Arc<SearchCoordinator>,
        queue: IngestQueue,
    ) -> Self {
        Self {
            bindings: ingestion.bindings().clone(),
            ingestion,
            search,
            queue,
        }
    }
}

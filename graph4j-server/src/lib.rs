//! HTTP surface for graph4j: episode ingestion, hybrid search, and store
//! maintenance over the `fast` and `quality` bindings.

pub mod config;
pub mod dto;
pub mod error;
pub mod routes;
pub mod state;
pub mod worker;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;

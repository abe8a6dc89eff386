//! Router setup.

mod ingest;
mod search;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::dto::{Health, ServiceInfo};
use crate::state::AppState;

pub const SERVICE_NAME: &str = "graph4j";

/// Build the router with every endpoint and request tracing.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/episodes", post(ingest::add_episodes))
        .route("/episodes/{group_id}", get(search::get_episodes))
        .route("/episode/{uuid}", delete(ingest::delete_episode))
        .route("/group/{group_id}", delete(ingest::delete_group))
        .route(
            "/entity-edge/{uuid}",
            get(search::get_entity_edge).delete(ingest::delete_entity_edge),
        )
        .route("/clear", post(ingest::clear))
        .route("/search", post(search::legacy_search))
        .route("/search/nodes", post(search::search_nodes))
        .route("/search/facts", post(search::search_facts))
        .route("/get-memory", post(search::get_memory))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        dual_store: !state.bindings.is_single_store(),
    })
}

/// Liveness probe.
async fn health() -> Json<Health> {
    Json(Health {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
    })
}

/// Readiness probe: 200 only if every store answers a ping.
async fn ready(State(state): State<AppState>) -> StatusCode {
    for binding in state.bindings.distinct_stores() {
        if let Err(e) = binding.driver.ping().await {
            warn!(binding = %binding.name, error = %e, "store not ready");
            return StatusCode::SERVICE_UNAVAILABLE;
        }
    }
    StatusCode::OK
}

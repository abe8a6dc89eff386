//! Search and lookup endpoints.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use graph4j_rs::nodes::EpisodicNode;
use graph4j_rs::{EmbeddingMode, FactSearch, NodeSearch};

use crate::dto::{
    compose_query, limit, Degraded, EpisodesQuery, FactResult, FactSearchRequest,
    FactSearchResponse, GetMemoryRequest, NodeResult, NodeSearchRequest, NodeSearchResponse,
    SearchQuery,
};
use crate::error::ApiError;
use crate::state::AppState;

pub async fn search_nodes(
    State(state): State<AppState>,
    Json(request): Json<NodeSearchRequest>,
) -> Result<Json<NodeSearchResponse>, ApiError> {
    let search = NodeSearch {
        query: request.query,
        group_ids: request.group_ids.unwrap_or_default(),
        max_nodes: limit(request.max_nodes),
        entity_types: request.entity_types.unwrap_or_default(),
    };
    let outcome = state.search.search_nodes(&search, request.embedding_mode).await?;
    Ok(Json(NodeSearchResponse {
        nodes: outcome.results.iter().map(NodeResult::from).collect(),
        degraded: outcome.degraded.as_ref().map(Degraded::from),
    }))
}

async fn facts(
    state: &AppState,
    search: FactSearch,
    mode: EmbeddingMode,
) -> Result<FactSearchResponse, ApiError> {
    let outcome = state.search.search_facts(&search, mode).await?;
    Ok(FactSearchResponse {
        facts: outcome.results.iter().map(FactResult::from).collect(),
        degraded: outcome.degraded.as_ref().map(Degraded::from),
    })
}

pub async fn search_facts(
    State(state): State<AppState>,
    Json(request): Json<FactSearchRequest>,
) -> Result<Json<FactSearchResponse>, ApiError> {
    let search = FactSearch {
        query: request.query,
        group_ids: request.group_ids.unwrap_or_default(),
        max_facts: limit(request.max_facts),
        center_node_uuid: request.center_node_uuid,
    };
    Ok(Json(facts(&state, search, request.embedding_mode).await?))
}

/// Legacy fact search against the quality store.
pub async fn legacy_search(
    State(state): State<AppState>,
    Json(request): Json<SearchQuery>,
) -> Result<Json<FactSearchResponse>, ApiError> {
    let search = FactSearch {
        query: request.query,
        group_ids: request.group_ids.unwrap_or_default(),
        max_facts: limit(request.max_facts),
        center_node_uuid: None,
    };
    Ok(Json(facts(&state, search, EmbeddingMode::Default).await?))
}

/// Fact search with a query composed from a conversation.
pub async fn get_memory(
    State(state): State<AppState>,
    Json(request): Json<GetMemoryRequest>,
) -> Result<Json<FactSearchResponse>, ApiError> {
    let search = FactSearch {
        query: compose_query(&request.messages),
        group_ids: vec![request.group_id],
        max_facts: limit(request.max_facts),
        center_node_uuid: request.center_node_uuid,
    };
    Ok(Json(facts(&state, search, EmbeddingMode::Default).await?))
}

/// Look the edge up in the quality store, then the fast store.
pub async fn get_entity_edge(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
) -> Result<Json<FactResult>, ApiError> {
    for binding in state.bindings.distinct_stores() {
        if let Some(edge) = binding.driver.get_entity_edge(uuid).await? {
            return Ok(Json(FactResult::from(&edge)));
        }
    }
    Err(ApiError::NotFound(format!("entity edge {uuid} not found")))
}

/// Most recent episodes of a group from the quality store, oldest first.
pub async fn get_episodes(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Query(query): Query<EpisodesQuery>,
) -> Result<Json<Vec<EpisodicNode>>, ApiError> {
    let episodes = state
        .bindings
        .quality()
        .driver
        .retrieve_episodes(&[group_id], query.last_n, Utc::now())
        .await?;
    Ok(Json(episodes))
}

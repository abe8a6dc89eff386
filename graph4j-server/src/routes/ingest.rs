//! Episode ingestion and maintenance endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::info;
use uuid::Uuid;

use crate::dto::{Ack, AddEpisodesRequest, AddEpisodesResponse, EpisodeReport, EpisodeStatus};
use crate::error::ApiError;
use crate::state::AppState;
use crate::worker::IngestJob;

/// `POST /episodes`: queue the episodes, or ingest them inline when `wait` is set.
pub async fn add_episodes(
    State(state): State<AppState>,
    Json(request): Json<AddEpisodesRequest>,
) -> Result<(StatusCode, Json<AddEpisodesResponse>), ApiError> {
    if request.group_id.trim().is_empty() {
        return Err(ApiError::BadRequest("group_id must not be empty".to_string()));
    }
    let count = request.episodes.len();

    if !request.wait {
        for input in request.episodes {
            state
                .queue
                .enqueue(IngestJob {
                    input,
                    group_id: request.group_id.clone(),
                    mode: request.embedding_mode,
                })
                .await?;
        }
        info!(group_id = %request.group_id, count, pending = state.queue.pending(), "episodes queued");
        return Ok((
            StatusCode::ACCEPTED,
            Json(AddEpisodesResponse {
                message: "Episodes added to processing queue".to_string(),
                success: true,
                episodes: Vec::new(),
            }),
        ));
    }

    let mut reports = Vec::with_capacity(count);
    for input in &request.episodes {
        let report = match state
            .ingestion
            .ingest(input, &request.group_id, request.embedding_mode)
            .await
        {
            Ok(outcome) => EpisodeReport::from_outcome(&outcome),
            Err(e) => EpisodeReport::failed(input.uuid, e),
        };
        reports.push(report);
    }

    let success = reports.iter().all(|r| r.status == EpisodeStatus::Success);
    let message = if success {
        "Episodes ingested".to_string()
    } else {
        "Some episodes were not fully ingested".to_string()
    };
    Ok((
        StatusCode::OK,
        Json(AddEpisodesResponse {
            message,
            success,
            episodes: reports,
        }),
    ))
}

/// `DELETE /entity-edge/{uuid}` on every store.
pub async fn delete_entity_edge(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
) -> Result<Json<Ack>, ApiError> {
    for binding in state.bindings.distinct_stores() {
        binding.driver.delete_entity_edge(uuid).await?;
    }
    Ok(Json(Ack::ok("Entity Edge deleted")))
}

/// `DELETE /episode/{uuid}` on every store.
pub async fn delete_episode(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
) -> Result<Json<Ack>, ApiError> {
    for binding in state.bindings.distinct_stores() {
        binding.driver.delete_episode(uuid).await?;
    }
    Ok(Json(Ack::ok("Episode deleted")))
}

/// `DELETE /group/{group_id}` on every store.
pub async fn delete_group(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
) -> Result<Json<Ack>, ApiError> {
    for binding in state.bindings.distinct_stores() {
        binding.driver.delete_group(&group_id).await?;
    }
    info!(%group_id, "group deleted");
    Ok(Json(Ack::ok("Group deleted")))
}

/// `POST /clear`: wipe every store and rebuild its indices.
pub async fn clear(State(state): State<AppState>) -> Result<Json<Ack>, ApiError> {
    for binding in state.bindings.distinct_stores() {
        binding.driver.clear().await?;
        binding.driver.build_indices_and_constraints().await?;
    }
    Ok(Json(Ack::ok("Graph cleared")))
}

//! API error type and JSON error bodies.
//!
//! Every handler returns `Result<_, ApiError>`; library errors are mapped
//! onto HTTP status codes here and nowhere else.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use graph4j_rs::Graph4jError;

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable code, e.g. `"not_found"`.
    pub error: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    /// 400: malformed or invalid parameters.
    BadRequest(String),
    /// 404: no such edge, node or episode.
    NotFound(String),
    /// 422: the episode could not be turned into a graph.
    UnprocessableEntity(String),
    /// 500
    Internal(String),
    /// 502: the LLM or embedding provider failed.
    BadGateway(String),
    /// 503: a graph store is unreachable, or the server is shutting down.
    ServiceUnavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::UnprocessableEntity(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "unprocessable_entity", msg)
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "bad_gateway", msg),
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg)
            }
        };

        if status.is_server_error() {
            error!(status = status.as_u16(), %message, "request failed");
        }

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

impl From<Graph4jError> for ApiError {
    fn from(err: Graph4jError) -> Self {
        match &err {
            Graph4jError::Validation(msg) => ApiError::BadRequest(msg.clone()),
            Graph4jError::NodeNotFound(_) | Graph4jError::EdgeNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            Graph4jError::Extraction(msg) => ApiError::UnprocessableEntity(msg.clone()),
            Graph4jError::Llm(_) | Graph4jError::Embedder(_) => ApiError::BadGateway(err.to_string()),
            Graph4jError::StoreUnavailable(_) => ApiError::ServiceUnavailable(err.to_string()),
            Graph4jError::StoreConstraint(_)
            | Graph4jError::Search(_)
            | Graph4jError::Serialization(_) => ApiError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(err: Graph4jError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn maps_library_errors_to_status_codes() {
        assert_eq!(status(Graph4jError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(Graph4jError::Extraction("x".into())), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status(Graph4jError::Embedder("x".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(status(Graph4jError::StoreUnavailable("x".into())), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status(Graph4jError::StoreConstraint("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use grounded_core::GroundedError;

/// HTTP boundary for the error taxonomy. Validator anomalies never reach
/// here; they travel as warnings inside successful responses.
pub struct AppError(pub GroundedError);

impl From<GroundedError> for AppError {
    fn from(err: GroundedError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            GroundedError::InputInvalid(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            GroundedError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            GroundedError::EmbeddingFailed(msg) | GroundedError::RetrievalFailed(msg) => {
                (StatusCode::BAD_GATEWAY, msg.clone())
            }
            GroundedError::GenerationFailed(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            other => {
                error!(error = %other, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

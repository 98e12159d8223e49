use crate::domain::error::CoreError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Newtype over the domain error so the HTTP mapping lives in the adapter
/// layer, not the domain.
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self.0 {
            CoreError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            CoreError::InvalidState(msg) => (StatusCode::CONFLICT, "invalid_state", msg.clone()),
            CoreError::Expired(msg) => (StatusCode::GONE, "hold_expired", msg.clone()),
            CoreError::Auth(_) => (
                StatusCode::UNAUTHORIZED,
                "auth_failure",
                "invalid webhook signature".to_string(),
            ),
            CoreError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            CoreError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                msg.clone(),
            ),
            CoreError::Database(err) => {
                tracing::error!("database error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error".to_string(),
                )
            }
            CoreError::Serialization(err) => {
                tracing::error!("serialization error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error_code": error_code,
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}

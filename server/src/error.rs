use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use narration_core::NarrationError;
use serde::Serialize;
use thiserror::Error;

/// API Error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Provider error: {0}")]
    ProviderError(#[from] anyhow::Error),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl From<NarrationError> for ApiError {
    fn from(e: NarrationError) -> Self {
        match e {
            NarrationError::InvalidInput(msg) => ApiError::InvalidInput(msg),
            NarrationError::Provider { index, source } => {
                ApiError::ProviderError(source.context(format!("chunk {index}")))
            }
            NarrationError::Cancelled => ApiError::InternalError("narration cancelled".to_string()),
        }
    }
}

/// Error response structure
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::ProviderError(e) => {
                tracing::error!("Provider error: {:#}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Provider error: {:#}", e))
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}

//! Error body shared by every endpoint and its mapping from crate errors

use crate::HalcyonError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// Longest `details` string ever sent to a client
const MAX_DETAILS_CHARS: usize = 200;

/// Error body returned by every endpoint: `{"error": ..., "details"?: ...}`
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>, details: &str) -> Self {
        Self {
            details: Some(truncate(details, MAX_DETAILS_CHARS)),
            ..Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
        }
    }

    pub fn bad_gateway(message: impl Into<String>, details: &str) -> Self {
        Self {
            details: Some(details.to_string()),
            ..Self::new(StatusCode::BAD_GATEWAY, message)
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.details {
            Some(details) => json!({ "error": self.message, "details": details }),
            None => json!({ "error": self.message }),
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<HalcyonError> for ApiError {
    fn from(err: HalcyonError) -> Self {
        match err {
            HalcyonError::Validation(reason) => Self::bad_request(reason),
            // Provider internals stay in the server log.
            HalcyonError::Generation(detail) => {
                error!(error = %detail, "Generation failed under strict policy");
                Self::bad_gateway(
                    "Generation failed",
                    "The generation provider did not return a response",
                )
            }
            other => {
                error!(error = %other, "Unexpected error while handling request");
                Self::internal("Internal server error", &other.to_string())
            }
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

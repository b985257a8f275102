//! API error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::infra::VerifyError;

/// Errors surfaced to the submitting client.
///
/// Only client input errors are reported synchronously; fraud verdicts are a
/// backend concern and never reach the (possibly malicious) client.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error handling submission");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string()).into_response()
            }
        }
    }
}

impl From<VerifyError> for ApiError {
    fn from(e: VerifyError) -> Self {
        match e {
            VerifyError::UnknownGame => ApiError::BadRequest("invalid game".to_string()),
            VerifyError::MalformedPayload(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

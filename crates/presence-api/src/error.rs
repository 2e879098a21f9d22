//! API error types.
//!
//! Every error body is `{"error": "<message>"}`. Backend and internal
//! failures are logged in full and answered with a fixed message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use presence_models::{BackendKind, ErrorBody};
use presence_vision::{BackendErrorKind, VisionError};
use thiserror::Error;
use tracing::error;

pub type ApiResult<T> = Result<T, ApiError>;

/// Client-facing message for a failed detection.
pub const DETECTION_FAILED: &str = "An error occurred during detection.";
/// Client-facing message for an undecodable upload.
pub const INVALID_IMAGE: &str = "Uploaded file is not a valid image.";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Upload exceeds the size limit.")]
    PayloadTooLarge,

    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Vision(#[from] VisionError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Vision(e) => match e {
                VisionError::BadInput(_) | VisionError::DecodeFailure(_) => StatusCode::BAD_REQUEST,
                VisionError::NoBackend { .. } => StatusCode::SERVICE_UNAVAILABLE,
                VisionError::BackendFailure(b) if b.kind == BackendErrorKind::Unavailable => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                VisionError::BackendFailure(_) | VisionError::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    /// Message safe to show a client.
    fn public_message(&self) -> String {
        match self {
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::PayloadTooLarge | ApiError::RateLimited => self.to_string(),
            ApiError::Internal(_) => DETECTION_FAILED.to_string(),
            ApiError::Vision(e) => match e {
                VisionError::BadInput(input) => input.to_string(),
                VisionError::DecodeFailure(_) => INVALID_IMAGE.to_string(),
                VisionError::NoBackend { service, .. } => {
                    format!("{} service is unavailable.", service)
                }
                VisionError::BackendFailure(b) if b.kind == BackendErrorKind::Unavailable => {
                    let service = b
                        .backend
                        .parse::<BackendKind>()
                        .map(|k| k.display_name())
                        .unwrap_or(b.backend);
                    format!("{} service is unavailable.", service)
                }
                VisionError::BackendFailure(_) | VisionError::Internal(_) => {
                    DETECTION_FAILED.to_string()
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Full details stay in the logs
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        }

        let body = ErrorBody::new(self.public_message());
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_vision::{BackendError, DecodeError, InputError};

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(ApiError, StatusCode, &str)> = vec![
            (
                VisionError::from(InputError::MissingFile).into(),
                StatusCode::BAD_REQUEST,
                "No image file provided.",
            ),
            (
                VisionError::from(DecodeError::EmptyInput).into(),
                StatusCode::BAD_REQUEST,
                INVALID_IMAGE,
            ),
            (
                VisionError::NoBackend { service: "HOG detector", reason: "x".into() }.into(),
                StatusCode::SERVICE_UNAVAILABLE,
                "HOG detector service is unavailable.",
            ),
            (
                VisionError::from(BackendError::transient("cloud", "secret upstream detail"))
                    .into(),
                StatusCode::INTERNAL_SERVER_ERROR,
                DETECTION_FAILED,
            ),
            (
                ApiError::internal("stack trace"),
                StatusCode::INTERNAL_SERVER_ERROR,
                DETECTION_FAILED,
            ),
        ];

        for (err, status, message) in cases {
            assert_eq!(err.status_code(), status);
            assert_eq!(err.public_message(), message);
        }
    }
}

// Error handling module
// Defines error types and HTTP response conversion for the binding layer.
//
// Per-probe failures are *not* represented here; they are captured as data
// on the Fingerprint itself (see fingerprint::Fingerprint::error) so that a
// single failed probe never aborts a detection. DetectorError exists only
// for failures that legitimately prevent any probe from being issued at all:
// bad input, or a transport-setup failure.

use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectorError {
    /// Request failed basic validation (missing key, empty model list,
    /// malformed base_url) before any probe was issued.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The SSRF filter rejected the target host for a non-admin caller.
    #[error("SSRF blocked: {0}")]
    SsrfBlocked(String),

    /// Failed to construct the underlying HTTP client.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for DetectorError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            DetectorError::ValidationError(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg),
            DetectorError::SsrfBlocked(msg) => (StatusCode::FORBIDDEN, "ssrf_blocked", msg),
            DetectorError::Internal(err) => {
                tracing::error!("Internal error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": message,
                "type": error_type,
            }
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, DetectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_message() {
        let err = DetectorError::ValidationError("models must not be empty".to_string());
        assert_eq!(err.to_string(), "Validation error: models must not be empty");
    }

    #[test]
    fn ssrf_error_message() {
        let err = DetectorError::SsrfBlocked("connection to private IP blocked".to_string());
        assert_eq!(err.to_string(), "SSRF blocked: connection to private IP blocked");
    }

    #[tokio::test]
    async fn response_status_codes() {
        let err = DetectorError::ValidationError("bad".to_string());
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let err = DetectorError::SsrfBlocked("bad host".to_string());
        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);

        let err = DetectorError::Internal(anyhow::anyhow!("boom"));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

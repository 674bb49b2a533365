//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Application-wide error type.
///
/// Each variant maps to a specific HTTP status code and error code.
///
/// # Error Categories
///
/// - **Infrastructure Errors**: database, object storage, serialization
/// - **Authentication Errors**: invalid API keys or webhook signatures
/// - **Resource Errors**: requested users, files or API keys not found
/// - **Validation Errors**: invalid request data or state transitions
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Object storage call failed or could not be signed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// JSON encoding or decoding of an internal payload failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API key is missing, invalid, or inactive.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// Webhook delivery failed SVIX signature verification.
    ///
    /// Returns HTTP 401 Unauthorized. The reason is logged, never returned.
    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    /// Authenticated user is deactivated or does not own the resource.
    ///
    /// Returns HTTP 403 Forbidden.
    #[error("Forbidden")]
    Forbidden,

    #[error("User not found")]
    UserNotFound,

    #[error("File not found")]
    FileNotFound,

    #[error("API key not found")]
    ApiKeyNotFound,

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    #[error("Invalid request")]
    InvalidRequest(String),

    /// Operation is not allowed in the file's current status.
    ///
    /// Returns HTTP 409 Conflict.
    #[error("Invalid file state")]
    InvalidFileState(String),

    /// Declared upload size exceeds the configured maximum.
    #[error("File exceeds the maximum upload size of {0} bytes")]
    PayloadTooLarge(i64),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// Infrastructure errors return 500 and hide their details from the client.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                "invalid_api_key",
                self.to_string(),
            ),
            AppError::InvalidSignature(ref reason) => {
                tracing::warn!(reason = %reason, "Rejected webhook delivery");
                (
                    StatusCode::UNAUTHORIZED,
                    "invalid_signature",
                    "Webhook signature verification failed".to_string(),
                )
            }
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden", self.to_string()),
            AppError::UserNotFound => (StatusCode::NOT_FOUND, "user_not_found", self.to_string()),
            AppError::FileNotFound => (StatusCode::NOT_FOUND, "file_not_found", self.to_string()),
            AppError::ApiKeyNotFound => {
                (StatusCode::NOT_FOUND, "api_key_not_found", self.to_string())
            }
            AppError::InvalidRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::InvalidFileState(ref msg) => {
                (StatusCode::CONFLICT, "invalid_file_state", msg.clone())
            }
            AppError::PayloadTooLarge(_) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "payload_too_large",
                self.to_string(),
            ),
            AppError::UnsupportedFileType(_) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "unsupported_file_type",
                self.to_string(),
            ),
            AppError::Database(ref e) => {
                tracing::error!(error = %e, "Database error");
                internal_error()
            }
            AppError::Storage(ref e) => {
                tracing::error!(error = %e, "Storage error");
                internal_error()
            }
            AppError::Serialization(ref e) => {
                tracing::error!(error = %e, "Serialization error");
                internal_error()
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

fn internal_error() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "An internal error occurred".to_string(),
    )
}

impl AppError {
    /// Whether retrying the same operation later could succeed.
    ///
    /// Used by the webhook processor to decide between backoff and giving up.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Database(_) | AppError::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn signature_errors_do_not_leak_the_reason() {
        let response = AppError::InvalidSignature("timestamp too old".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "invalid_signature");
        assert!(!body["error"]["message"].as_str().unwrap().contains("timestamp"));
    }

    #[tokio::test]
    async fn storage_errors_are_hidden_behind_500() {
        let response = AppError::Storage("bucket missing".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "internal_error");
        assert_eq!(body["error"]["message"], "An internal error occurred");
    }

    #[test]
    fn status_mapping() {
        let cases = [
            (AppError::InvalidApiKey, StatusCode::UNAUTHORIZED),
            (AppError::Forbidden, StatusCode::FORBIDDEN),
            (AppError::FileNotFound, StatusCode::NOT_FOUND),
            (AppError::InvalidFileState("x".into()), StatusCode::CONFLICT),
            (AppError::PayloadTooLarge(1), StatusCode::PAYLOAD_TOO_LARGE),
            (
                AppError::UnsupportedFileType("image/gif".into()),
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn only_infrastructure_errors_are_transient() {
        assert!(AppError::Database(sqlx::Error::PoolTimedOut).is_transient());
        assert!(AppError::Storage("timeout".into()).is_transient());
        assert!(!AppError::InvalidRequest("bad".into()).is_transient());
        assert!(!AppError::UserNotFound.is_transient());
    }
}

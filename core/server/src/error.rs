//! HTTP error mapping.
//!
//! Every failure leaves the service as `{code, message, data: {status}}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use campussync_sync::SyncError;

/// Request-level failures.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Rejected by the sync engine.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// No credentials, or credentials that match no configured token.
    #[error("Authentication required.")]
    Unauthorized,

    /// Valid credentials without the required role.
    #[error("Sorry, you are not allowed to do that.")]
    Forbidden,
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Sync(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Sync(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Sync(e) => e.code(),
            ApiError::Unauthorized => "unauthorized",
            ApiError::Forbidden => "forbidden",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = json!({
            "code": self.code(),
            "message": self.to_string(),
            "data": {"status": status.as_u16()},
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campussync_common::Error;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(SyncError::NoTypes).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(SyncError::InvalidSince("x".to_string())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(SyncError::Store(Error::Storage("disk full".to_string()))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden.code(), "forbidden");
    }

    #[test]
    fn test_message_passthrough() {
        let error = ApiError::from(SyncError::NoItems);
        assert_eq!(error.code(), "no_items");
        assert_eq!(error.to_string(), "No items provided for import.");
    }
}

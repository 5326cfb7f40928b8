//! Server error types and the HTTP error body.

use std::io;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use zenkat_config::ConfigError;
use zenkat_core::{ErrorKind, ZenkatError};

/// Failures while building or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] ZenkatError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("server error: {0}")]
    Io(#[from] io::Error),
}

/// Error response returned by every route.
///
/// ```json
/// { "ok": false, "error": { "code": "node_not_found", "message": "...", "key": "..." } }
/// ```
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ApiErrorResponse,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiErrorResponse {
    pub ok: bool,
    pub error: ApiErrorBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ApiErrorResponse {
                ok: false,
                error: ApiErrorBody {
                    code: code.into(),
                    message: message.into(),
                    key: None,
                },
            },
        }
    }

    pub fn with_key(mut self, key: Option<String>) -> Self {
        self.body.error.key = key;
        self
    }

    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

/// HTTP status for each error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::TreeNotFound | ErrorKind::NodeNotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidQuery | ErrorKind::InvalidTree | ErrorKind::NotAFile => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::NotMetadataLoaded => StatusCode::CONFLICT,
        ErrorKind::Pending => StatusCode::ACCEPTED,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::CrawlError | ErrorKind::HydrationError => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<ZenkatError> for ApiError {
    fn from(err: ZenkatError) -> Self {
        let kind = err.kind();
        Self::new(status_for(kind), kind.as_str(), err.to_string()).with_key(err.key())
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        Self::bad_request("invalid_config", err.to_string())
    }
}

impl From<ServerError> for ApiError {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Config(err) => err.into(),
            ServerError::Engine(err) => err.into(),
            other => Self::internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zenkat_core::Operation;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::TreeNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::InvalidQuery), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::Pending), StatusCode::ACCEPTED);
        assert_eq!(status_for(ErrorKind::Timeout), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status_for(ErrorKind::NotMetadataLoaded), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::CrawlError), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_error_body_carries_key() {
        let err = ApiError::from(ZenkatError::pending(Operation::Hydration, "abc"));
        assert_eq!(err.status(), StatusCode::ACCEPTED);
        assert_eq!(err.body.error.code, "pending");
        assert_eq!(err.body.error.key.as_deref(), Some("abc"));
        assert!(!err.body.ok);
    }
}

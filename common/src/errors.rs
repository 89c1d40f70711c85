//! Application error types.
//!
//! Every failure in discovery, normalization and service operations is an
//! [`AppError`]. Web handlers return it directly; it renders itself as the
//! standard [`ApiResponse`](crate::response::ApiResponse) error envelope.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ServiceKind;
use crate::response::ApiResponse;

/// Result alias used across the workspace.
pub type AppResult<T> = Result<T, AppError>;

/// Application error.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or invalid enablement document.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No binding and no environment fallback for a kind.
    #[error("{kind} is not available: {reason}")]
    Discovery { kind: ServiceKind, reason: String },

    /// Unparseable or incomplete credentials.
    #[error("malformed {kind} credentials: {reason}")]
    MalformedCredentials { kind: ServiceKind, reason: String },

    /// Backend unreachable or authentication rejected.
    #[error("{kind} connection failed: {message}")]
    Connection { kind: ServiceKind, message: String },

    /// The requested read/write failed on a reachable connection.
    #[error("{kind} {operation} failed: {message}")]
    Operation {
        kind: ServiceKind,
        operation: String,
        message: String,
    },

    /// Unknown service id.
    #[error("service not found: {0}")]
    ServiceNotFound(String),

    /// Known service that the enablement document switches off.
    #[error("service {0} is not enabled")]
    ServiceDisabled(ServiceKind),

    /// Action the service kind does not implement.
    #[error("{kind} does not support the '{operation}' action")]
    UnsupportedOperation { kind: ServiceKind, operation: String },

    /// Invalid request parameters.
    #[error("validation error: {0}")]
    Validation(String),

    /// Rejected SQL fragment or identifier.
    #[error("unsafe SQL: {0}")]
    UnsafeSql(String),

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Creates a connection error for a kind.
    pub fn connection(kind: ServiceKind, err: impl std::fmt::Display) -> Self {
        Self::Connection {
            kind,
            message: err.to_string(),
        }
    }

    /// Creates an operation error for a kind and action.
    pub fn operation(
        kind: ServiceKind,
        operation: impl Into<String>,
        err: impl std::fmt::Display,
    ) -> Self {
        Self::Operation {
            kind,
            operation: operation.into(),
            message: err.to_string(),
        }
    }

    /// Creates a malformed-credentials error for a kind.
    pub fn malformed(kind: ServiceKind, reason: impl Into<String>) -> Self {
        Self::MalformedCredentials {
            kind,
            reason: reason.into(),
        }
    }

    /// Stable error code for client handling.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Discovery { .. } => "DISCOVERY_ERROR",
            AppError::MalformedCredentials { .. } => "MALFORMED_CREDENTIALS",
            AppError::Connection { .. } => "CONNECTION_ERROR",
            AppError::Operation { .. } => "OPERATION_ERROR",
            AppError::ServiceNotFound(_) => "SERVICE_NOT_FOUND",
            AppError::ServiceDisabled(_) => "SERVICE_DISABLED",
            AppError::UnsupportedOperation { .. } => "UNSUPPORTED_OPERATION",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::UnsafeSql(_) => "UNSAFE_SQL",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Configuration(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Discovery { .. }
            | AppError::MalformedCredentials { .. }
            | AppError::ServiceNotFound(_)
            | AppError::ServiceDisabled(_) => StatusCode::NOT_FOUND,
            AppError::Connection { .. } | AppError::Operation { .. } => StatusCode::BAD_GATEWAY,
            AppError::UnsupportedOperation { .. }
            | AppError::Validation(_)
            | AppError::UnsafeSql(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Service kind the error is about, when there is one.
    pub fn kind(&self) -> Option<ServiceKind> {
        match self {
            AppError::Discovery { kind, .. }
            | AppError::MalformedCredentials { kind, .. }
            | AppError::Connection { kind, .. }
            | AppError::Operation { kind, .. }
            | AppError::UnsupportedOperation { kind, .. } => Some(*kind),
            AppError::ServiceDisabled(kind) => Some(*kind),
            _ => None,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        } else {
            tracing::warn!(code = self.code(), error = %self, "request rejected");
        }
        let body = ApiResponse::err(self.code(), self.to_string());
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_error_carries_context() {
        let err = AppError::operation(ServiceKind::Valkey, "get", "connection reset");
        assert_eq!(err.to_string(), "valkey get failed: connection reset");
        assert_eq!(err.kind(), Some(ServiceKind::Valkey));
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_discovery_errors_map_to_not_found() {
        let err = AppError::Discovery {
            kind: ServiceKind::MySql,
            reason: "no binding".into(),
        };
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "DISCOVERY_ERROR");
    }

    #[test]
    fn test_validation_is_bad_request() {
        let err = AppError::UnsafeSql("DROP".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}

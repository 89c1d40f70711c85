//! API response envelope.
//!
//! Every JSON endpoint answers with an [`ApiResponse`]. Service operations
//! are special: a backend failure still carries the failed
//! [`OperationResult`] as data so the page can render it next to the error.

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::errors::{AppError, AppResult};
use crate::models::{OperationResult, ServiceKind};

/// Standard response envelope.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T: Serialize> {
    /// Whether the request was successful.
    pub success: bool,

    /// Response data. Present on success and on failed service operations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    /// Error details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,

    pub meta: ResponseMeta,
}

/// Error details of a failed request.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    /// Stable code such as `CONNECTION_ERROR` or `UNSAFE_SQL`.
    pub code: String,

    /// Human-readable error message.
    pub message: String,
}

/// Response metadata.
#[derive(Debug, Serialize, ToSchema)]
pub struct ResponseMeta {
    /// Request ID echoed from `x-request-id`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    pub timestamp: DateTime<Utc>,

    /// Time spent handling the request, backend round trips included.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Binary that answered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

impl Default for ResponseMeta {
    fn default() -> Self {
        Self {
            request_id: None,
            timestamp: Utc::now(),
            duration_ms: None,
            service: None,
        }
    }
}

/// Page position of a table listing.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Pagination {
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
    /// Total number of rows.
    pub total: u64,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub fn new(page: u32, page_size: u32, total: u64) -> Self {
        let total_pages = total.div_ceil(u64::from(page_size.max(1))) as u32;
        Self {
            page,
            page_size,
            total,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    /// Successful response with data.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta: ResponseMeta::default(),
        }
    }

    /// Failed response that still carries data.
    pub fn failed(data: T, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Some(data),
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
            meta: ResponseMeta::default(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.meta.request_id = Some(request_id.into());
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.meta.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.meta.service = Some(service.into());
        self
    }
}

impl ApiResponse<OperationResult> {
    /// Envelope for the outcome of a service operation.
    ///
    /// Backend failures (`Connection`, `Operation`) become a failed result
    /// with HTTP 502. Every other error is handed back so it renders through
    /// [`AppError`]'s own response.
    pub fn from_outcome(
        kind: ServiceKind,
        action: &str,
        outcome: AppResult<OperationResult>,
    ) -> Result<(StatusCode, Self), AppError> {
        match outcome {
            Ok(result) => Ok((StatusCode::OK, Self::ok(result))),
            Err(e @ (AppError::Connection { .. } | AppError::Operation { .. })) => {
                let result = OperationResult::failed(kind, action, &e);
                Ok((e.status_code(), Self::failed(result, e.code(), e.to_string())))
            }
            Err(e) => Err(e),
        }
    }
}

impl ApiResponse<()> {
    /// Error response without data.
    pub fn err(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
            meta: ResponseMeta::default(),
        }
    }
}

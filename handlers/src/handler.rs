//! The service handler abstraction.

use std::time::Instant;

use async_trait::async_trait;
use common::errors::{AppError, AppResult};
use common::models::{ConnectionDescriptor, Operation, OperationResult, ServiceKind};

/// One backend kind's connectivity handler.
///
/// Handlers hold only a connection descriptor. Every call to
/// [`execute`](ServiceHandler::execute) opens its own connection, performs one
/// unit of work and closes the connection before returning, so a handler can
/// be shared freely between concurrent requests.
#[async_trait]
pub trait ServiceHandler: Send + Sync {
    /// Kind this handler talks to.
    fn kind(&self) -> ServiceKind;

    /// Connection parameters the handler was built from.
    fn descriptor(&self) -> &ConnectionDescriptor;

    /// Performs one operation.
    ///
    /// Driver failures come back as `Connection` or `Operation` errors that
    /// name the kind and the action; actions the kind does not implement are
    /// `UnsupportedOperation`.
    async fn execute(&self, operation: Operation) -> AppResult<OperationResult>;

    /// Validates, logs and executes an operation.
    async fn run(&self, operation: Operation) -> AppResult<OperationResult> {
        operation.check()?;
        let kind = self.kind();
        let action = operation.action();
        let started = Instant::now();
        tracing::info!(service = %kind, action, address = %self.descriptor().address(), "operation started");

        match self.execute(operation).await {
            Ok(result) => {
                tracing::info!(
                    service = %kind,
                    action,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "operation succeeded"
                );
                Ok(result)
            }
            Err(e) => {
                tracing::warn!(
                    service = %kind,
                    action,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %e,
                    "operation failed"
                );
                Err(e)
            }
        }
    }
}

/// Error for an action the kind does not implement.
pub(crate) fn unsupported(kind: ServiceKind, operation: &Operation) -> AppError {
    AppError::UnsupportedOperation {
        kind,
        operation: operation.action().to_string(),
    }
}

/// Serializes a listing into an operation payload.
pub(crate) fn to_payload<T: serde::Serialize>(value: &T) -> AppResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| AppError::Internal(e.to_string()))
}

/// Percent-encodes a credential for use inside a connection URI.
pub(crate) fn encode_component(raw: &str) -> String {
    percent_encoding::utf8_percent_encode(raw, percent_encoding::NON_ALPHANUMERIC).to_string()
}

/// Host as it must appear in a URI authority; IPv6 literals are bracketed.
pub(crate) fn uri_host(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]")
    } else {
        host.to_string()
    }
}

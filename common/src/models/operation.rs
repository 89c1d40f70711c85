//! Service operation models.
//!
//! An [`Operation`] is one bounded unit of work against a backend; every
//! handler call returns an [`OperationResult`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use validator::Validate;

use crate::errors::{AppError, AppResult};
use crate::models::ServiceKind;

/// Default table used by relational test transactions.
pub const DEFAULT_TEST_TABLE: &str = "test_table";
/// Default queue used by broker test transactions.
pub const DEFAULT_TEST_QUEUE: &str = "test_queue";
/// Default key used by cache test transactions.
pub const DEFAULT_TEST_KEY: &str = "test_key";

fn default_show_limit() -> u32 {
    50
}

fn default_key_pattern() -> String {
    "*".to_string()
}

fn default_key_limit() -> u32 {
    100
}

/// Parameters of a test transaction. Each kind reads the fields it needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct TestParams {
    /// Table for relational tests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 64, message = "table_name must be 1-64 characters"))]
    pub table_name: Option<String>,
    /// Queue for broker tests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 255, message = "queue_name must be 1-255 characters"))]
    pub queue_name: Option<String>,
    /// Key for cache tests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "key must not be empty"))]
    pub key: Option<String>,
    /// Value to insert or set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Message to publish.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TestParams {
    /// Value to write, or a timestamped default.
    pub fn value_or_default(&self) -> String {
        self.value
            .clone()
            .unwrap_or_else(|| format!("Test value at {}", Utc::now().to_rfc3339()))
    }

    /// Message to publish, or a timestamped default.
    pub fn message_or_default(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| format!("Test message at {}", Utc::now().to_rfc3339()))
    }
}

/// One bounded operation against a backend.
///
/// Serialized with an `action` tag, e.g. `{"action": "set", "key": "k", "value": "v"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Operation {
    /// Write-then-read smoke test.
    Test {
        #[serde(default)]
        table_name: Option<String>,
        #[serde(default)]
        queue_name: Option<String>,
        #[serde(default)]
        key: Option<String>,
        #[serde(default)]
        value: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },

    /// List tables with row counts.
    ListTables,
    /// Page through a table's rows.
    ShowTable {
        table: String,
        #[serde(default = "default_show_limit")]
        limit: u32,
        #[serde(default)]
        offset: u32,
    },
    /// Insert one row from a JSON object.
    #[serde(rename = "create")]
    CreateRow { table: String, data: Value },
    /// Update rows matching a WHERE clause.
    #[serde(rename = "update")]
    UpdateRows {
        table: String,
        #[serde(rename = "where")]
        where_clause: String,
        #[serde(default)]
        where_values: Vec<Value>,
        data: Value,
    },
    /// Delete rows matching a WHERE clause.
    #[serde(rename = "delete")]
    DeleteRows {
        table: String,
        #[serde(rename = "where")]
        where_clause: String,
        #[serde(default)]
        where_values: Vec<Value>,
    },

    /// List queues through the management API.
    ListQueues,
    /// Publish a message to a queue.
    Publish {
        queue: String,
        message: String,
        #[serde(default)]
        durable: bool,
    },
    /// Fetch one message from a queue.
    Consume {
        queue: String,
        #[serde(default = "default_true")]
        ack: bool,
    },
    /// Drop all messages of a queue.
    Purge { queue: String },
    /// Delete a queue.
    DeleteQueue {
        queue: String,
        #[serde(default)]
        if_unused: bool,
        #[serde(default)]
        if_empty: bool,
    },

    /// List keys matching a glob pattern.
    ListKeys {
        #[serde(default = "default_key_pattern")]
        pattern: String,
        #[serde(default = "default_key_limit")]
        limit: u32,
    },
    /// Set a key, optionally with a TTL in seconds.
    #[serde(rename = "set")]
    SetKey {
        key: String,
        value: String,
        #[serde(default)]
        ttl: Option<u64>,
    },
    /// Read a key.
    #[serde(rename = "get")]
    GetKey { key: String },
    /// Check whether a key exists.
    #[serde(rename = "exists")]
    KeyExists { key: String },
    /// Delete a key.
    DeleteKey { key: String },
}

fn default_true() -> bool {
    true
}

impl Operation {
    /// Action name as it appears on the wire and in error messages.
    pub fn action(&self) -> &'static str {
        match self {
            Operation::Test { .. } => "test",
            Operation::ListTables => "list-tables",
            Operation::ShowTable { .. } => "show-table",
            Operation::CreateRow { .. } => "create",
            Operation::UpdateRows { .. } => "update",
            Operation::DeleteRows { .. } => "delete",
            Operation::ListQueues => "list-queues",
            Operation::Publish { .. } => "publish",
            Operation::Consume { .. } => "consume",
            Operation::Purge { .. } => "purge",
            Operation::DeleteQueue { .. } => "delete-queue",
            Operation::ListKeys { .. } => "list-keys",
            Operation::SetKey { .. } => "set",
            Operation::GetKey { .. } => "get",
            Operation::KeyExists { .. } => "exists",
            Operation::DeleteKey { .. } => "delete-key",
        }
    }

    /// Checks parameters that do not depend on the backend.
    pub fn check(&self) -> AppResult<()> {
        let require = |field: &str, value: &str| {
            if value.trim().is_empty() {
                Err(AppError::Validation(format!("{field} must not be empty")))
            } else {
                Ok(())
            }
        };
        match self {
            Operation::ShowTable { table, limit, .. } => {
                require("table", table)?;
                if *limit == 0 || *limit > 1000 {
                    return Err(AppError::Validation("limit must be 1-1000".into()));
                }
                Ok(())
            }
            Operation::CreateRow { table, data } => {
                require("table", table)?;
                require_object("data", data)
            }
            Operation::UpdateRows {
                table,
                where_clause,
                data,
                ..
            } => {
                require("table", table)?;
                require("where", where_clause)?;
                require_object("data", data)
            }
            Operation::DeleteRows {
                table, where_clause, ..
            } => {
                require("table", table)?;
                require("where", where_clause)
            }
            Operation::Publish { queue, .. }
            | Operation::Consume { queue, .. }
            | Operation::Purge { queue }
            | Operation::DeleteQueue { queue, .. } => require("queue", queue),
            Operation::ListKeys { pattern, limit } => {
                require("pattern", pattern)?;
                if *limit == 0 || *limit > 10_000 {
                    return Err(AppError::Validation("limit must be 1-10000".into()));
                }
                Ok(())
            }
            Operation::SetKey { key, .. }
            | Operation::GetKey { key }
            | Operation::KeyExists { key }
            | Operation::DeleteKey { key } => require("key", key),
            Operation::Test { .. } | Operation::ListTables | Operation::ListQueues => Ok(()),
        }
    }

    /// Test parameters carried by a `Test` operation.
    pub fn test_params(&self) -> Option<TestParams> {
        match self {
            Operation::Test {
                table_name,
                queue_name,
                key,
                value,
                message,
            } => Some(TestParams {
                table_name: table_name.clone(),
                queue_name: queue_name.clone(),
                key: key.clone(),
                value: value.clone(),
                message: message.clone(),
            }),
            _ => None,
        }
    }
}

fn require_object(field: &str, value: &Value) -> AppResult<()> {
    match value {
        Value::Object(map) if !map.is_empty() => Ok(()),
        Value::Object(_) => Err(AppError::Validation(format!("{field} must not be empty"))),
        _ => Err(AppError::Validation(format!("{field} must be a JSON object"))),
    }
}

impl From<TestParams> for Operation {
    fn from(params: TestParams) -> Self {
        Operation::Test {
            table_name: params.table_name,
            queue_name: params.queue_name,
            key: params.key,
            value: params.value,
            message: params.message,
        }
    }
}

/// Outcome of a single handler invocation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OperationResult {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Service the operation ran against.
    pub service: ServiceKind,
    /// Action name.
    pub action: String,
    /// Human-readable outcome.
    pub message: String,
    /// Operation payload (rows, key value, message body, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Completion timestamp.
    pub timestamp: DateTime<Utc>,
}

impl OperationResult {
    /// Creates a successful result.
    pub fn ok(
        service: ServiceKind,
        action: impl Into<String>,
        message: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            success: true,
            service,
            action: action.into(),
            message: message.into(),
            payload: Some(payload),
            timestamp: Utc::now(),
        }
    }

    /// Creates a failed result from an error.
    pub fn failed(service: ServiceKind, action: impl Into<String>, error: &AppError) -> Self {
        Self {
            success: false,
            service,
            action: action.into(),
            message: error.to_string(),
            payload: None,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operation_parses_tagged_json() {
        let op: Operation =
            serde_json::from_value(json!({"action": "set", "key": "k", "value": "v", "ttl": 30}))
                .unwrap();
        assert_eq!(
            op,
            Operation::SetKey {
                key: "k".into(),
                value: "v".into(),
                ttl: Some(30)
            }
        );
        assert_eq!(op.action(), "set");
    }

    #[test]
    fn test_operation_defaults() {
        let op: Operation =
            serde_json::from_value(json!({"action": "show-table", "table": "users"})).unwrap();
        assert_eq!(
            op,
            Operation::ShowTable {
                table: "users".into(),
                limit: 50,
                offset: 0
            }
        );

        let op: Operation = serde_json::from_value(json!({"action": "consume", "queue": "q"})).unwrap();
        assert_eq!(
            op,
            Operation::Consume {
                queue: "q".into(),
                ack: true
            }
        );
    }

    #[test]
    fn test_update_uses_where_field() {
        let op: Operation = serde_json::from_value(json!({
            "action": "update",
            "table": "users",
            "where": "id = %s",
            "where_values": [1],
            "data": {"name": "Jane"}
        }))
        .unwrap();
        assert!(op.check().is_ok());
        assert_eq!(op.action(), "update");
    }

    #[test]
    fn test_check_rejects_non_object_data() {
        let op = Operation::CreateRow {
            table: "users".into(),
            data: json!(["John"]),
        };
        assert!(matches!(op.check(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_check_rejects_empty_key() {
        let op = Operation::GetKey { key: "  ".into() };
        assert!(op.check().is_err());
    }

    #[test]
    fn test_test_params_round_trip_through_operation() {
        let params = TestParams {
            key: Some("k".into()),
            value: Some("v".into()),
            ..Default::default()
        };
        let op = Operation::from(params.clone());
        assert_eq!(op.test_params(), Some(params));
    }

    #[test]
    fn test_failed_result_has_no_payload() {
        let err = AppError::operation(ServiceKind::MySql, "create", "duplicate key");
        let result = OperationResult::failed(ServiceKind::MySql, "create", &err);
        assert!(!result.success);
        assert!(result.payload.is_none());
        assert_eq!(result.message, "mysql create failed: duplicate key");
    }
}

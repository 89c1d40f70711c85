//! Backend resource listings (tables, queues, keys).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::response::Pagination;

/// A table in a relational database.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TableInfo {
    /// Table name.
    pub name: String,
    /// Exact row count.
    pub row_count: i64,
    /// Planner estimate of the row count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_rows: Option<i64>,
    /// Human-readable on-disk size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

/// Tables of one database.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TableListing {
    /// Database name.
    pub database: String,
    /// Tables in the database.
    pub tables: Vec<TableInfo>,
    /// Number of tables.
    pub count: usize,
}

impl TableListing {
    /// Creates a listing, counting the tables.
    pub fn new(database: impl Into<String>, tables: Vec<TableInfo>) -> Self {
        Self {
            database: database.into(),
            count: tables.len(),
            tables,
        }
    }
}

/// One page of a table's rows.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TableData {
    /// Table name.
    pub table: String,
    /// Column names in table order.
    pub columns: Vec<String>,
    /// Rows as column → value objects.
    #[schema(value_type = Vec<Object>)]
    pub rows: Vec<Map<String, Value>>,
    /// Total rows in the table.
    pub total_rows: u64,
    /// Page size requested.
    pub limit: u32,
    /// Offset requested.
    pub offset: u32,
    /// Rows on this page.
    pub returned_rows: usize,
    /// Pagination derived from limit and offset.
    pub pagination: Pagination,
}

impl TableData {
    /// Creates a page of table data.
    pub fn new(
        table: impl Into<String>,
        columns: Vec<String>,
        rows: Vec<Map<String, Value>>,
        total_rows: u64,
        limit: u32,
        offset: u32,
    ) -> Self {
        let page = offset / limit.max(1) + 1;
        Self {
            table: table.into(),
            columns,
            returned_rows: rows.len(),
            rows,
            total_rows,
            limit,
            offset,
            pagination: Pagination::new(page, limit.max(1), total_rows),
        }
    }
}

/// A broker queue as reported by the management API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QueueInfo {
    /// Queue name.
    pub name: String,
    /// Ready + unacknowledged messages.
    #[serde(default)]
    pub messages: u64,
    /// Attached consumers.
    #[serde(default)]
    pub consumers: u64,
    /// Survives broker restarts.
    #[serde(default)]
    pub durable: bool,
    /// Deleted when the last consumer leaves.
    #[serde(default)]
    pub auto_delete: bool,
}

/// Queues of one virtual host.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QueueListing {
    /// Virtual host.
    pub vhost: String,
    /// Queues in the virtual host.
    pub queues: Vec<QueueInfo>,
    /// Number of queues.
    pub count: usize,
    /// Why the listing is empty, when it could not be fetched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A cache key with a preview of its value.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct KeyInfo {
    /// Key name.
    pub key: String,
    /// Redis data type (`string`, `hash`, ...).
    #[serde(rename = "type")]
    pub key_type: String,
    /// Remaining time to live in seconds, absent without expiry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
    /// Truncated value for string keys, summary for others.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_preview: Option<String>,
}

/// Keys matching a pattern.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct KeyListing {
    /// Glob pattern used.
    pub pattern: String,
    /// Keys returned (at most `limit`).
    pub keys: Vec<KeyInfo>,
    /// Number of keys returned.
    pub count: usize,
    /// Whether more keys matched than were returned.
    pub truncated: bool,
}

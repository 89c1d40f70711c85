//! PostgreSQL handler.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use common::errors::{AppError, AppResult};
use common::models::{ConnectionDescriptor, Operation, OperationResult, ServiceKind, TableInfo};
use common::utils::Dialect;
use serde_json::{json, Value};
use sqlx::postgres::{PgArguments, PgConnectOptions, PgConnection, PgRow, PgSslMode};
use sqlx::query::Query;
use sqlx::types::{Decimal, Uuid};
use sqlx::{Column, ConnectOptions, Connection, Postgres, Row, TypeInfo};

use crate::handler::ServiceHandler;
use crate::sql::{self, Inserted, JsonRow, SqlBackend, TableColumn};

const KIND: ServiceKind = ServiceKind::Postgres;
const DIALECT: Dialect = Dialect::Postgres;
const DEFAULT_USER: &str = "postgres";
const DEFAULT_DATABASE: &str = "postgres";

/// `information_schema` data types that [`column_value`] decodes natively.
/// Columns of any other type are read through a `::text` cast.
const DECODED_TYPES: [&str; 19] = [
    "boolean",
    "smallint",
    "integer",
    "bigint",
    "real",
    "double precision",
    "numeric",
    "text",
    "character varying",
    "character",
    "name",
    "uuid",
    "json",
    "jsonb",
    "bytea",
    "date",
    "time without time zone",
    "timestamp without time zone",
    "timestamp with time zone",
];

/// Handler for a PostgreSQL database.
pub struct PostgresHandler {
    descriptor: ConnectionDescriptor,
}

impl PostgresHandler {
    pub fn new(descriptor: ConnectionDescriptor) -> Self {
        Self { descriptor }
    }

    fn connect_options(&self) -> PgConnectOptions {
        let d = &self.descriptor;
        let mut options = PgConnectOptions::new()
            .host(&d.host)
            .port(d.port)
            .username(d.username_or(DEFAULT_USER))
            .database(self.database());
        if let Some(password) = d.password.as_deref() {
            options = options.password(password);
        }
        if d.secure {
            options = options.ssl_mode(PgSslMode::Require);
        }
        options
    }
}

#[async_trait]
impl SqlBackend for PostgresHandler {
    type Conn = PgConnection;

    const KIND: ServiceKind = KIND;
    const DIALECT: Dialect = DIALECT;

    fn database(&self) -> &str {
        self.descriptor.database_or(DEFAULT_DATABASE)
    }

    async fn connect(&self) -> AppResult<PgConnection> {
        self.connect_options()
            .connect()
            .await
            .map_err(|e| AppError::connection(KIND, e))
    }

    async fn close(&self, conn: PgConnection) {
        if let Err(e) = conn.close().await {
            tracing::debug!(error = %e, "closing PostgreSQL connection");
        }
    }

    async fn test_insert(
        &self,
        conn: &mut PgConnection,
        quoted: &str,
        value: &str,
    ) -> Result<(Value, JsonRow), sqlx::Error> {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {quoted} (
                id SERIAL PRIMARY KEY,
                test_value VARCHAR(255),
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )"
        ))
        .execute(&mut *conn)
        .await?;

        let mut tx = conn.begin().await?;
        let insert_id: i64 = sqlx::query_scalar(&format!(
            "INSERT INTO {quoted} (test_value) VALUES ($1) RETURNING id::bigint"
        ))
        .bind(value)
        .fetch_one(&mut *tx)
        .await?;
        let row = sqlx::query(&format!(
            "SELECT id, test_value, created_at FROM {quoted} WHERE id = $1"
        ))
        .bind(insert_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok((json!(insert_id), row_to_json(&row)))
    }

    async fn table_stats(&self, conn: &mut PgConnection) -> Result<Vec<TableInfo>, sqlx::Error> {
        let rows: Vec<(String, Option<i64>, Option<String>)> = sqlx::query_as(
            "SELECT t.tablename::text,
                    c.reltuples::bigint,
                    pg_size_pretty(pg_total_relation_size(c.oid))
             FROM pg_tables t
             JOIN pg_namespace n ON n.nspname = t.schemaname
             JOIN pg_class c ON c.relname = t.tablename AND c.relnamespace = n.oid
             WHERE t.schemaname = current_schema()
             ORDER BY t.tablename",
        )
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, estimated, size)| TableInfo {
                name,
                row_count: 0,
                // -1 means the table was never analyzed.
                estimated_rows: estimated.filter(|n| *n >= 0),
                size,
            })
            .collect())
    }

    async fn table_columns(
        &self,
        conn: &mut PgConnection,
        table: &str,
    ) -> Result<Vec<TableColumn>, sqlx::Error> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT column_name::text, data_type::text FROM information_schema.columns
             WHERE table_schema = current_schema() AND table_name = $1
             ORDER BY ordinal_position",
        )
        .bind(table)
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(name, data_type)| TableColumn { name, data_type })
            .collect())
    }

    fn projection(&self, columns: &[TableColumn]) -> String {
        projection(columns)
    }

    async fn fetch_rows(
        &self,
        conn: &mut PgConnection,
        statement: &str,
        values: &[Value],
    ) -> Result<Vec<JsonRow>, sqlx::Error> {
        let mut query = sqlx::query(statement);
        for value in values {
            query = bind_json(query, value);
        }
        let rows = query.fetch_all(&mut *conn).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn execute_statement(
        &self,
        conn: &mut PgConnection,
        statement: &str,
        values: &[Value],
    ) -> Result<u64, sqlx::Error> {
        let mut query = sqlx::query(statement);
        for value in values {
            query = bind_json(query, value);
        }
        Ok(query.execute(&mut *conn).await?.rows_affected())
    }

    async fn insert(
        &self,
        conn: &mut PgConnection,
        table: &str,
        set: &[(String, Value)],
    ) -> Result<Inserted, sqlx::Error> {
        let columns = self.table_columns(conn, table).await?;
        let returning = if columns.is_empty() {
            "*".to_string()
        } else {
            projection(&columns)
        };
        let statement = sql::insert_statement(table, set, DIALECT)
            .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
        let statement = format!("{statement} RETURNING {returning}");

        let values: Vec<Value> = set.iter().map(|(_, v)| v.clone()).collect();
        let row = self
            .fetch_rows(conn, &statement, &values)
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();
        Ok(Inserted {
            insert_id: row.get("id").cloned().unwrap_or(Value::Null),
            row: Some(row),
        })
    }
}

/// Select list that reads undecodable column types as text.
fn projection(columns: &[TableColumn]) -> String {
    columns
        .iter()
        .map(|column| {
            let quoted = sql::quote_listed(&column.name, DIALECT);
            if DECODED_TYPES.contains(&column.data_type.as_str()) {
                quoted
            } else {
                format!("{quoted}::text AS {quoted}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn bind_json<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &Value,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.clone()),
    }
}

fn row_to_json(row: &PgRow) -> JsonRow {
    let names: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    let values = (0..names.len()).map(|idx| column_value(row, idx)).collect();
    sql::row_object(&names, values)
}

fn column_value(row: &PgRow, idx: usize) -> Value {
    macro_rules! decode {
        ($ty:ty, $convert:expr) => {
            if let Ok(value) = row.try_get::<Option<$ty>, _>(idx) {
                return value.map($convert).unwrap_or(Value::Null);
            }
        };
    }

    decode!(bool, Value::Bool);
    decode!(i16, Value::from);
    decode!(i32, Value::from);
    decode!(i64, Value::from);
    decode!(f32, Value::from);
    decode!(f64, Value::from);
    decode!(Decimal, decimal_value);
    decode!(Uuid, |u: Uuid| Value::String(u.to_string()));
    decode!(String, Value::String);
    decode!(NaiveDateTime, |t: NaiveDateTime| Value::String(
        t.format("%Y-%m-%dT%H:%M:%S").to_string()
    ));
    decode!(DateTime<Utc>, |t: DateTime<Utc>| Value::String(t.to_rfc3339()));
    decode!(NaiveDate, |d: NaiveDate| Value::String(d.to_string()));
    decode!(NaiveTime, |t: NaiveTime| Value::String(t.to_string()));
    decode!(Value, |v: Value| v);
    decode!(Vec<u8>, |b: Vec<u8>| Value::String(
        String::from_utf8_lossy(&b).into_owned()
    ));

    let column = &row.columns()[idx];
    tracing::debug!(
        column = column.name(),
        pg_type = column.type_info().name(),
        "column type has no JSON mapping"
    );
    Value::Null
}

/// NUMERIC keeps its exact digits as a string.
fn decimal_value(d: Decimal) -> Value {
    Value::String(d.to_string())
}

#[async_trait]
impl ServiceHandler for PostgresHandler {
    fn kind(&self) -> ServiceKind {
        KIND
    }

    fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    async fn execute(&self, operation: Operation) -> AppResult<OperationResult> {
        sql::execute(self, operation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn column(name: &str, data_type: &str) -> TableColumn {
        TableColumn {
            name: name.into(),
            data_type: data_type.into(),
        }
    }

    #[test]
    fn test_default_identity() {
        let handler = PostgresHandler::new(ConnectionDescriptor::new(KIND, "pg", 5432));
        assert_eq!(handler.database(), "postgres");
        assert_eq!(handler.descriptor.username_or(DEFAULT_USER), "postgres");
    }

    #[test]
    fn test_projection_casts_types_without_decoder() {
        let columns = vec![
            column("id", "uuid"),
            column("amount", "numeric"),
            column("addr", "inet"),
            column("tags", "ARRAY"),
            column("span", "interval"),
        ];
        assert_eq!(
            projection(&columns),
            "\"id\", \"amount\", \"addr\"::text AS \"addr\", \
             \"tags\"::text AS \"tags\", \"span\"::text AS \"span\""
        );
    }

    #[test]
    fn test_numeric_keeps_scale() {
        let amount = Decimal::from_str("12.50").unwrap();
        assert_eq!(decimal_value(amount), json!("12.50"));
    }

    #[tokio::test]
    async fn test_placeholder_mismatch_is_rejected_before_connecting() {
        let handler = PostgresHandler::new(ConnectionDescriptor::new(KIND, "127.0.0.1", 1));
        let err = handler
            .execute(Operation::DeleteRows {
                table: "users".into(),
                where_clause: "id = %s AND name = %s".into(),
                where_values: vec![json!(1)],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_cache_actions_are_unsupported() {
        let handler = PostgresHandler::new(ConnectionDescriptor::new(KIND, "127.0.0.1", 1));
        let err = handler
            .execute(Operation::SetKey {
                key: "k".into(),
                value: "v".into(),
                ttl: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnsupportedOperation { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connection_error() {
        let handler = PostgresHandler::new(ConnectionDescriptor::new(KIND, "127.0.0.1", 1));
        let err = handler.execute(Operation::ListTables).await.unwrap_err();
        assert!(matches!(err, AppError::Connection { kind: ServiceKind::Postgres, .. }));
    }
}

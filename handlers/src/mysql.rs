//! MySQL handler.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use common::errors::{AppError, AppResult};
use common::models::{ConnectionDescriptor, Operation, OperationResult, ServiceKind, TableInfo};
use common::utils::Dialect;
use serde_json::{json, Value};
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlConnection, MySqlRow, MySqlSslMode};
use sqlx::query::Query;
use sqlx::types::Decimal;
use sqlx::{Column, ConnectOptions, Connection, MySql, Row};

use crate::handler::ServiceHandler;
use crate::sql::{self, Inserted, JsonRow, SqlBackend, TableColumn};

const KIND: ServiceKind = ServiceKind::MySql;
const DEFAULT_USER: &str = "root";
const DEFAULT_DATABASE: &str = "testdb";

/// Handler for a MySQL database.
pub struct MySqlHandler {
    descriptor: ConnectionDescriptor,
}

impl MySqlHandler {
    pub fn new(descriptor: ConnectionDescriptor) -> Self {
        Self { descriptor }
    }

    fn connect_options(&self) -> MySqlConnectOptions {
        let d = &self.descriptor;
        let mut options = MySqlConnectOptions::new()
            .host(&d.host)
            .port(d.port)
            .username(d.username_or(DEFAULT_USER))
            .database(self.database());
        if let Some(password) = d.password.as_deref() {
            options = options.password(password);
        }
        if d.secure {
            options = options.ssl_mode(MySqlSslMode::Required);
        }
        options
    }
}

#[async_trait]
impl SqlBackend for MySqlHandler {
    type Conn = MySqlConnection;

    const KIND: ServiceKind = KIND;
    const DIALECT: Dialect = Dialect::MySql;

    fn database(&self) -> &str {
        self.descriptor.database_or(DEFAULT_DATABASE)
    }

    async fn connect(&self) -> AppResult<MySqlConnection> {
        self.connect_options()
            .connect()
            .await
            .map_err(|e| AppError::connection(KIND, e))
    }

    async fn close(&self, conn: MySqlConnection) {
        if let Err(e) = conn.close().await {
            tracing::debug!(error = %e, "closing MySQL connection");
        }
    }

    async fn test_insert(
        &self,
        conn: &mut MySqlConnection,
        quoted: &str,
        value: &str,
    ) -> Result<(Value, JsonRow), sqlx::Error> {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {quoted} (
                id INT AUTO_INCREMENT PRIMARY KEY,
                test_value VARCHAR(255),
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )"
        ))
        .execute(&mut *conn)
        .await?;

        let mut tx = conn.begin().await?;
        let insert_id = sqlx::query(&format!("INSERT INTO {quoted} (test_value) VALUES (?)"))
            .bind(value)
            .execute(&mut *tx)
            .await?
            .last_insert_id();
        let row = sqlx::query(&format!(
            "SELECT id, test_value, created_at FROM {quoted} WHERE id = ?"
        ))
        .bind(insert_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok((json!(insert_id), row_to_json(&row)))
    }

    async fn table_stats(&self, conn: &mut MySqlConnection) -> Result<Vec<TableInfo>, sqlx::Error> {
        // information_schema columns are binary-collated on some servers, hence the casts.
        let rows: Vec<(String, Option<i64>, Option<i64>)> = sqlx::query_as(
            "SELECT CAST(table_name AS CHAR),
                    CAST(table_rows AS SIGNED),
                    CAST(COALESCE(data_length, 0) + COALESCE(index_length, 0) AS SIGNED)
             FROM information_schema.TABLES
             WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE'
             ORDER BY table_name",
        )
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, estimated, bytes)| TableInfo {
                name,
                row_count: 0,
                estimated_rows: estimated,
                size: bytes.map(sql::format_size),
            })
            .collect())
    }

    async fn table_columns(
        &self,
        conn: &mut MySqlConnection,
        table: &str,
    ) -> Result<Vec<TableColumn>, sqlx::Error> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT CAST(column_name AS CHAR), CAST(data_type AS CHAR)
             FROM information_schema.COLUMNS
             WHERE table_schema = DATABASE() AND table_name = ?
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

    async fn fetch_rows(
        &self,
        conn: &mut MySqlConnection,
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
        conn: &mut MySqlConnection,
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
        conn: &mut MySqlConnection,
        table: &str,
        set: &[(String, Value)],
    ) -> Result<Inserted, sqlx::Error> {
        let statement = sql::insert_statement(table, set, Dialect::MySql)
            .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
        let mut query = sqlx::query(&statement);
        for (_, value) in set {
            query = bind_json(query, value);
        }
        let result = query.execute(&mut *conn).await?;
        Ok(Inserted {
            insert_id: json!(result.last_insert_id()),
            row: None,
        })
    }
}

fn bind_json<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &Value,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => query.bind(i),
            (None, Some(u)) => query.bind(u),
            _ => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

/// Converts a row to a JSON object keyed by column name.
fn row_to_json(row: &MySqlRow) -> JsonRow {
    let names: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    let values = (0..names.len()).map(|idx| column_value(row, idx)).collect();
    sql::row_object(&names, values)
}

fn column_value(row: &MySqlRow, idx: usize) -> Value {
    macro_rules! decode {
        ($ty:ty, $convert:expr) => {
            if let Ok(value) = row.try_get::<Option<$ty>, _>(idx) {
                return value.map($convert).unwrap_or(Value::Null);
            }
        };
    }

    decode!(i64, Value::from);
    decode!(u64, Value::from);
    decode!(f64, Value::from);
    decode!(Decimal, |d: Decimal| Value::String(d.to_string()));
    decode!(String, Value::String);
    decode!(DateTime<Utc>, |t: DateTime<Utc>| Value::String(t.to_rfc3339()));
    decode!(NaiveDateTime, |t: NaiveDateTime| Value::String(
        t.format("%Y-%m-%dT%H:%M:%S").to_string()
    ));
    decode!(NaiveDate, |d: NaiveDate| Value::String(d.to_string()));
    decode!(NaiveTime, |t: NaiveTime| Value::String(t.to_string()));
    decode!(Value, |v: Value| v);
    decode!(Vec<u8>, |b: Vec<u8>| Value::String(
        String::from_utf8_lossy(&b).into_owned()
    ));
    // The text protocol carries everything else as a string.
    row.try_get_unchecked::<Option<String>, _>(idx)
        .ok()
        .flatten()
        .map_or(Value::Null, Value::String)
}

#[async_trait]
impl ServiceHandler for MySqlHandler {
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

    #[test]
    fn test_default_identity() {
        let handler = MySqlHandler::new(ConnectionDescriptor::new(KIND, "db", 3306));
        assert_eq!(handler.database(), "testdb");
        assert_eq!(handler.descriptor.username_or(DEFAULT_USER), "root");
    }

    #[test]
    fn test_projection_selects_every_column() {
        let handler = MySqlHandler::new(ConnectionDescriptor::new(KIND, "db", 3306));
        let columns = vec![TableColumn {
            name: "amount".into(),
            data_type: "decimal".into(),
        }];
        assert_eq!(handler.projection(&columns), "*");
    }

    #[tokio::test]
    async fn test_unsafe_table_is_rejected_before_connecting() {
        // Port 1 is never reachable; a validation error proves no connection was tried.
        let handler = MySqlHandler::new(ConnectionDescriptor::new(KIND, "127.0.0.1", 1));
        let err = handler
            .execute(Operation::CreateRow {
                table: "users; DROP TABLE users".into(),
                data: json!({"name": "John"}),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnsafeSql(_)));
    }

    #[tokio::test]
    async fn test_queue_actions_are_unsupported() {
        let handler = MySqlHandler::new(ConnectionDescriptor::new(KIND, "127.0.0.1", 1));
        let err = handler
            .execute(Operation::Purge { queue: "q".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnsupportedOperation { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connection_error() {
        let handler = MySqlHandler::new(ConnectionDescriptor::new(KIND, "127.0.0.1", 1));
        let err = handler.execute(Operation::ListTables).await.unwrap_err();
        assert!(matches!(err, AppError::Connection { kind: ServiceKind::MySql, .. }));
    }
}

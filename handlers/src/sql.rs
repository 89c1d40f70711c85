//! Operation flow shared by the relational handlers.
//!
//! [`SqlBackend`] is the dialect seam: each database supplies connections,
//! catalog queries and value decoding, while validation, statement assembly
//! and payload shaping live here.

use async_trait::async_trait;
use common::errors::{AppError, AppResult};
use common::models::operation::DEFAULT_TEST_TABLE;
use common::models::{Operation, OperationResult, ServiceKind, TableData, TableInfo, TableListing};
use common::utils::{Dialect, SqlValidator};
use serde_json::{json, Map, Value};

use crate::handler::{to_payload, unsupported};

/// A decoded row keyed by column name.
pub(crate) type JsonRow = Map<String, Value>;

/// A column as reported by `information_schema.columns`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TableColumn {
    pub name: String,
    pub data_type: String,
}

/// Outcome of an `INSERT`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Inserted {
    /// Generated key, `null` when the table has none.
    pub insert_id: Value,
    /// The stored row, when the dialect can return it.
    pub row: Option<JsonRow>,
}

/// Database-specific half of a relational handler.
#[async_trait]
pub(crate) trait SqlBackend: Send + Sync {
    type Conn: Send;

    const KIND: ServiceKind;
    const DIALECT: Dialect;

    /// Database the handler connects to.
    fn database(&self) -> &str;

    async fn connect(&self) -> AppResult<Self::Conn>;

    async fn close(&self, conn: Self::Conn);

    /// Creates `quoted` if missing, then inserts `value` and reads the row
    /// back inside one transaction. Returns the generated id and the row.
    async fn test_insert(
        &self,
        conn: &mut Self::Conn,
        quoted: &str,
        value: &str,
    ) -> Result<(Value, JsonRow), sqlx::Error>;

    /// Base tables of the current schema. `row_count` is filled in by the caller.
    async fn table_stats(&self, conn: &mut Self::Conn) -> Result<Vec<TableInfo>, sqlx::Error>;

    /// Columns of `table` in ordinal order; empty when the table does not exist.
    async fn table_columns(
        &self,
        conn: &mut Self::Conn,
        table: &str,
    ) -> Result<Vec<TableColumn>, sqlx::Error>;

    /// Select list used when reading rows back.
    fn projection(&self, _columns: &[TableColumn]) -> String {
        "*".to_string()
    }

    async fn fetch_rows(
        &self,
        conn: &mut Self::Conn,
        statement: &str,
        values: &[Value],
    ) -> Result<Vec<JsonRow>, sqlx::Error>;

    /// Runs a statement and returns the number of affected rows.
    async fn execute_statement(
        &self,
        conn: &mut Self::Conn,
        statement: &str,
        values: &[Value],
    ) -> Result<u64, sqlx::Error>;

    async fn insert(
        &self,
        conn: &mut Self::Conn,
        table: &str,
        set: &[(String, Value)],
    ) -> Result<Inserted, sqlx::Error>;
}

/// Whether a relational handler implements the action.
pub(crate) fn supports(operation: &Operation) -> bool {
    matches!(
        operation,
        Operation::Test { .. }
            | Operation::ListTables
            | Operation::ShowTable { .. }
            | Operation::CreateRow { .. }
            | Operation::UpdateRows { .. }
            | Operation::DeleteRows { .. }
    )
}

/// Validates the operation, then runs it on a fresh connection that is
/// closed before returning.
pub(crate) async fn execute<B: SqlBackend>(
    backend: &B,
    operation: Operation,
) -> AppResult<OperationResult> {
    if !supports(&operation) {
        return Err(unsupported(B::KIND, &operation));
    }
    validate(&operation, B::DIALECT)?;

    let mut conn = backend.connect().await?;
    let result = perform(backend, &mut conn, operation).await;
    backend.close(conn).await;
    result
}

/// Runs one operation on an open connection.
async fn perform<B: SqlBackend>(
    backend: &B,
    conn: &mut B::Conn,
    operation: Operation,
) -> AppResult<OperationResult> {
    let kind = B::KIND;
    let dialect = B::DIALECT;
    let action = operation.action();
    let db = |e: sqlx::Error| AppError::operation(kind, action, e);

    match operation {
        test @ Operation::Test { .. } => {
            let params = test.test_params().unwrap_or_default();
            let table = params
                .table_name
                .clone()
                .unwrap_or_else(|| DEFAULT_TEST_TABLE.to_string());
            let quoted = SqlValidator::quote_identifier(&table, dialect)?;
            let value = params.value_or_default();
            let (insert_id, row) = backend
                .test_insert(conn, &quoted, &value)
                .await
                .map_err(db)?;
            Ok(OperationResult::ok(
                kind,
                action,
                format!("inserted and read back a row in '{table}'"),
                json!({
                    "action": "insert_and_select",
                    "table": table,
                    "insert_id": insert_id,
                    "inserted_value": value,
                    "retrieved_row": row,
                    "status": "success",
                }),
            ))
        }
        Operation::ListTables => {
            let mut tables = backend.table_stats(conn).await.map_err(db)?;
            for table in &mut tables {
                let quoted = quote_listed(&table.name, dialect);
                table.row_count = count_rows(backend, conn, &quoted).await.map_err(db)?;
            }
            let listing = TableListing::new(backend.database(), tables);
            Ok(OperationResult::ok(
                kind,
                action,
                format!("{} table(s) in '{}'", listing.count, listing.database),
                to_payload(&listing)?,
            ))
        }
        Operation::ShowTable {
            table,
            limit,
            offset,
        } => {
            let columns = backend.table_columns(conn, &table).await.map_err(db)?;
            if columns.is_empty() {
                return Err(AppError::operation(
                    kind,
                    action,
                    format!("table '{table}' does not exist"),
                ));
            }
            let quoted = SqlValidator::quote_identifier(&table, dialect)?;
            let total = count_rows(backend, conn, &quoted).await.map_err(db)?;
            let statement = page_statement(&quoted, &backend.projection(&columns), dialect);
            let rows = backend
                .fetch_rows(conn, &statement, &[json!(limit), json!(offset)])
                .await
                .map_err(db)?;

            let names = columns.into_iter().map(|c| c.name).collect();
            let data = TableData::new(&table, names, rows, total.max(0) as u64, limit, offset);
            Ok(OperationResult::ok(
                kind,
                action,
                format!("{} of {} row(s) from '{table}'", data.returned_rows, data.total_rows),
                to_payload(&data)?,
            ))
        }
        Operation::CreateRow { table, data } => {
            let set = columns(&data, dialect)?;
            let inserted = backend.insert(conn, &table, &set).await.map_err(db)?;
            Ok(created(kind, &table, inserted, data))
        }
        Operation::UpdateRows {
            table,
            where_clause: clause,
            where_values,
            data,
        } => {
            let set = columns(&data, dialect)?;
            let filter = where_clause(&clause, &where_values, dialect, set.len() + 1)?;
            let statement = update_statement(&table, &set, &filter, dialect)?;
            let values: Vec<Value> = set
                .into_iter()
                .map(|(_, v)| v)
                .chain(where_values)
                .collect();
            let affected = backend
                .execute_statement(conn, &statement, &values)
                .await
                .map_err(db)?;
            Ok(OperationResult::ok(
                kind,
                action,
                format!("{affected} row(s) updated in '{table}'"),
                json!({
                    "action": "update",
                    "table": table,
                    "affected_rows": affected,
                    "update_data": data,
                    "status": "success",
                }),
            ))
        }
        Operation::DeleteRows {
            table,
            where_clause: clause,
            where_values,
        } => {
            let filter = where_clause(&clause, &where_values, dialect, 1)?;
            let statement = format!(
                "DELETE FROM {} WHERE {filter}",
                SqlValidator::quote_identifier(&table, dialect)?
            );
            let affected = backend
                .execute_statement(conn, &statement, &where_values)
                .await
                .map_err(db)?;
            Ok(OperationResult::ok(
                kind,
                action,
                format!("{affected} row(s) deleted from '{table}'"),
                json!({
                    "action": "delete",
                    "table": table,
                    "affected_rows": affected,
                    "status": "success",
                }),
            ))
        }
        other => Err(unsupported(kind, &other)),
    }
}

fn created(kind: ServiceKind, table: &str, inserted: Inserted, data: Value) -> OperationResult {
    let message = match &inserted.insert_id {
        Value::Null => format!("row inserted into '{table}'"),
        id => format!("row inserted into '{table}' with id {id}"),
    };
    let mut payload = json!({
        "action": "create",
        "table": table,
        "insert_id": inserted.insert_id,
        "data": data,
        "status": "success",
    });
    if let (Some(row), Value::Object(fields)) = (inserted.row, &mut payload) {
        fields.insert("row".to_string(), Value::Object(row));
    }
    OperationResult::ok(kind, "create", message, payload)
}

async fn count_rows<B: SqlBackend>(
    backend: &B,
    conn: &mut B::Conn,
    quoted: &str,
) -> Result<i64, sqlx::Error> {
    let rows = backend
        .fetch_rows(conn, &format!("SELECT COUNT(*) AS total FROM {quoted}"), &[])
        .await?;
    Ok(rows
        .first()
        .and_then(|row| row.get("total"))
        .and_then(Value::as_i64)
        .unwrap_or(0))
}

/// Rejects unsafe identifiers and WHERE clauses before a connection is opened.
pub(crate) fn validate(operation: &Operation, dialect: Dialect) -> AppResult<()> {
    match operation {
        Operation::Test {
            table_name: Some(table),
            ..
        }
        | Operation::ShowTable { table, .. } => SqlValidator::validate_identifier(table),
        Operation::CreateRow { table, data } => {
            SqlValidator::validate_identifier(table)?;
            columns(data, dialect).map(|_| ())
        }
        Operation::UpdateRows {
            table,
            where_clause: clause,
            where_values,
            data,
        } => {
            SqlValidator::validate_identifier(table)?;
            let set = columns(data, dialect)?;
            where_clause(clause, where_values, dialect, set.len() + 1).map(|_| ())
        }
        Operation::DeleteRows {
            table,
            where_clause: clause,
            where_values,
        } => {
            SqlValidator::validate_identifier(table)?;
            where_clause(clause, where_values, dialect, 1).map(|_| ())
        }
        _ => Ok(()),
    }
}

/// Column/value pairs of a `create` or `update` payload, identifiers validated.
pub(crate) fn columns(data: &Value, dialect: Dialect) -> AppResult<Vec<(String, Value)>> {
    let Value::Object(map) = data else {
        return Err(AppError::Validation("data must be a JSON object".into()));
    };
    map.iter()
        .map(|(column, value)| {
            Ok((
                SqlValidator::quote_identifier(column, dialect)?,
                value.clone(),
            ))
        })
        .collect()
}

/// Screens a WHERE clause and rewrites its placeholders.
///
/// Placeholders are numbered from `first_index` (Postgres only) and must
/// match the number of supplied values.
pub(crate) fn where_clause(
    clause: &str,
    values: &[Value],
    dialect: Dialect,
    first_index: usize,
) -> AppResult<String> {
    SqlValidator::validate_where(clause)?;
    let (rewritten, placeholders) =
        SqlValidator::rewrite_placeholders(clause, dialect, first_index);
    if placeholders != values.len() {
        return Err(AppError::Validation(format!(
            "WHERE clause has {placeholders} placeholder(s) but {} value(s) were given",
            values.len()
        )));
    }
    Ok(rewritten)
}

/// The `n`th (1-based) bind placeholder.
pub(crate) fn placeholder(dialect: Dialect, n: usize) -> String {
    match dialect {
        Dialect::MySql => "?".to_string(),
        Dialect::Postgres => format!("${n}"),
    }
}

/// `INSERT` of already-quoted columns.
pub(crate) fn insert_statement(
    table: &str,
    set: &[(String, Value)],
    dialect: Dialect,
) -> AppResult<String> {
    let names: Vec<&str> = set.iter().map(|(c, _)| c.as_str()).collect();
    let placeholders: Vec<String> = (1..=set.len()).map(|i| placeholder(dialect, i)).collect();
    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({})",
        SqlValidator::quote_identifier(table, dialect)?,
        names.join(", "),
        placeholders.join(", ")
    ))
}

fn update_statement(
    table: &str,
    set: &[(String, Value)],
    filter: &str,
    dialect: Dialect,
) -> AppResult<String> {
    let assignments: Vec<String> = set
        .iter()
        .enumerate()
        .map(|(i, (c, _))| format!("{c} = {}", placeholder(dialect, i + 1)))
        .collect();
    Ok(format!(
        "UPDATE {} SET {} WHERE {filter}",
        SqlValidator::quote_identifier(table, dialect)?,
        assignments.join(", ")
    ))
}

fn page_statement(quoted: &str, projection: &str, dialect: Dialect) -> String {
    format!(
        "SELECT {projection} FROM {quoted} LIMIT {} OFFSET {}",
        placeholder(dialect, 1),
        placeholder(dialect, 2)
    )
}

/// Quotes a name read from the catalog, escaping embedded quote characters.
pub(crate) fn quote_listed(name: &str, dialect: Dialect) -> String {
    match dialect {
        Dialect::MySql => format!("`{}`", name.replace('`', "``")),
        Dialect::Postgres => format!("\"{}\"", name.replace('"', "\"\"")),
    }
}

/// Human-readable size from a byte count.
pub(crate) fn format_size(bytes: i64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes.max(0) as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.2} {}", UNITS[unit])
    }
}

/// Builds a row object from column names and decoded values.
pub(crate) fn row_object(names: &[String], values: Vec<Value>) -> JsonRow {
    names.iter().cloned().zip(values).collect()
}

//! SQLite storage backed by rusqlite.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection};

use super::{
    quote_ident, ColumnDescriptor, ExecutionError, QueryResult, StorageEngine, StorageResult,
    TableDescriptor,
};
use crate::catalog::ColumnProfile;

/// A single SQLite connection shared behind a mutex.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
    row_limit: usize,
}

impl SqliteStorage {
    /// Open a database file.
    pub fn open(path: impl AsRef<Path>, row_limit: usize) -> StorageResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| ExecutionError::new(format!("-- open {}", path.display()), e))?;
        Ok(Self::from_connection(conn, row_limit))
    }

    /// Open an empty in-memory database.
    pub fn open_in_memory(row_limit: usize) -> StorageResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ExecutionError::new("-- open :memory:", e))?;
        Ok(Self::from_connection(conn, row_limit))
    }

    pub fn from_connection(conn: Connection, row_limit: usize) -> Self {
        Self {
            conn: Mutex::new(conn),
            row_limit,
        }
    }

    /// Run statements that return no rows (schema setup, data loading).
    pub fn execute_batch(&self, sql: &str) -> StorageResult<()> {
        self.lock(sql)?
            .execute_batch(sql)
            .map_err(|e| ExecutionError::new(sql, e))
    }

    fn lock(&self, sql: &str) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ExecutionError::new(sql, "connection mutex poisoned"))
    }

    fn query(&self, sql: &str, limit: usize) -> StorageResult<QueryResult> {
        let conn = self.lock(sql)?;
        let err = |e: rusqlite::Error| ExecutionError::new(sql, e);

        let mut stmt = conn.prepare(sql).map_err(err)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query([]).map_err(err)?;

        let mut result = QueryResult {
            columns,
            rows: Vec::new(),
            truncated: false,
        };
        while let Some(row) = rows.next().map_err(err)? {
            if result.rows.len() == limit {
                result.truncated = true;
                break;
            }
            let values = (0..result.columns.len())
                .map(|i| row.get_ref(i).map(to_json))
                .collect::<Result<Vec<_>, _>>()
                .map_err(err)?;
            result.rows.push(values);
        }
        Ok(result)
    }
}

fn to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => i.into(),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned().into(),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()).into(),
    }
}

fn to_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn table_names(conn: &Connection, sql: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
}

fn table_columns(conn: &Connection, pragma: &str) -> rusqlite::Result<Vec<ColumnDescriptor>> {
    let mut stmt = conn.prepare(pragma)?;
    let columns = stmt
        .query_map([], |row| {
            let not_null: i64 = row.get(3)?;
            let pk: i64 = row.get(5)?;
            Ok(ColumnDescriptor {
                name: row.get(1)?,
                data_type: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                nullable: not_null == 0,
                primary_key: pk > 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

#[async_trait]
impl StorageEngine for SqliteStorage {
    async fn execute(&self, sql: &str) -> StorageResult<QueryResult> {
        tracing::debug!(sql, "executing");
        self.query(sql, self.row_limit)
    }

    async fn introspect_schema(&self) -> StorageResult<Vec<TableDescriptor>> {
        let list_sql = "SELECT name FROM sqlite_master \
                        WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name";
        let conn = self.lock(list_sql)?;

        let names = table_names(&conn, list_sql).map_err(|e| ExecutionError::new(list_sql, e))?;

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let pragma = format!("PRAGMA table_info({})", quote_ident(&name));
            let columns =
                table_columns(&conn, &pragma).map_err(|e| ExecutionError::new(&pragma, e))?;
            tables.push(TableDescriptor { name, columns });
        }
        Ok(tables)
    }

    async fn distinct_values(
        &self,
        table: &str,
        column: &str,
        limit: usize,
    ) -> StorageResult<Vec<String>> {
        let col = quote_ident(column);
        let sql = format!(
            "SELECT DISTINCT {col} FROM {} WHERE {col} IS NOT NULL ORDER BY {col} LIMIT {limit}",
            quote_ident(table)
        );
        let result = self.query(&sql, limit)?;
        Ok(result
            .rows
            .iter()
            .filter_map(|row| row.first())
            .map(to_text)
            .collect())
    }

    async fn column_profile(&self, table: &str, column: &str) -> StorageResult<ColumnProfile> {
        let col = quote_ident(column);
        let sql = format!(
            "SELECT COUNT(*), COUNT({col}), COUNT(DISTINCT {col}) FROM {}",
            quote_ident(table)
        );
        let conn = self.lock(&sql)?;
        conn.query_row(&sql, params![], |row| {
            Ok(ColumnProfile {
                total: row.get::<_, i64>(0)?.max(0) as u64,
                non_null: row.get::<_, i64>(1)?.max(0) as u64,
                distinct: row.get::<_, i64>(2)?.max(0) as u64,
            })
        })
        .map_err(|e| ExecutionError::new(&sql, e))
    }
}

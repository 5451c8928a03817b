//! Storage engine collaborator.
//!
//! The core never talks to a database directly. Everything it needs from
//! storage goes through [`StorageEngine`]: running validated SQL, reading the
//! schema for introspection, and the short bounded lookups used for column
//! profiling and clarification options.

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::catalog::ColumnProfile;

/// A storage failure, carrying the SQL that caused it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}\nSQL: {sql}")]
pub struct ExecutionError {
    pub sql: String,
    pub message: String,
}

impl ExecutionError {
    pub fn new(sql: impl Into<String>, message: impl ToString) -> Self {
        Self {
            sql: sql.into(),
            message: message.to_string(),
        }
    }
}

pub type StorageResult<T> = Result<T, ExecutionError>;

/// Column as reported by the schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Declared SQL type, possibly empty.
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
}

/// Table as reported by the schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
}

/// Rows returned by a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    /// True when more rows existed than the row limit allowed.
    pub truncated: bool,
}

impl QueryResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as JSON objects keyed by column name.
    pub fn to_records(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }
}

/// Interface to the relational store holding the billing tables.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Run a SELECT and return its rows.
    async fn execute(&self, sql: &str) -> StorageResult<QueryResult>;

    /// Tables and columns, in schema order.
    async fn introspect_schema(&self) -> StorageResult<Vec<TableDescriptor>>;

    /// Up to `limit` distinct non-null values of a column, as text, sorted.
    async fn distinct_values(
        &self,
        table: &str,
        column: &str,
        limit: usize,
    ) -> StorageResult<Vec<String>>;

    /// Row count, non-null count and distinct count, from one aggregate query.
    async fn column_profile(&self, table: &str, column: &str) -> StorageResult<ColumnProfile>;
}

/// Double-quote an identifier for SQL text.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

//! Metadata catalog.
//!
//! The catalog describes the billing tables the system can query: columns,
//! aliases, aggregation hints and classification flags. It is built once,
//! either from the curated description shipped with the crate or by
//! introspecting the storage engine, and is read-only afterwards.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐      ┌──────────────────────────────────────┐
//! │ predefined.json      │      │ StorageEngine                        │
//! │ (curated document)   │      │ introspect_schema / column_profile / │
//! └──────────┬───────────┘      │ distinct_values                      │
//!            │                  └──────────────────┬───────────────────┘
//!            ▼ [document]                          ▼ [introspect + classify]
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                  Catalog (BTreeMap<table, TableMetadata>)            │
//! └──────────────────────────────────────────────────────────────────────┘
//!            │ merge(fresh): new columns added, existing entries kept
//!            ▼
//!      shared as Arc<Catalog>
//! ```

mod classify;
mod document;
mod introspect;
mod predefined;
mod types;

pub use classify::{classify_column, Classification, ClassifyOptions};
pub use document::{CatalogDocument, ColumnDocument, TableDocument, UsageGuidance};
pub use introspect::{introspect, introspect_tables};
pub use predefined::predefined;
pub use types::{
    AggFn, ColumnCategory, ColumnMetadata, ColumnProfile, DataType, ExpertGuidance, NullBucket,
    Provider, TableMetadata,
};

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::storage::StorageEngine;

/// Fatal: without a catalog nothing else can run.
#[derive(Debug, thiserror::Error)]
pub enum CatalogLoadError {
    #[error("Failed to read catalog document: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse catalog document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unknown aggregate function: {0}")]
    UnknownAggregate(String),

    #[error("Unknown column category: {0}")]
    UnknownCategory(String),

    #[error("Invalid column {table}.{column}: {reason}")]
    InvalidColumn {
        table: String,
        column: String,
        reason: String,
    },

    #[error("Catalog contains no tables")]
    Empty,

    #[error("Introspection failed: {0}")]
    Introspection(String),
}

pub type CatalogResult<T> = Result<T, CatalogLoadError>;

/// How the catalog is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CatalogMode {
    #[default]
    Predefined,
    Introspected,
}

/// Immutable description of every queryable table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Catalog {
    tables: BTreeMap<String, TableMetadata>,
}

impl Catalog {
    /// Build a catalog, checking per-column invariants.
    pub fn new(tables: impl IntoIterator<Item = TableMetadata>) -> CatalogResult<Self> {
        let mut map = BTreeMap::new();
        for table in tables {
            for column in table.columns.values() {
                column.check_invariants(&table.name)?;
            }
            map.insert(table.name.clone(), table);
        }
        if map.is_empty() {
            return Err(CatalogLoadError::Empty);
        }
        Ok(Self { tables: map })
    }

    /// Parse the JSON document form.
    pub fn from_json(json: &str) -> CatalogResult<Self> {
        let document: CatalogDocument = serde_json::from_str(json)?;
        document.into_catalog()
    }

    /// Read a JSON document from disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn to_document(&self) -> CatalogDocument {
        CatalogDocument::from_catalog(self)
    }

    pub fn to_json(&self) -> CatalogResult<String> {
        Ok(serde_json::to_string_pretty(&self.to_document())?)
    }

    /// Case-insensitive table lookup.
    pub fn table(&self, name: &str) -> Option<&TableMetadata> {
        self.tables.get(name).or_else(|| {
            self.tables
                .values()
                .find(|t| t.name.eq_ignore_ascii_case(name))
        })
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableMetadata> {
        self.tables.values()
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Tables belonging to `provider`.
    pub fn provider_tables(&self, provider: Provider) -> impl Iterator<Item = &TableMetadata> {
        self.tables
            .values()
            .filter(move |t| t.provider() == Some(provider))
    }

    /// Providers with at least one table, in `Provider::ALL` order.
    pub fn providers(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|p| self.provider_tables(*p).next().is_some())
            .collect()
    }

    /// Look up a column in `table`, falling back to any table that has it.
    pub fn column(&self, table: &str, column: &str) -> Option<&ColumnMetadata> {
        self.table(table)
            .and_then(|t| t.column(column))
            .or_else(|| self.tables.values().find_map(|t| t.column(column)))
    }

    /// Metric columns across all tables, one entry per column name.
    pub fn metric_columns(&self) -> Vec<&ColumnMetadata> {
        let mut seen = BTreeMap::new();
        for table in self.tables.values() {
            for column in table.metric_columns() {
                seen.entry(column.name.as_str()).or_insert(column);
            }
        }
        seen.into_values().collect()
    }

    /// The metric answering a generic "cost" question.
    pub fn primary_cost_metric(&self) -> Option<&ColumnMetadata> {
        let metrics = self.metric_columns();
        metrics
            .iter()
            .find(|c| c.aliases.contains("cost"))
            .or_else(|| metrics.iter().find(|c| c.is_currency()))
            .or_else(|| metrics.first())
            .copied()
    }

    /// Combine with a fresh introspection.
    ///
    /// Tables and columns only present in `fresh` are added. Anything already
    /// in `self` is kept as is, so curated annotations survive re-introspection.
    pub fn merge(&self, fresh: &Catalog) -> Catalog {
        let mut tables = self.tables.clone();
        for (name, fresh_table) in &fresh.tables {
            match tables.get_mut(name) {
                Some(existing) => {
                    for (col_name, column) in &fresh_table.columns {
                        if existing.column(col_name).is_none() {
                            tracing::info!(table = %name, column = %col_name, "catalog: new column");
                            existing.columns.insert(col_name.clone(), column.clone());
                        }
                    }
                }
                None => {
                    tracing::info!(table = %name, "catalog: new table");
                    tables.insert(name.clone(), fresh_table.clone());
                }
            }
        }
        Catalog { tables }
    }
}

/// Build a catalog in the requested mode.
///
/// Introspected mode reads structure and statistics from `storage`.
pub async fn load(
    mode: CatalogMode,
    storage: &dyn StorageEngine,
    options: &ClassifyOptions,
) -> CatalogResult<Catalog> {
    let catalog = match mode {
        CatalogMode::Predefined => predefined()?,
        CatalogMode::Introspected => introspect(storage, options).await?,
    };
    tracing::info!(mode = ?mode, tables = catalog.len(), "catalog loaded");
    Ok(catalog)
}

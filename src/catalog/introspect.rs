//! Build a catalog from the live schema.
//!
//! One profile query and one sample query per column, issued concurrently
//! per table. Profiling failures are logged and leave the column without
//! statistics; they never fail the load.

use futures::future::join_all;

use super::classify::{annotate, ClassifyOptions};
use super::types::{ColumnMetadata, DataType, Provider, TableMetadata};
use super::{Catalog, CatalogLoadError, CatalogResult};
use crate::storage::{ColumnDescriptor, StorageEngine, TableDescriptor};

/// Introspect every table the storage engine exposes.
pub async fn introspect(
    storage: &dyn StorageEngine,
    options: &ClassifyOptions,
) -> CatalogResult<Catalog> {
    let descriptors = storage
        .introspect_schema()
        .await
        .map_err(|e| CatalogLoadError::Introspection(e.to_string()))?;
    introspect_tables(storage, &descriptors, options).await
}

/// Build catalog entries for already-fetched table descriptors.
pub async fn introspect_tables(
    storage: &dyn StorageEngine,
    descriptors: &[TableDescriptor],
    options: &ClassifyOptions,
) -> CatalogResult<Catalog> {
    let mut tables = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        let columns = join_all(
            descriptor
                .columns
                .iter()
                .map(|column| introspect_column(storage, &descriptor.name, column, options)),
        )
        .await;

        let mut table = TableMetadata::new(&descriptor.name);
        table.description = format!("Auto-extracted metadata for {}", descriptor.name);
        table.aliases.insert(descriptor.name.replace('_', " ").to_lowercase());
        if let Some(provider) = Provider::detect(&descriptor.name) {
            table.aliases.insert(provider.label().to_lowercase());
        }
        for column in columns {
            table.add_column(column);
        }
        tracing::debug!(table = %table.name, columns = table.columns.len(), "introspected table");
        tables.push(table);
    }
    Catalog::new(tables)
}

async fn introspect_column(
    storage: &dyn StorageEngine,
    table: &str,
    descriptor: &ColumnDescriptor,
    options: &ClassifyOptions,
) -> ColumnMetadata {
    let data_type = DataType::from_sql_type(&descriptor.data_type);
    let mut column = ColumnMetadata::new(&descriptor.name, data_type)
        .with_aliases([descriptor.name.replace('_', " ")]);
    column.description = format!("Auto-extracted column {}", descriptor.name);
    column.nullable = descriptor.nullable;
    column.is_primary_key = descriptor.primary_key;

    let (profile, samples) = futures::join!(
        storage.column_profile(table, &descriptor.name),
        storage.distinct_values(table, &descriptor.name, options.sample_size),
    );

    let profile = match profile {
        Ok(p) => Some(p),
        Err(e) => {
            tracing::warn!(table, column = %descriptor.name, error = %e, "column profile failed");
            None
        }
    };
    match samples {
        Ok(values) => column.sample_values = values,
        Err(e) => {
            tracing::warn!(table, column = %descriptor.name, error = %e, "sampling failed");
        }
    }

    annotate(&mut column, profile, options);
    column
}

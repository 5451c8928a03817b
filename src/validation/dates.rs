//! Unsafe date window removal.
//!
//! `col BETWEEN date(..) AND date(..)` compares strings. When `col` holds
//! something other than ISO dates the filter silently matches nothing, so it
//! is removed and reported instead. Columns without sampled values are left
//! alone.

use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime};

use super::Warning;
use crate::catalog::Catalog;
use crate::sql::{Predicate, SqlStatement};

/// True for `YYYY-MM-DD` and `YYYY-MM-DD HH:MM:SS`.
pub fn is_date_like(value: &str) -> bool {
    match value.len() {
        10 => NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok(),
        19 => NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").is_ok(),
        _ => false,
    }
}

pub(crate) fn remove_unsafe_date_filters(
    statement: &mut SqlStatement,
    catalog: &Catalog,
    warnings: &mut Vec<Warning>,
) {
    let mut reported: BTreeSet<String> = BTreeSet::new();

    for block in &mut statement.selects {
        let table = block.source_table.clone();
        block.where_clause.retain(|predicate| {
            let Some(column) = unsafe_date_window(predicate, catalog, &table) else {
                return true;
            };
            if reported.insert(column.clone()) {
                warnings.push(Warning::DateFilterRemoved { column });
            }
            false
        });
    }
}

/// The column of a date window that should not be applied.
fn unsafe_date_window(predicate: &Predicate, catalog: &Catalog, table: &str) -> Option<String> {
    let Predicate::Between {
        expr,
        low,
        high,
        negated: false,
    } = predicate
    else {
        return None;
    };
    if !low.is_date_call() || !high.is_date_call() {
        return None;
    }
    let name = expr.as_column()?;
    let column = catalog.column(table, &name)?;
    if column.sample_values.is_empty() {
        return None;
    }

    let bad = column.sample_values.iter().find(|v| !is_date_like(v))?;
    tracing::debug!(
        table,
        column = %column.name,
        sample = %bad,
        "date window over non-date values"
    );
    Some(column.name.clone())
}

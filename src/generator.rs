//! Rule-based SQL generation.
//!
//! Assembles a [`SqlStatement`] from an [`Intent`] without a language model.
//! One arm per table; several arms are joined with `UNION ALL`, each arm
//! prefixed with a provider label column. ORDER BY and LIMIT always live on
//! the statement, never on an arm.
//!
//! ```text
//! SELECT 'AWS' AS provider, servicename, SUM(billedcost) AS total_cost
//! FROM aws_cost_usage
//! GROUP BY servicename
//! UNION ALL
//! SELECT 'Azure' AS provider, servicename, SUM(billedcost) AS total_cost
//! FROM azure_cost_usage
//! GROUP BY servicename
//! ORDER BY total_cost DESC
//! LIMIT 10
//! ```

use crate::catalog::{AggFn, Catalog, ColumnMetadata, TableMetadata};
use crate::intent::{GroupKey, Intent, IntentFilter};
use crate::sql::{Expr, Limit, OrderBy, Predicate, SelectBlock, SelectItem, SqlStatement};

/// Output name of `COUNT(*)`.
const ROW_COUNT_ALIAS: &str = "record_count";

/// Deterministic generator used when no language model is available.
pub struct RuleBasedGenerator;

impl RuleBasedGenerator {
    /// Build the statement for an intent.
    pub fn generate(intent: &Intent, catalog: &Catalog) -> SqlStatement {
        let candidates: Vec<&TableMetadata> = intent
            .tables
            .iter()
            .filter_map(|name| catalog.table(name))
            .collect();
        let serving: Vec<&TableMetadata> = candidates
            .iter()
            .copied()
            .filter(|t| Self::serves(t, intent))
            .collect();
        let tables = if serving.is_empty() { candidates } else { serving };

        let labelled = tables.len() > 1;
        let blocks: Vec<SelectBlock> = tables
            .iter()
            .map(|table| Self::block(table, intent, labelled))
            .collect();

        let mut statement = SqlStatement::union_all(blocks);
        if let (Some(dir), Some(alias)) = (intent.order, Self::measure_alias(intent, catalog)) {
            statement.trailing_order_by = Some(OrderBy::single(Expr::new(alias), dir));
        }
        statement.trailing_limit = intent.limit.map(Limit::new);

        tracing::debug!(
            arms = statement.selects.len(),
            sql = %statement,
            "rule-based statement built"
        );
        statement
    }

    /// True if `table` has every column the intent groups by or measures.
    fn serves(table: &TableMetadata, intent: &Intent) -> bool {
        let groups_ok = intent.group_by.iter().all(|key| match key {
            GroupKey::Column(c) => table.column(c).is_some(),
            GroupKey::Tag(_) => tags_column(table).is_some(),
        });
        let metric_ok = intent
            .metric
            .as_deref()
            .map_or(true, |m| table.column(m).is_some());
        groups_ok && (intent.listing || metric_ok)
    }

    fn block(table: &TableMetadata, intent: &Intent, labelled: bool) -> SelectBlock {
        let mut block = SelectBlock::from_table(table.name.clone());

        if labelled {
            let label = table
                .provider()
                .map_or_else(|| table.name.clone(), |p| p.label().to_string());
            block
                .projection
                .push(SelectItem::aliased(Expr::new(quote_literal(&label)), "provider"));
        }

        if intent.listing {
            block.projection.push(SelectItem::new(Expr::new("*")));
        } else {
            for key in &intent.group_by {
                let Some((expr, alias)) = group_expr(table, key) else {
                    continue;
                };
                block.group_by.push(expr.clone());
                block.projection.push(match alias {
                    Some(alias) => SelectItem::aliased(expr, alias),
                    None => SelectItem::new(expr),
                });
            }
            if let Some(item) = measure(table, intent) {
                block.projection.push(item);
            }
        }

        block.where_clause = intent
            .filters
            .iter()
            .filter_map(|f| predicate(table, f))
            .collect();
        block
    }

    /// Output name of the aggregate column, used for ordering.
    fn measure_alias(intent: &Intent, catalog: &Catalog) -> Option<String> {
        if intent.listing {
            return None;
        }
        match intent.metric.as_deref() {
            None => Some(ROW_COUNT_ALIAS.to_string()),
            Some(metric) => {
                let column = intent
                    .tables
                    .iter()
                    .find_map(|t| catalog.column(t, metric))?;
                Some(aggregate_alias(aggregate_for(intent, column), column))
            }
        }
    }
}

/// `total_cost` for currency metrics, `total_<column>` otherwise.
pub fn aggregate_alias(aggregate: AggFn, column: &ColumnMetadata) -> String {
    let subject = if column.is_currency() {
        "cost"
    } else {
        column.name.as_str()
    };
    format!("{}_{}", aggregate.alias_prefix(), subject)
}

/// The intent's aggregate, else the column's catalog default, else `SUM`.
fn aggregate_for(intent: &Intent, column: &ColumnMetadata) -> AggFn {
    intent
        .aggregate
        .unwrap_or_else(|| column.effective_aggregate())
}

fn measure(table: &TableMetadata, intent: &Intent) -> Option<SelectItem> {
    let Some(metric) = intent.metric.as_deref() else {
        return Some(SelectItem::aliased(Expr::new("COUNT(*)"), ROW_COUNT_ALIAS));
    };
    let column = table.column(metric)?;
    let aggregate = aggregate_for(intent, column);
    Some(SelectItem::aliased(
        Expr::new(format!("{}({})", aggregate.sql_name(), column.name)),
        aggregate_alias(aggregate, column),
    ))
}

fn tags_column(table: &TableMetadata) -> Option<&ColumnMetadata> {
    table
        .column("tags")
        .or_else(|| table.columns.values().find(|c| c.aliases.contains("tag")))
}

fn tag_expr(column: &ColumnMetadata, key: &str) -> Expr {
    Expr::new(format!("json_extract({}, '$.{}')", column.name, key))
}

fn group_expr(table: &TableMetadata, key: &GroupKey) -> Option<(Expr, Option<String>)> {
    match key {
        GroupKey::Column(name) => table
            .column(name)
            .map(|c| (Expr::new(c.name.clone()), None)),
        GroupKey::Tag(tag) => {
            let column = tags_column(table)?;
            Some((tag_expr(column, tag), Some(tag.to_lowercase())))
        }
    }
}

fn predicate(table: &TableMetadata, filter: &IntentFilter) -> Option<Predicate> {
    let found = match filter {
        IntentFilter::Time(window) => table.time_column().map(|c| {
            let (low, high) = window.sql_bounds();
            Predicate::between(Expr::new(c.name.clone()), Expr::new(low), Expr::new(high))
        }),
        IntentFilter::DateRange { from, to } => table.time_column().map(|c| {
            let from = quote_literal(&from.format("%Y-%m-%d").to_string());
            match to {
                Some(to) => Predicate::between(
                    Expr::new(c.name.clone()),
                    Expr::new(from),
                    Expr::new(quote_literal(&to.format("%Y-%m-%d").to_string())),
                ),
                None => Predicate::condition(format!("{} >= {}", c.name, from)),
            }
        }),
        IntentFilter::Region(region) => table
            .region_column()
            .map(|c| Predicate::condition(format!("{} = {}", c.name, quote_literal(region)))),
        IntentFilter::Service(pattern) => table.service_column().map(|c| {
            Predicate::condition(format!(
                "{} LIKE {}",
                c.name,
                quote_literal(&format!("%{pattern}%"))
            ))
        }),
        IntentFilter::TagPresent(tag) => tags_column(table)
            .map(|c| Predicate::condition(format!("{} IS NOT NULL", tag_expr(c, tag)))),
    };
    if found.is_none() {
        tracing::debug!(table = %table.name, ?filter, "filter skipped, no matching column");
    }
    found
}

/// Single-quoted SQL string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

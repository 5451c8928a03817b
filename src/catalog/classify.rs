//! Column classification for introspected catalogs.
//!
//! Name rules decide the semantic category; cardinality from the column
//! profile decides whether a string column is groupable or filter-only.
//!
//! | Rule              | Pattern                         | Result              |
//! |-------------------|---------------------------------|---------------------|
//! | temporal          | name contains `date` / `period` | Temporal            |
//! | currency_metric   | name contains `cost` / `price`  | Metric, currency    |
//! | identifier        | name ends with `id`             | Dimension           |
//! | name_dimension    | name ends with `name`           | Dimension           |
//! | numeric_metric    | numeric data type               | Metric              |

use serde::{Deserialize, Serialize};

use super::types::{AggFn, ColumnCategory, ColumnMetadata, ColumnProfile, DataType};

/// Thresholds and sampling limits for introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifyOptions {
    /// Distinct sample values kept per column.
    pub sample_size: usize,
    /// Below this many distinct values a string column is groupable.
    pub low_cardinality: u64,
    /// Above this many distinct values a column is filter-only.
    pub high_cardinality: u64,
}

impl Default for ClassifyOptions {
    fn default() -> Self {
        Self {
            sample_size: 5,
            low_cardinality: 50,
            high_cardinality: 1000,
        }
    }
}

/// Outcome of the name rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: ColumnCategory,
    pub unit: Option<&'static str>,
    /// Name of the rule that fired, `None` if no rule matched.
    pub rule: Option<&'static str>,
}

#[derive(Debug, Clone, Copy)]
enum Pattern {
    Contains(&'static [&'static str]),
    EndsWith(&'static str),
    Numeric,
}

#[derive(Debug, Clone, Copy)]
struct NameRule {
    name: &'static str,
    priority: u8,
    pattern: Pattern,
    category: ColumnCategory,
    unit: Option<&'static str>,
}

impl NameRule {
    fn matches(&self, name: &str, data_type: DataType) -> bool {
        match self.pattern {
            Pattern::Contains(needles) => needles.iter().any(|n| name.contains(n)),
            Pattern::EndsWith(suffix) => name.ends_with(suffix),
            Pattern::Numeric => data_type.is_numeric(),
        }
    }
}

fn rules() -> Vec<NameRule> {
    let mut rules = vec![
        NameRule {
            name: "temporal",
            priority: 100,
            pattern: Pattern::Contains(&["date", "period"]),
            category: ColumnCategory::Temporal,
            unit: None,
        },
        NameRule {
            name: "currency_metric",
            priority: 90,
            pattern: Pattern::Contains(&["cost", "price"]),
            category: ColumnCategory::Metric,
            unit: Some("currency"),
        },
        NameRule {
            name: "identifier",
            priority: 80,
            pattern: Pattern::EndsWith("id"),
            category: ColumnCategory::Dimension,
            unit: None,
        },
        NameRule {
            name: "name_dimension",
            priority: 80,
            pattern: Pattern::EndsWith("name"),
            category: ColumnCategory::Dimension,
            unit: None,
        },
        NameRule {
            name: "numeric_metric",
            priority: 10,
            pattern: Pattern::Numeric,
            category: ColumnCategory::Metric,
            unit: None,
        },
    ];
    rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    rules
}

/// Classify a column by its name and type. First matching rule wins.
pub fn classify_column(name: &str, data_type: DataType) -> Classification {
    let lower = name.to_lowercase();
    rules()
        .into_iter()
        .find(|rule| rule.matches(&lower, data_type))
        .map(|rule| Classification {
            category: rule.category,
            unit: rule.unit,
            rule: Some(rule.name),
        })
        .unwrap_or(Classification {
            category: ColumnCategory::Unknown,
            unit: None,
            rule: None,
        })
}

/// Fill in category, aggregation and grouping flags on an introspected column.
pub(crate) fn annotate(
    column: &mut ColumnMetadata,
    profile: Option<ColumnProfile>,
    options: &ClassifyOptions,
) {
    let classification = classify_column(&column.name, column.data_type);
    column.category = classification.category;
    column.unit = classification.unit.map(str::to_string);
    column.profile = profile;

    if column.data_type.is_numeric() {
        column.aggregations = AggFn::ALL.to_vec();
    } else if column.category == ColumnCategory::Metric {
        // A text column named like a cost still sums after SQLite coercion.
        column.aggregations = vec![AggFn::Sum, AggFn::Avg, AggFn::Min, AggFn::Max];
    }

    if column.is_metric() {
        column.default_aggregate = Some(AggFn::Sum);
        column.groupable = false;
        column.filterable = true;
        return;
    }

    let distinct = profile.map(|p| p.distinct);
    let by_name = column.category == ColumnCategory::Dimension;
    column.groupable = match distinct {
        Some(d) if d > options.high_cardinality => false,
        Some(d) if d < options.low_cardinality => !column.data_type.is_numeric() || by_name,
        Some(_) => by_name,
        None => by_name,
    };
    column.filterable = true;
    column.default_aggregate = None;

    tracing::debug!(
        column = %column.name,
        rule = classification.rule.unwrap_or("none"),
        groupable = column.groupable,
        "classified column"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(distinct: u64) -> Option<ColumnProfile> {
        Some(ColumnProfile {
            total: 10_000,
            non_null: 10_000,
            distinct,
        })
    }

    #[test]
    fn test_name_rules() {
        let c = classify_column("billing_period_start", DataType::String);
        assert_eq!(c.category, ColumnCategory::Temporal);
        assert_eq!(c.rule, Some("temporal"));

        let c = classify_column("BilledCost", DataType::Numeric);
        assert_eq!(c.category, ColumnCategory::Metric);
        assert_eq!(c.unit, Some("currency"));

        let c = classify_column("resource_id", DataType::String);
        assert_eq!(c.category, ColumnCategory::Dimension);

        let c = classify_column("servicename", DataType::String);
        assert_eq!(c.category, ColumnCategory::Dimension);

        let c = classify_column("consumedquantity", DataType::Numeric);
        assert_eq!(c.category, ColumnCategory::Metric);
        assert_eq!(c.unit, None);

        let c = classify_column("tags", DataType::String);
        assert_eq!(c.category, ColumnCategory::Unknown);
        assert_eq!(c.rule, None);
    }

    #[test]
    fn test_temporal_outranks_cost() {
        // "cost_date" is a date, not a cost
        let c = classify_column("cost_date", DataType::String);
        assert_eq!(c.category, ColumnCategory::Temporal);
    }

    #[test]
    fn test_annotate_metric() {
        let mut column = ColumnMetadata::new("billedcost", DataType::Numeric);
        annotate(&mut column, profile(9000), &ClassifyOptions::default());
        assert_eq!(column.aggregations, AggFn::ALL.to_vec());
        assert_eq!(column.default_aggregate, Some(AggFn::Sum));
        assert!(!column.groupable);
        column.check_invariants("t").unwrap();
    }

    #[test]
    fn test_annotate_cardinality_thresholds() {
        let options = ClassifyOptions::default();

        let mut low = ColumnMetadata::new("chargecategory", DataType::String);
        annotate(&mut low, profile(4), &options);
        assert!(low.groupable);

        let mut high = ColumnMetadata::new("resourcename", DataType::String);
        annotate(&mut high, profile(5000), &options);
        assert!(!high.groupable);
        assert!(high.filterable);

        let mut middle = ColumnMetadata::new("servicename", DataType::String);
        annotate(&mut middle, profile(200), &options);
        assert!(middle.groupable);

        let mut unknown_middle = ColumnMetadata::new("tags", DataType::String);
        annotate(&mut unknown_middle, profile(200), &options);
        assert!(!unknown_middle.groupable);
    }
}

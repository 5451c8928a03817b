//! Detection predicates and fixed option lists, one per slot.
//!
//! Every predicate takes a normalized (lowercase) question.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::alias::AliasResolver;
use crate::catalog::{Catalog, ColumnMetadata};
use crate::intent::{has_time_bound, providers_in, service_terms_in, TimeWindow};
use crate::text::{contains_any, contains_phrase};

use super::context::SlotOption;

const COST_WORDS: &[&str] = &[
    "cost", "costs", "spend", "spending", "spent", "bill", "billing", "charge", "charges",
    "expense", "expenses", "price", "pricing",
];

/// Words that make a cost figure ambiguous between metrics.
const GENERIC_COST_TERMS: &[&str] = &["cost", "costs", "price", "prices"];

const SUPERLATIVE_WORDS: &[&str] = &[
    "top", "highest", "most", "biggest", "largest", "lowest", "cheapest", "bottom",
];

const REGION_WORDS: &[&str] = &["region", "regional", "location", "geography", "where"];

pub const LIMIT_CHOICES: [u64; 4] = [5, 10, 20, 50];

pub const TIME_WINDOWS: [TimeWindow; 4] = [
    TimeWindow::LastDays(7),
    TimeWindow::LastDays(30),
    TimeWindow::ThisMonth,
    TimeWindow::YearToDate,
];

static TIME_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:today|yesterday|days?|weeks?|weekly|months?|monthly|years?|yearly|annual|quarters?|quarterly|q[1-4]|ytd|mtd|between|since|january|february|march|april|june|july|august|september|october|november|december)\b|\d{4}-\d{2}-\d{2}",
    )
    .expect("valid regex")
});

static ADJACENT_COUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:top|first|highest|most|biggest|largest|lowest|cheapest|bottom)\s+\d+\b|\b\d+\s+(?:most|highest|biggest|largest|lowest|cheapest|least)\b",
    )
    .expect("valid regex")
});

static REGION_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:us|eu|ap|sa|ca|me|af)-[a-z]+-\d\b").expect("valid regex")
});

// ============================================================================
// time_range
// ============================================================================

pub fn is_cost_query(q: &str) -> bool {
    contains_any(q, COST_WORDS)
}

/// A cost question with no time bound at all.
pub fn needs_time_range(q: &str) -> bool {
    is_cost_query(q) && !TIME_KEYWORD.is_match(q) && !has_time_bound(q)
}

pub fn time_range_options(today: NaiveDate) -> Vec<SlotOption> {
    TIME_WINDOWS
        .iter()
        .map(|w| {
            let (from, to) = w.range(today);
            SlotOption::new(w.label(), w.slot_value())
                .described(format!("{} to {}", from.format("%Y-%m-%d"), to.format("%Y-%m-%d")))
        })
        .collect()
}

// ============================================================================
// provider
// ============================================================================

/// A generic service is named but nothing pins down the provider.
pub fn needs_provider(q: &str, catalog: &Catalog) -> bool {
    if catalog.providers().len() < 2 {
        return false;
    }
    let terms = service_terms_in(q);
    let generic_service = terms.iter().any(|t| t.provider.is_none());
    let specific_service = terms.iter().any(|t| t.provider.is_some());
    let named = !providers_in(q).is_empty()
        || !AliasResolver::new(catalog).tables_mentioned(q).is_empty();
    generic_service && !specific_service && !named
}

pub fn provider_options() -> Vec<SlotOption> {
    vec![
        SlotOption::new("AWS", "aws").described("Amazon Web Services"),
        SlotOption::new("Azure", "azure").described("Microsoft Azure"),
        SlotOption::new("Both AWS and Azure", "both").described("Compare both providers"),
    ]
}

// ============================================================================
// metric
// ============================================================================

/// Cost metrics in catalog order.
pub fn cost_metrics(catalog: &Catalog) -> Vec<&ColumnMetadata> {
    catalog
        .metric_columns()
        .into_iter()
        .filter(|c| c.is_currency())
        .collect()
}

/// Readable name of a metric column: `billedcost` → `billed cost`.
pub fn metric_phrase(column: &ColumnMetadata) -> String {
    let name = column.name.to_lowercase();
    for generic in ["cost", "price"] {
        if let Some(prefix) = name.strip_suffix(generic) {
            let prefix = prefix.trim_end_matches('_');
            if !prefix.is_empty() {
                return format!("{} {}", prefix.replace('_', " "), generic);
            }
        }
    }
    column
        .aliases
        .iter()
        .find(|a| a.contains(' '))
        .cloned()
        .unwrap_or_else(|| name.replace('_', " "))
}

/// Phrases that pick out one cost metric over the others.
fn qualifiers(column: &ColumnMetadata) -> Vec<String> {
    let mut out = vec![column.name.to_lowercase(), metric_phrase(column)];
    out.extend(
        column
            .aliases
            .iter()
            .filter(|a| !GENERIC_COST_TERMS.contains(&a.as_str()))
            .cloned(),
    );
    out
}

/// "cost" or "price" without anything naming one of several cost metrics.
pub fn needs_metric(q: &str, catalog: &Catalog) -> bool {
    let metrics = cost_metrics(catalog);
    if metrics.len() < 2 || !contains_any(q, GENERIC_COST_TERMS) {
        return false;
    }
    !metrics
        .iter()
        .flat_map(|c| qualifiers(c))
        .any(|phrase| contains_phrase(q, &phrase))
}

pub fn metric_options(catalog: &Catalog) -> Vec<SlotOption> {
    cost_metrics(catalog)
        .into_iter()
        .map(|c| {
            let label = capitalize(&metric_phrase(c));
            let option = SlotOption::new(label, c.name.clone());
            if c.description.is_empty() {
                option
            } else {
                option.described(c.description.clone())
            }
        })
        .collect()
}

fn capitalize(s: &str) -> String {
    s.split(' ')
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// limit
// ============================================================================

/// A ranking word with no count next to it.
pub fn needs_limit(q: &str) -> bool {
    contains_any(q, SUPERLATIVE_WORDS) && !ADJACENT_COUNT.is_match(q)
}

pub fn limit_options() -> Vec<SlotOption> {
    LIMIT_CHOICES
        .iter()
        .map(|n| SlotOption::new(format!("Top {n}"), n.to_string()))
        .collect()
}

// ============================================================================
// region
// ============================================================================

/// Mentions a region at all, grouping by region included.
pub fn mentions_region(q: &str) -> bool {
    contains_any(q, REGION_WORDS)
}

/// A region code or known region value already present.
pub fn has_region_literal<'v>(q: &str, known: impl IntoIterator<Item = &'v str>) -> bool {
    REGION_CODE.is_match(q)
        || known
            .into_iter()
            .any(|v| !v.is_empty() && contains_phrase(q, &v.to_lowercase()))
}

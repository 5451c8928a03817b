//! Merging a chosen slot value back into the question text.
//!
//! Every slot maps to a fixed phrase. Re-setting a slot first takes the
//! previous phrase back out, so values replace each other instead of
//! stacking.

use std::sync::LazyLock;

use regex::Regex;

use crate::catalog::Catalog;
use crate::intent::TimeWindow;

use super::context::SlotKey;
use super::rules::{cost_metrics, metric_phrase};
use super::{ClarificationError, ClarificationResult};

static GENERIC_COST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:cost|price)s?\b").expect("valid regex"));

static TOP_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(top)\s+\d+\b").expect("valid regex"));

static BARE_TOP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(top)\b").expect("valid regex"));

/// Superlatives that already mean "largest first"; `top N` takes their place.
static DESC_SUPERLATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:highest|most|biggest|largest)\b").expect("valid regex")
});

/// Superlatives asking for the smallest rows; `top N` goes in front of them.
static ASC_SUPERLATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:lowest|cheapest|bottom)\b").expect("valid regex")
});

/// Value of the region option that means "no region filter".
pub const ALL_REGIONS: &str = "all";

pub struct ClarificationApplier<'a> {
    catalog: &'a Catalog,
}

impl<'a> ClarificationApplier<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Merge `value` for `key` into `question`.
    pub fn apply(&self, question: &str, key: SlotKey, value: &str) -> ClarificationResult<String> {
        let invalid = || ClarificationError::InvalidValue {
            slot: key,
            value: value.to_string(),
        };

        match key {
            SlotKey::TimeRange => {
                let window = TimeWindow::from_slot_value(value).ok_or_else(invalid)?;
                Ok(append_phrase(question, &time_phrase(window)))
            }
            SlotKey::Provider => {
                let label = provider_label(value).ok_or_else(invalid)?;
                Ok(append_phrase(question, &format!(" for {label}")))
            }
            SlotKey::Metric => {
                let phrase = self.metric_phrase(value).ok_or_else(invalid)?;
                Ok(substitute_metric(question, &phrase))
            }
            SlotKey::Limit => {
                let n = value
                    .trim()
                    .parse::<u64>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(invalid)?;
                Ok(set_limit(question, n))
            }
            SlotKey::Region => {
                let region = value.trim();
                if region.is_empty() {
                    return Err(invalid());
                }
                if region.eq_ignore_ascii_case(ALL_REGIONS) {
                    return Ok(question.to_string());
                }
                Ok(append_phrase(question, &format!(" in {region}")))
            }
        }
    }

    /// Replace the phrase `previous` produced with the one for `value`.
    pub fn reapply(
        &self,
        question: &str,
        key: SlotKey,
        previous: &str,
        value: &str,
    ) -> ClarificationResult<String> {
        let undone = self.undo(question, key, previous);
        self.apply(&undone, key, value)
    }

    fn undo(&self, question: &str, key: SlotKey, previous: &str) -> String {
        match key {
            SlotKey::TimeRange => match TimeWindow::from_slot_value(previous) {
                Some(window) => question.replacen(&time_phrase(window), "", 1),
                None => question.to_string(),
            },
            SlotKey::Provider => match provider_label(previous) {
                Some(label) => question.replacen(&format!(" for {label}"), "", 1),
                None => question.to_string(),
            },
            SlotKey::Metric => match self.metric_phrase(previous) {
                Some(phrase) => {
                    let appended = format!(" using {phrase}");
                    if question.contains(&appended) {
                        question.replacen(&appended, "", 1)
                    } else {
                        question.replace(&phrase, "cost")
                    }
                }
                None => question.to_string(),
            },
            // `set_limit` rewrites the count in place.
            SlotKey::Limit => question.to_string(),
            SlotKey::Region => {
                let region = previous.trim();
                if region.eq_ignore_ascii_case(ALL_REGIONS) {
                    question.to_string()
                } else {
                    question.replacen(&format!(" in {region}"), "", 1)
                }
            }
        }
    }

    fn metric_phrase(&self, value: &str) -> Option<String> {
        cost_metrics(self.catalog)
            .into_iter()
            .find(|c| c.name.eq_ignore_ascii_case(value.trim()))
            .map(metric_phrase)
    }
}

fn time_phrase(window: TimeWindow) -> String {
    format!(" in the {}", window.label().to_lowercase())
}

fn provider_label(value: &str) -> Option<&'static str> {
    match value.trim().to_lowercase().as_str() {
        "aws" => Some("AWS"),
        "azure" => Some("Azure"),
        "both" => Some("both AWS and Azure"),
        _ => None,
    }
}

/// Insert `phrase` before any trailing `?`, `!` or `.`.
fn append_phrase(question: &str, phrase: &str) -> String {
    let trimmed = question.trim_end();
    let body = trimmed.trim_end_matches(['?', '!', '.']);
    let punctuation = &trimmed[body.len()..];
    format!("{body}{phrase}{punctuation}")
}

fn substitute_metric(question: &str, phrase: &str) -> String {
    if GENERIC_COST.is_match(question) {
        GENERIC_COST.replace_all(question, phrase).into_owned()
    } else {
        append_phrase(question, &format!(" using {phrase}"))
    }
}

fn set_limit(question: &str, n: u64) -> String {
    let with_count = format!("${{1}} {n}");
    if TOP_COUNT.is_match(question) {
        return TOP_COUNT.replace(question, with_count.as_str()).into_owned();
    }
    if BARE_TOP.is_match(question) {
        return BARE_TOP.replace(question, with_count.as_str()).into_owned();
    }
    if let Some(m) = DESC_SUPERLATIVE.find(question) {
        let top = if m.as_str().starts_with(char::is_uppercase) { "Top" } else { "top" };
        return format!("{}{top} {n}{}", &question[..m.start()], &question[m.end()..]);
    }
    if let Some(m) = ASC_SUPERLATIVE.find(question) {
        return format!("{}top {n} {}", &question[..m.start()], &question[m.start()..]);
    }
    format!("Top {n} {question}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::predefined;

    fn apply(question: &str, key: SlotKey, value: &str) -> String {
        let catalog = predefined().unwrap();
        ClarificationApplier::new(&catalog)
            .apply(question, key, value)
            .unwrap()
    }

    #[test]
    fn test_time_range_before_punctuation() {
        assert_eq!(
            apply("What is the total cost?", SlotKey::TimeRange, "last_30_days"),
            "What is the total cost in the last 30 days?"
        );
        assert_eq!(
            apply("Total cost", SlotKey::TimeRange, "this_month"),
            "Total cost in the current month"
        );
    }

    #[test]
    fn test_provider_and_region_phrases() {
        assert_eq!(
            apply("Storage cost last month?", SlotKey::Provider, "both"),
            "Storage cost last month for both AWS and Azure?"
        );
        assert_eq!(
            apply("Cost in my region", SlotKey::Region, "us-east-1"),
            "Cost in my region in us-east-1"
        );
        assert_eq!(apply("Cost in my region", SlotKey::Region, "all"), "Cost in my region");
    }

    #[test]
    fn test_metric_substitution() {
        assert_eq!(
            apply("What are my costs this month?", SlotKey::Metric, "effectivecost"),
            "What are my effective cost this month?"
        );
        assert_eq!(
            apply("Total spend", SlotKey::Metric, "billedcost"),
            "Total spend using billed cost"
        );
    }

    #[test]
    fn test_limit_placement() {
        assert_eq!(apply("Show me top services", SlotKey::Limit, "5"), "Show me top 5 services");
        assert_eq!(apply("Top 3 services", SlotKey::Limit, "20"), "Top 20 services");
        assert_eq!(apply("Services by cost", SlotKey::Limit, "50"), "Top 50 Services by cost");
    }

    #[test]
    fn test_limit_replaces_bare_superlative() {
        assert_eq!(
            apply("Most expensive regions", SlotKey::Limit, "10"),
            "Top 10 expensive regions"
        );
        assert_eq!(
            apply("which services have the highest spend", SlotKey::Limit, "5"),
            "which services have the top 5 spend"
        );
        assert_eq!(
            apply("cheapest services last month", SlotKey::Limit, "3"),
            "top 3 cheapest services last month"
        );

        let catalog = predefined().unwrap();
        let applier = ClarificationApplier::new(&catalog);
        let q = applier.apply("Most expensive regions", SlotKey::Limit, "10").unwrap();
        let q = applier.reapply(&q, SlotKey::Limit, "10", "20").unwrap();
        assert_eq!(q, "Top 20 expensive regions");
    }

    #[test]
    fn test_invalid_values() {
        let catalog = predefined().unwrap();
        let applier = ClarificationApplier::new(&catalog);
        for (key, value) in [
            (SlotKey::TimeRange, "someday"),
            (SlotKey::Provider, "gcp"),
            (SlotKey::Metric, "consumedquantity"),
            (SlotKey::Limit, "0"),
            (SlotKey::Limit, "many"),
            (SlotKey::Region, "  "),
        ] {
            assert!(
                matches!(
                    applier.apply("q", key, value),
                    Err(ClarificationError::InvalidValue { .. })
                ),
                "{key} = {value:?}"
            );
        }
    }

    #[test]
    fn test_reapply_replaces_previous_value() {
        let catalog = predefined().unwrap();
        let applier = ClarificationApplier::new(&catalog);

        let q = applier
            .apply("What is the total cost?", SlotKey::TimeRange, "last_7_days")
            .unwrap();
        let q = applier
            .reapply(&q, SlotKey::TimeRange, "last_7_days", "year_to_date")
            .unwrap();
        assert_eq!(q, "What is the total cost in the year to date?");

        let q = applier.apply("Total cost", SlotKey::Metric, "billedcost").unwrap();
        let q = applier
            .reapply(&q, SlotKey::Metric, "billedcost", "effectivecost")
            .unwrap();
        assert_eq!(q, "Total effective cost");

        let q = applier.apply("Show me top services", SlotKey::Limit, "5").unwrap();
        let q = applier.reapply(&q, SlotKey::Limit, "5", "20").unwrap();
        assert_eq!(q, "Show me top 20 services");

        let q = applier.apply("Cost by service", SlotKey::Region, "us-east-1").unwrap();
        let q = applier
            .reapply(&q, SlotKey::Region, "us-east-1", "EU (Ireland)")
            .unwrap();
        assert_eq!(q, "Cost by service in EU (Ireland)");
    }
}

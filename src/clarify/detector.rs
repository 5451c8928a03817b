//! Slot detection.

use std::collections::BTreeMap;

use chrono::{Local, NaiveDate};
use futures::future::join_all;

use crate::catalog::{Catalog, ColumnMetadata, TableMetadata};
use crate::config::ClarificationSettings;
use crate::intent::providers_in;
use crate::text::normalize_question;

use super::applier::ALL_REGIONS;
use super::context::{ClarificationContext, ClarificationSlot, SlotKey, SlotOption};
use super::rules;
use super::LiveDataAccessor;

const TIME_RANGE_QUESTION: &str = "Which time range would you like me to use?";
const PROVIDER_QUESTION: &str = "Which cloud provider would you like to analyze?";
const METRIC_QUESTION: &str = "Which cost metric would you like to use?";
const LIMIT_QUESTION: &str = "How many results would you like to see?";
const REGION_QUESTION: &str = "Which region would you like to analyze?";

/// Finds the first piece of missing context in a question.
pub struct AmbiguityDetector<'a> {
    catalog: &'a Catalog,
    max_region_options: usize,
    today: NaiveDate,
}

impl<'a> AmbiguityDetector<'a> {
    pub fn new(catalog: &'a Catalog, settings: &ClarificationSettings) -> Self {
        Self {
            catalog,
            max_region_options: settings.max_region_options,
            today: Local::now().date_naive(),
        }
    }

    /// Anchor date for the concrete ranges shown with time options.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Start a clarification for `question`, or `None` if nothing is missing.
    pub async fn detect<L>(&self, question: &str, live: &L) -> Option<ClarificationContext>
    where
        L: LiveDataAccessor + ?Sized,
    {
        let slot = self.next_slot(question, &BTreeMap::new(), live).await?;
        Some(ClarificationContext::new(question).with_pending(slot))
    }

    /// The highest-priority unresolved slot, at most one per call.
    pub async fn next_slot<L>(
        &self,
        question: &str,
        resolved: &BTreeMap<SlotKey, String>,
        live: &L,
    ) -> Option<ClarificationSlot>
    where
        L: LiveDataAccessor + ?Sized,
    {
        let q = normalize_question(question);
        for key in SlotKey::ALL {
            if resolved.contains_key(&key) {
                continue;
            }
            let slot = match key {
                SlotKey::TimeRange => rules::needs_time_range(&q)
                    .then(|| slot(key, TIME_RANGE_QUESTION, rules::time_range_options(self.today))),
                SlotKey::Provider => rules::needs_provider(&q, self.catalog)
                    .then(|| slot(key, PROVIDER_QUESTION, rules::provider_options())),
                SlotKey::Metric => rules::needs_metric(&q, self.catalog)
                    .then(|| slot(key, METRIC_QUESTION, rules::metric_options(self.catalog))),
                SlotKey::Limit => rules::needs_limit(&q)
                    .then(|| slot(key, LIMIT_QUESTION, rules::limit_options())),
                SlotKey::Region => self.region_slot(&q, live).await,
            };
            if let Some(slot) = slot {
                tracing::debug!(slot = %key, options = slot.options.len(), "clarification needed");
                return Some(slot);
            }
        }
        None
    }

    async fn region_slot<L>(&self, q: &str, live: &L) -> Option<ClarificationSlot>
    where
        L: LiveDataAccessor + ?Sized,
    {
        if !rules::mentions_region(q) {
            return None;
        }
        let columns = self.region_columns(q);
        let samples = columns.iter().flat_map(|(_, c)| c.sample_values.iter().map(String::as_str));
        if rules::has_region_literal(q, samples) {
            return None;
        }

        let lookups = columns.iter().map(|&(table, column)| {
            live.distinct_values(&table.name, &column.name, self.max_region_options)
        });
        let results = join_all(lookups).await;

        // value -> providers offering it, in first-seen order
        let mut regions: Vec<(String, Vec<String>)> = Vec::new();
        for (&(table, column), result) in columns.iter().zip(results) {
            let values = match result {
                Ok(values) => values,
                Err(err) => {
                    tracing::warn!(
                        table = %table.name,
                        column = %column.name,
                        error = %err,
                        "region lookup failed, using catalog samples"
                    );
                    column.sample_values.clone()
                }
            };
            let owner = table
                .provider()
                .map(|p| p.label().to_string())
                .unwrap_or_else(|| table.name.clone());
            for value in values {
                match regions.iter_mut().find(|(v, _)| *v == value) {
                    Some((_, owners)) if !owners.contains(&owner) => owners.push(owner.clone()),
                    Some(_) => {}
                    None => regions.push((value, vec![owner.clone()])),
                }
            }
        }

        if rules::has_region_literal(q, regions.iter().map(|(v, _)| v.as_str())) {
            return None;
        }

        let mut options = vec![SlotOption::new("All regions", ALL_REGIONS)];
        options.extend(
            regions
                .into_iter()
                .take(self.max_region_options)
                .map(|(value, owners)| SlotOption::new(value.clone(), value).described(owners.join(", "))),
        );
        Some(slot(SlotKey::Region, REGION_QUESTION, options))
    }

    /// Region columns of the tables the question can be about.
    fn region_columns(&self, q: &str) -> Vec<(&'a TableMetadata, &'a ColumnMetadata)> {
        let named = providers_in(q);
        self.catalog
            .tables()
            .filter(|t| named.is_empty() || t.provider().is_some_and(|p| named.contains(&p)))
            .filter_map(|t| t.region_column().map(|c| (t, c)))
            .collect()
    }
}

fn slot(key: SlotKey, question: &str, options: Vec<SlotOption>) -> ClarificationSlot {
    ClarificationSlot {
        key,
        question: question.to_string(),
        options,
        required: true,
    }
}

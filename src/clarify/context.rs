//! Clarification state for one in-flight question.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::applier::ClarificationApplier;
use super::{ClarificationError, ClarificationResult};

/// A piece of context a question can be missing, in detection priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKey {
    TimeRange,
    Provider,
    Metric,
    Limit,
    Region,
}

impl SlotKey {
    pub const ALL: [SlotKey; 5] = [
        SlotKey::TimeRange,
        SlotKey::Provider,
        SlotKey::Metric,
        SlotKey::Limit,
        SlotKey::Region,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SlotKey::TimeRange => "time_range",
            SlotKey::Provider => "provider",
            SlotKey::Metric => "metric",
            SlotKey::Limit => "limit",
            SlotKey::Region => "region",
        }
    }

    /// Slots that accept a value outside their option list.
    pub fn accepts_free_value(&self) -> bool {
        matches!(self, SlotKey::Limit | SlotKey::Region)
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SlotKey {
    type Err = ClarificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SlotKey::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ClarificationError::UnknownSlot(s.to_string()))
    }
}

/// One choice offered to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotOption {
    pub label: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SlotOption {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            description: None,
        }
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A question put back to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarificationSlot {
    pub key: SlotKey,
    pub question: String,
    pub options: Vec<SlotOption>,
    pub required: bool,
}

impl ClarificationSlot {
    /// Map user input to an option value.
    ///
    /// Accepts a 1-based option number, an option value or label
    /// (case-insensitive), or any non-empty text for slots taking free values.
    /// A number given for the limit slot is the row count itself, never an
    /// option number.
    pub fn choose(&self, input: &str) -> ClarificationResult<String> {
        let input = input.trim();
        if let Ok(n) = input.parse::<usize>() {
            if self.key == SlotKey::Limit && n > 0 {
                return Ok(n.to_string());
            }
            if let Some(option) = n.checked_sub(1).and_then(|i| self.options.get(i)) {
                return Ok(option.value.clone());
            }
        }
        if let Some(option) = self.options.iter().find(|o| {
            o.value.eq_ignore_ascii_case(input) || o.label.eq_ignore_ascii_case(input)
        }) {
            return Ok(option.value.clone());
        }
        if self.key.accepts_free_value() && !input.is_empty() {
            return Ok(input.to_string());
        }
        Err(ClarificationError::InvalidValue {
            slot: self.key,
            value: input.to_string(),
        })
    }
}

/// State of one question while slots are being resolved.
///
/// Owned by the caller and passed back on every step; nothing about an
/// in-flight question is stored anywhere else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationContext {
    pub id: Uuid,
    pub original_question: String,
    /// The question with every resolved slot applied.
    pub question: String,
    pub pending: Option<ClarificationSlot>,
    pub resolved: BTreeMap<SlotKey, String>,
}

impl ClarificationContext {
    pub fn new(question: impl Into<String>) -> Self {
        let question = question.into();
        Self {
            id: Uuid::new_v4(),
            original_question: question.clone(),
            question,
            pending: None,
            resolved: BTreeMap::new(),
        }
    }

    pub fn with_pending(mut self, slot: ClarificationSlot) -> Self {
        self.pending = Some(slot);
        self
    }

    pub fn is_resolved(&self, key: SlotKey) -> bool {
        self.resolved.contains_key(&key)
    }

    pub fn resolved_value(&self, key: SlotKey) -> Option<&str> {
        self.resolved.get(&key).map(String::as_str)
    }

    /// Resolve the pending slot from user input.
    pub fn answer(&mut self, applier: &ClarificationApplier<'_>, input: &str) -> ClarificationResult<SlotKey> {
        let slot = self.pending.as_ref().ok_or(ClarificationError::NoPendingSlot)?;
        let key = slot.key;
        let value = slot.choose(input)?;
        self.set(applier, key, &value)?;
        self.pending = None;
        Ok(key)
    }

    /// Set a slot, replacing any value it already had.
    pub fn set(
        &mut self,
        applier: &ClarificationApplier<'_>,
        key: SlotKey,
        value: &str,
    ) -> ClarificationResult<()> {
        let question = match self.resolved.get(&key) {
            Some(previous) => applier.reapply(&self.question, key, previous, value)?,
            None => applier.apply(&self.question, key, value)?,
        };
        tracing::debug!(context = %self.id, slot = %key, value, question = %question, "slot resolved");
        self.question = question;
        self.resolved.insert(key, value.to_string());
        Ok(())
    }
}

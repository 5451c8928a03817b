//! Ambiguity detection and clarification.
//!
//! A question missing context (no time range, an unnamed provider, a
//! generic "cost", a "top" without a count, an unnamed region) is sent back
//! to the user with one slot to fill. The caller owns the resulting
//! [`ClarificationContext`] and hands it back with the answer.
//!
//! # Flow
//!
//! ```text
//!   question
//!      │
//!      ▼
//! ┌───────────────────┐  no slot   ┌──────────────┐
//! │ AmbiguityDetector │──────────▶│ generation   │
//! │ (one slot / call) │            └──────────────┘
//! └─────────┬─────────┘                   ▲
//!           │ slot                        │ no slot left
//!           ▼                             │
//! ┌───────────────────┐  answer   ┌───────┴────────────┐
//! │ ClarificationCtx  │─────────▶│ ClarificationApplier│
//! │ pending + resolved│◀─────────│ (phrase per slot)   │
//! └───────────────────┘  question'└────────────────────┘
//! ```
//!
//! Slots are checked in a fixed order: time_range, provider, metric, limit,
//! region. Region options come from live distinct values through
//! [`LiveDataAccessor`].

mod applier;
mod context;
mod detector;
mod rules;

pub use applier::{ClarificationApplier, ALL_REGIONS};
pub use context::{ClarificationContext, ClarificationSlot, SlotKey, SlotOption};
pub use detector::AmbiguityDetector;
pub use rules::{cost_metrics, metric_phrase};

use async_trait::async_trait;

use crate::storage::{ExecutionError, StorageEngine};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClarificationError {
    #[error("No clarification is pending")]
    NoPendingSlot,

    #[error("Unknown clarification slot: {0}")]
    UnknownSlot(String),

    #[error("Invalid value for {slot}: {value:?}")]
    InvalidValue { slot: SlotKey, value: String },
}

pub type ClarificationResult<T> = Result<T, ClarificationError>;

/// Read access to live column values, used to build region options.
#[async_trait]
pub trait LiveDataAccessor: Send + Sync {
    async fn distinct_values(
        &self,
        table: &str,
        column: &str,
        limit: usize,
    ) -> Result<Vec<String>, ExecutionError>;
}

#[async_trait]
impl<T: StorageEngine + ?Sized> LiveDataAccessor for T {
    async fn distinct_values(
        &self,
        table: &str,
        column: &str,
        limit: usize,
    ) -> Result<Vec<String>, ExecutionError> {
        StorageEngine::distinct_values(self, table, column, limit).await
    }
}

//! # costlens
//!
//! Natural-language questions about cloud billing data, translated to SQL
//! that is structurally repaired before it runs.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │        Catalog (tables, columns, aliases, hints)         │
//! └─────────────────────────────────────────────────────────┘
//!        │ read-only, shared by every stage below
//!        ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │  question ──▶ AmbiguityDetector ──▶ ClarificationSlot    │
//! │                     ▲                      │ user choice │
//! │                     └── ClarificationApplier ◀──────────┘│
//! └─────────────────────────────────────────────────────────┘
//!                          │ complete question
//!                          ▼ [llm, falling back to generator]
//! ┌─────────────────────────────────────────────────────────┐
//! │                  SqlStatement                            │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [validation]
//! ┌─────────────────────────────────────────────────────────┐
//! │        repaired SQL + warnings ──▶ StorageEngine         │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! [`engine::Engine`] wires the stages together.

pub mod alias;
pub mod cache;
pub mod catalog;
pub mod clarify;
pub mod config;
pub mod engine;
pub mod generator;
pub mod intent;
pub mod llm;
pub mod sql;
pub mod storage;
pub mod text;
pub mod validation;

pub use catalog::Catalog;
pub use engine::{Answer, Engine, EngineError, EngineResult, GenerationMethod, PreparedQuery};

//! Structural validation and repair of generated SQL.
//!
//! The validator never rejects a statement it could parse. It applies three
//! repairs in a fixed order and reports each change as a [`Warning`]:
//!
//! ```text
//! SqlStatement
//!   │
//!   ├── 1. set_ops     ORDER BY / LIMIT on a UNION arm → statement level
//!   ├── 2. projection  GROUP BY column missing from SELECT → inserted
//!   └── 3. dates       BETWEEN date(..) AND date(..) on a column whose
//!                      samples are not dates → removed
//!   │
//!   ▼
//! (SqlStatement, Vec<Warning>)
//! ```
//!
//! Every repair is idempotent: running the validator on its own output
//! yields the same statement and no warnings.

mod dates;
mod projection;
mod set_ops;

pub use dates::is_date_like;

use std::fmt;

use serde::Serialize;

use crate::catalog::Catalog;
use crate::sql::{parse_sql, SqlResult, SqlStatement};

/// A repair the validator applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// An arm's ORDER BY or LIMIT now applies to the whole set operation.
    ArmClauseHoisted { arm: usize, clause: &'static str },
    /// An arm's ORDER BY or LIMIT was dropped because the statement already
    /// had one.
    ArmClauseDropped { arm: usize, clause: &'static str },
    /// A grouped expression was added to an arm's projection.
    GroupColumnAdded { arm: usize, column: String },
    /// A date window was removed because the column does not hold dates.
    DateFilterRemoved { column: String },
    /// Unmatched `)` dropped from the end of the text.
    StrayParenthesisRemoved { count: usize },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::ArmClauseHoisted { arm, clause } => write!(
                f,
                "Moved {} from UNION arm {} to the end of the statement",
                clause,
                arm + 1
            ),
            Warning::ArmClauseDropped { arm, clause } => write!(
                f,
                "Removed {} from UNION arm {}; the statement already has one",
                clause,
                arm + 1
            ),
            Warning::GroupColumnAdded { arm, column } => write!(
                f,
                "Added grouped column '{}' to the SELECT list of arm {}",
                column,
                arm + 1
            ),
            Warning::DateFilterRemoved { column } => write!(
                f,
                "Removed date filter on '{}': its values are not YYYY-MM-DD dates",
                column
            ),
            Warning::StrayParenthesisRemoved { count } => {
                let noun = if *count == 1 {
                    "parenthesis"
                } else {
                    "parentheses"
                };
                write!(f, "Removed {} unmatched closing {}", count, noun)
            }
        }
    }
}

/// Validated SQL ready for execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedSql {
    #[serde(skip)]
    pub statement: SqlStatement,
    pub sql: String,
    pub warnings: Vec<Warning>,
}

/// Detects and repairs known structural defects.
#[derive(Debug, Clone, Copy)]
pub struct SqlStructuralValidator<'a> {
    catalog: &'a Catalog,
}

impl<'a> SqlStructuralValidator<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Apply every repair. Never fails.
    pub fn validate_and_fix(&self, statement: SqlStatement) -> (SqlStatement, Vec<Warning>) {
        let mut statement = statement;
        let mut warnings = Vec::new();

        set_ops::hoist_arm_clauses(&mut statement, &mut warnings);
        projection::add_group_columns(&mut statement, &mut warnings);
        dates::remove_unsafe_date_filters(&mut statement, self.catalog, &mut warnings);

        for warning in &warnings {
            tracing::warn!(%warning, "SQL repaired");
        }
        (statement, warnings)
    }

    /// Parse SQL text, then repair it.
    ///
    /// Fails with [`MalformedSqlError`](crate::sql::MalformedSqlError) when
    /// the text cannot be brought into statement form.
    pub fn validate_text(&self, sql: &str) -> SqlResult<ValidatedSql> {
        let parsed = parse_sql(sql)?;
        let mut warnings = Vec::new();
        if parsed.stray_closing_parens > 0 {
            let warning = Warning::StrayParenthesisRemoved {
                count: parsed.stray_closing_parens,
            };
            tracing::warn!(%warning, "SQL repaired");
            warnings.push(warning);
        }

        let (statement, repairs) = self.validate_and_fix(parsed.statement);
        warnings.extend(repairs);
        Ok(ValidatedSql {
            sql: statement.to_sql(),
            statement,
            warnings,
        })
    }
}

//! Structured SQL for the repair pipeline.
//!
//! This is not a general SQL front end. It understands exactly the shapes the
//! generators produce (single SELECTs and `UNION [ALL]` chains over one table
//! per arm) and rejects everything else with [`MalformedSqlError`].
//!
//! - [`lexer`] - Significant tokens from the `sqlparser` tokenizer
//! - [`statement`] - The `SqlStatement` model the validator rewrites
//! - [`parser`] - Text → `SqlStatement`
//! - [`token`] - Output tokens and `TokenStream`
//! - [`render`] - `SqlStatement` → text

pub mod lexer;
pub mod parser;
pub mod render;
pub mod statement;
pub mod token;

#[cfg(test)]
pub mod test_utils;

pub use parser::{parse, parse_sql, ParsedSql};
pub use statement::{
    Expr, Limit, OrderBy, OrderItem, Predicate, SelectBlock, SelectItem, SetOperator, SortDir,
    SqlStatement,
};

/// Raised when SQL text cannot be brought into `SqlStatement` form.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MalformedSqlError {
    #[error("SQL text is empty")]
    Empty,

    #[error("Tokenizer error: {0}")]
    Tokenize(String),

    #[error("Unexpected character '{ch}' at line {line}, column {column}")]
    UnexpectedCharacter { ch: char, line: u64, column: u64 },

    #[error("Unbalanced parentheses near line {line}, column {column}")]
    UnbalancedParens { line: u64, column: u64 },

    #[error("Expected SELECT, found '{0}'")]
    NotASelect(String),

    #[error("Unsupported construct: {0}")]
    Unsupported(String),

    #[error("Set operator {0} is not supported")]
    UnsupportedSetOperator(String),

    #[error("UNION and UNION ALL cannot be mixed in one statement")]
    MixedSetOperators,

    #[error("Multiple statements are not allowed")]
    MultipleStatements,

    #[error("SELECT arm {arm} has no FROM clause")]
    MissingFrom { arm: usize },

    #[error("Clause {clause} is empty")]
    EmptyClause { clause: &'static str },

    #[error("Clause {clause} is out of order or repeated")]
    ClauseOutOfOrder { clause: &'static str },

    #[error("Invalid LIMIT: {0}")]
    InvalidLimit(String),

    #[error("Unexpected token '{token}' at line {line}, column {column}")]
    UnexpectedToken { token: String, line: u64, column: u64 },
}

pub type SqlResult<T> = Result<T, MalformedSqlError>;

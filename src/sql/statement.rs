//! The structured statement model.
//!
//! ```text
//! SqlStatement
//! ├── selects: [SelectBlock, ...]      one per set-operation arm
//! ├── set_operator: None | Union | UnionAll
//! ├── trailing_order_by                applies to the combined result
//! └── trailing_limit
//!
//! SelectBlock
//! ├── projection: [SelectItem]         expr [AS alias]
//! ├── from / source_table
//! ├── where_clause: [Predicate]        top-level AND conjuncts
//! ├── group_by: [Expr]
//! ├── having
//! └── order_by / limit                 arm-local; lone arm or parenthesized last arm
//! ```
//!
//! Expressions are kept as text. Each carries a normalized spelling used for
//! structural comparisons (case folded outside string literals, whitespace
//! collapsed).

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static AGGREGATE_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(sum|avg|min|max|count|total|group_concat)\(").expect("valid regex")
});

// ============================================================================
// Expressions
// ============================================================================

/// A SQL expression held as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Expr {
    text: String,
    #[serde(skip)]
    normalized: String,
}

impl Expr {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into().trim().to_string();
        let normalized = normalize(&text);
        Self { text, normalized }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Spelling used for equality between expressions.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn is_star(&self) -> bool {
        self.normalized == "*" || self.normalized.ends_with(".*")
    }

    /// If this is a (possibly qualified) column reference, the column name.
    pub fn as_column(&self) -> Option<String> {
        let parts: Vec<&str> = self.normalized.split('.').collect();
        if parts.len() > 2 {
            return None;
        }
        let mut last = None;
        for part in parts {
            let bare = part.trim_matches(|c| matches!(c, '"' | '`' | '[' | ']'));
            let mut chars = bare.chars();
            let first_ok = chars
                .next()
                .is_some_and(|c| c.is_alphabetic() || c == '_');
            if !first_ok || !chars.all(|c| c.is_alphanumeric() || c == '_') {
                return None;
            }
            last = Some(bare.to_string());
        }
        last
    }

    /// `GROUP BY 2` style references.
    pub fn as_position(&self) -> Option<usize> {
        self.normalized.parse().ok()
    }

    /// A call to SQLite's `date(...)`.
    pub fn is_date_call(&self) -> bool {
        self.normalized.starts_with("date(") && self.normalized.ends_with(')')
    }

    pub fn contains_aggregate(&self) -> bool {
        AGGREGATE_CALL.is_match(&self.normalized)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Case-fold outside string literals and drop whitespace that carries no
/// meaning (around parentheses, commas and dots).
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_str = false;
    let mut gap = false;

    for c in text.chars() {
        if in_str {
            out.push(c);
            if c == '\'' {
                in_str = false;
            }
            continue;
        }
        if c.is_whitespace() {
            gap = true;
            continue;
        }
        let tight_before = out.ends_with(['(', ',', '.']);
        let tight_here = matches!(c, '(' | ')' | ',' | '.');
        if gap && !out.is_empty() && !tight_before && !tight_here {
            out.push(' ');
        }
        gap = false;
        if c == '\'' {
            in_str = true;
        }
        out.extend(c.to_lowercase());
    }
    out
}

// ============================================================================
// Clauses
// ============================================================================

/// One projection entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl SelectItem {
    pub fn new(expr: Expr) -> Self {
        Self { expr, alias: None }
    }

    pub fn aliased(expr: Expr, alias: impl Into<String>) -> Self {
        Self {
            expr,
            alias: Some(alias.into()),
        }
    }

    /// Name of the output column, when one can be determined.
    pub fn output_name(&self) -> Option<String> {
        match &self.alias {
            Some(alias) => Some(alias.to_lowercase()),
            None => self.expr.as_column(),
        }
    }

    /// True if this item produces `expr`, either by expression or by name.
    pub fn produces(&self, expr: &Expr) -> bool {
        if self.expr.normalized() == expr.normalized() {
            return true;
        }
        match (self.output_name(), expr.as_column()) {
            (Some(name), Some(column)) => name == column,
            _ => false,
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SortDir {
    Asc,
    Desc,
}

impl SortDir {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }
}

/// One ORDER BY term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItem {
    pub expr: Expr,
    pub dir: Option<SortDir>,
}

impl OrderItem {
    pub fn new(expr: Expr, dir: Option<SortDir>) -> Self {
        Self { expr, dir }
    }
}

/// An ORDER BY clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderBy {
    pub items: Vec<OrderItem>,
}

impl OrderBy {
    pub fn new(items: Vec<OrderItem>) -> Self {
        Self { items }
    }

    pub fn single(expr: Expr, dir: SortDir) -> Self {
        Self::new(vec![OrderItem::new(expr, Some(dir))])
    }
}

/// LIMIT n [OFFSET m].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Limit {
    pub count: u64,
    pub offset: Option<u64>,
}

impl Limit {
    pub fn new(count: u64) -> Self {
        Self {
            count,
            offset: None,
        }
    }
}

/// A top-level WHERE conjunct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Predicate {
    /// `expr [NOT] BETWEEN low AND high`
    Between {
        expr: Expr,
        low: Expr,
        high: Expr,
        negated: bool,
    },
    /// Anything else, kept verbatim.
    Condition(Expr),
}

impl Predicate {
    pub fn condition(text: impl Into<String>) -> Self {
        Predicate::Condition(Expr::new(text))
    }

    pub fn between(expr: Expr, low: Expr, high: Expr) -> Self {
        Predicate::Between {
            expr,
            low,
            high,
            negated: false,
        }
    }
}

// ============================================================================
// Statement
// ============================================================================

/// How the arms of a statement are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SetOperator {
    None,
    Union,
    UnionAll,
}

impl SetOperator {
    pub fn keyword(&self) -> Option<&'static str> {
        match self {
            SetOperator::None => None,
            SetOperator::Union => Some("UNION"),
            SetOperator::UnionAll => Some("UNION ALL"),
        }
    }
}

/// One SELECT arm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectBlock {
    pub distinct: bool,
    pub projection: Vec<SelectItem>,
    /// Full FROM clause text (may include joins).
    pub from: Expr,
    /// Primary table named in FROM, unqualified.
    pub source_table: String,
    pub where_clause: Vec<Predicate>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<Limit>,
}

impl SelectBlock {
    /// An empty arm reading from `table`.
    pub fn from_table(table: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            distinct: false,
            projection: Vec::new(),
            from: Expr::new(table.clone()),
            source_table: table,
            where_clause: Vec::new(),
            group_by: Vec::new(),
            having: None,
            order_by: None,
            limit: None,
        }
    }

    pub fn has_arm_clauses(&self) -> bool {
        self.order_by.is_some() || self.limit.is_some()
    }
}

/// A possibly multi-arm SELECT statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlStatement {
    pub selects: Vec<SelectBlock>,
    pub set_operator: SetOperator,
    pub trailing_order_by: Option<OrderBy>,
    pub trailing_limit: Option<Limit>,
}

impl SqlStatement {
    pub fn single(block: SelectBlock) -> Self {
        Self {
            selects: vec![block],
            set_operator: SetOperator::None,
            trailing_order_by: None,
            trailing_limit: None,
        }
    }

    /// Arms joined with `UNION ALL`. A single arm stays a plain SELECT.
    pub fn union_all(blocks: Vec<SelectBlock>) -> Self {
        let set_operator = if blocks.len() > 1 {
            SetOperator::UnionAll
        } else {
            SetOperator::None
        };
        Self {
            selects: blocks,
            set_operator,
            trailing_order_by: None,
            trailing_limit: None,
        }
    }

    pub fn is_set_operation(&self) -> bool {
        self.selects.len() > 1
    }

    /// Render to SQL text.
    pub fn to_sql(&self) -> String {
        super::render::render(self)
    }
}

impl fmt::Display for SqlStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

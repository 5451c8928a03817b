//! Catalog types.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::CatalogLoadError;

/// Storage class of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    Numeric,
    Binary,
}

impl DataType {
    /// Map a declared SQL type to a data type using SQLite affinity rules.
    pub fn from_sql_type(declared: &str) -> Self {
        let upper = declared.to_uppercase();
        if upper.contains("INT")
            || upper.contains("REAL")
            || upper.contains("FLOA")
            || upper.contains("DOUB")
            || upper.contains("NUM")
            || upper.contains("DEC")
        {
            DataType::Numeric
        } else if upper.contains("BLOB") || upper.trim().is_empty() {
            DataType::Binary
        } else {
            DataType::String
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Numeric)
    }

    /// SQL type name used when rendering the schema for a prompt.
    pub fn sql_name(&self) -> &'static str {
        match self {
            DataType::String => "TEXT",
            DataType::Numeric => "REAL",
            DataType::Binary => "BLOB",
        }
    }
}

impl FromStr for DataType {
    type Err = CatalogLoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "string" => Ok(DataType::String),
            "numeric" => Ok(DataType::Numeric),
            "binary" => Ok(DataType::Binary),
            _ => Ok(DataType::from_sql_type(s)),
        }
    }
}

/// Aggregate function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggFn {
    Sum,
    Avg,
    Min,
    Max,
    Count,
}

impl AggFn {
    /// The full numeric aggregate set, in display order.
    pub const ALL: [AggFn; 5] = [AggFn::Sum, AggFn::Avg, AggFn::Min, AggFn::Max, AggFn::Count];

    pub fn sql_name(&self) -> &'static str {
        match self {
            AggFn::Sum => "SUM",
            AggFn::Avg => "AVG",
            AggFn::Min => "MIN",
            AggFn::Max => "MAX",
            AggFn::Count => "COUNT",
        }
    }

    /// Word used as the prefix of generated output aliases.
    pub fn alias_prefix(&self) -> &'static str {
        match self {
            AggFn::Sum => "total",
            AggFn::Avg => "average",
            AggFn::Min => "minimum",
            AggFn::Max => "maximum",
            AggFn::Count => "count",
        }
    }
}

impl fmt::Display for AggFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}

impl FromStr for AggFn {
    type Err = CatalogLoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SUM" => Ok(AggFn::Sum),
            "AVG" | "AVERAGE" => Ok(AggFn::Avg),
            "MIN" => Ok(AggFn::Min),
            "MAX" => Ok(AggFn::Max),
            "COUNT" => Ok(AggFn::Count),
            _ => Err(CatalogLoadError::UnknownAggregate(s.to_string())),
        }
    }
}

/// Semantic role of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ColumnCategory {
    Metric,
    Dimension,
    Temporal,
    #[default]
    Unknown,
}

impl FromStr for ColumnCategory {
    type Err = CatalogLoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "metric" => Ok(ColumnCategory::Metric),
            "dimension" => Ok(ColumnCategory::Dimension),
            "temporal" => Ok(ColumnCategory::Temporal),
            "unknown" => Ok(ColumnCategory::Unknown),
            _ => Err(CatalogLoadError::UnknownCategory(s.to_string())),
        }
    }
}

/// Null-ratio bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NullBucket {
    /// Under 5% nulls.
    Mandatory,
    /// 5% to 30% nulls.
    Optional,
    /// Over 30% nulls.
    Sparse,
}

/// Diagnostic statistics for one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub total: u64,
    pub non_null: u64,
    pub distinct: u64,
}

impl ColumnProfile {
    pub fn null_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.total - self.non_null.min(self.total)) as f64 / self.total as f64
        }
    }

    pub fn null_bucket(&self) -> NullBucket {
        let ratio = self.null_ratio();
        if ratio < 0.05 {
            NullBucket::Mandatory
        } else if ratio <= 0.30 {
            NullBucket::Optional
        } else {
            NullBucket::Sparse
        }
    }
}

/// Free-text advice carried into the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ExpertGuidance {
    #[serde(default)]
    pub when_to_use: String,
    #[serde(default)]
    pub how_to_use: String,
    #[serde(default)]
    pub do_not_use_for: String,
}

/// Cloud provider a table belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Provider {
    Aws,
    Azure,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Aws, Provider::Azure];

    /// Label used in projections and clarification options.
    pub fn label(&self) -> &'static str {
        match self {
            Provider::Aws => "AWS",
            Provider::Azure => "Azure",
        }
    }

    /// Lowercase keywords that name this provider in a question.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Provider::Aws => &["aws", "amazon"],
            Provider::Azure => &["azure", "microsoft"],
        }
    }

    /// Detect a provider from a table name or alias.
    pub fn detect(name: &str) -> Option<Provider> {
        let lower = name.to_lowercase();
        Provider::ALL
            .into_iter()
            .find(|p| p.keywords().iter().any(|k| lower.contains(k)))
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything known about one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnMetadata {
    pub name: String,
    pub description: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub is_primary_key: bool,
    /// Lowercase.
    pub aliases: BTreeSet<String>,
    pub aggregations: Vec<AggFn>,
    pub category: ColumnCategory,
    /// `"currency"` for money metrics.
    pub unit: Option<String>,
    pub filterable: bool,
    pub groupable: bool,
    pub default_aggregate: Option<AggFn>,
    pub sample_values: Vec<String>,
    pub profile: Option<ColumnProfile>,
    pub guidance: Option<ExpertGuidance>,
}

impl ColumnMetadata {
    /// A bare column with no semantic annotations.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            data_type,
            nullable: true,
            is_primary_key: false,
            aliases: BTreeSet::new(),
            aggregations: Vec::new(),
            category: ColumnCategory::Unknown,
            unit: None,
            filterable: true,
            groupable: false,
            default_aggregate: None,
            sample_values: Vec::new(),
            profile: None,
            guidance: None,
        }
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.aliases
            .extend(aliases.into_iter().map(|a| a.as_ref().to_lowercase()));
        self
    }

    pub fn is_metric(&self) -> bool {
        self.category == ColumnCategory::Metric
    }

    pub fn is_currency(&self) -> bool {
        self.unit.as_deref() == Some("currency")
    }

    /// Aggregate to use when a question names none.
    pub fn effective_aggregate(&self) -> AggFn {
        self.default_aggregate.unwrap_or(AggFn::Sum)
    }

    /// A groupable column never carries a default aggregate.
    pub(crate) fn check_invariants(&self, table: &str) -> Result<(), CatalogLoadError> {
        if self.groupable && self.default_aggregate.is_some() {
            return Err(CatalogLoadError::InvalidColumn {
                table: table.to_string(),
                column: self.name.clone(),
                reason: "a groupable column cannot have a default aggregate".into(),
            });
        }
        Ok(())
    }
}

/// Everything known about one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableMetadata {
    pub name: String,
    pub description: String,
    /// Lowercase.
    pub aliases: BTreeSet<String>,
    pub columns: BTreeMap<String, ColumnMetadata>,
}

impl TableMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            aliases: BTreeSet::new(),
            columns: BTreeMap::new(),
        }
    }

    /// Case-insensitive column lookup.
    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns
            .get(name)
            .or_else(|| self.columns.get(&name.to_lowercase()))
            .or_else(|| {
                self.columns
                    .values()
                    .find(|c| c.name.eq_ignore_ascii_case(name))
            })
    }

    pub fn add_column(&mut self, column: ColumnMetadata) {
        self.columns.insert(column.name.clone(), column);
    }

    pub fn metric_columns(&self) -> impl Iterator<Item = &ColumnMetadata> {
        self.columns.values().filter(|c| c.is_metric())
    }

    /// Provider this table reports on, from its name or aliases.
    pub fn provider(&self) -> Option<Provider> {
        Provider::detect(&self.name).or_else(|| self.aliases.iter().find_map(|a| Provider::detect(a)))
    }

    /// The column describing deployment region.
    pub fn region_column(&self) -> Option<&ColumnMetadata> {
        self.columns
            .values()
            .find(|c| c.aliases.contains("region"))
            .or_else(|| self.columns.values().find(|c| c.name.contains("region")))
    }

    /// The column naming the billed service.
    pub fn service_column(&self) -> Option<&ColumnMetadata> {
        self.columns
            .values()
            .find(|c| c.aliases.contains("service"))
            .or_else(|| self.columns.values().find(|c| c.name.contains("service") && c.groupable))
    }

    /// The temporal column used for time windows, preferring a period start.
    pub fn time_column(&self) -> Option<&ColumnMetadata> {
        let temporal = || {
            self.columns
                .values()
                .filter(|c| c.category == ColumnCategory::Temporal)
        };
        temporal()
            .find(|c| c.name.contains("start"))
            .or_else(|| temporal().next())
    }
}

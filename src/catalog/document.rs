//! The JSON document a catalog is saved to and loaded from.
//!
//! ```json
//! {
//!   "aws_cost_usage": {
//!     "description": "...",
//!     "aliases": ["aws"],
//!     "columns": {
//!       "billedcost": {
//!         "description": "...",
//!         "data_type": "REAL",
//!         "nullable": true,
//!         "primary_key": false,
//!         "aliases": ["cost", "spend"],
//!         "aggregations": ["SUM", "AVG"],
//!         "llm_usage_guidance": {"filterable": true, "groupable": false, "aggregate_function": "SUM"},
//!         "expert_guidance": {"when_to_use": "...", "how_to_use": "...", "do_not_use_for": "..."}
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! `category`, `unit`, `sample_values` and `profile` are optional extensions.
//! When `category` is missing it is derived from the usage guidance and, failing
//! that, from the column name.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::classify::classify_column;
use super::types::{
    AggFn, ColumnCategory, ColumnMetadata, ColumnProfile, DataType, ExpertGuidance, TableMetadata,
};
use super::{Catalog, CatalogResult};

/// Top level: table name → table entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct CatalogDocument {
    pub tables: BTreeMap<String, TableDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TableDocument {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDocument {
    #[serde(default)]
    pub description: String,
    pub data_type: String,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub aggregations: Vec<String>,
    #[serde(default)]
    pub llm_usage_guidance: UsageGuidance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expert_guidance: Option<ExpertGuidance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sample_values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<ColumnProfile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageGuidance {
    #[serde(default = "default_true")]
    pub filterable: bool,
    #[serde(default)]
    pub groupable: bool,
    #[serde(default)]
    pub aggregate_function: Option<String>,
}

impl Default for UsageGuidance {
    fn default() -> Self {
        Self {
            filterable: true,
            groupable: false,
            aggregate_function: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn category_name(category: ColumnCategory) -> &'static str {
    match category {
        ColumnCategory::Metric => "metric",
        ColumnCategory::Dimension => "dimension",
        ColumnCategory::Temporal => "temporal",
        ColumnCategory::Unknown => "unknown",
    }
}

impl CatalogDocument {
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let tables = catalog
            .tables()
            .map(|t| (t.name.clone(), TableDocument::from_table(t)))
            .collect();
        Self { tables }
    }

    pub fn into_catalog(self) -> CatalogResult<Catalog> {
        let tables = self
            .tables
            .into_iter()
            .map(|(name, doc)| doc.into_table(name))
            .collect::<CatalogResult<Vec<_>>>()?;
        Catalog::new(tables)
    }
}

impl TableDocument {
    fn from_table(table: &TableMetadata) -> Self {
        Self {
            description: table.description.clone(),
            aliases: table.aliases.iter().cloned().collect(),
            columns: table
                .columns
                .values()
                .map(|c| (c.name.clone(), ColumnDocument::from_column(c)))
                .collect(),
        }
    }

    fn into_table(self, name: String) -> CatalogResult<TableMetadata> {
        let mut table = TableMetadata::new(name);
        table.description = self.description;
        table.aliases = self.aliases.iter().map(|a| a.to_lowercase()).collect();
        for (col_name, doc) in self.columns {
            table.add_column(doc.into_column(col_name)?);
        }
        Ok(table)
    }
}

impl ColumnDocument {
    fn from_column(column: &ColumnMetadata) -> Self {
        Self {
            description: column.description.clone(),
            data_type: column.data_type.sql_name().to_string(),
            nullable: column.nullable,
            primary_key: column.is_primary_key,
            aliases: column.aliases.iter().cloned().collect(),
            aggregations: column.aggregations.iter().map(|a| a.to_string()).collect(),
            llm_usage_guidance: UsageGuidance {
                filterable: column.filterable,
                groupable: column.groupable,
                aggregate_function: column.default_aggregate.map(|a| a.to_string()),
            },
            expert_guidance: column.guidance.clone(),
            category: Some(category_name(column.category).to_string()),
            unit: column.unit.clone(),
            sample_values: column.sample_values.clone(),
            profile: column.profile,
        }
    }

    fn into_column(self, name: String) -> CatalogResult<ColumnMetadata> {
        let data_type: DataType = self.data_type.parse()?;
        let aggregations = self
            .aggregations
            .iter()
            .map(|a| a.parse::<AggFn>())
            .collect::<CatalogResult<Vec<_>>>()?;
        let default_aggregate = self
            .llm_usage_guidance
            .aggregate_function
            .as_deref()
            .map(str::parse::<AggFn>)
            .transpose()?;

        let category = match self.category.as_deref() {
            Some(c) => c.parse()?,
            None if default_aggregate.is_some() => ColumnCategory::Metric,
            None => {
                let by_name = classify_column(&name, data_type).category;
                if self.llm_usage_guidance.groupable && by_name == ColumnCategory::Unknown {
                    ColumnCategory::Dimension
                } else {
                    by_name
                }
            }
        };

        let mut column = ColumnMetadata::new(name, data_type).with_aliases(&self.aliases);
        column.description = self.description;
        column.nullable = self.nullable;
        column.is_primary_key = self.primary_key;
        column.aggregations = aggregations;
        column.category = category;
        column.unit = self.unit;
        column.filterable = self.llm_usage_guidance.filterable;
        column.groupable = self.llm_usage_guidance.groupable;
        column.default_aggregate = default_aggregate;
        column.sample_values = self.sample_values;
        column.profile = self.profile;
        column.guidance = self.expert_guidance;
        Ok(column)
    }
}

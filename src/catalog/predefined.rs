//! The curated catalog for the AWS and Azure cost tables.

use super::{Catalog, CatalogResult};

const PREDEFINED: &str = include_str!("predefined.json");

/// Load the built-in catalog.
pub fn predefined() -> CatalogResult<Catalog> {
    Catalog::from_json(PREDEFINED)
}

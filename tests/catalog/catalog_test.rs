use costlens::alias::{AliasResolver, MatchKind};
use costlens::cache::CatalogCache;
use costlens::catalog::{
    self, classify_column, predefined, AggFn, Catalog, CatalogLoadError, CatalogMode,
    ClassifyOptions, ColumnCategory, DataType, Provider,
};
use costlens::config::CatalogSettings;
use costlens::engine::load_catalog;
use costlens::storage::SqliteStorage;

fn billing_db() -> SqliteStorage {
    let storage = SqliteStorage::open_in_memory(100).unwrap();
    storage
        .execute_batch(
            "CREATE TABLE aws_cost_usage (
                billedcost REAL,
                servicename TEXT,
                regionname TEXT,
                billingperiodstart TEXT,
                usage_note TEXT
            );
            INSERT INTO aws_cost_usage VALUES
                (12.5, 'Amazon Elastic Compute Cloud', 'us-east-1', '2024-01-01', 'a'),
                (3.0, 'Amazon Simple Storage Service', 'us-west-2', '2024-01-01', 'b'),
                (8.25, 'Amazon Elastic Compute Cloud', 'us-east-1', '2024-02-01', NULL);
            CREATE TABLE azure_cost_usage (
                billedcost REAL,
                resourceid TEXT,
                chargeperiodend TEXT
            );
            INSERT INTO azure_cost_usage VALUES
                (4.5, '/subscriptions/1/vm-a', '2024-01-31'),
                (1.5, '/subscriptions/1/vm-b', '2024-02-29');",
        )
        .unwrap();
    storage
}

// ============================================================================
// Predefined catalog
// ============================================================================

#[test]
fn test_predefined_has_both_providers() {
    let catalog = predefined().unwrap();
    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog.providers(), vec![Provider::Aws, Provider::Azure]);

    let aws = catalog.table("aws_cost_usage").unwrap();
    assert!(aws.aliases.contains("aws"));
    assert_eq!(aws.region_column().map(|c| c.name.as_str()), Some("regionname"));
    assert_eq!(aws.service_column().map(|c| c.name.as_str()), Some("servicename"));
    assert_eq!(
        aws.time_column().map(|c| c.name.as_str()),
        Some("billingperiodstart")
    );
}

#[test]
fn test_predefined_metrics() {
    let catalog = predefined().unwrap();
    let billed = catalog.column("aws_cost_usage", "billedcost").unwrap();
    assert_eq!(billed.category, ColumnCategory::Metric);
    assert!(billed.is_currency());
    assert_eq!(billed.default_aggregate, Some(AggFn::Sum));
    assert!(!billed.groupable);

    assert_eq!(
        catalog.primary_cost_metric().map(|c| c.name.as_str()),
        Some("billedcost")
    );
    let names: Vec<&str> = catalog
        .metric_columns()
        .iter()
        .filter(|c| c.is_currency())
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(names, vec!["billedcost", "effectivecost"]);
}

#[test]
fn test_every_column_satisfies_invariants() {
    let catalog = predefined().unwrap();
    for table in catalog.tables() {
        for column in table.columns.values() {
            assert!(
                !(column.groupable && column.default_aggregate.is_some()),
                "{}.{} is both groupable and aggregated",
                table.name,
                column.name
            );
            assert!(column.aliases.iter().all(|a| a == &a.to_lowercase()));
        }
    }
}

// ============================================================================
// Documents
// ============================================================================

#[test]
fn test_document_survives_json() {
    let catalog = predefined().unwrap();
    let json = catalog.to_json().unwrap();
    let reloaded = Catalog::from_json(&json).unwrap();
    assert_eq!(reloaded, catalog);

    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(
        value["aws_cost_usage"]["columns"]["billedcost"]["llm_usage_guidance"]["aggregate_function"],
        "SUM"
    );
}

#[test]
fn test_document_file_loads() {
    let dir = std::env::temp_dir().join(format!("costlens-catalog-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("catalog.json");
    std::fs::write(&path, predefined().unwrap().to_json().unwrap()).unwrap();

    let catalog = Catalog::from_json_file(&path).unwrap();
    assert_eq!(catalog.len(), 2);
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_bad_documents_are_fatal() {
    assert!(matches!(
        Catalog::from_json("{}"),
        Err(CatalogLoadError::Empty)
    ));
    assert!(matches!(
        Catalog::from_json("{not json"),
        Err(CatalogLoadError::Parse(_))
    ));
    assert!(matches!(
        Catalog::from_json_file("/definitely/not/here.json"),
        Err(CatalogLoadError::Io(_))
    ));
}

// ============================================================================
// Introspection
// ============================================================================

#[test]
fn test_classification_rules() {
    assert_eq!(
        classify_column("billingperiodstart", DataType::String).category,
        ColumnCategory::Temporal
    );
    let cost = classify_column("effective_cost", DataType::Numeric);
    assert_eq!(cost.category, ColumnCategory::Metric);
    assert_eq!(cost.unit, Some("currency"));
    assert_eq!(
        classify_column("resourceid", DataType::String).category,
        ColumnCategory::Dimension
    );
    assert_eq!(
        classify_column("consumedquantity", DataType::Numeric).category,
        ColumnCategory::Metric
    );
    assert_eq!(
        classify_column("notes", DataType::String).category,
        ColumnCategory::Unknown
    );
}

#[tokio::test]
async fn test_introspected_catalog() {
    let storage = billing_db();
    let catalog = catalog::load(CatalogMode::Introspected, &storage, &ClassifyOptions::default())
        .await
        .unwrap();

    assert_eq!(catalog.len(), 2);
    let aws = catalog.table("aws_cost_usage").unwrap();
    assert_eq!(aws.provider(), Some(Provider::Aws));

    let cost = aws.column("billedcost").unwrap();
    assert_eq!(cost.category, ColumnCategory::Metric);
    assert_eq!(cost.default_aggregate, Some(AggFn::Sum));
    assert!(!cost.groupable);

    let service = aws.column("servicename").unwrap();
    assert_eq!(service.category, ColumnCategory::Dimension);
    assert!(service.groupable);
    assert_eq!(
        service.sample_values,
        vec![
            "Amazon Elastic Compute Cloud".to_string(),
            "Amazon Simple Storage Service".to_string()
        ]
    );

    assert_eq!(
        aws.column("billingperiodstart").unwrap().category,
        ColumnCategory::Temporal
    );

    // Introspected documents round-trip too, profiles included.
    let reloaded = Catalog::from_json(&catalog.to_json().unwrap()).unwrap();
    assert_eq!(reloaded, catalog);
}

#[tokio::test]
async fn test_merge_keeps_curated_entries() {
    let storage = billing_db();
    storage
        .execute_batch("CREATE TABLE gcp_cost_usage (billedcost REAL);")
        .unwrap();
    let fresh = catalog::introspect(&storage, &ClassifyOptions::default())
        .await
        .unwrap();
    let curated = predefined().unwrap();

    let merged = curated.merge(&fresh);
    assert_eq!(merged.len(), 3);
    assert_eq!(
        merged.column("aws_cost_usage", "billedcost").unwrap().description,
        "The actual amount billed to the customer"
    );
    assert!(merged.table("aws_cost_usage").unwrap().column("usage_note").is_some());
    assert!(merged.table("gcp_cost_usage").is_some());
}

#[tokio::test]
async fn test_load_catalog_uses_cache() {
    let storage = billing_db();
    let cache = CatalogCache::open_in_memory().unwrap();
    let settings = CatalogSettings {
        mode: CatalogMode::Introspected,
        ..Default::default()
    };

    let first = load_catalog(&settings, &storage, Some(&cache)).await.unwrap();
    assert_eq!(cache.len().unwrap(), 1);

    let second = load_catalog(&settings, &storage, Some(&cache)).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(cache.len().unwrap(), 1);

    storage
        .execute_batch("ALTER TABLE azure_cost_usage ADD COLUMN servicename TEXT;")
        .unwrap();
    let changed = load_catalog(&settings, &storage, Some(&cache)).await.unwrap();
    assert!(changed.column("azure_cost_usage", "servicename").is_some());
    assert_eq!(cache.len().unwrap(), 2);
}

#[tokio::test]
async fn test_predefined_mode_ignores_database() {
    let storage = SqliteStorage::open_in_memory(10).unwrap();
    let catalog = load_catalog(&CatalogSettings::default(), &storage, None)
        .await
        .unwrap();
    assert_eq!(catalog, predefined().unwrap());
}

// ============================================================================
// Aliases
// ============================================================================

#[test]
fn test_alias_resolution() {
    let catalog = predefined().unwrap();
    let resolver = AliasResolver::new(&catalog);

    let spend = resolver.resolve("spend");
    assert_eq!(spend.len(), 2);
    for candidate in &spend {
        assert_eq!(candidate.column, "billedcost");
        assert_eq!(candidate.confidence, 1.0);
        assert_eq!(candidate.match_kind, MatchKind::Alias);
    }

    assert!(resolver.resolve("flux capacitor").is_empty());
}

#[test]
fn test_ambiguous_alias_lists_every_candidate() {
    let catalog = predefined().unwrap();
    let resolver = AliasResolver::new(&catalog);
    let err = resolver.pick("spend").unwrap_err();
    assert_eq!(err.candidates.len(), 2);
    assert!(err.to_string().contains("aws_cost_usage.billedcost"));
    assert!(err.to_string().contains("azure_cost_usage.billedcost"));
}

use costlens::catalog::{predefined, Catalog};
use costlens::sql::MalformedSqlError;
use costlens::validation::{is_date_like, SqlStructuralValidator, Warning};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;

fn assert_valid_sqlite(sql: &str) {
    if let Err(e) = Parser::parse_sql(&SQLiteDialect {}, sql) {
        panic!("invalid SQL: {}\n{}", e, sql);
    }
}

/// Two monthly tables whose period columns disagree on format.
fn monthly_catalog() -> Catalog {
    Catalog::from_json(
        r#"{
            "billing_export": {
                "columns": {
                    "cost": {
                        "data_type": "REAL",
                        "aggregations": ["SUM"],
                        "llm_usage_guidance": {"aggregate_function": "SUM"}
                    },
                    "period": {
                        "data_type": "TEXT",
                        "category": "temporal",
                        "sample_values": ["202401", "202402"]
                    },
                    "usage_date": {
                        "data_type": "TEXT",
                        "category": "temporal",
                        "sample_values": ["2024-01-01", "2024-01-02 13:45:00"]
                    },
                    "loaded_at": {
                        "data_type": "TEXT",
                        "category": "temporal"
                    }
                }
            },
            "billing_archive": {
                "columns": {
                    "cost": {
                        "data_type": "REAL",
                        "aggregations": ["SUM"],
                        "llm_usage_guidance": {"aggregate_function": "SUM"}
                    },
                    "period": {
                        "data_type": "TEXT",
                        "category": "temporal",
                        "sample_values": ["2023-12"]
                    }
                }
            }
        }"#,
    )
    .unwrap()
}

#[test]
fn test_all_repairs_in_one_statement() {
    let catalog = predefined().unwrap();
    let validator = SqlStructuralValidator::new(&catalog);

    let out = validator
        .validate_text(
            "SELECT 'AWS' AS provider, servicename, SUM(billedcost) AS total_cost
             FROM aws_cost_usage
             WHERE billingperiodstart BETWEEN date('now', '-30 days') AND date('now')
             GROUP BY servicename ORDER BY total_cost DESC LIMIT 10
             UNION ALL
             SELECT 'Azure' AS provider, SUM(billedcost) AS total_cost
             FROM azure_cost_usage GROUP BY servicename",
        )
        .unwrap();

    insta::assert_snapshot!(out.sql, @r"
    SELECT 'AWS' AS provider, servicename, SUM(billedcost) AS total_cost
    FROM aws_cost_usage
    WHERE billingperiodstart BETWEEN date('now', '-30 days') AND date('now')
    GROUP BY servicename
    UNION ALL
    SELECT 'Azure' AS provider, servicename, SUM(billedcost) AS total_cost
    FROM azure_cost_usage
    GROUP BY servicename
    ORDER BY total_cost DESC
    LIMIT 10
    ");
    assert_eq!(
        out.warnings,
        vec![
            Warning::ArmClauseHoisted { arm: 0, clause: "ORDER BY" },
            Warning::ArmClauseHoisted { arm: 0, clause: "LIMIT" },
            Warning::GroupColumnAdded { arm: 1, column: "servicename".into() },
        ]
    );
    assert_valid_sqlite(&out.sql);
}

#[test]
fn test_repaired_output_is_stable() {
    let catalog = predefined().unwrap();
    let validator = SqlStructuralValidator::new(&catalog);
    let once = validator
        .validate_text(
            "SELECT SUM(effectivecost) AS c FROM aws_cost_usage GROUP BY regionname LIMIT 5 \
             UNION ALL SELECT SUM(effectivecost) AS c FROM azure_cost_usage GROUP BY regionname",
        )
        .unwrap();
    assert!(!once.warnings.is_empty());

    let twice = validator.validate_text(&once.sql).unwrap();
    assert!(twice.warnings.is_empty());
    assert_eq!(twice.sql, once.sql);
}

#[test]
fn test_non_date_period_filter_removed() {
    let catalog = monthly_catalog();
    let out = SqlStructuralValidator::new(&catalog)
        .validate_text(
            "SELECT SUM(cost) AS total FROM billing_export \
             WHERE period BETWEEN date('now', '-30 days') AND date('now') \
             AND usage_date BETWEEN date('now', '-30 days') AND date('now') \
             AND loaded_at BETWEEN date('now', '-7 days') AND date('now')",
        )
        .unwrap();

    assert_eq!(
        out.warnings,
        vec![Warning::DateFilterRemoved { column: "period".into() }]
    );
    assert!(!out.sql.contains("period BETWEEN"));
    // Date samples and unsampled columns keep their filters.
    assert!(out.sql.contains("usage_date BETWEEN date('now', '-30 days') AND date('now')"));
    assert!(out.sql.contains("loaded_at BETWEEN date('now', '-7 days') AND date('now')"));
    assert_valid_sqlite(&out.sql);
}

#[test]
fn test_date_filter_warning_reported_once_per_column() {
    let catalog = monthly_catalog();
    let out = SqlStructuralValidator::new(&catalog)
        .validate_text(
            "SELECT SUM(cost) AS total FROM billing_export \
             WHERE period BETWEEN date('now', 'start of month') AND date('now') \
             UNION ALL \
             SELECT SUM(cost) AS total FROM billing_archive \
             WHERE period BETWEEN date('now', 'start of month') AND date('now')",
        )
        .unwrap();

    assert_eq!(
        out.warnings,
        vec![Warning::DateFilterRemoved { column: "period".into() }]
    );
    assert!(!out.sql.contains("WHERE"));
}

#[test]
fn test_literal_ranges_are_not_date_windows() {
    let catalog = monthly_catalog();
    let out = SqlStructuralValidator::new(&catalog)
        .validate_text(
            "SELECT SUM(cost) AS total FROM billing_export WHERE period BETWEEN '202401' AND '202403'",
        )
        .unwrap();
    assert!(out.warnings.is_empty());
    assert!(out.sql.contains("period BETWEEN '202401' AND '202403'"));
}

#[test]
fn test_stray_parentheses() {
    let catalog = predefined().unwrap();
    let out = SqlStructuralValidator::new(&catalog)
        .validate_text("SELECT servicename, SUM(billedcost) FROM aws_cost_usage GROUP BY servicename))")
        .unwrap();
    assert_eq!(out.warnings, vec![Warning::StrayParenthesisRemoved { count: 2 }]);
    assert!(out.sql.ends_with("GROUP BY servicename"));
    assert_valid_sqlite(&out.sql);
}

#[test]
fn test_unusable_text_is_malformed() {
    let catalog = predefined().unwrap();
    let validator = SqlStructuralValidator::new(&catalog);

    assert!(matches!(validator.validate_text("   "), Err(MalformedSqlError::Empty)));
    assert!(matches!(
        validator.validate_text("UPDATE aws_cost_usage SET billedcost = 0"),
        Err(MalformedSqlError::NotASelect(_))
    ));
    assert!(validator
        .validate_text("SELECT (billedcost FROM aws_cost_usage")
        .is_err());
}

#[test]
fn test_validated_sql_serializes_without_statement() {
    let catalog = predefined().unwrap();
    let out = SqlStructuralValidator::new(&catalog)
        .validate_text("SELECT SUM(billedcost) FROM aws_cost_usage GROUP BY regionname")
        .unwrap();
    let json = serde_json::to_value(&out).unwrap();
    assert!(json.get("statement").is_none());
    assert_eq!(json["warnings"][0]["kind"], "group_column_added");
    assert_eq!(json["warnings"][0]["column"], "regionname");
}

#[test]
fn test_date_like_values() {
    assert!(is_date_like("2024-02-29"));
    assert!(is_date_like("2024-02-29 23:59:59"));
    assert!(!is_date_like("2023-02-29"));
    assert!(!is_date_like("202401"));
    assert!(!is_date_like("Jan 2024"));
}

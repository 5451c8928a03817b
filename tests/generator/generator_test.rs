use costlens::catalog::{predefined, AggFn, Catalog};
use costlens::generator::RuleBasedGenerator;
use costlens::intent::{self, GroupKey, Intent, IntentFilter, TimeWindow};
use costlens::sql::{Expr, Limit, SortDir, SqlStatement};
use costlens::validation::SqlStructuralValidator;
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;

fn assert_valid_sqlite(sql: &str) {
    if let Err(e) = Parser::parse_sql(&SQLiteDialect {}, sql) {
        panic!("invalid SQL: {}\n{}", e, sql);
    }
}

fn generate(catalog: &Catalog, question: &str) -> SqlStatement {
    let intent = intent::extract(question, catalog);
    RuleBasedGenerator::generate(&intent, catalog)
}

const QUESTIONS: &[&str] = &[
    "What is the total cost?",
    "top 10 services by cost",
    "Show me the top 5 services by cost",
    "net cost by region and service for azure",
    "total azure spend last 30 days",
    "the 3 cheapest regions",
    "show me some rows from azure",
    "how many records for azure",
    "compare aws and azure spend this month",
    "total cost between 2024-01-01 and 2024-03-31",
    "ec2 cost in us-east-1",
];

#[test]
fn test_generated_sql_is_valid_sqlite() {
    let catalog = predefined().unwrap();
    for question in QUESTIONS {
        let sql = generate(&catalog, question).to_sql();
        assert_valid_sqlite(&sql);
    }
}

#[test]
fn test_generated_sql_needs_no_repair() {
    let catalog = predefined().unwrap();
    let validator = SqlStructuralValidator::new(&catalog);
    for question in QUESTIONS {
        let stmt = generate(&catalog, question);
        assert!(
            stmt.selects.iter().all(|b| !b.has_arm_clauses()),
            "arm clause generated for {question:?}"
        );
        let (fixed, warnings) = validator.validate_and_fix(stmt.clone());
        assert!(warnings.is_empty(), "{question:?} needed repairs: {warnings:?}");
        assert_eq!(fixed, stmt);
    }
}

#[test]
fn test_union_arms_share_trailing_clauses() {
    let catalog = predefined().unwrap();
    let stmt = generate(&catalog, "Show me the top 5 services by cost");

    assert_eq!(stmt.selects.len(), 2);
    assert_eq!(stmt.trailing_limit, Some(Limit::new(5)));
    let order = stmt.trailing_order_by.as_ref().unwrap();
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.items[0].expr, Expr::new("total_cost"));
    assert_eq!(order.items[0].dir, Some(SortDir::Desc));

    let sql = stmt.to_sql();
    assert_eq!(sql.matches("UNION ALL").count(), 1);
    assert!(sql.contains("SELECT 'AWS' AS provider"));
    assert!(sql.contains("SELECT 'Azure' AS provider"));
    assert!(sql.ends_with("ORDER BY total_cost DESC\nLIMIT 5"));
}

#[test]
fn test_average_per_region_for_one_provider() {
    let catalog = predefined().unwrap();
    let sql = generate(&catalog, "average cost per region for aws").to_sql();
    insta::assert_snapshot!(sql, @r"
    SELECT regionname, AVG(billedcost) AS average_cost
    FROM aws_cost_usage
    GROUP BY regionname
    ");
}

#[test]
fn test_explicit_intent_across_providers() {
    let catalog = predefined().unwrap();
    let intent = Intent {
        aggregate: Some(AggFn::Sum),
        metric: Some("effectivecost".into()),
        group_by: vec![GroupKey::Column("servicecategory".into())],
        filters: vec![
            IntentFilter::Time(TimeWindow::LastDays(7)),
            IntentFilter::Region("eastus".into()),
        ],
        limit: None,
        order: None,
        tables: ["aws_cost_usage", "azure_cost_usage"]
            .into_iter()
            .map(String::from)
            .collect(),
        listing: false,
    };
    let stmt = RuleBasedGenerator::generate(&intent, &catalog);

    // servicecategory exists in both tables; each arm filters on its own
    // region column.
    assert_eq!(stmt.selects.len(), 2);
    for block in &stmt.selects {
        assert_eq!(block.group_by, vec![Expr::new("servicecategory")]);
        assert_eq!(block.where_clause.len(), 2);
    }
    assert!(stmt.trailing_order_by.is_none());
    assert!(stmt.trailing_limit.is_none());
    assert_valid_sqlite(&stmt.to_sql());
}

#[test]
fn test_quote_in_region_is_escaped() {
    let catalog = predefined().unwrap();
    let intent = intent::extract("total aws cost", &catalog).with_region("O'Hare");
    let sql = RuleBasedGenerator::generate(&intent, &catalog).to_sql();
    assert!(sql.contains("regionname = 'O''Hare'"));
    assert_valid_sqlite(&sql);
}

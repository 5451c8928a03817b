use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use costlens::catalog::{predefined, CatalogMode};
use costlens::clarify::{ClarificationContext, SlotKey};
use costlens::config::Settings;
use costlens::llm::{LlmError, LlmResult, SqlGenerator};
use costlens::storage::SqliteStorage;
use costlens::validation::Warning;
use costlens::{Answer, Engine, EngineError, GenerationMethod, PreparedQuery};
use serde_json::json;

const SCHEMA: &str = "
    CREATE TABLE aws_cost_usage (
        billedcost REAL, effectivecost REAL, servicename TEXT,
        regionname TEXT, billingperiodstart TEXT, tags TEXT
    );
    CREATE TABLE azure_cost_usage (
        billedcost REAL, effectivecost REAL, servicename TEXT,
        regionname TEXT, billingperiodstart TEXT, tags TEXT
    );
    INSERT INTO aws_cost_usage VALUES
        (10.0, 9.0, 'Amazon Elastic Compute Cloud', 'us-east-1', date('now'), NULL),
        (5.5, 5.0, 'Amazon Elastic Compute Cloud', 'us-west-2', date('now', '-3 days'), NULL),
        (2.0, 2.0, 'Amazon Simple Storage Service', 'us-east-1', date('now', '-400 days'), NULL);
    INSERT INTO azure_cost_usage VALUES
        (7.25, 7.0, 'Virtual Machines', 'Australia East', date('now'), NULL);
";

fn storage() -> SqliteStorage {
    let storage = SqliteStorage::open_in_memory(100).unwrap();
    storage.execute_batch(SCHEMA).unwrap();
    storage
}

fn engine() -> Engine {
    Engine::new(Arc::new(predefined().unwrap()), Arc::new(storage()))
}

fn pending(answer: &Answer) -> Option<SlotKey> {
    match answer {
        Answer::NeedsClarification(ctx) => ctx.pending.as_ref().map(|s| s.key),
        Answer::Ready(_) => None,
    }
}

fn into_context(answer: Answer) -> ClarificationContext {
    match answer {
        Answer::NeedsClarification(ctx) => ctx,
        Answer::Ready(query) => panic!("expected a clarification, got {}", query.sql),
    }
}

fn into_query(answer: Answer) -> PreparedQuery {
    match answer {
        Answer::Ready(query) => query,
        Answer::NeedsClarification(ctx) => panic!("unexpected clarification: {:?}", ctx.pending),
    }
}

/// Returns a fixed reply and remembers the prompt it was given.
struct ScriptedLlm {
    reply: Option<&'static str>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    fn replying(reply: &'static str) -> Self {
        Self {
            reply: Some(reply),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SqlGenerator for ScriptedLlm {
    async fn generate(&self, prompt: &str) -> LlmResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.reply {
            Some(reply) => Ok(reply.to_string()),
            None => Err(LlmError::Status {
                status: 503,
                body: "model is loading".into(),
            }),
        }
    }
}

// ============================================================================
// Rule-based path
// ============================================================================

#[tokio::test]
async fn test_total_cost_after_clarification() {
    let engine = engine();

    let answer = engine.ask("What is the total cost?", None).await.unwrap();
    assert_eq!(pending(&answer), Some(SlotKey::TimeRange));

    let answer = engine.ask("Last 30 days", Some(into_context(answer))).await.unwrap();
    assert_eq!(pending(&answer), Some(SlotKey::Metric));

    let query = into_query(engine.ask("1", Some(into_context(answer))).await.unwrap());
    assert_eq!(query.method, GenerationMethod::RuleBased);
    assert_eq!(query.question, "What is the total billed cost in the last 30 days?");
    assert!(query.warnings.is_empty());

    let result = engine.execute(&query).await.unwrap();
    assert_eq!(result.columns, vec!["provider", "total_cost"]);
    assert_eq!(
        result.rows,
        vec![vec![json!("AWS"), json!(15.5)], vec![json!("Azure"), json!(7.25)]]
    );
    assert!(!result.truncated);
}

#[tokio::test]
async fn test_top_services_across_providers() {
    let engine = engine();
    let answer = engine.ask("Show me top services", None).await.unwrap();
    assert_eq!(pending(&answer), Some(SlotKey::Limit));

    let query = into_query(engine.resolve(into_context(answer), "10").await.unwrap());
    assert_eq!(query.question, "Show me top 10 services");
    assert!(query.sql.contains("UNION ALL"));
    assert!(query.sql.ends_with("ORDER BY total_cost DESC\nLIMIT 10"));

    let result = engine.execute(&query).await.unwrap();
    assert_eq!(result.columns, vec!["provider", "servicename", "total_cost"]);
    assert_eq!(result.row_count(), 3);
    assert_eq!(
        result.rows[0],
        vec![json!("AWS"), json!("Amazon Elastic Compute Cloud"), json!(15.5)]
    );
    assert_eq!(result.rows[2][2], json!(2.0));
}

#[tokio::test]
async fn test_region_choice_becomes_filter() {
    let engine = engine();
    let answer = engine
        .ask("billed cost last month in my region", None)
        .await
        .unwrap();
    let ctx = into_context(answer);
    let slot = ctx.pending.as_ref().unwrap();
    assert_eq!(slot.key, SlotKey::Region);
    let values: Vec<&str> = slot.options.iter().map(|o| o.value.as_str()).collect();
    assert!(values.contains(&"us-west-2"));
    assert!(values.contains(&"Australia East"));

    let query = into_query(engine.resolve(ctx, "us-west-2").await.unwrap());
    assert!(query.sql.contains("regionname = 'us-west-2'"));
    engine.execute(&query).await.unwrap();
}

#[tokio::test]
async fn test_answer_serializes_with_status() {
    let engine = engine();
    let answer = engine.ask("Show me top services", None).await.unwrap();
    let value = serde_json::to_value(&answer).unwrap();
    assert_eq!(value["status"], "needs_clarification");
    assert_eq!(value["pending"]["key"], "limit");

    let ctx = into_context(answer);
    let answer = engine.resolve(ctx, "5").await.unwrap();
    let value = serde_json::to_value(&answer).unwrap();
    assert_eq!(value["status"], "ready");
    assert_eq!(value["method"], "rule_based");
}

#[tokio::test]
async fn test_invalid_choice_is_an_error() {
    let engine = engine();
    let ctx = into_context(engine.ask("storage spend last month", None).await.unwrap());
    let err = engine.resolve(ctx, "oracle cloud").await.unwrap_err();
    assert!(matches!(err, EngineError::Clarification(_)));
}

#[tokio::test]
async fn test_validate_reports_repairs() {
    let engine = engine();
    let validated = engine
        .validate("SELECT SUM(billedcost) AS total FROM aws_cost_usage GROUP BY regionname")
        .unwrap();
    assert_eq!(
        validated.warnings,
        vec![Warning::GroupColumnAdded {
            arm: 0,
            column: "regionname".into()
        }]
    );
    assert!(matches!(
        engine.validate("DROP TABLE aws_cost_usage"),
        Err(EngineError::MalformedSql(_))
    ));
}

// ============================================================================
// LLM path
// ============================================================================

#[tokio::test]
async fn test_llm_sql_is_repaired_before_it_runs() {
    let llm = Arc::new(ScriptedLlm::replying(
        "<think>Union both providers.</think>\n```sql\n\
         SELECT 'AWS' AS provider, servicename, SUM(billedcost) AS total_cost FROM aws_cost_usage \
         GROUP BY servicename ORDER BY total_cost DESC LIMIT 1\n\
         UNION ALL\n\
         SELECT 'Azure' AS provider, servicename, SUM(billedcost) AS total_cost FROM azure_cost_usage \
         GROUP BY servicename;\n```",
    ));
    let engine = engine().with_llm(llm.clone(), Duration::from_secs(5));

    let question = "Top 1 service by billed cost for AWS and Azure last month?";
    let answer = engine.ask(question, None).await.unwrap();
    let query = into_query(answer);

    assert_eq!(query.method, GenerationMethod::Llm);
    assert_eq!(
        query.warnings,
        vec![
            Warning::ArmClauseHoisted { arm: 0, clause: "ORDER BY" },
            Warning::ArmClauseHoisted { arm: 0, clause: "LIMIT" },
        ]
    );

    let prompts = llm.prompts.lock().unwrap().clone();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Database Schema:"));
    assert!(prompts[0].contains(question));

    let result = engine.execute(&query).await.unwrap();
    assert_eq!(
        result.rows,
        vec![vec![json!("AWS"), json!("Amazon Elastic Compute Cloud"), json!(15.5)]]
    );
}

#[tokio::test]
async fn test_llm_failure_falls_back_to_rules() {
    let llm = Arc::new(ScriptedLlm::failing());
    let engine = engine().with_llm(llm.clone(), Duration::from_secs(5));

    let query = into_query(
        engine
            .ask("Billed cost by service for AWS last month", None)
            .await
            .unwrap(),
    );
    assert_eq!(query.method, GenerationMethod::RuleBased);
    assert_eq!(llm.prompts.lock().unwrap().len(), 1);
    engine.execute(&query).await.unwrap();
}

// ============================================================================
// Settings
// ============================================================================

#[tokio::test]
async fn test_engine_from_settings_introspects_database() {
    let dir = std::env::temp_dir().join(format!("costlens-engine-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("billing.db");
    SqliteStorage::open(&path, 10)
        .unwrap()
        .execute_batch(SCHEMA)
        .unwrap();

    let mut settings = Settings::default();
    settings.storage.database = path.display().to_string();
    settings.catalog.mode = CatalogMode::Introspected;
    settings.catalog.cache_enabled = false;

    let engine = Engine::from_settings(&settings).await.unwrap();
    let names: Vec<&str> = engine.catalog().table_names().collect();
    assert_eq!(names, vec!["aws_cost_usage", "azure_cost_usage"]);
    assert!(engine
        .catalog()
        .column("aws_cost_usage", "billedcost")
        .unwrap()
        .is_metric());

    drop(engine);
    std::fs::remove_dir_all(&dir).unwrap();
}

use chrono::NaiveDate;
use costlens::catalog::{predefined, Catalog};
use costlens::clarify::{
    AmbiguityDetector, ClarificationApplier, ClarificationContext, ClarificationError, SlotKey,
    ALL_REGIONS,
};
use costlens::config::ClarificationSettings;
use costlens::storage::SqliteStorage;

fn billing_db() -> SqliteStorage {
    let storage = SqliteStorage::open_in_memory(100).unwrap();
    storage
        .execute_batch(
            "CREATE TABLE aws_cost_usage (billedcost REAL, regionname TEXT);
            INSERT INTO aws_cost_usage VALUES
                (1.0, 'us-east-1'), (2.0, 'ap-southeast-2'), (3.0, 'us-east-1'), (4.0, NULL);
            CREATE TABLE azure_cost_usage (billedcost REAL, regionname TEXT);
            INSERT INTO azure_cost_usage VALUES (5.0, 'australiaeast');",
        )
        .unwrap();
    storage
}

fn detector(catalog: &Catalog) -> AmbiguityDetector<'_> {
    AmbiguityDetector::new(catalog, &ClarificationSettings::default())
        .with_today(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap())
}

fn pending_key(ctx: &ClarificationContext) -> Option<SlotKey> {
    ctx.pending.as_ref().map(|s| s.key)
}

/// Ask for the next slot and store it on the context.
async fn advance(
    detector: &AmbiguityDetector<'_>,
    storage: &SqliteStorage,
    ctx: ClarificationContext,
) -> ClarificationContext {
    match detector.next_slot(&ctx.question, &ctx.resolved, storage).await {
        Some(slot) => ctx.with_pending(slot),
        None => ctx,
    }
}

#[tokio::test]
async fn test_every_slot_resolved_in_priority_order() {
    let catalog = predefined().unwrap();
    let storage = billing_db();
    let detector = detector(&catalog);
    let applier = ClarificationApplier::new(&catalog);

    let mut ctx = detector
        .detect("top storage cost in my region", &storage)
        .await
        .unwrap();

    assert_eq!(pending_key(&ctx), Some(SlotKey::TimeRange));
    ctx.answer(&applier, "2").unwrap();
    assert_eq!(ctx.question, "top storage cost in my region in the last 30 days");

    ctx = advance(&detector, &storage, ctx).await;
    assert_eq!(pending_key(&ctx), Some(SlotKey::Provider));
    ctx.answer(&applier, "AWS").unwrap();

    ctx = advance(&detector, &storage, ctx).await;
    assert_eq!(pending_key(&ctx), Some(SlotKey::Metric));
    ctx.answer(&applier, "Billed Cost").unwrap();

    ctx = advance(&detector, &storage, ctx).await;
    assert_eq!(pending_key(&ctx), Some(SlotKey::Limit));
    ctx.answer(&applier, "5").unwrap();

    ctx = advance(&detector, &storage, ctx).await;
    assert_eq!(pending_key(&ctx), Some(SlotKey::Region));
    // Only AWS regions, read from the database, sorted and without NULLs.
    let values: Vec<&str> = ctx.pending.as_ref().unwrap().options.iter().map(|o| o.value.as_str()).collect();
    assert_eq!(values, vec![ALL_REGIONS, "ap-southeast-2", "us-east-1"]);
    ctx.answer(&applier, "ap-southeast-2").unwrap();

    ctx = advance(&detector, &storage, ctx).await;
    assert!(ctx.pending.is_none());
    assert_eq!(
        ctx.question,
        "top 5 storage billed cost in my region in the last 30 days for AWS in ap-southeast-2"
    );
    assert_eq!(ctx.original_question, "top storage cost in my region");
    assert_eq!(ctx.resolved.len(), 5);
    assert_eq!(ctx.resolved_value(SlotKey::Metric), Some("billedcost"));
    assert_eq!(ctx.resolved_value(SlotKey::Limit), Some("5"));
}

#[tokio::test]
async fn test_time_options_show_concrete_ranges() {
    let catalog = predefined().unwrap();
    let ctx = detector(&catalog)
        .detect("How much did we spend?", &billing_db())
        .await
        .unwrap();
    let slot = ctx.pending.unwrap();

    assert_eq!(slot.key, SlotKey::TimeRange);
    assert_eq!(slot.question, "Which time range would you like me to use?");
    assert!(slot.required);
    let labels: Vec<&str> = slot.options.iter().map(|o| o.label.as_str()).collect();
    assert_eq!(
        labels,
        vec!["Last 7 days", "Last 30 days", "Current month", "Year to date"]
    );
    assert_eq!(
        slot.options[0].description.as_deref(),
        Some("2024-03-08 to 2024-03-15")
    );
    assert_eq!(
        slot.options[3].description.as_deref(),
        Some("2024-01-01 to 2024-03-15")
    );
}

#[tokio::test]
async fn test_at_most_one_slot_per_call() {
    let catalog = predefined().unwrap();
    let storage = billing_db();
    let ctx = detector(&catalog)
        .detect("top storage cost in my region", &storage)
        .await
        .unwrap();
    assert!(ctx.resolved.is_empty());
    assert_eq!(pending_key(&ctx), Some(SlotKey::TimeRange));
}

#[tokio::test]
async fn test_complete_questions_pass_through() {
    let catalog = predefined().unwrap();
    let storage = billing_db();
    let detector = detector(&catalog);
    for q in [
        "Billed cost by service for AWS last month",
        "top 5 regions by effective cost this month",
        "show me some rows from azure",
        "Azure spend in us-east-1 year to date",
    ] {
        assert!(detector.detect(q, &storage).await.is_none(), "{q}");
    }
}

#[tokio::test]
async fn test_invalid_answer_keeps_slot_pending() {
    let catalog = predefined().unwrap();
    let storage = billing_db();
    let applier = ClarificationApplier::new(&catalog);
    let mut ctx = detector(&catalog)
        .detect("storage spend last month", &storage)
        .await
        .unwrap();
    assert_eq!(pending_key(&ctx), Some(SlotKey::Provider));

    let err = ctx.answer(&applier, "gcp").unwrap_err();
    assert_eq!(
        err,
        ClarificationError::InvalidValue {
            slot: SlotKey::Provider,
            value: "gcp".into()
        }
    );
    assert_eq!(pending_key(&ctx), Some(SlotKey::Provider));
    assert_eq!(ctx.question, "storage spend last month");

    ctx.answer(&applier, "3").unwrap();
    assert_eq!(ctx.question, "storage spend last month for both AWS and Azure");
    assert!(ctx.pending.is_none());
    assert_eq!(
        ctx.answer(&applier, "1").unwrap_err(),
        ClarificationError::NoPendingSlot
    );
}

#[tokio::test]
async fn test_changing_an_answer_replaces_it() {
    let catalog = predefined().unwrap();
    let applier = ClarificationApplier::new(&catalog);
    let mut ctx = ClarificationContext::new("What is the total cost?");

    ctx.set(&applier, SlotKey::TimeRange, "last_7_days").unwrap();
    ctx.set(&applier, SlotKey::Provider, "azure").unwrap();
    ctx.set(&applier, SlotKey::TimeRange, "year_to_date").unwrap();

    // The new phrase is appended; the provider phrase stays where it was.
    assert_eq!(ctx.question, "What is the total cost for Azure in the year to date?");
    assert_eq!(ctx.resolved_value(SlotKey::TimeRange), Some("year_to_date"));
}

#[tokio::test]
async fn test_all_regions_leaves_question_unchanged() {
    let catalog = predefined().unwrap();
    let storage = billing_db();
    let detector = detector(&catalog);
    let applier = ClarificationApplier::new(&catalog);

    let mut ctx = ClarificationContext::new("billed cost last month in my region");
    ctx = advance(&detector, &storage, ctx).await;
    assert_eq!(pending_key(&ctx), Some(SlotKey::Region));
    ctx.answer(&applier, "1").unwrap();

    assert_eq!(ctx.question, "billed cost last month in my region");
    assert_eq!(ctx.resolved_value(SlotKey::Region), Some(ALL_REGIONS));
    assert!(detector
        .next_slot(&ctx.question, &ctx.resolved, &storage)
        .await
        .is_none());
}

#[tokio::test]
async fn test_context_survives_json() {
    let catalog = predefined().unwrap();
    let ctx = detector(&catalog)
        .detect("Show me top services", &billing_db())
        .await
        .unwrap();

    let json = serde_json::to_string(&ctx).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["pending"]["key"], "limit");
    assert_eq!(value["pending"]["options"][1]["label"], "Top 10");

    let restored: ClarificationContext = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, ctx);
}

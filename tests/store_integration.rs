/// Storage smoke tests against a live Postgres instance. Expects a dedicated
/// test database.
///
/// Run with:
///   TEST_DATABASE_URL=postgres://... cargo test --test store_integration -- --ignored
use lead_router_api::assignment::{AssignmentExecutor, AssignmentStrategy};
use lead_router_api::db::Database;
use lead_router_api::eligibility::ContractorStore;
use lead_router_api::errors::AppError;
use lead_router_api::lead_store::{LeadPatch, LeadStore};
use lead_router_api::scoring::ScoreSet;
use sqlx::PgPool;
use uuid::Uuid;

async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let db = Database::new(&url).await.ok()?;
    Some(db.pool)
}

async fn test_store() -> Option<LeadStore> {
    Some(LeadStore::new(test_pool().await?))
}

fn unique_email() -> String {
    format!("smoke-{}@example.com", Uuid::new_v4().simple())
}

/// A ZIP unlikely to collide with other runs; keeps seeded contractors out
/// of each other's eligible sets.
fn unique_zip() -> String {
    format!("{:05}", Uuid::new_v4().as_u128() % 100_000)
}

fn intake_patch(email: &str) -> LeadPatch {
    intake_patch_for_zip(email, "01701")
}

fn intake_patch_for_zip(email: &str, zip: &str) -> LeadPatch {
    LeadPatch {
        user_id: None,
        name: Some("Smoke Tester".to_string()),
        email: Some(email.to_string()),
        phone: None,
        zip_code: zip.to_string(),
        room_type: Some("kitchen".to_string()),
        style: Some("modern".to_string()),
        wants_quote: false,
        social_engaged: false,
        render_count: None,
    }
}

async fn seed_contractor(pool: &PgPool, zip: &str, leads_received: i32) -> Uuid {
    let row: (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO contractors (
            name, email, serves_all_zipcodes, assigned_zip_codes,
            is_active_subscriber, subscription_tier, leads_received_count
        )
        VALUES ($1, $2, false, $3, true, 'basic', $4)
        RETURNING id
        "#,
    )
    .bind(format!("Smoke Contractor {}", zip))
    .bind(format!("contractor-{}@example.com", Uuid::new_v4().simple()))
    .bind(vec![zip.to_string()])
    .bind(leads_received)
    .fetch_one(pool)
    .await
    .unwrap();
    row.0
}

#[tokio::test]
#[ignore]
async fn upsert_creates_then_increments_on_repeat() {
    let Some(store) = test_store().await else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return;
    };

    let email = unique_email();

    let (first, existed) = store.upsert(&intake_patch(&email)).await.unwrap();
    assert!(!existed);
    assert_eq!(first.render_count, 1);
    assert!(!first.is_repeat_visitor);
    assert_eq!(first.status, "new");

    let (second, existed) = store.upsert(&intake_patch(&email)).await.unwrap();
    assert!(existed);
    assert_eq!(second.id, first.id);
    assert_eq!(second.render_count, 2);
    assert!(second.is_repeat_visitor);
}

#[tokio::test]
#[ignore]
async fn email_lookup_is_case_insensitive() {
    let Some(store) = test_store().await else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return;
    };

    let email = unique_email();
    let (created, _) = store.upsert(&intake_patch(&email)).await.unwrap();

    let shouting = email.to_uppercase();
    let found = store.find_by_email(&shouting).await.unwrap();
    assert_eq!(found.map(|l| l.id), Some(created.id));
}

#[tokio::test]
#[ignore]
async fn update_scores_writes_only_score_columns() {
    let Some(store) = test_store().await else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return;
    };

    let email = unique_email();
    let (lead, _) = store.upsert(&intake_patch(&email)).await.unwrap();

    let scores = ScoreSet {
        engagement: 10,
        intent: 45,
        lead_quality: 65,
        probability_to_close: 50,
        overall: 42,
    };
    store.update_scores(lead.id, &scores).await.unwrap();

    let reloaded = store.get(lead.id).await.unwrap();
    assert_eq!(reloaded.engagement_score, 10);
    assert_eq!(reloaded.intent_score, 45);
    assert_eq!(reloaded.lead_quality_score, 65);
    assert_eq!(reloaded.probability_to_close_score, 50);
    assert_eq!(reloaded.lead_score, 42);
    // Non-score columns untouched.
    assert_eq!(reloaded.render_count, lead.render_count);
    assert_eq!(reloaded.status, lead.status);
    assert_eq!(reloaded.email, lead.email);
}

#[tokio::test]
#[ignore]
async fn update_scores_on_unknown_lead_is_not_found() {
    let Some(store) = test_store().await else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return;
    };

    let scores = ScoreSet {
        engagement: 0,
        intent: 0,
        lead_quality: 0,
        probability_to_close: 0,
        overall: 0,
    };
    let err = store.update_scores(Uuid::new_v4(), &scores).await;
    assert!(err.is_err());
}

#[tokio::test]
#[ignore]
async fn keyset_pagination_visits_every_lead_once() {
    let Some(store) = test_store().await else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return;
    };

    // Seed a handful of leads, then walk the whole corpus in small batches
    // and check the seeded ids each appear exactly once.
    let mut seeded = Vec::new();
    for _ in 0..5 {
        let (lead, _) = store.upsert(&intake_patch(&unique_email())).await.unwrap();
        seeded.push(lead.id);
    }

    let mut seen = std::collections::HashMap::new();
    let mut cursor = None;
    loop {
        let batch = store.fetch_scoring_batch(cursor, 3).await.unwrap();
        if batch.is_empty() {
            break;
        }
        for row in &batch {
            *seen.entry(row.lead.id).or_insert(0u32) += 1;
        }
        cursor = batch.last().map(|r| (r.lead.created_at, r.lead.id));
    }

    for id in &seeded {
        assert_eq!(seen.get(id), Some(&1), "lead {} visited wrong count", id);
    }
}

#[tokio::test]
#[ignore]
async fn empty_eligible_set_mutates_nothing() {
    let Some(pool) = test_pool().await else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return;
    };
    let store = LeadStore::new(pool.clone());

    // No contractor is seeded for this ZIP.
    let zip = unique_zip();
    let (lead, _) = store
        .upsert(&intake_patch_for_zip(&unique_email(), &zip))
        .await
        .unwrap();

    let executor = AssignmentExecutor::new(pool);
    let err = executor
        .assign(lead.id, &AssignmentStrategy::LeastLoaded, &None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NoEligibleContractors(_)));

    let reloaded = store.get(lead.id).await.unwrap();
    assert_eq!(reloaded.status, "new");
    assert!(reloaded.assigned_contractor_id.is_none());
}

#[tokio::test]
#[ignore]
async fn manual_with_ineligible_id_persists_no_partial_assignment() {
    let Some(pool) = test_pool().await else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return;
    };
    let store = LeadStore::new(pool.clone());
    let contractors = ContractorStore::new(pool.clone());

    let zip = unique_zip();
    let eligible_id = seed_contractor(&pool, &zip, 0).await;
    let (lead, _) = store
        .upsert(&intake_patch_for_zip(&unique_email(), &zip))
        .await
        .unwrap();

    let executor = AssignmentExecutor::new(pool);
    let strategy = AssignmentStrategy::Manual {
        contractor_ids: vec![eligible_id, Uuid::new_v4()],
    };
    let err = executor.assign(lead.id, &strategy, &None).await.unwrap_err();
    assert!(matches!(err, AppError::NotEligible(_)));

    // The eligible half of the pick list must not have been assigned either.
    let reloaded = store.get(lead.id).await.unwrap();
    assert_eq!(reloaded.status, "new");
    assert!(reloaded.assigned_contractor_id.is_none());
    let contractor = contractors.get(eligible_id).await.unwrap();
    assert_eq!(contractor.leads_received_count, 0);
}

#[tokio::test]
#[ignore]
async fn least_loaded_assigns_and_increments_winner_once() {
    let Some(pool) = test_pool().await else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return;
    };
    let store = LeadStore::new(pool.clone());
    let contractors = ContractorStore::new(pool.clone());

    let zip = unique_zip();
    let busy_id = seed_contractor(&pool, &zip, 5).await;
    let idle_id = seed_contractor(&pool, &zip, 0).await;
    let (lead, _) = store
        .upsert(&intake_patch_for_zip(&unique_email(), &zip))
        .await
        .unwrap();

    let executor = AssignmentExecutor::new(pool);
    let outcome = executor
        .assign(lead.id, &AssignmentStrategy::LeastLoaded, &None)
        .await
        .unwrap();

    assert_eq!(outcome.contractor_ids, vec![idle_id]);
    assert_eq!(outcome.strategy_used, "least_loaded");
    assert_eq!(outcome.notifications_simulated, 1);

    let reloaded = store.get(lead.id).await.unwrap();
    assert_eq!(reloaded.status, "assigned");
    assert_eq!(reloaded.assigned_contractor_id, Some(idle_id));

    let winner = contractors.get(idle_id).await.unwrap();
    assert_eq!(winner.leads_received_count, 1);
    let bystander = contractors.get(busy_id).await.unwrap();
    assert_eq!(bystander.leads_received_count, 5);
}

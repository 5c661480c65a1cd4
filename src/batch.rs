use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::lead_store::LeadStore;
use crate::models::RecalculationReport;
use crate::scoring::{compute_scores, LeadFacts};

/// Re-derive scores for the whole lead corpus in fixed-size batches.
///
/// Batches are processed independently: a per-lead write failure is recorded
/// in the report and the job continues, while a batch fetch failure (store
/// unreachable) fails the whole job. Prior committed batches stay committed
/// either way. Only the five score columns are written; render_count,
/// contact fields and status are untouched. Assignment is never re-run here.
///
/// Idempotent: an immediate re-run with unchanged inputs skips every write
/// and reports `updated == 0`.
pub async fn recalculate_all(
    pool: &PgPool,
    batch_size: i64,
) -> Result<RecalculationReport, AppError> {
    let store = LeadStore::new(pool.clone());
    let total_leads = store.count().await?;

    // One timestamp for the whole run keeps age-of-lead features consistent
    // across batches.
    let as_of = Utc::now();

    let mut attempted: u64 = 0;
    let mut updated: u64 = 0;
    let mut failed: u64 = 0;
    let mut batches: u64 = 0;
    let mut cursor: Option<(DateTime<Utc>, Uuid)> = None;

    loop {
        let batch = store.fetch_scoring_batch(cursor, batch_size).await?;
        if batch.is_empty() {
            break;
        }
        batches += 1;

        for row in &batch {
            attempted += 1;

            let facts = LeadFacts::from_lead(&row.lead);
            let scores = compute_scores(&row.profile_snapshot(), &facts, as_of);

            // Unchanged scores are skipped entirely, which is what makes a
            // back-to-back re-run observable as a no-op.
            if scores.matches_lead(&row.lead) {
                continue;
            }

            match store.update_scores(row.lead.id, &scores).await {
                Ok(()) => updated += 1,
                Err(e) => {
                    failed += 1;
                    tracing::error!(
                        "Score recalculation failed for lead {}: {}",
                        row.lead.id,
                        e
                    );
                }
            }
        }

        cursor = batch.last().map(|r| (r.lead.created_at, r.lead.id));
    }

    let report = RecalculationReport {
        total_leads,
        attempted,
        updated,
        failed,
        batches,
    };

    tracing::info!(
        "Score recalculation complete: {} attempted, {} updated, {} failed across {} batches",
        report.attempted,
        report.updated,
        report.failed,
        report.batches
    );

    Ok(report)
}

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::eligibility::{eligible_for_zip, ContractorStore};
use crate::errors::AppError;
use crate::models::{AssignmentOutcome, Contractor, LeadStatus, LeadSummary};
use crate::notify::{DeliveryOutcome, Notifier};

/// How target contractors are chosen from the eligible set. Selected by the
/// caller per assignment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum AssignmentStrategy {
    /// Caller supplies the contractor list; every id must be eligible.
    Manual { contractor_ids: Vec<Uuid> },
    /// Rotating pointer per territory, persisted so it survives restarts.
    RoundRobin,
    /// Eligible contractor with the fewest leads received so far.
    LeastLoaded,
}

impl AssignmentStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStrategy::Manual { .. } => "manual",
            AssignmentStrategy::RoundRobin => "round_robin",
            AssignmentStrategy::LeastLoaded => "least_loaded",
        }
    }
}

/// Validate an explicit contractor pick list against the eligible set.
///
/// Ids outside the eligible set fail the whole request with `NotEligible`;
/// ineligible contractors are never silently admitted or dropped.
pub fn validate_manual(
    eligible: &[Contractor],
    requested: &[Uuid],
) -> Result<Vec<Uuid>, AppError> {
    if requested.is_empty() {
        return Err(AppError::Validation(
            "Manual assignment requires at least one contractor id".to_string(),
        ));
    }

    let rejected: Vec<String> = requested
        .iter()
        .filter(|id| !eligible.iter().any(|c| c.id == **id))
        .map(|id| id.to_string())
        .collect();

    if !rejected.is_empty() {
        return Err(AppError::NotEligible(format!(
            "Contractor(s) not eligible for this lead's territory: {}",
            rejected.join(", ")
        )));
    }

    // Preserve caller order, dropping duplicates.
    let mut targets = Vec::with_capacity(requested.len());
    for id in requested {
        if !targets.contains(id) {
            targets.push(*id);
        }
    }
    Ok(targets)
}

/// Pick exactly one contractor from the eligible set for a given cursor
/// position. The eligible set must be in registration order for rotation to
/// be fair across calls.
pub fn select_round_robin(eligible: &[Contractor], position: i64) -> Result<Uuid, AppError> {
    if eligible.is_empty() {
        return Err(AppError::NoEligibleContractors(
            "Eligible set is empty".to_string(),
        ));
    }
    let index = (position.rem_euclid(eligible.len() as i64)) as usize;
    Ok(eligible[index].id)
}

/// Pick the eligible contractor with the minimum leads_received_count.
/// Ties break by earliest registration, then id, keeping the rule total and
/// reproducible.
pub fn select_least_loaded(eligible: &[Contractor]) -> Result<Uuid, AppError> {
    eligible
        .iter()
        .min_by(|a, b| {
            a.leads_received_count
                .cmp(&b.leads_received_count)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        })
        .map(|c| c.id)
        .ok_or_else(|| {
            AppError::NoEligibleContractors("Eligible set is empty".to_string())
        })
}

/// Persists assignments: lead status transition, contractor counters and the
/// lead -> contractor link move in a single transaction, then the
/// notification collaborator is informed best-effort.
pub struct AssignmentExecutor {
    pool: PgPool,
}

impl AssignmentExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Assign a lead to contractors chosen by `strategy`.
    ///
    /// Eligibility is re-validated here at execution time; a stale eligible
    /// set computed earlier in the request is never trusted. On any error
    /// before commit, no row is mutated.
    pub async fn assign(
        &self,
        lead_id: Uuid,
        strategy: &AssignmentStrategy,
        notifier: &Option<Notifier>,
    ) -> Result<AssignmentOutcome, AppError> {
        let lead = crate::lead_store::LeadStore::new(self.pool.clone())
            .get(lead_id)
            .await?;

        let roster = ContractorStore::new(self.pool.clone())
            .load_active_roster()
            .await?;
        let eligible = eligible_for_zip(&roster, &lead.zip_code);
        if eligible.is_empty() {
            return Err(AppError::NoEligibleContractors(format!(
                "No eligible contractors for ZIP {}",
                lead.zip_code
            )));
        }

        let mut tx = self.pool.begin().await?;

        let targets: Vec<Uuid> = match strategy {
            AssignmentStrategy::Manual { contractor_ids } => {
                validate_manual(&eligible, contractor_ids)?
            }
            AssignmentStrategy::RoundRobin => {
                // Cursor advance participates in the transaction, so a failed
                // assignment does not consume a rotation slot.
                let position = advance_cursor(&mut tx, &lead.zip_code).await?;
                vec![select_round_robin(&eligible, position)?]
            }
            AssignmentStrategy::LeastLoaded => vec![select_least_loaded(&eligible)?],
        };

        let primary = targets[0];

        sqlx::query(
            r#"
            UPDATE leads
            SET status = $2,
                assigned_contractor_id = $3,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(lead.id)
        .bind(LeadStatus::Assigned.as_str())
        .bind(primary)
        .execute(&mut *tx)
        .await?;

        for contractor_id in &targets {
            let inserted = sqlx::query(
                r#"
                INSERT INTO assignments (lead_id, contractor_id, strategy_used)
                VALUES ($1, $2, $3)
                ON CONFLICT (lead_id, contractor_id) DO NOTHING
                "#,
            )
            .bind(lead.id)
            .bind(contractor_id)
            .bind(strategy.as_str())
            .execute(&mut *tx)
            .await?;

            // Counters are append-only audit facts: increment once per new
            // lead/contractor pair, never on a repeated assignment of the
            // same pair, and never decrement.
            if inserted.rows_affected() == 1 {
                sqlx::query(
                    r#"
                    UPDATE contractors
                    SET leads_received_count = leads_received_count + 1,
                        updated_at = now()
                    WHERE id = $1
                    "#,
                )
                .bind(contractor_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;

        let assigned_at = Utc::now();
        tracing::info!(
            "Lead {} assigned to {} contractor(s) via {}",
            lead.id,
            targets.len(),
            strategy.as_str()
        );

        // Notification is best-effort and post-commit: a delivery failure is
        // counted and logged but never reverses the assignment.
        let summary = LeadSummary::from_lead(&lead);
        let mut delivered = 0;
        let mut simulated = 0;
        let mut failed = 0;
        for contractor_id in &targets {
            // Targets were selected from the eligible set, so lookups hit.
            let Some(contractor) = eligible.iter().find(|c| c.id == *contractor_id) else {
                continue;
            };
            match Notifier::notify_assignment(notifier, contractor, &summary).await {
                DeliveryOutcome::Delivered => delivered += 1,
                DeliveryOutcome::Simulated => simulated += 1,
                DeliveryOutcome::Failed(reason) => {
                    failed += 1;
                    tracing::error!(
                        "Notification to contractor {} failed: {}",
                        contractor_id,
                        reason
                    );
                }
            }
        }

        Ok(AssignmentOutcome {
            lead_id: lead.id,
            contractor_ids: targets,
            strategy_used: strategy.as_str().to_string(),
            assigned_at,
            notifications_delivered: delivered,
            notifications_simulated: simulated,
            notifications_failed: failed,
        })
    }
}

/// Atomically advance the persisted round-robin cursor for a territory and
/// return the new position. Safe under concurrent assignment requests: the
/// row update is the synchronization point.
async fn advance_cursor(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    zip_code: &str,
) -> Result<i64, AppError> {
    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO assignment_cursors (zip_code, position)
        VALUES ($1, 0)
        ON CONFLICT (zip_code)
        DO UPDATE SET position = assignment_cursors.position + 1
        RETURNING position
        "#,
    )
    .bind(zip_code)
    .fetch_one(&mut **tx)
    .await?;

    Ok(row.0)
}

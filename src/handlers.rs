use crate::assignment::{AssignmentExecutor, AssignmentStrategy};
use crate::auth::require_admin;
use crate::cache_validator::ValidatedCacheEntry;
use crate::config::Config;
use crate::eligibility::{eligible_for_zip, ContractorStore};
use crate::errors::AppError;
use crate::lead_store::{LeadPatch, LeadStore};
use crate::models::*;
use crate::notify::Notifier;
use crate::scoring::{compute_scores, LeadFacts, ProfileSnapshot, ScoreSet};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use moka::future::Cache;
use serde_json::json;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: PgPool,
    /// Application configuration.
    pub config: Config,
    /// Client for the contractor notification service (optional; absent
    /// configuration degrades delivery to simulated outcomes).
    pub notifier: Option<Notifier>,
    /// Short-TTL deduplication cache to absorb double-submitted intake
    /// events for the same identity.
    pub intake_dedup_cache: Cache<String, i64>,
    /// Per-ZIP eligible-roster cache. Values are checksum-validated JSON.
    pub roster_cache: Cache<String, String>,
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "lead-router-api",
            "version": "0.1.0"
        })),
    )
}

/// POST /api/v1/leads
///
/// Lead intake: an AI render completed or the homeowner requested a quote.
/// Scores the event, upserts the canonical lead record and, when the overall
/// score clears the configured threshold, routes the lead to a contractor.
///
/// Scoring/assignment problems are secondary effects here: they are logged
/// and the caller's primary action still succeeds wherever possible.
pub async fn intake_lead(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LeadEventRequest>,
) -> Result<Json<LeadIntakeResponse>, AppError> {
    tracing::info!(
        "POST /leads - zip: {}, wants_quote: {}",
        payload.zip_code,
        payload.wants_quote
    );

    let dedup_key = intake_dedup_key(&payload)?;

    let store = LeadStore::new(state.db.clone());

    // Byte-identical double-submits within the dedup window return the
    // canonical record without re-processing (same pattern as a webhook
    // duplicate). A differing payload for the same identity, say a quote
    // request seconds after a render, hashes to a new key and is processed
    // normally.
    if state.intake_dedup_cache.get(&dedup_key).await.is_some() {
        tracing::warn!("Duplicate intake event within dedup window: {}", dedup_key);
        let existing = match payload.user_id {
            Some(user_id) => store.find_by_user(user_id).await?,
            None => match payload.email.as_deref() {
                Some(email) => store.find_by_email(email).await?,
                None => None,
            },
        };
        if let Some(lead) = existing {
            return Ok(Json(LeadIntakeResponse {
                success: true,
                message: "Duplicate event ignored".to_string(),
                lead,
                auto_assigned: false,
            }));
        }
        // Cache hit without a stored record means the first submit has not
        // committed yet; fall through and process normally.
    }

    let patch = LeadPatch {
        user_id: payload.user_id,
        name: payload.name.clone(),
        email: payload.email.clone(),
        phone: payload.phone.clone(),
        zip_code: payload.zip_code.clone(),
        room_type: payload.room_type.clone(),
        style: payload.style.clone(),
        wants_quote: payload.wants_quote,
        social_engaged: payload.social_engaged,
        render_count: None,
    };

    let (mut lead, existed) = store.upsert(&patch).await?;
    if existed {
        tracing::info!("Repeat visitor: lead {} render_count={}", lead.id, lead.render_count);
    }

    let profile = match lead.user_id {
        Some(user_id) => store.load_profile(user_id).await?,
        None => None,
    };
    let snapshot = ProfileSnapshot::from_profile(profile.as_ref());
    let scores = compute_scores(&snapshot, &LeadFacts::from_lead(&lead), Utc::now());

    // Scoring is a secondary effect: a failed score write leaves the lead
    // recorded but unscored, and the intake still succeeds.
    let lead_id = lead.id;
    let scored = apply_score_write(
        &mut lead,
        &scores,
        store.update_scores(lead_id, &scores).await,
    );

    state
        .intake_dedup_cache
        .insert(dedup_key, Utc::now().timestamp())
        .await;

    // Auto-assignment is a secondary effect. Any failure here (no eligible
    // contractors, store hiccup) must never fail the homeowner's action.
    let mut auto_assigned = false;
    if scored
        && lead.status == LeadStatus::New.as_str()
        && scores.overall >= state.config.auto_assign_threshold
    {
        let executor = AssignmentExecutor::new(state.db.clone());
        match executor
            .assign(lead.id, &AssignmentStrategy::LeastLoaded, &state.notifier)
            .await
        {
            Ok(outcome) => {
                auto_assigned = true;
                lead.status = LeadStatus::Assigned.as_str().to_string();
                lead.assigned_contractor_id = outcome.contractor_ids.first().copied();
                tracing::info!(
                    "Lead {} auto-assigned to contractor {:?} (score {})",
                    lead.id,
                    lead.assigned_contractor_id,
                    scores.overall
                );
            }
            Err(e) => {
                tracing::warn!("Auto-assignment skipped for lead {}: {}", lead.id, e);
            }
        }
    }

    Ok(Json(LeadIntakeResponse {
        success: true,
        message: if auto_assigned {
            "Lead scored and assigned".to_string()
        } else if scored {
            "Lead scored".to_string()
        } else {
            "Lead recorded, scoring deferred".to_string()
        },
        lead,
        auto_assigned,
    }))
}

/// Dedup key for an intake event: lead identity plus a hash of the full
/// payload. Only a byte-identical resubmission maps to the same key, so the
/// dedup window absorbs double-submits without swallowing new intent signals.
fn intake_dedup_key(payload: &LeadEventRequest) -> Result<String, AppError> {
    let identity = match (payload.user_id, payload.email.as_deref()) {
        (Some(user_id), _) => format!("user:{}", user_id),
        (None, Some(email)) => format!("email:{}", email.trim().to_lowercase()),
        (None, None) => {
            return Err(AppError::Validation(
                "Lead event requires a user_id or an email".to_string(),
            ));
        }
    };

    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(payload).unwrap_or_default());
    Ok(format!("{}:{}", identity, hex::encode(hasher.finalize())))
}

/// Apply a freshly computed score set to the in-memory lead after the store
/// write. Returns false when the write failed; the caller keeps the unscored
/// record and skips auto-assignment.
fn apply_score_write(lead: &mut Lead, scores: &ScoreSet, write: Result<(), AppError>) -> bool {
    match write {
        Ok(()) => {
            lead.engagement_score = scores.engagement;
            lead.intent_score = scores.intent;
            lead.lead_quality_score = scores.lead_quality;
            lead.probability_to_close_score = scores.probability_to_close;
            lead.lead_score = scores.overall;
            true
        }
        Err(e) => {
            tracing::warn!("Score write failed for lead {}: {}", lead.id, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(wants_quote: bool) -> LeadEventRequest {
        LeadEventRequest {
            user_id: None,
            name: Some("Dana Whitfield".to_string()),
            email: Some("dana@example.com".to_string()),
            phone: None,
            zip_code: "01701".to_string(),
            room_type: Some("kitchen".to_string()),
            style: None,
            wants_quote,
            social_engaged: false,
        }
    }

    fn test_lead() -> Lead {
        let now = Utc::now();
        Lead {
            id: Uuid::new_v4(),
            user_id: None,
            name: None,
            email: Some("dana@example.com".to_string()),
            phone: None,
            zip_code: "01701".to_string(),
            room_type: None,
            style: None,
            render_count: 1,
            wants_quote: false,
            social_engaged: false,
            is_repeat_visitor: false,
            engagement_score: 0,
            intent_score: 0,
            lead_quality_score: 0,
            probability_to_close_score: 0,
            lead_score: 0,
            assigned_contractor_id: None,
            status: "new".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn identical_payloads_share_a_dedup_key() {
        let a = intake_dedup_key(&event(false)).unwrap();
        let b = intake_dedup_key(&event(false)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn changed_intent_gets_a_fresh_dedup_key() {
        // A quote request right after a render is a new event, not a
        // double-submit; it must not be absorbed by the dedup window.
        let render_only = intake_dedup_key(&event(false)).unwrap();
        let quote = intake_dedup_key(&event(true)).unwrap();
        assert_ne!(render_only, quote);
    }

    #[test]
    fn dedup_key_requires_an_identity() {
        let mut anonymous = event(false);
        anonymous.user_id = None;
        anonymous.email = None;
        assert!(matches!(
            intake_dedup_key(&anonymous),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn user_id_dominates_the_dedup_identity() {
        let mut with_user = event(false);
        with_user.user_id = Some(Uuid::new_v4());
        let key = intake_dedup_key(&with_user).unwrap();
        assert!(key.starts_with("user:"));
    }

    #[test]
    fn successful_score_write_applies_scores() {
        let mut lead = test_lead();
        let scores = ScoreSet {
            engagement: 10,
            intent: 45,
            lead_quality: 65,
            probability_to_close: 50,
            overall: 42,
        };

        assert!(apply_score_write(&mut lead, &scores, Ok(())));
        assert_eq!(lead.lead_score, 42);
        assert_eq!(lead.intent_score, 45);
    }

    #[test]
    fn failed_score_write_keeps_the_lead_unscored() {
        let mut lead = test_lead();
        let scores = ScoreSet {
            engagement: 10,
            intent: 45,
            lead_quality: 65,
            probability_to_close: 50,
            overall: 42,
        };
        let write = Err(AppError::DatabaseError(sqlx::Error::PoolTimedOut));

        assert!(!apply_score_write(&mut lead, &scores, write));
        assert_eq!(lead.lead_score, 0);
        assert_eq!(lead.engagement_score, 0);
    }
}

/// POST /api/v1/leads/:id/assign
///
/// Administrative assignment with an explicit strategy (manual pick list,
/// round-robin or least-loaded).
pub async fn assign_lead(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<AssignRequest>,
) -> Result<Json<AssignmentOutcome>, AppError> {
    require_admin(&headers, &state.config)?;

    tracing::info!(
        "POST /leads/{}/assign - strategy: {}",
        lead_id,
        request.strategy.as_str()
    );

    let executor = AssignmentExecutor::new(state.db.clone());
    let outcome = executor
        .assign(lead_id, &request.strategy, &state.notifier)
        .await?;

    Ok(Json(outcome))
}

/// GET /api/v1/leads/:id/contractors
///
/// Eligible contractor roster for the lead's territory. Rosters are cached
/// per ZIP for a short window; entries are checksum-validated on read and
/// re-fetched from the store when validation fails.
pub async fn eligible_contractors(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<Uuid>,
) -> Result<Json<EligibleContractorsResponse>, AppError> {
    let lead = LeadStore::new(state.db.clone()).get(lead_id).await?;
    let cache_key = format!("roster:{}", lead.zip_code);

    if let Some(cached) = state.roster_cache.get(&cache_key).await {
        if let Some(valid_data) = ValidatedCacheEntry::deserialize_and_validate(&cached) {
            if let Ok(contractors) = serde_json::from_str::<Vec<Contractor>>(&valid_data) {
                tracing::debug!("Roster cache HIT (validated) for ZIP {}", lead.zip_code);
                return Ok(Json(EligibleContractorsResponse {
                    lead_id: lead.id,
                    zip_code: lead.zip_code,
                    contractors,
                }));
            }
        } else {
            tracing::warn!(
                "Roster cache validation failed for ZIP {}, refetching",
                lead.zip_code
            );
        }
    }

    let roster = ContractorStore::new(state.db.clone())
        .load_active_roster()
        .await?;
    let contractors = eligible_for_zip(&roster, &lead.zip_code);

    if let Ok(json_str) = serde_json::to_string(&contractors) {
        let entry = ValidatedCacheEntry::new(json_str);
        state.roster_cache.insert(cache_key, entry.serialize()).await;
    }

    Ok(Json(EligibleContractorsResponse {
        lead_id: lead.id,
        zip_code: lead.zip_code,
        contractors,
    }))
}

/// POST /api/v1/admin/recompute-scores
///
/// Admin-only batch recalculation over the full lead corpus. Returns the
/// structured attempted/updated/failed report.
pub async fn recompute_scores(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<RecalculationReport>, AppError> {
    require_admin(&headers, &state.config)?;

    tracing::info!("POST /admin/recompute-scores");

    let report = crate::batch::recalculate_all(&state.db, state.config.recalc_batch_size).await?;

    Ok(Json(report))
}

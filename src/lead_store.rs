use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{Lead, LeadStatus, Profile};
use crate::scoring::{is_valid_zip, ProfileSnapshot, ScoreSet};

/// Typed write patch for a lead event. Every optional field has a declared
/// default applied here, at the repository boundary, rather than ad hoc
/// coalescing at call sites.
#[derive(Debug, Clone, Default)]
pub struct LeadPatch {
    pub user_id: Option<Uuid>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub zip_code: String,
    pub room_type: Option<String>,
    pub style: Option<String>,
    pub wants_quote: bool,
    pub social_engaged: bool,
    /// Explicit render count. Leave `None` for intake events so repeats
    /// increment the stored value; supply a value only on import-style
    /// writes that must not increment.
    pub render_count: Option<i32>,
}

/// A lead joined with its owner's engagement counters. Missing profile rows
/// surface as zeros.
#[derive(Debug, Clone, FromRow)]
pub struct LeadWithProfile {
    #[sqlx(flatten)]
    pub lead: Lead,
    pub login_count: i32,
    pub total_time_on_site_ms: i64,
    pub ai_renderings_count: i32,
}

impl LeadWithProfile {
    pub fn profile_snapshot(&self) -> ProfileSnapshot {
        ProfileSnapshot {
            login_count: self.login_count.max(0),
            total_time_on_site_ms: self.total_time_on_site_ms.max(0),
            ai_renderings_count: self.ai_renderings_count.max(0),
        }
    }
}

/// CRUD over lead records. Owns uniqueness/recency resolution: one canonical
/// lead per user_id, or per email when no user is attached.
pub struct LeadStore {
    pool: PgPool,
}

impl LeadStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert-or-update keyed by user_id, else email.
    ///
    /// New identity: `render_count = patch.render_count` (default 1),
    /// `is_repeat_visitor = false`, `status = new`.
    /// Existing identity: render_count increments (unless the patch carries
    /// one explicitly), `is_repeat_visitor = true`, remaining fields are
    /// last-write-wins, `updated_at` refreshed.
    ///
    /// Returns the stored lead and whether a prior record existed.
    pub async fn upsert(&self, patch: &LeadPatch) -> Result<(Lead, bool), AppError> {
        let email = patch
            .email
            .as_deref()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty());

        if patch.user_id.is_none() && email.is_none() {
            return Err(AppError::Validation(
                "Lead event requires a user_id or an email".to_string(),
            ));
        }
        if !is_valid_zip(&patch.zip_code) {
            return Err(AppError::Validation(format!(
                "Invalid ZIP code '{}': expected 5 digits",
                patch.zip_code
            )));
        }

        // Resolve the canonical record: user_id wins, email is the fallback.
        let existing = match patch.user_id {
            Some(user_id) => self.find_by_user(user_id).await?,
            None => match email.as_deref() {
                Some(e) => self.find_by_email(e).await?,
                None => None,
            },
        };

        match existing {
            Some(current) => {
                let render_count = match patch.render_count {
                    Some(explicit) => explicit.max(1),
                    None => current.render_count.saturating_add(1),
                };

                let lead = sqlx::query_as::<_, Lead>(
                    r#"
                    UPDATE leads
                    SET user_id = COALESCE($2, user_id),
                        name = $3,
                        email = COALESCE($4, email),
                        phone = $5,
                        zip_code = $6,
                        room_type = $7,
                        style = $8,
                        render_count = $9,
                        wants_quote = $10,
                        social_engaged = $11,
                        is_repeat_visitor = true,
                        updated_at = now()
                    WHERE id = $1
                    RETURNING *
                    "#,
                )
                .bind(current.id)
                .bind(patch.user_id)
                .bind(&patch.name)
                .bind(&email)
                .bind(&patch.phone)
                .bind(&patch.zip_code)
                .bind(&patch.room_type)
                .bind(&patch.style)
                .bind(render_count)
                .bind(patch.wants_quote)
                .bind(patch.social_engaged)
                .fetch_one(&self.pool)
                .await?;

                Ok((lead, true))
            }
            None => {
                let lead = sqlx::query_as::<_, Lead>(
                    r#"
                    INSERT INTO leads (
                        user_id, name, email, phone, zip_code, room_type, style,
                        render_count, wants_quote, social_engaged,
                        is_repeat_visitor, status
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, false, $11)
                    RETURNING *
                    "#,
                )
                .bind(patch.user_id)
                .bind(&patch.name)
                .bind(&email)
                .bind(&patch.phone)
                .bind(&patch.zip_code)
                .bind(&patch.room_type)
                .bind(&patch.style)
                .bind(patch.render_count.unwrap_or(1).max(1))
                .bind(patch.wants_quote)
                .bind(patch.social_engaged)
                .bind(LeadStatus::New.as_str())
                .fetch_one(&self.pool)
                .await?;

                Ok((lead, false))
            }
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Lead, AppError> {
        sqlx::query_as::<_, Lead>("SELECT * FROM leads WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", id)))
    }

    pub async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Lead>, AppError> {
        let lead = sqlx::query_as::<_, Lead>(
            "SELECT * FROM leads WHERE user_id = $1 ORDER BY updated_at DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(lead)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<Lead>, AppError> {
        let lead = sqlx::query_as::<_, Lead>(
            "SELECT * FROM leads WHERE email = $1 ORDER BY updated_at DESC LIMIT 1",
        )
        .bind(email.to_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        Ok(lead)
    }

    /// Write only the five score columns. Contact fields, render_count and
    /// status are never touched by this path (batch recompute contract).
    pub async fn update_scores(&self, lead_id: Uuid, scores: &ScoreSet) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE leads
            SET engagement_score = $2,
                intent_score = $3,
                lead_quality_score = $4,
                probability_to_close_score = $5,
                lead_score = $6,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(lead_id)
        .bind(scores.engagement)
        .bind(scores.intent)
        .bind(scores.lead_quality)
        .bind(scores.probability_to_close)
        .bind(scores.overall)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Lead {} not found", lead_id)));
        }
        Ok(())
    }

    pub async fn count(&self) -> Result<i64, AppError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM leads")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    /// Fetch the next scoring batch in (created_at, id) keyset order, with
    /// the owning profile left-joined in (missing profile reads as zeros).
    pub async fn fetch_scoring_batch(
        &self,
        after: Option<(DateTime<Utc>, Uuid)>,
        limit: i64,
    ) -> Result<Vec<LeadWithProfile>, AppError> {
        let rows = match after {
            Some((created_at, id)) => {
                sqlx::query_as::<_, LeadWithProfile>(
                    r#"
                    SELECT l.*,
                           COALESCE(p.login_count, 0) AS login_count,
                           COALESCE(p.total_time_on_site_ms, 0) AS total_time_on_site_ms,
                           COALESCE(p.ai_renderings_count, 0) AS ai_renderings_count
                    FROM leads l
                    LEFT JOIN profiles p ON p.user_id = l.user_id
                    WHERE (l.created_at, l.id) > ($1, $2)
                    ORDER BY l.created_at, l.id
                    LIMIT $3
                    "#,
                )
                .bind(created_at)
                .bind(id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, LeadWithProfile>(
                    r#"
                    SELECT l.*,
                           COALESCE(p.login_count, 0) AS login_count,
                           COALESCE(p.total_time_on_site_ms, 0) AS total_time_on_site_ms,
                           COALESCE(p.ai_renderings_count, 0) AS ai_renderings_count
                    FROM leads l
                    LEFT JOIN profiles p ON p.user_id = l.user_id
                    ORDER BY l.created_at, l.id
                    LIMIT $1
                    "#,
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows)
    }

    pub async fn load_profile(&self, user_id: Uuid) -> Result<Option<Profile>, AppError> {
        let profile =
            sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(profile)
    }
}

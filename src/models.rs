use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ============ Database Models ============

/// A recorded homeowner contact/intent event. The unit that gets scored and
/// assigned to contractors.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Lead {
    /// Unique identifier for the lead.
    pub id: Uuid,
    /// Owning user, when the event came from a signed-in visitor.
    pub user_id: Option<Uuid>,
    /// Homeowner name.
    pub name: Option<String>,
    /// Contact email (lowercased at the boundary).
    pub email: Option<String>,
    /// Contact phone.
    pub phone: Option<String>,
    /// 5-digit territory ZIP code.
    pub zip_code: String,
    /// Room type selected for the render (e.g. "kitchen").
    pub room_type: Option<String>,
    /// Style selected for the render.
    pub style: Option<String>,
    /// Number of renders produced for this identity. Cumulative across updates.
    pub render_count: i32,
    /// Whether the homeowner explicitly requested a quote.
    pub wants_quote: bool,
    /// Whether the homeowner shared/engaged socially.
    pub social_engaged: bool,
    /// Derived at write time from prior-record lookup.
    pub is_repeat_visitor: bool,
    /// Engagement sub-score, 0-100.
    pub engagement_score: i32,
    /// Intent sub-score, 0-100.
    pub intent_score: i32,
    /// Contact/territory quality sub-score, 0-100.
    pub lead_quality_score: i32,
    /// Probability-to-close sub-score, 0-100.
    pub probability_to_close_score: i32,
    /// Legacy overall aggregate, 0-100. Weighting is versioned, see scoring.
    pub lead_score: i32,
    /// Contractor the lead was routed to (first target on fan-out).
    pub assigned_contractor_id: Option<Uuid>,
    /// Lifecycle status. See `LeadStatus` for the member set.
    pub status: String,
    /// Timestamp of creation, set once.
    pub created_at: DateTime<Utc>,
    /// Refreshed on every mutation.
    pub updated_at: DateTime<Utc>,
}

/// Lead lifecycle states. Stored as lowercase text; only `new -> assigned`
/// is driven by this engine, the rest are recorded for downstream tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    New,
    Assigned,
    Contacted,
    Converted,
    Closed,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Assigned => "assigned",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Converted => "converted",
            LeadStatus::Closed => "closed",
        }
    }
}

/// Aggregate engagement history for the owning user. Read-only input to
/// scoring; mutated by collaborators outside this engine.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: Uuid,
    pub login_count: i32,
    pub total_time_on_site_ms: i64,
    pub ai_renderings_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A service provider eligible to receive leads.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Contractor {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    /// When true, `assigned_zip_codes` is ignored for eligibility.
    pub serves_all_zipcodes: bool,
    /// 5-digit ZIP codes this contractor serves.
    pub assigned_zip_codes: Vec<String>,
    /// Inactive contractors are never eligible.
    pub is_active_subscriber: bool,
    /// basic / premium / enterprise. Informational; does not gate eligibility.
    pub subscription_tier: String,
    /// Monotonically non-decreasing; incremented only by the assignment
    /// executor. Append-only audit fact, never decremented.
    pub leads_received_count: i32,
    /// Incremented by downstream conversion tracking.
    pub leads_converted_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Contractor subscription tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Basic,
    Premium,
    Enterprise,
}

/// One lead -> contractor routing record. Each pair is recorded at most once.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub contractor_id: Uuid,
    pub strategy_used: String,
    pub assigned_at: DateTime<Utc>,
}

// ============ API Request/Response Models ============

/// Inbound lead-producing event: a completed AI render or an explicit quote
/// request. Every field the visitor did not supply defaults to zero/false at
/// the repository boundary. Serialized form feeds the intake dedup hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadEventRequest {
    pub user_id: Option<Uuid>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub zip_code: String,
    pub room_type: Option<String>,
    pub style: Option<String>,
    #[serde(default)]
    pub wants_quote: bool,
    #[serde(default)]
    pub social_engaged: bool,
}

/// Response payload for lead intake.
#[derive(Debug, Serialize)]
pub struct LeadIntakeResponse {
    pub success: bool,
    pub message: String,
    pub lead: Lead,
    /// Set when intake triggered automatic assignment.
    pub auto_assigned: bool,
}

/// Request body for POST /api/v1/leads/:id/assign.
#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    #[serde(flatten)]
    pub strategy: crate::assignment::AssignmentStrategy,
}

/// Outcome of a persisted assignment, including best-effort notification
/// bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentOutcome {
    pub lead_id: Uuid,
    /// Ordered contractor targets; first entry is the primary assignee.
    pub contractor_ids: Vec<Uuid>,
    pub strategy_used: String,
    pub assigned_at: DateTime<Utc>,
    pub notifications_delivered: usize,
    pub notifications_simulated: usize,
    pub notifications_failed: usize,
}

/// Eligible roster for a lead's territory.
#[derive(Debug, Serialize, Deserialize)]
pub struct EligibleContractorsResponse {
    pub lead_id: Uuid,
    pub zip_code: String,
    pub contractors: Vec<Contractor>,
}

/// Structured report returned by the batch recalculation job.
///
/// `attempted` vs `updated`/`failed` lets administrative callers distinguish
/// partial success; an immediate idempotent re-run reports `updated == 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecalculationReport {
    pub total_leads: i64,
    pub attempted: u64,
    pub updated: u64,
    pub failed: u64,
    pub batches: u64,
}

/// Compact lead summary handed to the notification collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct LeadSummary {
    pub lead_id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub zip_code: String,
    pub room_type: Option<String>,
    pub style: Option<String>,
    pub lead_score: i32,
    pub wants_quote: bool,
}

impl LeadSummary {
    pub fn from_lead(lead: &Lead) -> Self {
        Self {
            lead_id: lead.id,
            name: lead.name.clone(),
            email: lead.email.clone(),
            phone: lead.phone.clone(),
            zip_code: lead.zip_code.clone(),
            room_type: lead.room_type.clone(),
            style: lead.style.clone(),
            lead_score: lead.lead_score,
            wants_quote: lead.wants_quote,
        }
    }
}

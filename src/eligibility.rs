use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::Contractor;

/// Territory/subscription predicate for a single contractor.
///
/// A contractor is eligible iff they are an active subscriber and either
/// serve all ZIP codes or have the lead's ZIP in their assigned set.
pub fn is_eligible(contractor: &Contractor, lead_zip: &str) -> bool {
    contractor.is_active_subscriber
        && (contractor.serves_all_zipcodes
            || contractor
                .assigned_zip_codes
                .iter()
                .any(|z| z == lead_zip))
}

/// Pure filter over the roster. An empty result is a value, not an error;
/// callers decide whether that is a `NoEligibleContractors` condition.
pub fn eligible_for_zip(roster: &[Contractor], lead_zip: &str) -> Vec<Contractor> {
    roster
        .iter()
        .filter(|c| is_eligible(c, lead_zip))
        .cloned()
        .collect()
}

/// Read access to the contractor roster.
pub struct ContractorStore {
    pool: PgPool,
}

impl ContractorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Active-subscriber roster in registration order. The ordering is what
    /// makes downstream round-robin indices and least-loaded tie-breaks
    /// reproducible.
    pub async fn load_active_roster(&self) -> Result<Vec<Contractor>, AppError> {
        let roster = sqlx::query_as::<_, Contractor>(
            "SELECT * FROM contractors WHERE is_active_subscriber = true ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(roster)
    }

    pub async fn get(&self, id: Uuid) -> Result<Contractor, AppError> {
        sqlx::query_as::<_, Contractor>("SELECT * FROM contractors WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Contractor {} not found", id)))
    }
}

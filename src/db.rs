use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

/// Embedded, idempotent schema bootstrap. Applied statement by statement at
/// startup; `IF NOT EXISTS` keeps repeated boots safe.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS leads (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        user_id UUID,
        name TEXT,
        email TEXT,
        phone TEXT,
        zip_code TEXT NOT NULL,
        room_type TEXT,
        style TEXT,
        render_count INT NOT NULL DEFAULT 1,
        wants_quote BOOLEAN NOT NULL DEFAULT false,
        social_engaged BOOLEAN NOT NULL DEFAULT false,
        is_repeat_visitor BOOLEAN NOT NULL DEFAULT false,
        engagement_score INT NOT NULL DEFAULT 0,
        intent_score INT NOT NULL DEFAULT 0,
        lead_quality_score INT NOT NULL DEFAULT 0,
        probability_to_close_score INT NOT NULL DEFAULT 0,
        lead_score INT NOT NULL DEFAULT 0,
        assigned_contractor_id UUID,
        status TEXT NOT NULL DEFAULT 'new',
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_leads_user_id ON leads (user_id)",
    "CREATE INDEX IF NOT EXISTS idx_leads_email ON leads (email)",
    "CREATE INDEX IF NOT EXISTS idx_leads_created_at ON leads (created_at, id)",
    r#"
    CREATE TABLE IF NOT EXISTS profiles (
        user_id UUID PRIMARY KEY,
        login_count INT NOT NULL DEFAULT 0,
        total_time_on_site_ms BIGINT NOT NULL DEFAULT 0,
        ai_renderings_count INT NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS contractors (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        name TEXT NOT NULL,
        email TEXT NOT NULL,
        serves_all_zipcodes BOOLEAN NOT NULL DEFAULT false,
        assigned_zip_codes TEXT[] NOT NULL DEFAULT '{}',
        is_active_subscriber BOOLEAN NOT NULL DEFAULT false,
        subscription_tier TEXT NOT NULL DEFAULT 'basic',
        leads_received_count INT NOT NULL DEFAULT 0,
        leads_converted_count INT NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS assignments (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        lead_id UUID NOT NULL,
        contractor_id UUID NOT NULL,
        strategy_used TEXT NOT NULL,
        assigned_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (lead_id, contractor_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS assignment_cursors (
        zip_code TEXT PRIMARY KEY,
        position BIGINT NOT NULL DEFAULT 0
    )
    "#,
];

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        let db = Self { pool };
        db.bootstrap().await?;
        Ok(db)
    }

    /// Apply the embedded schema. Safe to run on every boot.
    async fn bootstrap(&self) -> anyhow::Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("Database schema verified");
        Ok(())
    }
}

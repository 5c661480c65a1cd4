use axum::{
    routing::{get, post},
    Router,
};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lead_router_api::config::Config;
use lead_router_api::db::Database;
use lead_router_api::handlers;
use lead_router_api::notify::Notifier;

/// Main entry point.
///
/// Initializes logging, configuration, the database pool (with schema
/// bootstrap), caches and the optional notification client, then serves the
/// HTTP API.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lead_router_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    // Initialize database connection pool and verify schema
    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    // Intake deduplication cache: absorbs double-submitted lead events for
    // the same identity within a short window.
    let intake_dedup_cache = Cache::builder()
        .time_to_live(Duration::from_secs(10))
        .max_capacity(10_000)
        .build();
    tracing::info!("Intake deduplication cache initialized");

    // Per-ZIP eligible-roster cache (60s TTL, checksum-validated entries).
    let roster_cache = Cache::builder()
        .time_to_live(Duration::from_secs(60))
        .max_capacity(10_000)
        .build();
    tracing::info!("Roster cache initialized (60s TTL)");

    // Notification client is optional: without it, deliveries are simulated.
    let notifier = match (&config.notify_base_url, &config.notify_token) {
        (Some(base_url), Some(token)) => match Notifier::new(base_url, token.clone()) {
            Ok(client) => {
                tracing::info!("Notification client initialized: {}", base_url);
                Some(client)
            }
            Err(e) => {
                tracing::error!("Failed to initialize notification client: {}", e);
                None
            }
        },
        _ => None,
    };

    // Build application state
    let app_state = Arc::new(handlers::AppState {
        db: db.pool.clone(),
        config: config.clone(),
        notifier,
        intake_dedup_cache,
        roster_cache,
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .unwrap(),
    );

    // Build protected routes with security layers
    let protected_routes = Router::new()
        .route("/api/v1/leads", post(handlers::intake_lead))
        .route("/api/v1/leads/:id/assign", post(handlers::assign_lead))
        .route(
            "/api/v1/leads/:id/contractors",
            get(handlers::eligible_contractors),
        )
        .route(
            "/api/v1/admin/recompute-scores",
            post(handlers::recompute_scores),
        )
        .layer(
            ServiceBuilder::new()
                // Request size limit: 1MB max payload
                .layer(RequestBodyLimitLayer::new(1024 * 1024))
                // Rate limiting: 10 req/sec per IP, burst of 20
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Build final app with health check bypassing rate limiting
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

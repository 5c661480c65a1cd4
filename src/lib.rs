//! Lead Scoring & Contractor Assignment Engine
//!
//! Backend engine for a home-renovation visualization product: homeowner
//! interactions (AI renders, quote requests) become leads, leads are scored
//! on four axes plus a legacy overall score, and qualifying leads are routed
//! to contractors filtered by ZIP territory and subscription state.
//!
//! # Modules
//!
//! - `assignment`: Assignment strategies (manual, round-robin, least-loaded)
//!   and the transactional executor.
//! - `auth`: Admin bearer-credential validation.
//! - `batch`: Batch score recalculation over the lead corpus.
//! - `cache_validator`: Checksum validation for cached roster payloads.
//! - `config`: Configuration management.
//! - `db`: Database connection, pool and schema bootstrap.
//! - `eligibility`: Contractor territory/subscription filtering.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `lead_store`: Lead repository (upsert, scoring batches).
//! - `models`: Core data models.
//! - `notify`: Best-effort contractor notification client.
//! - `scoring`: Pure score computation with versioned weights.

pub mod assignment;
pub mod auth;
pub mod batch;
pub mod cache_validator;
pub mod config;
pub mod db;
pub mod eligibility;
pub mod errors;
pub mod handlers;
pub mod lead_store;
pub mod models;
pub mod notify;
pub mod scoring;

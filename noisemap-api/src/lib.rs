//! noisemap-api library interface
//!
//! Exposes application state and router construction for the binary and
//! for integration tests.

pub mod aggregate;
pub mod api;
pub mod classifier;
pub mod db;
pub mod error;
pub mod features;
pub mod ingest;
pub mod models;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::classifier::Classifier;
use crate::db::ReadingStore;
use crate::ingest::IngestService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Reading persistence and queries
    pub store: ReadingStore,
    /// Ingestion pipeline
    pub ingest: IngestService,
    /// Loaded classifier artifact; read-only for the process lifetime
    pub classifier: Arc<Classifier>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, classifier: Classifier) -> Self {
        let store = ReadingStore::new(db.clone());
        let classifier = Arc::new(classifier);
        let ingest = IngestService::new(store.clone(), classifier.clone());
        Self {
            db,
            store,
            ingest,
            classifier,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router.
///
/// CORS is permissive: the dashboard client is served from a different
/// origin and consumes the aggregate endpoints directly.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::ingest_routes())
        .merge(api::reading_routes())
        .merge(api::infer_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

//! Database access for noisemap-api
//!
//! One SQLite database holding the `noise_readings` table, a secondary
//! index on `timestamp`, and an R*Tree virtual table over the reading
//! locations for spatial range predicates. Connections come from a bounded
//! pool with scoped acquisition per operation, never opened ad hoc.

pub mod readings;

pub use readings::ReadingStore;

use noisemap_common::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;

/// Upper bound on concurrent storage connections
const MAX_CONNECTIONS: u32 = 8;

/// Initialize the database connection pool and schema
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect(&db_url)
        .await?;

    init_schema(&pool).await?;

    Ok(pool)
}

/// Create tables and indexes if they don't exist.
///
/// The R*Tree rows are keyed by the reading's rowid and are written in the
/// same transaction as the reading itself, so the two never diverge.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS noise_readings (
            id TEXT PRIMARY KEY,
            device_id TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            lat REAL NOT NULL,
            lon REAL NOT NULL,
            db_level REAL NOT NULL,
            source_label TEXT,
            features TEXT,
            raw_audio_path TEXT,
            processed INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_noise_readings_timestamp ON noise_readings (timestamp)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS noise_readings_geo USING rtree(
            rid,
            min_lat, max_lat,
            min_lon, max_lon
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database schema initialized (noise_readings, noise_readings_geo)");

    Ok(())
}

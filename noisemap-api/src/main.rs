//! noisemap-api - Noise reading ingestion and aggregation service
//!
//! Collects geotagged ambient-noise readings, enriches them with
//! audio-derived features and a trained source-label classifier, and serves
//! spatial/temporal aggregates for visualization clients.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use noisemap_api::classifier::Classifier;
use noisemap_api::AppState;
use noisemap_common::config::ServiceConfig;

#[derive(Parser, Debug)]
#[command(name = "noisemap-api", version, about = "NoiseMap ingestion and aggregation service")]
struct Args {
    /// HTTP listen port
    #[arg(long)]
    port: Option<u16>,

    /// Path to the SQLite database file
    #[arg(long)]
    database: Option<PathBuf>,

    /// Path to the classifier artifact (omit to run without a model)
    #[arg(long)]
    model: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting noisemap-api (reading ingestion and aggregation)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = ServiceConfig::resolve(args.port, args.database, args.model)?;

    // Initialize database connection pool
    let db_pool = noisemap_api::db::init_database_pool(&config.database_path).await?;
    info!("Database connection established");

    // Load the classifier artifact once; it stays read-only for the
    // process lifetime
    let classifier = Classifier::load(config.model_path.as_deref());

    // Create application state and router
    let state = AppState::new(db_pool, classifier);
    let app = noisemap_api::build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!("Listening on http://0.0.0.0:{}", config.port);
    info!("Health check: http://127.0.0.1:{}/health", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}

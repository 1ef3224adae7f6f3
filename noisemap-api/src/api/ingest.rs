//! Reading ingestion endpoint

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::json;

use crate::error::ApiResult;
use crate::models::ReadingSubmission;
use crate::AppState;

/// POST /ingest
///
/// Validates and persists one reading, returning the assigned id. A
/// validation failure reports a readable reason and persists nothing.
pub async fn ingest_reading(
    State(state): State<AppState>,
    Json(submission): Json<ReadingSubmission>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let id = state.ingest.ingest(submission).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

/// Build ingestion routes
pub fn ingest_routes() -> Router<AppState> {
    Router::new().route("/ingest", post(ingest_reading))
}

//! Reading query and aggregate endpoints

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::Duration;
use serde::Deserialize;

use noisemap_common::time::parse_timestamp;
use noisemap_common::Error;

use crate::aggregate::{self, BoundingBox};
use crate::error::ApiResult;
use crate::models::{HeatmapCell, ReadingSummary, TimeBucket};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RecentParams {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    1000
}

/// GET /readings/recent?limit=1000
pub async fn recent(
    State(state): State<AppState>,
    Query(params): Query<RecentParams>,
) -> ApiResult<Json<Vec<ReadingSummary>>> {
    let readings = state.store.recent(params.limit).await?;
    Ok(Json(readings))
}

#[derive(Debug, Deserialize)]
pub struct HeatmapParams {
    #[serde(default = "default_hours")]
    pub hours: i64,
    /// Optional `min_lat,min_lon,max_lat,max_lon`
    pub bbox: Option<String>,
}

fn default_hours() -> i64 {
    168
}

/// GET /readings/heatmap?hours=168&bbox=min_lat,min_lon,max_lat,max_lon
pub async fn heatmap(
    State(state): State<AppState>,
    Query(params): Query<HeatmapParams>,
) -> ApiResult<Json<Vec<HeatmapCell>>> {
    let bbox = params.bbox.as_deref().map(parse_bbox).transpose()?;
    let cells = aggregate::heatmap(
        &state.store,
        noisemap_common::time::now(),
        Duration::hours(params.hours),
        bbox,
    )
    .await?;
    Ok(Json(cells))
}

#[derive(Debug, Deserialize)]
pub struct TimeSeriesParams {
    #[serde(default = "default_bucket_seconds")]
    pub bucket_seconds: i64,
    /// Optional RFC3339 window bounds
    pub start: Option<String>,
    pub end: Option<String>,
}

fn default_bucket_seconds() -> i64 {
    3600
}

/// GET /readings/timeseries?bucket_seconds=3600&start=...&end=...
pub async fn time_series(
    State(state): State<AppState>,
    Query(params): Query<TimeSeriesParams>,
) -> ApiResult<Json<Vec<TimeBucket>>> {
    let range = match (&params.start, &params.end) {
        (Some(start), Some(end)) => Some((parse_timestamp(start)?, parse_timestamp(end)?)),
        (None, None) => None,
        _ => {
            return Err(Error::Validation(
                "start and end must be supplied together".to_string(),
            )
            .into())
        }
    };

    let buckets = aggregate::time_series(&state.store, params.bucket_seconds, range).await?;
    Ok(Json(buckets))
}

/// Parse `min_lat,min_lon,max_lat,max_lon`
fn parse_bbox(raw: &str) -> Result<BoundingBox, Error> {
    let parts: Vec<f64> = raw
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| Error::Validation(format!("Invalid bbox '{}'", raw)))?;

    match parts[..] {
        [min_lat, min_lon, max_lat, max_lon] => Ok(BoundingBox {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }),
        _ => Err(Error::Validation(format!(
            "bbox expects 4 comma-separated values, got {}",
            parts.len()
        ))),
    }
}

/// Build reading query routes
pub fn reading_routes() -> Router<AppState> {
    Router::new()
        .route("/readings/recent", get(recent))
        .route("/readings/heatmap", get(heatmap))
        .route("/readings/timeseries", get(time_series))
}

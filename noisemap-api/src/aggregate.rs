//! Spatiotemporal aggregation over stored readings
//!
//! Two pure read operations: spatial heatmap bins and epoch-aligned time
//! buckets. Each call runs as a single snapshot read against the store;
//! nothing is mutated, so an abandoned call leaves nothing to clean up.

use chrono::{DateTime, Duration, Utc};
use futures::TryStreamExt;
use noisemap_common::time::{bucket_start, from_epoch_seconds};
use noisemap_common::{Error, Result};
use sqlx::Row;
use std::collections::BTreeMap;

use crate::db::ReadingStore;
use crate::models::{HeatmapCell, TimeBucket};

/// Optional spatial filter for the heatmap, served via the R*Tree index
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    fn validate(&self) -> Result<()> {
        ReadingStore::validate_point(self.min_lat, self.min_lon, 0.0)?;
        ReadingStore::validate_point(self.max_lat, self.max_lon, 0.0)?;
        if self.min_lat > self.max_lat || self.min_lon > self.max_lon {
            return Err(Error::Validation(
                "bounding box minimum exceeds maximum".to_string(),
            ));
        }
        Ok(())
    }
}

/// Spatial bins over readings with `timestamp` in `[now − window, now)`.
///
/// Cells are keyed by coordinates rounded to 4 decimal digits (~11 m); cells
/// with no readings are omitted. A zero window yields an empty result, a
/// negative window is a validation error. `now` is a parameter so callers
/// (and tests) control the reference instant.
pub async fn heatmap(
    store: &ReadingStore,
    now: DateTime<Utc>,
    window: Duration,
    bbox: Option<BoundingBox>,
) -> Result<Vec<HeatmapCell>> {
    if window < Duration::zero() {
        return Err(Error::Validation(
            "time window must be non-negative".to_string(),
        ));
    }
    if window.is_zero() {
        return Ok(Vec::new());
    }

    let since = noisemap_common::time::format_timestamp(now - window);
    let until = noisemap_common::time::format_timestamp(now);

    let rows = match bbox {
        None => {
            sqlx::query(
                r#"
                SELECT ROUND(lat, 4) AS lat_r, ROUND(lon, 4) AS lon_r,
                       AVG(db_level) AS avg_db, COUNT(*) AS n
                FROM noise_readings
                WHERE timestamp >= ? AND timestamp < ?
                GROUP BY lat_r, lon_r
                ORDER BY lat_r, lon_r
                "#,
            )
            .bind(&since)
            .bind(&until)
            .fetch_all(store.pool())
            .await?
        }
        Some(bbox) => {
            bbox.validate()?;
            sqlx::query(
                r#"
                SELECT ROUND(r.lat, 4) AS lat_r, ROUND(r.lon, 4) AS lon_r,
                       AVG(r.db_level) AS avg_db, COUNT(*) AS n
                FROM noise_readings r
                JOIN noise_readings_geo g ON g.rid = r.rowid
                WHERE r.timestamp >= ? AND r.timestamp < ?
                  AND g.max_lat >= ? AND g.min_lat <= ?
                  AND g.max_lon >= ? AND g.min_lon <= ?
                  AND r.lat BETWEEN ? AND ?
                  AND r.lon BETWEEN ? AND ?
                GROUP BY lat_r, lon_r
                ORDER BY lat_r, lon_r
                "#,
            )
            .bind(&since)
            .bind(&until)
            .bind(bbox.min_lat)
            .bind(bbox.max_lat)
            .bind(bbox.min_lon)
            .bind(bbox.max_lon)
            .bind(bbox.min_lat)
            .bind(bbox.max_lat)
            .bind(bbox.min_lon)
            .bind(bbox.max_lon)
            .fetch_all(store.pool())
            .await?
        }
    };

    rows.iter()
        .map(|row| {
            Ok(HeatmapCell {
                lat_r: row.try_get("lat_r")?,
                lon_r: row.try_get("lon_r")?,
                avg_db: row.try_get("avg_db")?,
                n: row.try_get("n")?,
            })
        })
        .collect()
}

/// Mean level per epoch-aligned bucket of `bucket_seconds`, chronological,
/// non-empty buckets only. `range` limits the scan to `[start, end)`;
/// without it every stored reading is bucketed.
///
/// Boundaries depend only on the width, so repeated calls with the same
/// width and unchanged data return identical results.
pub async fn time_series(
    store: &ReadingStore,
    bucket_seconds: i64,
    range: Option<(DateTime<Utc>, DateTime<Utc>)>,
) -> Result<Vec<TimeBucket>> {
    if bucket_seconds <= 0 {
        return Err(Error::Validation(format!(
            "bucket width must be positive, got {}s",
            bucket_seconds
        )));
    }

    let mut scan = match range {
        Some((start, end)) => store.scan_window(start, end),
        None => store.scan_all(),
    };

    // bucket start -> (sum, count); BTreeMap keeps chronological order
    let mut buckets: BTreeMap<i64, (f64, i64)> = BTreeMap::new();
    while let Some(reading) = scan.try_next().await? {
        let bucket = bucket_start(reading.timestamp, bucket_seconds);
        let entry = buckets.entry(bucket).or_insert((0.0, 0));
        entry.0 += reading.db_level;
        entry.1 += 1;
    }

    buckets
        .into_iter()
        .map(|(start, (sum, n))| {
            Ok(TimeBucket {
                bucket_start: from_epoch_seconds(start)?,
                avg_db: sum / n as f64,
                n,
            })
        })
        .collect()
}

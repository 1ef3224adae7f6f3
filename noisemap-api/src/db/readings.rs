//! Noise reading persistence and queries

use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use noisemap_common::time::{format_timestamp, parse_timestamp};
use noisemap_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{NoiseReading, ReadingSummary};

/// Exclusive owner of persisted reading rows. Aggregation and API layers
/// only read through it; the ingestion service is the only writer.
#[derive(Debug, Clone)]
pub struct ReadingStore {
    pool: SqlitePool,
}

impl ReadingStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Pool handle for read-only aggregate queries
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Validate coordinate bounds and level finiteness.
    ///
    /// Every persisted reading must have a spatial point derivable from its
    /// location, so out-of-range coordinates are rejected before any write.
    pub fn validate_point(lat: f64, lon: f64, db_level: f64) -> Result<()> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(Error::Validation(format!(
                "lat must be within [-90, 90], got {}",
                lat
            )));
        }
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(Error::Validation(format!(
                "lon must be within [-180, 180], got {}",
                lon
            )));
        }
        if !db_level.is_finite() {
            return Err(Error::Validation("db_level must be finite".to_string()));
        }
        Ok(())
    }

    /// Persist a reading atomically: the row and its spatial index entry
    /// commit together or not at all. Returns the reading id.
    pub async fn insert(&self, reading: &NoiseReading) -> Result<Uuid> {
        Self::validate_point(reading.lat, reading.lon, reading.db_level)?;

        let features = reading
            .features
            .as_ref()
            .map(|f| serde_json::to_string(f))
            .transpose()
            .map_err(|e| Error::Internal(format!("Failed to serialize features: {}", e)))?;

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO noise_readings (
                id, device_id, timestamp, lat, lon, db_level,
                source_label, features, raw_audio_path, processed, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(reading.id.to_string())
        .bind(&reading.device_id)
        .bind(format_timestamp(reading.timestamp))
        .bind(reading.lat)
        .bind(reading.lon)
        .bind(reading.db_level)
        .bind(&reading.source_label)
        .bind(&features)
        .bind(&reading.raw_audio_path)
        .bind(reading.processed)
        .bind(format_timestamp(reading.created_at))
        .execute(&mut *tx)
        .await?;

        // Degenerate point box keyed by the reading's rowid
        sqlx::query(
            r#"
            INSERT INTO noise_readings_geo (rid, min_lat, max_lat, min_lon, max_lon)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(result.last_insert_rowid())
        .bind(reading.lat)
        .bind(reading.lat)
        .bind(reading.lon)
        .bind(reading.lon)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(reading.id)
    }

    /// Up to `limit` most recent readings by measurement timestamp,
    /// ties broken by insertion order
    pub async fn recent(&self, limit: i64) -> Result<Vec<ReadingSummary>> {
        if limit <= 0 {
            return Err(Error::Validation(format!(
                "limit must be a positive integer, got {}",
                limit
            )));
        }

        let rows = sqlx::query(
            r#"
            SELECT id, device_id, timestamp, lat, lon, db_level, source_label
            FROM noise_readings
            ORDER BY timestamp DESC, rowid ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(summary_from_row).collect()
    }

    /// Lazy stream of readings with `start <= timestamp < end`, in
    /// chronological order. Restartable: each call opens a fresh scan.
    pub fn scan_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BoxStream<'_, Result<NoiseReading>> {
        sqlx::query(
            r#"
            SELECT id, device_id, timestamp, lat, lon, db_level,
                   source_label, features, raw_audio_path, processed, created_at
            FROM noise_readings
            WHERE timestamp >= ? AND timestamp < ?
            ORDER BY timestamp ASC, rowid ASC
            "#,
        )
        .bind(format_timestamp(start))
        .bind(format_timestamp(end))
        .fetch(&self.pool)
        .map(|row| row.map_err(Error::Database).and_then(|r| reading_from_row(&r)))
        .boxed()
    }

    /// Lazy stream of every reading in chronological order
    pub fn scan_all(&self) -> BoxStream<'_, Result<NoiseReading>> {
        sqlx::query(
            r#"
            SELECT id, device_id, timestamp, lat, lon, db_level,
                   source_label, features, raw_audio_path, processed, created_at
            FROM noise_readings
            ORDER BY timestamp ASC, rowid ASC
            "#,
        )
        .fetch(&self.pool)
        .map(|row| row.map_err(Error::Database).and_then(|r| reading_from_row(&r)))
        .boxed()
    }

    /// All readings whose location falls inside the bounding box, served
    /// through the R*Tree index (candidate boxes are single-precision, so
    /// the exact predicate is re-checked against the stored scalars).
    pub async fn readings_in_bbox(
        &self,
        min_lat: f64,
        min_lon: f64,
        max_lat: f64,
        max_lon: f64,
    ) -> Result<Vec<NoiseReading>> {
        Self::validate_point(min_lat, min_lon, 0.0)?;
        Self::validate_point(max_lat, max_lon, 0.0)?;
        if min_lat > max_lat || min_lon > max_lon {
            return Err(Error::Validation(
                "bounding box minimum exceeds maximum".to_string(),
            ));
        }

        let rows = sqlx::query(
            r#"
            SELECT r.id, r.device_id, r.timestamp, r.lat, r.lon, r.db_level,
                   r.source_label, r.features, r.raw_audio_path, r.processed, r.created_at
            FROM noise_readings r
            JOIN noise_readings_geo g ON g.rid = r.rowid
            WHERE g.max_lat >= ? AND g.min_lat <= ?
              AND g.max_lon >= ? AND g.min_lon <= ?
              AND r.lat BETWEEN ? AND ?
              AND r.lon BETWEEN ? AND ?
            ORDER BY r.timestamp ASC, r.rowid ASC
            "#,
        )
        .bind(min_lat)
        .bind(max_lat)
        .bind(min_lon)
        .bind(max_lon)
        .bind(min_lat)
        .bind(max_lat)
        .bind(min_lon)
        .bind(max_lon)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(reading_from_row).collect()
    }

    /// Total persisted reading count
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM noise_readings")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn summary_from_row(row: &SqliteRow) -> Result<ReadingSummary> {
    Ok(ReadingSummary {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        device_id: row.try_get("device_id")?,
        timestamp: parse_timestamp(&row.try_get::<String, _>("timestamp")?)?,
        lat: row.try_get("lat")?,
        lon: row.try_get("lon")?,
        db_level: row.try_get("db_level")?,
        source_label: row.try_get("source_label")?,
    })
}

fn reading_from_row(row: &SqliteRow) -> Result<NoiseReading> {
    let features = row
        .try_get::<Option<String>, _>("features")?
        .map(|f| serde_json::from_str(&f))
        .transpose()
        .map_err(|e| Error::Internal(format!("Corrupt features blob: {}", e)))?;

    Ok(NoiseReading {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        device_id: row.try_get("device_id")?,
        timestamp: parse_timestamp(&row.try_get::<String, _>("timestamp")?)?,
        lat: row.try_get("lat")?,
        lon: row.try_get("lon")?,
        db_level: row.try_get("db_level")?,
        source_label: row.try_get("source_label")?,
        features,
        raw_audio_path: row.try_get("raw_audio_path")?,
        processed: row.try_get("processed")?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::Internal(format!("Corrupt reading id '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_store() -> ReadingStore {
        // Single connection keeps one shared :memory: database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");
        crate::db::init_schema(&pool).await.expect("schema");
        ReadingStore::new(pool)
    }

    fn reading(ts: DateTime<Utc>, lat: f64, lon: f64, db_level: f64) -> NoiseReading {
        NoiseReading {
            id: Uuid::new_v4(),
            device_id: "d1".to_string(),
            timestamp: ts,
            lat,
            lon,
            db_level,
            source_label: None,
            features: None,
            raw_audio_path: None,
            processed: false,
            created_at: Utc::now(),
        }
    }

    fn ts(s: &str) -> DateTime<Utc> {
        parse_timestamp(s).unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_recent_round_trip() {
        let store = memory_store().await;
        let r = reading(ts("2024-01-01T00:00:00Z"), 40.0, -73.0, 72.5);
        let id = store.insert(&r).await.unwrap();
        assert_eq!(id, r.id);

        let recent = store.recent(1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, r.id);
        assert_eq!(recent[0].device_id, "d1");
        assert_eq!(recent[0].timestamp, r.timestamp);
        assert_eq!(recent[0].db_level, 72.5);
    }

    #[tokio::test]
    async fn test_insert_rejects_out_of_range_lat() {
        let store = memory_store().await;
        let r = reading(Utc::now(), 91.0, 0.0, 60.0);
        assert!(matches!(
            store.insert(&r).await,
            Err(Error::Validation(_))
        ));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_insert_rejects_out_of_range_lon() {
        let store = memory_store().await;
        let r = reading(Utc::now(), 0.0, -180.5, 60.0);
        assert!(matches!(
            store.insert(&r).await,
            Err(Error::Validation(_))
        ));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_insert_rejects_non_finite_level() {
        let store = memory_store().await;
        let r = reading(Utc::now(), 0.0, 0.0, f64::NAN);
        assert!(matches!(
            store.insert(&r).await,
            Err(Error::Validation(_))
        ));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_recent_orders_by_timestamp_descending() {
        let store = memory_store().await;
        let older = reading(ts("2024-01-01T00:00:00Z"), 0.0, 0.0, 50.0);
        let newer = reading(ts("2024-01-02T00:00:00Z"), 0.0, 0.0, 60.0);
        store.insert(&older).await.unwrap();
        store.insert(&newer).await.unwrap();

        let recent = store.recent(10).await.unwrap();
        assert_eq!(recent[0].id, newer.id);
        assert_eq!(recent[1].id, older.id);
    }

    #[tokio::test]
    async fn test_recent_ties_broken_by_insertion_order() {
        let store = memory_store().await;
        let when = ts("2024-01-01T00:00:00Z");
        let first = reading(when, 0.0, 0.0, 50.0);
        let second = reading(when, 0.0, 0.0, 60.0);
        store.insert(&first).await.unwrap();
        store.insert(&second).await.unwrap();

        let recent = store.recent(10).await.unwrap();
        assert_eq!(recent[0].id, first.id);
        assert_eq!(recent[1].id, second.id);
    }

    #[tokio::test]
    async fn test_recent_rejects_non_positive_limit() {
        let store = memory_store().await;
        assert!(matches!(store.recent(0).await, Err(Error::Validation(_))));
        assert!(matches!(store.recent(-5).await, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_scan_window_is_half_open() {
        let store = memory_store().await;
        let inside_start = reading(ts("2024-01-01T00:00:00Z"), 0.0, 0.0, 50.0);
        let inside = reading(ts("2024-01-01T12:00:00Z"), 0.0, 0.0, 55.0);
        let at_end = reading(ts("2024-01-02T00:00:00Z"), 0.0, 0.0, 60.0);
        for r in [&inside_start, &inside, &at_end] {
            store.insert(r).await.unwrap();
        }

        let scanned: Vec<NoiseReading> = store
            .scan_window(ts("2024-01-01T00:00:00Z"), ts("2024-01-02T00:00:00Z"))
            .try_collect()
            .await
            .unwrap();

        let ids: Vec<Uuid> = scanned.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![inside_start.id, inside.id]);
    }

    #[tokio::test]
    async fn test_scan_window_restartable() {
        let store = memory_store().await;
        store
            .insert(&reading(ts("2024-01-01T06:00:00Z"), 1.0, 2.0, 40.0))
            .await
            .unwrap();

        let window = (ts("2024-01-01T00:00:00Z"), ts("2024-01-02T00:00:00Z"));
        let first: Vec<NoiseReading> = store
            .scan_window(window.0, window.1)
            .try_collect()
            .await
            .unwrap();
        let second: Vec<NoiseReading> = store
            .scan_window(window.0, window.1)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].id, second[0].id);
    }

    #[tokio::test]
    async fn test_bbox_query_filters_by_location() {
        let store = memory_store().await;
        let inside = reading(Utc::now(), 40.0, -73.0, 70.0);
        let outside = reading(Utc::now(), 51.5, -0.1, 60.0);
        store.insert(&inside).await.unwrap();
        store.insert(&outside).await.unwrap();

        let found = store
            .readings_in_bbox(39.0, -74.0, 41.0, -72.0)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, inside.id);
    }

    #[tokio::test]
    async fn test_bbox_rejects_inverted_box() {
        let store = memory_store().await;
        assert!(matches!(
            store.readings_in_bbox(41.0, -73.0, 40.0, -72.0).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_features_blob_round_trip() {
        let store = memory_store().await;
        let mut r = reading(ts("2024-03-01T00:00:00Z"), 10.0, 10.0, 45.0);
        r.features = Some(serde_json::json!({"rms": 0.2, "zcr": 0.1, "mfcc_mean": [0.0, 1.0]}));
        r.source_label = Some("traffic".to_string());
        r.processed = true;
        store.insert(&r).await.unwrap();

        let scanned: Vec<NoiseReading> = store
            .scan_window(ts("2024-03-01T00:00:00Z"), ts("2024-03-02T00:00:00Z"))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(scanned[0].features, r.features);
        assert_eq!(scanned[0].source_label.as_deref(), Some("traffic"));
        assert!(scanned[0].processed);
    }

    #[test]
    fn test_validate_point_boundaries() {
        assert!(ReadingStore::validate_point(90.0, 180.0, 0.0).is_ok());
        assert!(ReadingStore::validate_point(-90.0, -180.0, 0.0).is_ok());
        assert!(ReadingStore::validate_point(90.01, 0.0, 0.0).is_err());
        assert!(ReadingStore::validate_point(0.0, 180.01, 0.0).is_err());
        assert!(ReadingStore::validate_point(f64::NAN, 0.0, 0.0).is_err());
    }
}

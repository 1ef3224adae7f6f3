//! Reading ingestion pipeline
//!
//! Each submission moves through explicit stages: received →
//! [`ValidatedReading`] → [`EnrichedReading`] → persisted. The stages are
//! distinct types, so an unvalidated submission cannot reach the store and
//! a reading cannot be persisted with its label attempt unresolved.
//!
//! Classification problems never block ingestion: they downgrade the label
//! to `"unknown"` and the reason is logged out of band. Storage failures
//! always surface to the caller.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use noisemap_common::time::parse_timestamp;
use noisemap_common::{Error, Result};

use crate::classifier::{Classification, Classifier};
use crate::db::ReadingStore;
use crate::features;
use crate::models::{FeaturePayload, NoiseReading, ReadingSubmission, LABEL_UNKNOWN};

/// A submission whose required fields are present and in range
#[derive(Debug)]
struct ValidatedReading {
    device_id: String,
    timestamp: DateTime<Utc>,
    lat: f64,
    lon: f64,
    db_level: f64,
    source_label: Option<String>,
    features: Option<serde_json::Value>,
    raw_audio_path: Option<String>,
}

/// A validated reading with its label attempt resolved
#[derive(Debug)]
struct EnrichedReading {
    reading: ValidatedReading,
    /// True once extraction/classification was attempted
    processed: bool,
}

/// Ingestion service: validates, enriches, persists
#[derive(Clone)]
pub struct IngestService {
    store: ReadingStore,
    classifier: Arc<Classifier>,
}

impl IngestService {
    pub fn new(store: ReadingStore, classifier: Arc<Classifier>) -> Self {
        Self { store, classifier }
    }

    /// Run a submission through the full pipeline and return the assigned
    /// id. Either the reading is fully persisted or nothing is written.
    /// No retries here; retry policy belongs to the caller.
    pub async fn ingest(&self, submission: ReadingSubmission) -> Result<Uuid> {
        let validated = validate(submission)?;
        let enriched = self.enrich(validated);
        self.persist(enriched).await
    }

    /// Resolve the label attempt for a validated reading.
    ///
    /// Caller-supplied labels are stored verbatim with no attempt made.
    /// Otherwise classification is attempted from the best available
    /// material (inline features, then referenced audio), falling back to
    /// the explicit `"unknown"` sentinel.
    fn enrich(&self, mut reading: ValidatedReading) -> EnrichedReading {
        if reading.source_label.is_some() {
            return EnrichedReading {
                reading,
                processed: false,
            };
        }

        let (label, extracted) = if let Some(features) = &reading.features {
            (self.classify_payload(features), None)
        } else if let Some(path) = &reading.raw_audio_path {
            self.classify_audio(Path::new(path))
        } else {
            debug!(device_id = %reading.device_id, "No features or audio, labelling unknown");
            (LABEL_UNKNOWN.to_string(), None)
        };

        if extracted.is_some() {
            reading.features = extracted;
        }
        reading.source_label = Some(label);
        EnrichedReading {
            reading,
            processed: true,
        }
    }

    /// Classify from an inline feature blob
    fn classify_payload(&self, features: &serde_json::Value) -> String {
        let payload: FeaturePayload = match serde_json::from_value(features.clone()) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Feature blob not interpretable, labelling unknown");
                return LABEL_UNKNOWN.to_string();
            }
        };

        match self.classifier.classify(&payload.to_model_input()) {
            Ok(Classification::Label(label)) => label,
            Ok(Classification::Unknown { detail }) => {
                debug!(detail = detail, "Classifier returned unknown");
                LABEL_UNKNOWN.to_string()
            }
            Err(shape) => {
                warn!(error = %shape, "Feature shape mismatch, labelling unknown");
                LABEL_UNKNOWN.to_string()
            }
        }
    }

    /// Extract features from referenced audio, then classify. Returns the
    /// label and the extracted features (kept for later re-analysis).
    fn classify_audio(&self, path: &Path) -> (String, Option<serde_json::Value>) {
        let vector = match features::extract_from_file(path) {
            Ok(vector) => vector,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Audio unusable, labelling unknown");
                return (LABEL_UNKNOWN.to_string(), None);
            }
        };

        let label = match self.classifier.classify(&vector.to_model_input()) {
            Ok(classification) => classification.label().to_string(),
            Err(shape) => {
                warn!(error = %shape, "Feature shape mismatch, labelling unknown");
                LABEL_UNKNOWN.to_string()
            }
        };

        let blob = serde_json::to_value(&vector).ok();
        (label, blob)
    }

    async fn persist(&self, enriched: EnrichedReading) -> Result<Uuid> {
        let r = enriched.reading;
        let reading = NoiseReading {
            id: Uuid::new_v4(),
            device_id: r.device_id,
            timestamp: r.timestamp,
            lat: r.lat,
            lon: r.lon,
            db_level: r.db_level,
            source_label: r.source_label,
            features: r.features,
            raw_audio_path: r.raw_audio_path,
            processed: enriched.processed,
            created_at: Utc::now(),
        };

        self.store.insert(&reading).await
    }
}

/// Check required fields and coordinate bounds. Nothing is persisted for a
/// submission that fails here.
fn validate(submission: ReadingSubmission) -> Result<ValidatedReading> {
    let device_id = submission
        .device_id
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| Error::Validation("device_id is required".to_string()))?;

    let timestamp = submission
        .timestamp
        .ok_or_else(|| Error::Validation("timestamp is required".to_string()))?;
    let timestamp = parse_timestamp(&timestamp)?;

    let lat = submission
        .lat
        .ok_or_else(|| Error::Validation("lat is required".to_string()))?;
    let lon = submission
        .lon
        .ok_or_else(|| Error::Validation("lon is required".to_string()))?;
    let db_level = submission
        .db_level
        .ok_or_else(|| Error::Validation("db_level is required".to_string()))?;

    ReadingStore::validate_point(lat, lon, db_level)?;

    Ok(ValidatedReading {
        device_id,
        timestamp,
        lat,
        lon,
        db_level,
        source_label: submission.source_label,
        features: submission.features,
        raw_audio_path: submission.raw_audio_path,
    })
}

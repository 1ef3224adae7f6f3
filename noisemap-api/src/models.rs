//! Domain types for noise readings, features, and aggregates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sentinel label for readings the classifier could not (or cannot yet) label.
///
/// Distinct from an absent label: `"unknown"` records that a classification
/// attempt happened, `NULL` means no attempt was ever made.
pub const LABEL_UNKNOWN: &str = "unknown";

/// Fixed-length audio feature summary.
///
/// Dimensionality and ordering are what the classifier artifact was trained
/// on: 13 MFCC coefficient means followed by RMS energy and zero-crossing
/// rate. Computed once per audio source and never mutated afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// RMS energy over the whole clip
    pub rms: f32,
    /// Zero-crossing rate (fraction of sign changes)
    pub zcr: f32,
    /// Mean of each of the 13 MFCC coefficients, order-significant
    pub mfcc_mean: [f32; 13],
}

impl FeatureVector {
    /// Total model input width
    pub const DIM: usize = 15;

    /// Flatten into the layout the classifier artifact was trained on:
    /// `[mfcc_0..mfcc_12, rms, zcr]`
    pub fn to_model_input(&self) -> Vec<f32> {
        let mut input = Vec::with_capacity(Self::DIM);
        input.extend_from_slice(&self.mfcc_mean);
        input.push(self.rms);
        input.push(self.zcr);
        input
    }
}

/// One persisted geotagged noise observation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoiseReading {
    /// Globally unique identifier, assigned at creation
    pub id: Uuid,
    /// Opaque sensor identifier, not unique across readings
    pub device_id: String,
    /// When the measurement was taken (not insertion time)
    pub timestamp: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    /// Sound pressure level in decibels; finite, otherwise unbounded
    pub db_level: f64,
    /// Classifier or human-assigned label; `"unknown"` is an explicit value
    pub source_label: Option<String>,
    /// Opaque feature blob kept alongside the row for later re-analysis
    pub features: Option<serde_json::Value>,
    /// Reference into external audio storage, not validated here
    pub raw_audio_path: Option<String>,
    /// True once a feature extraction / classification attempt was made
    pub processed: bool,
    /// Insertion timestamp, system-assigned
    pub created_at: DateTime<Utc>,
}

/// Raw ingestion payload as submitted by a sensor.
///
/// All fields optional at the wire level; [`crate::ingest`] validates the
/// required ones and reports missing fields with a readable reason instead
/// of a deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReadingSubmission {
    pub device_id: Option<String>,
    /// RFC3339 timestamp string
    pub timestamp: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub db_level: Option<f64>,
    pub source_label: Option<String>,
    pub features: Option<serde_json::Value>,
    pub raw_audio_path: Option<String>,
}

/// Reading summary returned by the recent-readings endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ReadingSummary {
    pub id: Uuid,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    pub db_level: f64,
    pub source_label: Option<String>,
}

/// One heatmap cell: coordinates rounded to 4 decimal digits (~11 m),
/// mean level and sample count. Computed on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapCell {
    pub lat_r: f64,
    pub lon_r: f64,
    pub avg_db: f64,
    pub n: i64,
}

/// One time-series point: epoch-aligned bucket start and mean level
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeBucket {
    pub bucket_start: DateTime<Utc>,
    pub avg_db: f64,
    pub n: i64,
}

/// Feature payload accepted by the classification endpoint.
///
/// Missing scalars default to 0.0; the assembled vector is shape-checked
/// against the loaded artifact before any inference runs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeaturePayload {
    #[serde(default)]
    pub mfcc_mean: Vec<f32>,
    pub rms: Option<f32>,
    pub zcr: Option<f32>,
}

impl FeaturePayload {
    /// Assemble the model input in training order
    pub fn to_model_input(&self) -> Vec<f32> {
        let mut input = Vec::with_capacity(self.mfcc_mean.len() + 2);
        input.extend_from_slice(&self.mfcc_mean);
        input.push(self.rms.unwrap_or(0.0));
        input.push(self.zcr.unwrap_or(0.0));
        input
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_vector_model_input_order() {
        let vector = FeatureVector {
            rms: 0.5,
            zcr: 0.1,
            mfcc_mean: [
                1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0, 13.0,
            ],
        };

        let input = vector.to_model_input();
        assert_eq!(input.len(), FeatureVector::DIM);
        assert_eq!(input[0], 1.0);
        assert_eq!(input[12], 13.0);
        assert_eq!(input[13], 0.5);
        assert_eq!(input[14], 0.1);
    }

    #[test]
    fn test_feature_payload_defaults_missing_scalars() {
        let payload: FeaturePayload = serde_json::from_str(r#"{"mfcc_mean":[1.0,2.0]}"#).unwrap();
        let input = payload.to_model_input();
        assert_eq!(input, vec![1.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn test_feature_payload_empty_object() {
        let payload: FeaturePayload = serde_json::from_str("{}").unwrap();
        assert_eq!(payload.to_model_input(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_feature_vector_serde_round_trip() {
        let vector = FeatureVector {
            rms: 0.25,
            zcr: 0.05,
            mfcc_mean: [0.0; 13],
        };
        let json = serde_json::to_value(&vector).unwrap();
        assert!(json.get("mfcc_mean").unwrap().is_array());
        let back: FeatureVector = serde_json::from_value(json).unwrap();
        assert_eq!(back, vector);
    }
}

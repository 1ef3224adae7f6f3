//! Source-label classifier adapter
//!
//! Wraps the pre-trained artifact produced by the offline trainer: a
//! versioned JSON file holding per-class centroids in standardized feature
//! space. The artifact is loaded once at startup, shared read-only for the
//! process lifetime, and never reloaded. Running without an artifact is a
//! supported mode: classification then yields the `"unknown"` sentinel
//! rather than an error.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::LABEL_UNKNOWN;

/// Detail string reported when classification runs without a loaded model
pub const NO_MODEL_DETAIL: &str = "no model available on server";

/// Input width mismatch, checked before any model math runs
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Feature vector has {actual} values, model expects {expected}")]
pub struct FeatureShape {
    pub expected: usize,
    pub actual: usize,
}

/// Classification outcome. `Unknown` covers the no-model case and is a
/// first-class result, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// A label from the artifact's trained class set
    Label(String),
    /// No model loaded; `detail` explains why
    Unknown { detail: &'static str },
}

impl Classification {
    /// The label string to persist with a reading
    pub fn label(&self) -> &str {
        match self {
            Classification::Label(label) => label,
            Classification::Unknown { .. } => LABEL_UNKNOWN,
        }
    }
}

/// Per-feature standardization parameters fitted at training time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scaler {
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
}

impl Scaler {
    fn transform(&self, input: &[f32]) -> Vec<f32> {
        input
            .iter()
            .zip(self.mean.iter().zip(self.std.iter()))
            .map(|(&x, (&mean, &std))| (x - mean) / std.max(1e-8))
            .collect()
    }
}

/// Serialized model artifact: trained class set plus one centroid per class
/// in standardized feature space
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: u32,
    pub classes: Vec<String>,
    pub n_features: usize,
    pub scaler: Scaler,
    pub centroids: Vec<Vec<f32>>,
}

impl ModelArtifact {
    fn validate(&self) -> Result<(), String> {
        if self.classes.is_empty() {
            return Err("artifact has no classes".to_string());
        }
        if self.classes.len() != self.centroids.len() {
            return Err(format!(
                "{} classes but {} centroids",
                self.classes.len(),
                self.centroids.len()
            ));
        }
        if self.scaler.mean.len() != self.n_features || self.scaler.std.len() != self.n_features {
            return Err("scaler width does not match n_features".to_string());
        }
        if let Some(bad) = self.centroids.iter().find(|c| c.len() != self.n_features) {
            return Err(format!(
                "centroid width {} does not match n_features {}",
                bad.len(),
                self.n_features
            ));
        }
        Ok(())
    }
}

/// Classifier adapter holding the (optional) loaded artifact
#[derive(Debug)]
pub struct Classifier {
    artifact: Option<ModelArtifact>,
}

impl Classifier {
    /// Load the artifact from disk. A missing path, unreadable file, or
    /// malformed artifact leaves the classifier in no-model mode rather
    /// than failing startup.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            info!("No model path configured, classifier runs in no-model mode");
            return Self::disabled();
        };

        match Self::try_load(path) {
            Ok(artifact) => {
                info!(
                    path = %path.display(),
                    version = artifact.version,
                    classes = artifact.classes.len(),
                    n_features = artifact.n_features,
                    "Classifier artifact loaded"
                );
                Self {
                    artifact: Some(artifact),
                }
            }
            Err(reason) => {
                warn!(
                    path = %path.display(),
                    reason = %reason,
                    "Classifier artifact unavailable, running in no-model mode"
                );
                Self::disabled()
            }
        }
    }

    fn try_load(path: &Path) -> Result<ModelArtifact, String> {
        let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        let artifact: ModelArtifact =
            serde_json::from_str(&content).map_err(|e| e.to_string())?;
        artifact.validate()?;
        Ok(artifact)
    }

    /// A classifier with no artifact; every classify call yields `Unknown`
    pub fn disabled() -> Self {
        Self { artifact: None }
    }

    /// Build directly from an artifact (used by tests and the trainer)
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self, String> {
        artifact.validate()?;
        Ok(Self {
            artifact: Some(artifact),
        })
    }

    pub fn is_loaded(&self) -> bool {
        self.artifact.is_some()
    }

    /// Expected model input width, when a model is loaded
    pub fn expected_width(&self) -> Option<usize> {
        self.artifact.as_ref().map(|a| a.n_features)
    }

    /// Map a feature vector to a source label.
    ///
    /// The no-model check runs first so a bare deployment never fails; the
    /// shape check runs before any inference so a mismatch surfaces as a
    /// typed error instead of garbage output.
    pub fn classify(&self, input: &[f32]) -> Result<Classification, FeatureShape> {
        let Some(artifact) = &self.artifact else {
            return Ok(Classification::Unknown {
                detail: NO_MODEL_DETAIL,
            });
        };

        if input.len() != artifact.n_features {
            return Err(FeatureShape {
                expected: artifact.n_features,
                actual: input.len(),
            });
        }

        let standardized = artifact.scaler.transform(input);

        let (best_idx, _) = artifact
            .centroids
            .iter()
            .enumerate()
            .map(|(idx, centroid)| {
                let distance: f32 = centroid
                    .iter()
                    .zip(standardized.iter())
                    .map(|(c, x)| (c - x).powi(2))
                    .sum();
                (idx, distance)
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .expect("artifact validated non-empty");

        Ok(Classification::Label(artifact.classes[best_idx].clone()))
    }
}

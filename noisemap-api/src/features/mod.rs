//! Audio feature extraction
//!
//! Turns a raw waveform into the fixed 15-dimensional [`FeatureVector`]
//! consumed by the classifier: RMS energy, zero-crossing rate, and the mean
//! of 13 MFCC coefficients. Extraction is deterministic for identical input
//! samples and sample rate, and has no side effects.

mod decode;
mod mfcc;

pub use decode::{decode_file, DecodedAudio};

use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::models::FeatureVector;

/// Canonical sample rate all file-based extraction resamples to.
/// Matches the rate the classifier's training corpus was decoded at.
pub const CANONICAL_SAMPLE_RATE: u32 = 22_050;

/// Unusable feature input. Classification is skipped for the affected
/// reading, ingestion continues with the `"unknown"` label.
#[derive(Debug, Error)]
pub enum InvalidAudio {
    #[error("No audio samples provided")]
    Empty,

    #[error("Sample rate must be positive")]
    SampleRate,

    #[error("Audio decode failed: {0}")]
    Decode(String),

    #[error("Resampling failed: {0}")]
    Resample(String),

    #[error("Extracted features contain non-finite values")]
    NonFinite,
}

/// Extract the feature vector from a mono waveform.
///
/// Silence legitimately evaluates to near-zero RMS/ZCR rather than failing;
/// only empty input, a non-positive sample rate, or non-finite output are
/// errors.
pub fn extract(samples: &[f32], sample_rate: u32) -> Result<FeatureVector, InvalidAudio> {
    if samples.is_empty() {
        return Err(InvalidAudio::Empty);
    }
    if sample_rate == 0 {
        return Err(InvalidAudio::SampleRate);
    }

    debug!(
        sample_count = samples.len(),
        sample_rate = sample_rate,
        "Extracting audio features"
    );

    let rms = compute_rms(samples);
    let zcr = compute_zcr(samples);
    let mfcc_mean = mfcc::mfcc_means(samples, sample_rate);

    let vector = FeatureVector {
        rms,
        zcr,
        mfcc_mean,
    };

    if !vector.to_model_input().iter().all(|v| v.is_finite()) {
        return Err(InvalidAudio::NonFinite);
    }

    Ok(vector)
}

/// Decode an audio file, resample to [`CANONICAL_SAMPLE_RATE`], and extract.
///
/// The decode/resample policy is fixed, so the same file always yields the
/// same vector.
pub fn extract_from_file(path: &Path) -> Result<FeatureVector, InvalidAudio> {
    let audio = decode_file(path)?;
    let samples = decode::resample(audio.samples, audio.sample_rate, CANONICAL_SAMPLE_RATE)?;
    extract(&samples, CANONICAL_SAMPLE_RATE)
}

/// RMS (root mean square) energy over the whole clip
fn compute_rms(samples: &[f32]) -> f32 {
    let sum_squares: f32 = samples.iter().map(|&s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Zero-crossing rate: fraction of adjacent sample pairs that change sign.
/// High ZCR indicates noisy or high-frequency content.
fn compute_zcr(samples: &[f32]) -> f32 {
    if samples.len() < 2 {
        return 0.0;
    }

    let mut crossings = 0usize;
    for i in 1..samples.len() {
        if (samples[i - 1] >= 0.0) != (samples[i] >= 0.0) {
            crossings += 1;
        }
    }

    crossings as f32 / (samples.len() - 1) as f32
}

#[cfg(test)]
pub(crate) fn sine_wave(frequency: f32, sample_rate: u32, seconds: f32) -> Vec<f32> {
    let count = (sample_rate as f32 * seconds) as usize;
    (0..count)
        .map(|i| {
            (2.0 * std::f32::consts::PI * frequency * i as f32 / sample_rate as f32).sin() * 0.5
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_empty_samples() {
        assert!(matches!(extract(&[], 22050), Err(InvalidAudio::Empty)));
    }

    #[test]
    fn test_extract_zero_sample_rate() {
        let samples = vec![0.1f32; 100];
        assert!(matches!(
            extract(&samples, 0),
            Err(InvalidAudio::SampleRate)
        ));
    }

    #[test]
    fn test_extract_silence_is_near_zero_not_error() {
        let silence = vec![0.0f32; 22050];
        let vector = extract(&silence, 22050).unwrap();
        assert_eq!(vector.rms, 0.0);
        assert_eq!(vector.zcr, 0.0);
        assert!(vector.mfcc_mean.iter().all(|c| c.is_finite()));
    }

    #[test]
    fn test_extract_sine_rms_positive() {
        let tone = sine_wave(440.0, 22050, 1.0);
        let vector = extract(&tone, 22050).unwrap();
        // 0.5 amplitude sine has RMS 0.5 / sqrt(2) ~= 0.354
        assert!((vector.rms - 0.3536).abs() < 0.01);
    }

    #[test]
    fn test_zcr_monotonic_in_frequency() {
        let low = extract(&sine_wave(220.0, 22050, 1.0), 22050).unwrap();
        let high = extract(&sine_wave(1760.0, 22050, 1.0), 22050).unwrap();
        assert!(
            high.zcr > low.zcr,
            "higher tone should cross zero more often: {} vs {}",
            high.zcr,
            low.zcr
        );
        // A pure tone crosses zero twice per cycle
        let expected = 2.0 * 220.0 / 22050.0;
        assert!((low.zcr - expected).abs() < 0.005);
    }

    #[test]
    fn test_extract_deterministic() {
        let tone = sine_wave(440.0, 22050, 0.5);
        let a = extract(&tone, 22050).unwrap();
        let b = extract(&tone, 22050).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_extract_all_components_finite() {
        let tone = sine_wave(990.0, 22050, 0.25);
        let vector = extract(&tone, 22050).unwrap();
        assert!(vector.to_model_input().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_extract_short_clip() {
        // Shorter than one FFT frame; must still produce a full vector
        let tone = sine_wave(440.0, 22050, 0.01);
        let vector = extract(&tone, 22050).unwrap();
        assert!(vector.rms > 0.0);
    }
}

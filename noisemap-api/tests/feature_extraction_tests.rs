//! End-to-end feature extraction from audio files
//!
//! Exercises the decode → resample → extract path with generated WAV
//! fixtures.

use std::path::Path;

use noisemap_api::features;
use noisemap_api::models::FeatureVector;

fn write_sine_wav(path: &Path, frequency: f32, sample_rate: u32, seconds: f32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let count = (sample_rate as f32 * seconds) as u32;
    for i in 0..count {
        let sample =
            (2.0 * std::f32::consts::PI * frequency * i as f32 / sample_rate as f32).sin() * 0.5;
        writer
            .write_sample((sample * i16::MAX as f32) as i16)
            .unwrap();
    }
    writer.finalize().unwrap();
}

#[test]
fn test_extract_from_wav_at_canonical_rate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    write_sine_wav(&path, 440.0, features::CANONICAL_SAMPLE_RATE, 1.0);

    let vector = features::extract_from_file(&path).unwrap();

    // 0.5 amplitude sine has RMS near 0.5 / sqrt(2)
    assert!((vector.rms - 0.3536).abs() < 0.02);
    // A pure tone crosses zero twice per cycle
    let expected_zcr = 2.0 * 440.0 / features::CANONICAL_SAMPLE_RATE as f32;
    assert!((vector.zcr - expected_zcr).abs() < 0.005);
    assert!(vector.to_model_input().iter().all(|v| v.is_finite()));
}

#[test]
fn test_extract_resamples_to_canonical_rate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone44k.wav");
    write_sine_wav(&path, 440.0, 44_100, 1.0);

    let vector = features::extract_from_file(&path).unwrap();

    // After resampling to 22 050 Hz the tone is still 440 Hz, so ZCR is
    // unchanged relative to the canonical rate
    let expected_zcr = 2.0 * 440.0 / features::CANONICAL_SAMPLE_RATE as f32;
    assert!(
        (vector.zcr - expected_zcr).abs() < 0.01,
        "zcr {} vs expected {}",
        vector.zcr,
        expected_zcr
    );
}

#[test]
fn test_zcr_tracks_frequency_across_files() {
    let dir = tempfile::tempdir().unwrap();
    let low_path = dir.path().join("low.wav");
    let high_path = dir.path().join("high.wav");
    write_sine_wav(&low_path, 220.0, features::CANONICAL_SAMPLE_RATE, 1.0);
    write_sine_wav(&high_path, 880.0, features::CANONICAL_SAMPLE_RATE, 1.0);

    let low = features::extract_from_file(&low_path).unwrap();
    let high = features::extract_from_file(&high_path).unwrap();

    assert!(low.rms >= 0.0 && high.rms >= 0.0);
    assert!(high.zcr > low.zcr);
}

#[test]
fn test_extract_from_file_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    write_sine_wav(&path, 660.0, features::CANONICAL_SAMPLE_RATE, 0.5);

    let a: FeatureVector = features::extract_from_file(&path).unwrap();
    let b: FeatureVector = features::extract_from_file(&path).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_extract_from_garbage_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("not_audio.wav");
    std::fs::write(&path, b"definitely not a wav file").unwrap();

    assert!(features::extract_from_file(&path).is_err());
}

//! MFCC computation: framed Hann-windowed real FFT, mel filterbank,
//! log compression, DCT-II. Per-frame coefficients are averaged so the
//! output is one 13-value summary per clip.

use realfft::{RealFftPlanner, RealToComplex};
use std::sync::Arc;

/// FFT window size in samples
const N_FFT: usize = 2048;
/// Advance between analysis frames
const HOP: usize = 512;
/// Number of triangular mel filters
const N_MELS: usize = 40;
/// Number of cepstral coefficients kept
pub const N_MFCC: usize = 13;

/// Floor applied before the log to keep silence finite
const LOG_FLOOR: f32 = 1e-10;

/// Mean of each MFCC coefficient across all frames.
///
/// Input shorter than one FFT window is zero-padded into a single frame,
/// so every non-empty clip yields a full coefficient set.
pub fn mfcc_means(samples: &[f32], sample_rate: u32) -> [f32; N_MFCC] {
    let fft = RealFftPlanner::<f32>::new().plan_fft_forward(N_FFT);
    let filterbank = mel_filterbank(sample_rate);

    let mut sums = [0.0f32; N_MFCC];
    let mut frame_count = 0usize;

    for frame in frames(samples) {
        let power = power_spectrum(&fft, &frame);
        let mel_energies = apply_filterbank(&filterbank, &power);
        let coeffs = dct_ii(&mel_energies);
        for (sum, c) in sums.iter_mut().zip(coeffs.iter()) {
            *sum += c;
        }
        frame_count += 1;
    }

    let mut means = [0.0f32; N_MFCC];
    for (mean, sum) in means.iter_mut().zip(sums.iter()) {
        *mean = sum / frame_count as f32;
    }
    means
}

/// Split the signal into Hann-windowed frames of N_FFT samples.
/// Always yields at least one (zero-padded) frame for non-empty input.
fn frames(samples: &[f32]) -> Vec<Vec<f32>> {
    let mut out = Vec::new();
    let mut start = 0usize;

    loop {
        let mut frame = vec![0.0f32; N_FFT];
        let end = (start + N_FFT).min(samples.len());
        frame[..end - start].copy_from_slice(&samples[start..end]);
        apply_hann_window(&mut frame);
        out.push(frame);

        start += HOP;
        if start + N_FFT > samples.len() {
            break;
        }
    }

    out
}

/// Hann window to reduce spectral leakage
fn apply_hann_window(frame: &mut [f32]) {
    let n = frame.len();
    for (i, s) in frame.iter_mut().enumerate() {
        let w = 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n as f32).cos());
        *s *= w;
    }
}

/// Power spectrum of one frame (N_FFT/2 + 1 bins)
fn power_spectrum(fft: &Arc<dyn RealToComplex<f32>>, frame: &[f32]) -> Vec<f32> {
    let mut input = frame.to_vec();
    let mut spectrum = fft.make_output_vec();
    // Process cannot fail here: input/output lengths come from the same plan
    fft.process(&mut input, &mut spectrum)
        .expect("FFT buffer sizes match plan");
    spectrum.iter().map(|c| c.norm_sqr()).collect()
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0f32.powf(mel / 2595.0) - 1.0)
}

/// Triangular mel filterbank over the 0..Nyquist power spectrum.
/// Each filter is a row of per-bin weights.
fn mel_filterbank(sample_rate: u32) -> Vec<Vec<f32>> {
    let n_bins = N_FFT / 2 + 1;
    let nyquist = sample_rate as f32 / 2.0;
    let max_mel = hz_to_mel(nyquist);

    // N_MELS + 2 equally spaced mel points define the triangle edges
    let mel_points: Vec<f32> = (0..N_MELS + 2)
        .map(|i| i as f32 * max_mel / (N_MELS + 1) as f32)
        .collect();
    let bin_of_hz = |hz: f32| hz * N_FFT as f32 / sample_rate as f32;
    let edges: Vec<f32> = mel_points.iter().map(|&m| bin_of_hz(mel_to_hz(m))).collect();

    let mut filters = Vec::with_capacity(N_MELS);
    for f in 0..N_MELS {
        let (left, center, right) = (edges[f], edges[f + 1], edges[f + 2]);
        let mut weights = vec![0.0f32; n_bins];
        for (bin, w) in weights.iter_mut().enumerate() {
            let b = bin as f32;
            if b > left && b < center {
                *w = (b - left) / (center - left);
            } else if b >= center && b < right {
                *w = (right - b) / (right - center);
            }
        }
        filters.push(weights);
    }
    filters
}

/// Log mel energies for one frame
fn apply_filterbank(filterbank: &[Vec<f32>], power: &[f32]) -> Vec<f32> {
    filterbank
        .iter()
        .map(|weights| {
            let energy: f32 = weights.iter().zip(power.iter()).map(|(w, p)| w * p).sum();
            energy.max(LOG_FLOOR).ln()
        })
        .collect()
}

/// Orthonormal DCT-II of the log mel energies, truncated to N_MFCC
fn dct_ii(mel_energies: &[f32]) -> [f32; N_MFCC] {
    let m = mel_energies.len() as f32;
    let mut coeffs = [0.0f32; N_MFCC];
    for (k, coeff) in coeffs.iter_mut().enumerate() {
        let sum: f32 = mel_energies
            .iter()
            .enumerate()
            .map(|(i, &e)| {
                e * (std::f32::consts::PI * k as f32 * (i as f32 + 0.5) / m).cos()
            })
            .sum();
        let scale = if k == 0 {
            (1.0 / m).sqrt()
        } else {
            (2.0 / m).sqrt()
        };
        *coeff = scale * sum;
    }
    coeffs
}

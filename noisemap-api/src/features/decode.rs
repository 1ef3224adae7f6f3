//! Audio file decoding and resampling
//!
//! Decodes any symphonia-supported container to mono f32 PCM, then
//! resamples to the canonical extraction rate with rubato.

use std::path::Path;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::conv::FromSample;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;
use tracing::debug;

use super::InvalidAudio;

/// Decoded mono audio
#[derive(Debug)]
pub struct DecodedAudio {
    /// Mono samples, range [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Source sample rate in Hz
    pub sample_rate: u32,
}

/// Decode an audio file to mono f32 PCM samples.
///
/// Multi-channel audio is downmixed by averaging channels.
pub fn decode_file(path: &Path) -> Result<DecodedAudio, InvalidAudio> {
    let file = std::fs::File::open(path)
        .map_err(|e| InvalidAudio::Decode(format!("open {}: {}", path.display(), e)))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| InvalidAudio::Decode(format!("probe {}: {}", path.display(), e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| InvalidAudio::Decode("no audio track found".to_string()))?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| InvalidAudio::Decode("sample rate unknown".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| InvalidAudio::Decode(format!("decoder init: {}", e)))?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(InvalidAudio::Decode(format!("read packet: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder
            .decode(&packet)
            .map_err(|e| InvalidAudio::Decode(format!("decode packet: {}", e)))?;
        downmix_to_mono(&decoded, &mut samples);
    }

    debug!(
        path = %path.display(),
        sample_rate = sample_rate,
        sample_count = samples.len(),
        "Audio decode complete"
    );

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

/// Resample mono samples from `source_rate` to `target_rate` using sinc
/// interpolation. A no-op when the rates already match.
pub fn resample(
    samples: Vec<f32>,
    source_rate: u32,
    target_rate: u32,
) -> Result<Vec<f32>, InvalidAudio> {
    if source_rate == target_rate || samples.is_empty() {
        return Ok(samples);
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = target_rate as f64 / source_rate as f64;
    let num_frames = samples.len();

    // Single-pass: chunk size equals input length
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, num_frames, 1)
        .map_err(|e| InvalidAudio::Resample(e.to_string()))?;

    let output = resampler
        .process(&[samples], None)
        .map_err(|e| InvalidAudio::Resample(e.to_string()))?;

    debug!(
        source_rate = source_rate,
        target_rate = target_rate,
        input_frames = num_frames,
        output_frames = output[0].len(),
        "Resampling complete"
    );

    Ok(output.into_iter().next().unwrap_or_default())
}

/// Append one decoded packet to `out`, averaged down to mono
fn downmix_to_mono(decoded: &AudioBufferRef, out: &mut Vec<f32>) {
    fn mix<S: Sample>(buf: &symphonia::core::audio::AudioBuffer<S>, out: &mut Vec<f32>)
    where
        f32: FromSample<S>,
    {
        let num_channels = buf.spec().channels.count();
        let num_frames = buf.frames();
        out.reserve(num_frames);
        for frame in 0..num_frames {
            let mut sum = 0.0f32;
            for ch in 0..num_channels {
                sum += f32::from_sample(buf.chan(ch)[frame]);
            }
            out.push(sum / num_channels as f32);
        }
    }

    match decoded {
        AudioBufferRef::U8(buf) => mix(buf, out),
        AudioBufferRef::U16(buf) => mix(buf, out),
        AudioBufferRef::U24(buf) => mix(buf, out),
        AudioBufferRef::U32(buf) => mix(buf, out),
        AudioBufferRef::S8(buf) => mix(buf, out),
        AudioBufferRef::S16(buf) => mix(buf, out),
        AudioBufferRef::S24(buf) => mix(buf, out),
        AudioBufferRef::S32(buf) => mix(buf, out),
        AudioBufferRef::F32(buf) => mix(buf, out),
        AudioBufferRef::F64(buf) => mix(buf, out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_file_not_found() {
        let result = decode_file(Path::new("/nonexistent/audio.wav"));
        assert!(matches!(result, Err(InvalidAudio::Decode(_))));
    }

    #[test]
    fn test_resample_identity_when_rates_match() {
        let samples = vec![0.1f32, 0.2, 0.3];
        let out = resample(samples.clone(), 22050, 22050).unwrap();
        assert_eq!(out, samples);
    }

    #[test]
    fn test_resample_halves_length() {
        let samples = vec![0.0f32; 44100];
        let out = resample(samples, 44100, 22050).unwrap();
        // Sinc resampling trims filter transients; allow some slack
        assert!((out.len() as i64 - 22050).unsigned_abs() < 1000);
    }
}

//! Audio decoding via symphonia
//!
//! Decodes any supported container/codec to mono f32 at a fixed sample
//! rate. Normalization matters: fingerprints are computed over this stream,
//! so two encodes of the same recording must decode to the same samples
//! regardless of their container.

use crate::error::{LibraryError, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// All decoded audio is normalized to this rate before hashing or analysis
pub const TARGET_SAMPLE_RATE: u32 = 44_100;

/// Streams shorter than this are rejected with `TooShort`
pub const MIN_ANALYZABLE_SECS: f64 = 3.0;

/// A fully decoded, normalized audio stream
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Mono samples at [`TARGET_SAMPLE_RATE`]
    pub samples: Vec<f32>,
    /// Sample rate of the source file before normalization
    pub source_sample_rate: u32,
}

impl DecodedAudio {
    /// Duration of the normalized stream in seconds
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / TARGET_SAMPLE_RATE as f64
    }
}

/// Decode an audio file to mono f32 at the target sample rate
///
/// Fails with [`LibraryError::Decode`] when the stream cannot be decoded
/// and [`LibraryError::TooShort`] when the decoded duration is below
/// [`MIN_ANALYZABLE_SECS`].
pub fn decode_file(path: &Path) -> Result<DecodedAudio> {
    log::debug!("Decoding: {:?}", path);

    let file = std::fs::File::open(path)
        .map_err(|e| LibraryError::decode(path, format!("cannot open file: {e}")))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension() {
        hint.with_extension(ext.to_str().unwrap_or(""));
    }

    let format_opts = FormatOptions::default();
    let metadata_opts = MetadataOptions::default();

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &format_opts, &metadata_opts)
        .map_err(|e| LibraryError::decode(path, format!("unrecognized format: {e}")))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| LibraryError::decode(path, "no audio track found"))?;

    let track_id = track.id;
    let source_sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| LibraryError::decode(path, "no sample rate in audio track"))?;

    let dec_opts = DecoderOptions::default();
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &dec_opts)
        .map_err(|e| LibraryError::decode(path, format!("cannot create decoder: {e}")))?;

    let mut mono: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                log::warn!("Error reading packet from {:?}: {:?}", path, e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(e) => {
                log::warn!("Error decoding packet from {:?}: {:?}", path, e);
                continue;
            }
        };

        let spec = *decoded.spec();
        let capacity = decoded.capacity() as u64;

        let mut sample_buf = SampleBuffer::<f32>::new(capacity, spec);
        sample_buf.copy_interleaved_ref(decoded);

        let samples = sample_buf.samples();

        // Downmix to mono by averaging channels
        let channels = spec.channels.count();
        if channels > 1 {
            for chunk in samples.chunks(channels) {
                let sum: f32 = chunk.iter().sum();
                mono.push(sum / channels as f32);
            }
        } else {
            mono.extend_from_slice(samples);
        }
    }

    if mono.is_empty() {
        return Err(LibraryError::decode(path, "no samples decoded"));
    }

    let samples = resample_linear(&mono, source_sample_rate, TARGET_SAMPLE_RATE);
    drop(mono);

    let audio = DecodedAudio {
        samples,
        source_sample_rate,
    };

    let duration = audio.duration_secs();
    log::debug!(
        "Decoded {:?}: {:.1}s at {}Hz (source {}Hz)",
        path,
        duration,
        TARGET_SAMPLE_RATE,
        source_sample_rate
    );

    if duration < MIN_ANALYZABLE_SECS {
        return Err(LibraryError::TooShort {
            path: path.to_path_buf(),
            seconds: duration,
        });
    }

    Ok(audio)
}

/// Linear-interpolation resampling
///
/// Identity when the rates match, so the common 44.1kHz case introduces no
/// floating-point drift into the fingerprint.
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).floor() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let position = i as f64 * ratio;
        let index = position.floor() as usize;
        let frac = (position - index as f64) as f32;

        let a = samples[index];
        let b = if index + 1 < samples.len() {
            samples[index + 1]
        } else {
            a
        };
        out.push(a + (b - a) * frac);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_requires_file() {
        let result = decode_file(Path::new("/nonexistent/file.mp3"));
        assert!(matches!(result, Err(LibraryError::Decode { .. })));
    }

    #[test]
    fn test_resample_identity() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample_linear(&samples, 44_100, 44_100), samples);
    }

    #[test]
    fn test_resample_halves_length() {
        let samples: Vec<f32> = (0..1000).map(|i| i as f32).collect();
        let out = resample_linear(&samples, 88_200, 44_100);
        assert_eq!(out.len(), 500);
        // Linear interpolation of a ramp stays on the ramp
        assert!((out[10] - 20.0).abs() < 1e-3);
    }

    #[test]
    fn test_resample_preserves_duration() {
        let samples = vec![0.0f32; 48_000];
        let out = resample_linear(&samples, 48_000, 44_100);
        let duration = out.len() as f64 / 44_100.0;
        assert!((duration - 1.0).abs() < 0.001);
    }
}

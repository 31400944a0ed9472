//! Content identification
//!
//! The fingerprint hashes the normalized sample stream after quantizing
//! back to 16-bit, which absorbs the sub-quantum float differences left by
//! different decoder paths. The acoustic signature is a separate, much
//! coarser measurement used for near-duplicate grouping.

use crate::audio::{DecodedAudio, TARGET_SAMPLE_RATE};
use crate::error::{LibraryError, Result};
use crate::model::{AcousticSignature, Fingerprint};
use std::io::Read;
use std::path::Path;

/// Time slices in the acoustic signature
const SIGNATURE_SLICES: usize = 32;

/// Band center frequencies in Hz, one octave apart
const SIGNATURE_BANDS: &[f32] = &[60.0, 120.0, 240.0, 480.0, 960.0, 1920.0, 3840.0, 7680.0];

/// Per-slice sample cap; keeps the sketch cheap on long tracks
const MAX_SLICE_SAMPLES: usize = TARGET_SAMPLE_RATE as usize * 3;

/// Compute the content fingerprint for a decoded stream
///
/// Deterministic for bit-identical decoded sample data and stable across
/// container/codec changes at equivalent quality.
pub fn fingerprint(audio: &DecodedAudio) -> Fingerprint {
    let mut context = md5::Context::new();
    let mut buffer = [0u8; 8192];
    let mut filled = 0;

    for &sample in &audio.samples {
        let quantized = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        buffer[filled..filled + 2].copy_from_slice(&quantized.to_le_bytes());
        filled += 2;
        if filled == buffer.len() {
            context.consume(&buffer);
            filled = 0;
        }
    }
    if filled > 0 {
        context.consume(&buffer[..filled]);
    }

    Fingerprint::from_bytes(context.compute().0)
}

/// Fallback fingerprint over raw file bytes
///
/// Used for files that cannot be decoded, so their failure is still tracked
/// under a stable content-derived identity and re-walks skip them.
pub fn raw_fingerprint(path: &Path) -> Result<Fingerprint> {
    let mut file = std::fs::File::open(path)
        .map_err(|e| LibraryError::decode(path, format!("cannot open file: {e}")))?;

    let mut context = md5::Context::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        context.consume(&buffer[..read]);
    }

    Ok(Fingerprint::from_bytes(context.compute().0))
}

/// Compute the coarse acoustic signature for a decoded stream
///
/// Splits the stream into [`SIGNATURE_SLICES`] equal slices and measures the
/// energy at [`SIGNATURE_BANDS`] in each, then normalizes the whole vector.
/// Robust to codec and level differences, which is exactly what
/// near-duplicate grouping needs; never used for identity.
pub fn signature(audio: &DecodedAudio) -> AcousticSignature {
    let samples = &audio.samples;
    let slice_len = (samples.len() / SIGNATURE_SLICES).max(1);

    let mut energies = Vec::with_capacity(SIGNATURE_SLICES * SIGNATURE_BANDS.len());
    for slice_index in 0..SIGNATURE_SLICES {
        let start = slice_index * slice_len;
        if start >= samples.len() {
            // Very short stream; pad the sketch with silence
            energies.extend(std::iter::repeat(0.0).take(SIGNATURE_BANDS.len()));
            continue;
        }
        let end = (start + slice_len).min(samples.len());
        let window = &samples[start..end.min(start + MAX_SLICE_SAMPLES)];

        for &freq in SIGNATURE_BANDS {
            energies.push(goertzel_power(window, freq, TARGET_SAMPLE_RATE));
        }
    }

    AcousticSignature::from_energies(energies)
}

/// Goertzel single-bin power estimate, normalized by window length
fn goertzel_power(samples: &[f32], freq: f32, sample_rate: u32) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let omega = 2.0 * std::f64::consts::PI * freq as f64 / sample_rate as f64;
    let coeff = 2.0 * omega.cos();

    let mut s_prev = 0.0f64;
    let mut s_prev2 = 0.0f64;
    for &sample in samples {
        let s = sample as f64 + coeff * s_prev - s_prev2;
        s_prev2 = s_prev;
        s_prev = s;
    }

    let power = s_prev * s_prev + s_prev2 * s_prev2 - coeff * s_prev * s_prev2;
    (power.max(0.0) / samples.len() as f64) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f32, secs: f32, amplitude: f32) -> DecodedAudio {
        let count = (secs * TARGET_SAMPLE_RATE as f32) as usize;
        let samples = (0..count)
            .map(|i| {
                let t = i as f32 / TARGET_SAMPLE_RATE as f32;
                amplitude * (2.0 * std::f32::consts::PI * freq * t).sin()
            })
            .collect();
        DecodedAudio {
            samples,
            source_sample_rate: TARGET_SAMPLE_RATE,
        }
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let audio = tone(440.0, 1.0, 0.5);
        assert_eq!(fingerprint(&audio), fingerprint(&audio));
    }

    #[test]
    fn test_fingerprint_distinguishes_content() {
        let a = tone(440.0, 1.0, 0.5);
        let b = tone(220.0, 1.0, 0.5);
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_goertzel_peaks_at_target_frequency() {
        let audio = tone(480.0, 0.5, 0.8);
        let on_target = goertzel_power(&audio.samples, 480.0, TARGET_SAMPLE_RATE);
        let off_target = goertzel_power(&audio.samples, 960.0, TARGET_SAMPLE_RATE);
        assert!(on_target > off_target * 10.0);
    }

    #[test]
    fn test_signature_survives_level_change() {
        let loud = tone(480.0, 4.0, 0.8);
        let quiet = tone(480.0, 4.0, 0.4);
        let similarity = signature(&loud).similarity(&signature(&quiet));
        assert!(similarity > 0.99, "similarity was {similarity}");
    }

    #[test]
    fn test_signature_separates_different_content() {
        let low = tone(120.0, 4.0, 0.8);
        let high = tone(3840.0, 4.0, 0.8);
        let similarity = signature(&low).similarity(&signature(&high));
        assert!(similarity < 0.5, "similarity was {similarity}");
    }

    #[test]
    fn test_raw_fingerprint_requires_file() {
        assert!(raw_fingerprint(Path::new("/nonexistent/file.mp3")).is_err());
    }
}

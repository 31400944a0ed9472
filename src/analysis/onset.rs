//! Onset-strength envelope
//!
//! Half-wave-rectified energy flux over short frames: the envelope rises
//! wherever signal energy jumps, which is where rhythmic onsets live.

use crate::audio::TARGET_SAMPLE_RATE;

/// Analysis frame length in samples
pub(crate) const FRAME_SIZE: usize = 1024;

/// Hop between frames in samples
pub(crate) const HOP_SIZE: usize = 512;

/// Envelope frames per second
pub(crate) fn envelope_rate() -> f32 {
    TARGET_SAMPLE_RATE as f32 / HOP_SIZE as f32
}

/// Compute the onset-strength envelope for a mono sample stream
pub(crate) fn onset_envelope(samples: &[f32]) -> Vec<f32> {
    if samples.len() < FRAME_SIZE {
        return Vec::new();
    }

    let frame_count = (samples.len() - FRAME_SIZE) / HOP_SIZE + 1;
    let mut envelope = Vec::with_capacity(frame_count);

    let mut previous_rms = 0.0f32;
    for frame_index in 0..frame_count {
        let start = frame_index * HOP_SIZE;
        let frame = &samples[start..start + FRAME_SIZE];

        let mean_square: f64 = frame.iter().map(|s| (*s as f64).powi(2)).sum::<f64>()
            / FRAME_SIZE as f64;
        let rms = mean_square.sqrt() as f32;

        // Half-wave rectification: only energy increases count as onsets
        envelope.push((rms - previous_rms).max(0.0));
        previous_rms = rms;
    }

    envelope
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_yields_flat_envelope() {
        let samples = vec![0.0f32; FRAME_SIZE * 8];
        let envelope = onset_envelope(&samples);
        assert!(!envelope.is_empty());
        assert!(envelope.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_burst_produces_single_peak() {
        let mut samples = vec![0.0f32; FRAME_SIZE * 16];
        // One loud burst in the middle
        let burst_start = FRAME_SIZE * 8;
        for sample in &mut samples[burst_start..burst_start + FRAME_SIZE] {
            *sample = 0.9;
        }

        let envelope = onset_envelope(&samples);
        let peak_index = envelope
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();

        // The peak should land where the burst begins
        let expected = burst_start / HOP_SIZE;
        assert!((peak_index as isize - expected as isize).abs() <= 1);
    }

    #[test]
    fn test_too_short_input_is_empty() {
        assert!(onset_envelope(&vec![0.0f32; FRAME_SIZE - 1]).is_empty());
    }
}

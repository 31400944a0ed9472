//! Tempo estimation
//!
//! Periodicity analysis over the onset-strength envelope: the normalized
//! autocorrelation of the envelope peaks at the beat period. The peak value
//! doubles as the confidence score; estimates below the configured
//! threshold are reported as absent, never guessed.

use super::onset::{envelope_rate, onset_envelope};
use crate::config::AnalysisConfig;
use crate::model::TempoEstimate;

/// Estimate the tempo of a mono sample stream
pub fn estimate_tempo(samples: &[f32], config: &AnalysisConfig) -> Option<TempoEstimate> {
    let mut envelope = onset_envelope(samples);
    if envelope.is_empty() {
        return None;
    }

    let fps = envelope_rate();
    let lag_min = (60.0 * fps / config.max_bpm).floor().max(1.0) as usize;
    let lag_max = (60.0 * fps / config.min_bpm).ceil() as usize;

    // Need at least two full periods of the slowest candidate tempo
    if envelope.len() < lag_max * 2 {
        log::debug!(
            "Envelope too short for tempo estimation: {} frames, need {}",
            envelope.len(),
            lag_max * 2
        );
        return None;
    }

    // Remove the mean so slow level trends do not masquerade as periodicity
    let mean = envelope.iter().sum::<f32>() / envelope.len() as f32;
    for value in &mut envelope {
        *value -= mean;
    }

    let zero_lag = autocorrelation(&envelope, 0);
    if zero_lag <= f64::EPSILON {
        return None;
    }

    let mut best_lag = 0usize;
    let mut best_value = f64::MIN;
    for lag in lag_min..=lag_max {
        let value = autocorrelation(&envelope, lag);
        if value > best_value {
            best_value = value;
            best_lag = lag;
        }
    }

    if best_lag == 0 || best_value <= 0.0 {
        return None;
    }

    let confidence = (best_value / zero_lag).clamp(0.0, 1.0) as f32;

    // Parabolic interpolation around the peak for sub-lag precision
    let refined_lag = if best_lag > lag_min && best_lag < lag_max {
        let left = autocorrelation(&envelope, best_lag - 1);
        let right = autocorrelation(&envelope, best_lag + 1);
        let denominator = left - 2.0 * best_value + right;
        if denominator.abs() > f64::EPSILON {
            best_lag as f64 + 0.5 * (left - right) / denominator
        } else {
            best_lag as f64
        }
    } else {
        best_lag as f64
    };

    let mut bpm = (60.0 * fps as f64 / refined_lag) as f32;

    // Fold octave errors back into the configured range
    while bpm < config.min_bpm && bpm * 2.0 <= config.max_bpm {
        bpm *= 2.0;
    }
    while bpm > config.max_bpm && bpm / 2.0 >= config.min_bpm {
        bpm /= 2.0;
    }

    if confidence < config.tempo_min_confidence {
        log::debug!(
            "Tempo {:.1} BPM below confidence threshold ({:.2} < {:.2})",
            bpm,
            confidence,
            config.tempo_min_confidence
        );
        return None;
    }

    Some(TempoEstimate { bpm, confidence })
}

/// Raw autocorrelation at one lag, normalized by overlap length
fn autocorrelation(envelope: &[f32], lag: usize) -> f64 {
    if lag >= envelope.len() {
        return 0.0;
    }
    let overlap = envelope.len() - lag;
    let sum: f64 = (0..overlap)
        .map(|i| envelope[i] as f64 * envelope[i + lag] as f64)
        .sum();
    sum / overlap as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::TARGET_SAMPLE_RATE;

    /// Synthesize a click track: short bursts at the given tempo
    fn click_track(bpm: f32, secs: f32) -> Vec<f32> {
        let total = (secs * TARGET_SAMPLE_RATE as f32) as usize;
        let period = (60.0 / bpm * TARGET_SAMPLE_RATE as f32) as usize;
        let click_len = TARGET_SAMPLE_RATE as usize / 100; // 10ms clicks

        let mut samples = vec![0.0f32; total];
        let mut position = 0;
        while position < total {
            let end = (position + click_len).min(total);
            for (offset, sample) in samples[position..end].iter_mut().enumerate() {
                // Decaying click so the onset is sharp
                let t = offset as f32 / click_len as f32;
                *sample = 0.9 * (1.0 - t);
            }
            position += period;
        }
        samples
    }

    #[test]
    fn test_click_track_tempo() {
        let config = AnalysisConfig::default();
        let samples = click_track(120.0, 10.0);
        let estimate = estimate_tempo(&samples, &config).expect("tempo should be detected");
        assert!(
            (estimate.bpm - 120.0).abs() < 3.0,
            "detected {:.1} BPM",
            estimate.bpm
        );
        assert!(estimate.confidence >= config.tempo_min_confidence);
    }

    #[test]
    fn test_slow_click_track_folds_into_range() {
        // 60 BPM is below the default 70-170 range; the estimator should
        // report the 120 BPM octave instead of an out-of-range value
        let config = AnalysisConfig::default();
        let samples = click_track(60.0, 12.0);
        if let Some(estimate) = estimate_tempo(&samples, &config) {
            assert!(estimate.bpm >= config.min_bpm && estimate.bpm <= config.max_bpm);
        }
    }

    #[test]
    fn test_silence_has_no_tempo() {
        let config = AnalysisConfig::default();
        let samples = vec![0.0f32; TARGET_SAMPLE_RATE as usize * 8];
        assert!(estimate_tempo(&samples, &config).is_none());
    }

    #[test]
    fn test_short_input_has_no_tempo() {
        let config = AnalysisConfig::default();
        let samples = click_track(120.0, 0.5);
        assert!(estimate_tempo(&samples, &config).is_none());
    }
}

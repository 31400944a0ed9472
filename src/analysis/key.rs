//! Musical key estimation
//!
//! Pitch-class energy profiling: per-semitone energy across several octaves
//! is folded into a 12-bin profile and correlated against the
//! Krumhansl-Kessler major and minor templates in all 12 rotations. The
//! tie-break between a minor key and its relative major is deterministic:
//! when their scores differ by less than the configured tolerance, the
//! relative major wins.

use crate::audio::TARGET_SAMPLE_RATE;
use crate::config::AnalysisConfig;
use crate::model::{KeyEstimate, Mode, MusicalKey, PitchClass};

/// Krumhansl-Kessler major key profile, tonic first
const MAJOR_PROFILE: [f64; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];

/// Krumhansl-Kessler minor key profile, tonic first
const MINOR_PROFILE: [f64; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

/// MIDI note range profiled: C2..B5
const LOW_NOTE: i32 = 36;
const HIGH_NOTE: i32 = 83;

/// At most this much audio is profiled
const MAX_PROFILE_SECS: usize = 60;

/// Estimate the musical key of a mono sample stream
pub fn estimate_key(samples: &[f32], config: &AnalysisConfig) -> Option<KeyEstimate> {
    let window_len = (MAX_PROFILE_SECS * TARGET_SAMPLE_RATE as usize).min(samples.len());
    let window = &samples[..window_len];

    let profile = pitch_class_profile(window)?;
    let (key, confidence) = best_key(&profile, config.key_tie_tolerance);

    if confidence < config.key_min_confidence {
        log::debug!(
            "Key {} below confidence threshold ({:.2} < {:.2})",
            key.name(),
            confidence,
            config.key_min_confidence
        );
        return None;
    }

    Some(KeyEstimate { key, confidence })
}

/// Fold per-semitone magnitudes into a 12-bin pitch-class profile
///
/// Returns None when the window carries no measurable tonal energy.
fn pitch_class_profile(samples: &[f32]) -> Option<[f64; 12]> {
    if samples.is_empty() {
        return None;
    }

    let mut profile = [0.0f64; 12];
    for note in LOW_NOTE..=HIGH_NOTE {
        let freq = 440.0 * 2f64.powf((note - 69) as f64 / 12.0);
        let power = goertzel_power(samples, freq);
        // Magnitude rather than power keeps low octaves from dominating
        profile[(note.rem_euclid(12)) as usize] += power.sqrt();
    }

    let total: f64 = profile.iter().sum();
    if total < 1e-9 {
        return None;
    }
    Some(profile)
}

/// Pick the best-matching key for a pitch-class profile
///
/// Exposed within the crate so the tie-break is testable without DSP.
pub(crate) fn best_key(profile: &[f64; 12], tie_tolerance: f32) -> (MusicalKey, f32) {
    let mut best: Option<(MusicalKey, f64)> = None;
    let mut scores = [[0.0f64; 12]; 2]; // [major, minor] by tonic

    for tonic in 0..12 {
        for (mode_index, template) in [&MAJOR_PROFILE, &MINOR_PROFILE].into_iter().enumerate() {
            let score = rotated_correlation(profile, template, tonic);
            scores[mode_index][tonic] = score;

            let mode = if mode_index == 0 { Mode::Major } else { Mode::Minor };
            let key = MusicalKey::new(PitchClass::from_index(tonic), mode);
            if best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((key, score));
            }
        }
    }

    let (mut key, mut score) = best.expect("24 candidates always produce a best");

    // Relative-major tie-break: a minor key that barely beats its relative
    // major yields to it
    if key.mode == Mode::Minor {
        let relative = key.relative_major();
        let relative_score = scores[0][relative.pitch_class.index()];
        if (score - relative_score) < tie_tolerance as f64 {
            log::debug!(
                "Key tie-break: {} ({:.3}) -> {} ({:.3})",
                key.name(),
                score,
                relative.name(),
                relative_score
            );
            key = relative;
            score = relative_score;
        }
    }

    (key, score.clamp(0.0, 1.0) as f32)
}

/// Pearson correlation between a profile and a template rotated to a tonic
fn rotated_correlation(profile: &[f64; 12], template: &[f64; 12], tonic: usize) -> f64 {
    let profile_mean = profile.iter().sum::<f64>() / 12.0;
    let template_mean = template.iter().sum::<f64>() / 12.0;

    let mut covariance = 0.0;
    let mut profile_var = 0.0;
    let mut template_var = 0.0;
    for pc in 0..12 {
        let x = profile[pc] - profile_mean;
        let y = template[(pc + 12 - tonic) % 12] - template_mean;
        covariance += x * y;
        profile_var += x * x;
        template_var += y * y;
    }

    let denominator = (profile_var * template_var).sqrt();
    if denominator < 1e-12 {
        0.0
    } else {
        covariance / denominator
    }
}

/// Goertzel single-bin power estimate, normalized by window length
fn goertzel_power(samples: &[f32], freq: f64) -> f64 {
    let omega = 2.0 * std::f64::consts::PI * freq / TARGET_SAMPLE_RATE as f64;
    let coeff = 2.0 * omega.cos();

    let mut s_prev = 0.0f64;
    let mut s_prev2 = 0.0f64;
    for &sample in samples {
        let s = sample as f64 + coeff * s_prev - s_prev2;
        s_prev2 = s_prev;
        s_prev = s;
    }

    let power = s_prev * s_prev + s_prev2 * s_prev2 - coeff * s_prev * s_prev2;
    power.max(0.0) / samples.len() as f64
}

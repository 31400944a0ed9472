//! Integrated loudness
//!
//! Windowed RMS with two-stage gating: 400ms blocks with 75% overlap, an
//! absolute gate at -70 LUFS and a relative gate 10 LU under the ungated
//! mean. All math is f64, so the result is reproducible bit-for-bit for
//! identical input samples.

use crate::audio::TARGET_SAMPLE_RATE;

/// Block length in seconds
const BLOCK_SECS: f64 = 0.4;

/// Hop between blocks in seconds (75% overlap)
const HOP_SECS: f64 = 0.1;

/// Blocks quieter than this are never counted
const ABSOLUTE_GATE_LUFS: f64 = -70.0;

/// Relative gate offset below the ungated mean loudness
const RELATIVE_GATE_LU: f64 = 10.0;

/// Compute integrated loudness in LUFS
///
/// Returns None for streams with no blocks above the absolute gate
/// (silence or near-silence), which is an absent value, not an error.
pub fn integrated_loudness(samples: &[f32]) -> Option<f64> {
    let block_len = (BLOCK_SECS * TARGET_SAMPLE_RATE as f64) as usize;
    let hop_len = (HOP_SECS * TARGET_SAMPLE_RATE as f64) as usize;

    if samples.len() < block_len {
        return None;
    }

    // Mean-square energy per block
    let block_count = (samples.len() - block_len) / hop_len + 1;
    let mut block_energy = Vec::with_capacity(block_count);
    for block_index in 0..block_count {
        let start = block_index * hop_len;
        let block = &samples[start..start + block_len];
        let mean_square =
            block.iter().map(|s| (*s as f64).powi(2)).sum::<f64>() / block_len as f64;
        block_energy.push(mean_square);
    }

    // Stage 1: absolute gate
    let gated: Vec<f64> = block_energy
        .iter()
        .copied()
        .filter(|&ms| block_loudness(ms) > ABSOLUTE_GATE_LUFS)
        .collect();
    if gated.is_empty() {
        return None;
    }

    // Stage 2: relative gate 10 LU below the mean of surviving blocks
    let ungated_mean = gated.iter().sum::<f64>() / gated.len() as f64;
    let relative_threshold = block_loudness(ungated_mean) - RELATIVE_GATE_LU;

    let final_blocks: Vec<f64> = gated
        .into_iter()
        .filter(|&ms| block_loudness(ms) > relative_threshold)
        .collect();
    if final_blocks.is_empty() {
        return None;
    }

    let integrated_mean = final_blocks.iter().sum::<f64>() / final_blocks.len() as f64;
    Some(block_loudness(integrated_mean))
}

/// Loudness of a mean-square energy value
fn block_loudness(mean_square: f64) -> f64 {
    if mean_square <= 0.0 {
        return f64::NEG_INFINITY;
    }
    -0.691 + 10.0 * mean_square.log10()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, secs: f32, amplitude: f32) -> Vec<f32> {
        let count = (secs * TARGET_SAMPLE_RATE as f32) as usize;
        (0..count)
            .map(|i| {
                let t = i as f32 / TARGET_SAMPLE_RATE as f32;
                amplitude * (2.0 * std::f32::consts::PI * freq * t).sin()
            })
            .collect()
    }

    #[test]
    fn test_full_scale_sine_loudness() {
        // A full-scale sine has mean-square 0.5:
        // -0.691 + 10*log10(0.5) = -3.70 LUFS
        let samples = sine(1000.0, 5.0, 1.0);
        let lufs = integrated_loudness(&samples).unwrap();
        assert!((lufs - (-3.70)).abs() < 0.1, "got {lufs}");
    }

    #[test]
    fn test_quieter_is_lower() {
        let loud = integrated_loudness(&sine(1000.0, 5.0, 0.8)).unwrap();
        let quiet = integrated_loudness(&sine(1000.0, 5.0, 0.2)).unwrap();
        assert!(loud > quiet);
        // Half amplitude is one quarter power: about -12 LU
        assert!(((loud - quiet) - 12.04).abs() < 0.2);
    }

    #[test]
    fn test_silence_is_absent() {
        let samples = vec![0.0f32; TARGET_SAMPLE_RATE as usize * 5];
        assert!(integrated_loudness(&samples).is_none());
    }

    #[test]
    fn test_bit_for_bit_determinism() {
        let samples = sine(440.0, 4.0, 0.6);
        let first = integrated_loudness(&samples).unwrap();
        let second = integrated_loudness(&samples.clone()).unwrap();
        assert_eq!(first.to_bits(), second.to_bits());
    }

    #[test]
    fn test_gating_ignores_long_silence() {
        // Loud sine followed by silence: the silence must not drag the
        // integrated value down
        let mut samples = sine(1000.0, 4.0, 0.8);
        let loud_only = integrated_loudness(&samples).unwrap();
        samples.extend(vec![0.0f32; TARGET_SAMPLE_RATE as usize * 4]);
        let with_silence = integrated_loudness(&samples).unwrap();
        assert!((loud_only - with_silence).abs() < 0.5);
    }
}

//! Compact waveform overview
//!
//! One byte per column, peak amplitude scaled to 0-255. Cheap to compute
//! while the samples are already in memory and enough for a consumer to
//! draw a recognizable overview without re-decoding the file.

/// Number of columns in the overview
pub const OVERVIEW_COLUMNS: usize = 400;

/// Generate the overview for a mono sample stream
pub fn overview(samples: &[f32]) -> Vec<u8> {
    let samples_per_column = samples.len() / OVERVIEW_COLUMNS;
    if samples_per_column == 0 {
        return vec![0; OVERVIEW_COLUMNS];
    }

    let mut result = Vec::with_capacity(OVERVIEW_COLUMNS);
    for column in 0..OVERVIEW_COLUMNS {
        let start = column * samples_per_column;
        let end = ((column + 1) * samples_per_column).min(samples.len());

        let peak = samples[start..end]
            .iter()
            .map(|s| s.abs())
            .fold(0.0f32, f32::max);

        result.push((peak.min(1.0) * 255.0) as u8);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overview_has_fixed_width() {
        let samples = vec![0.5f32; 100_000];
        assert_eq!(overview(&samples).len(), OVERVIEW_COLUMNS);
    }

    #[test]
    fn test_overview_tracks_amplitude() {
        // First half loud, second half quiet
        let mut samples = vec![0.8f32; 50_000];
        samples.extend(vec![0.1f32; 50_000]);

        let columns = overview(&samples);
        assert!(columns[10] > columns[390]);
        assert_eq!(columns[10], (0.8f32 * 255.0) as u8);
    }

    #[test]
    fn test_short_input_is_flat() {
        let columns = overview(&[0.5f32; 10]);
        assert_eq!(columns, vec![0; OVERVIEW_COLUMNS]);
    }
}

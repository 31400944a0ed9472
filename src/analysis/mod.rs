//! Audio analysis layer
//!
//! Pure functions from decoded samples to estimates. Each sub-analysis
//! (tempo, key, loudness) reports a confidence and comes back absent rather
//! than guessed when that confidence is below the configured threshold:
//! a silently wrong tempo is worse than a missing one. An inconclusive
//! sub-analysis never fails the track: partial results are first-class.

mod key;
mod loudness;
mod onset;
mod tempo;
mod waveform;

pub use key::estimate_key;
pub use loudness::integrated_loudness;
pub use tempo::estimate_tempo;
pub use waveform::{overview, OVERVIEW_COLUMNS};

use crate::audio::DecodedAudio;
use crate::config::AnalysisConfig;
use crate::model::{AcousticSignature, KeyEstimate, TempoEstimate};

/// Combined result of one analysis pass over a decoded stream
#[derive(Debug, Clone)]
pub struct TrackAnalysis {
    pub tempo: Option<TempoEstimate>,
    pub key: Option<KeyEstimate>,
    pub loudness_lufs: Option<f64>,
    pub waveform: Vec<u8>,
    /// Filled in by the caller from the content identifier; the analyzer
    /// itself does not compute identity data
    pub signature: Option<AcousticSignature>,
}

/// Run every sub-analysis over an already-decoded stream
///
/// Decoding is never repeated here: the same samples that produced the
/// fingerprint are analyzed. This function has no side effects and never
/// fails; absent fields encode inconclusive sub-analyses.
pub fn analyze_samples(audio: &DecodedAudio, config: &AnalysisConfig) -> TrackAnalysis {
    let tempo = estimate_tempo(&audio.samples, config);
    let key = estimate_key(&audio.samples, config);
    let loudness_lufs = integrated_loudness(&audio.samples);
    let waveform = overview(&audio.samples);

    log::debug!(
        "Analysis: tempo={}, key={}, loudness={}",
        tempo
            .map(|t| format!("{:.1} BPM ({:.2})", t.bpm, t.confidence))
            .unwrap_or_else(|| "absent".into()),
        key.map(|k| format!("{} ({:.2})", k.key.name(), k.confidence))
            .unwrap_or_else(|| "absent".into()),
        loudness_lufs
            .map(|l| format!("{:.1} LUFS", l))
            .unwrap_or_else(|| "absent".into()),
    );

    TrackAnalysis {
        tempo,
        key,
        loudness_lufs,
        waveform,
        signature: None,
    }
}

//! Library configuration
//!
//! All tuning values (confidence thresholds, near-duplicate tolerances, the
//! tombstone grace period) live here rather than as constants in the
//! algorithms, so they can be adjusted and validated empirically.

use crate::dupes::ResolutionPolicy;
use crate::error::{LibraryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Default audio file extensions considered during a walk
pub const DEFAULT_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "m4a", "ogg", "aiff"];

/// Configuration for the whole library engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Root directories to walk
    pub roots: Vec<PathBuf>,

    /// Allowed file extensions, lowercase without the dot
    pub extensions: BTreeSet<String>,

    /// Where the store snapshot is persisted
    pub store_path: PathBuf,

    /// Worker threads for decode/analysis (0 = available parallelism)
    pub worker_threads: usize,

    /// Bounded depth of the walk-to-worker queue; applies backpressure
    /// against a fast walk overwhelming memory with buffered samples
    pub queue_depth: usize,

    /// Analysis tuning
    pub analysis: AnalysisConfig,

    /// Near-duplicate grouping tuning
    pub duplicates: DuplicateConfig,

    /// Seconds a track record with no remaining paths is retained before
    /// permanent removal
    pub tombstone_grace_secs: u64,
}

/// Tuning for the audio analyzer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Minimum BPM for tempo detection range
    pub min_bpm: f32,
    /// Maximum BPM for tempo detection range
    pub max_bpm: f32,
    /// Tempo estimates below this confidence are reported as absent
    pub tempo_min_confidence: f32,
    /// Key estimates below this confidence are reported as absent
    pub key_min_confidence: f32,
    /// Score gap under which a relative major/minor pair counts as a tie;
    /// the relative major wins the tie
    pub key_tie_tolerance: f32,
}

/// Tuning for near-duplicate grouping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateConfig {
    /// Minimum cosine similarity between acoustic signatures
    pub similarity_threshold: f32,
    /// Maximum duration difference in seconds between group members
    pub duration_tolerance_secs: f64,
    /// Policy applied when proposing actions for a group
    pub policy: ResolutionPolicy,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_bpm: 70.0,
            max_bpm: 170.0,
            tempo_min_confidence: 0.3,
            key_min_confidence: 0.35,
            key_tie_tolerance: 0.02,
        }
    }
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.95,
            duration_tolerance_secs: 2.0,
            policy: ResolutionPolicy::KeepAll,
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            store_path: PathBuf::from("tunedex.json"),
            worker_threads: 0,
            queue_depth: 64,
            analysis: AnalysisConfig::default(),
            duplicates: DuplicateConfig::default(),
            tombstone_grace_secs: 3600,
        }
    }
}

impl LibraryConfig {
    /// Create a configuration for the given root directories
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            ..Self::default()
        }
    }

    /// Set the store snapshot location
    pub fn with_store_path(mut self, path: PathBuf) -> Self {
        self.store_path = path;
        self
    }

    /// Set the worker thread count (0 = available parallelism)
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Set the duplicate resolution policy
    pub fn with_policy(mut self, policy: ResolutionPolicy) -> Self {
        self.duplicates.policy = policy;
        self
    }

    /// Number of worker threads after resolving the automatic setting
    pub fn effective_threads(&self) -> usize {
        if self.worker_threads > 0 {
            self.worker_threads
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }

    /// True if the path carries one of the allowed extensions
    pub fn matches_extension(&self, path: &std::path::Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.contains(&e.to_lowercase()))
            .unwrap_or(false)
    }

    /// Check the configuration for out-of-range tuning values
    pub fn validate(&self) -> Result<()> {
        if self.roots.is_empty() {
            return Err(LibraryError::Config("no root directories".into()));
        }
        if self.analysis.min_bpm <= 0.0 || self.analysis.max_bpm <= self.analysis.min_bpm {
            return Err(LibraryError::Config(format!(
                "invalid BPM range {}-{}",
                self.analysis.min_bpm, self.analysis.max_bpm
            )));
        }
        for (name, value) in [
            ("tempo_min_confidence", self.analysis.tempo_min_confidence),
            ("key_min_confidence", self.analysis.key_min_confidence),
            ("similarity_threshold", self.duplicates.similarity_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(LibraryError::Config(format!(
                    "{name} must be within 0..=1, got {value}"
                )));
            }
        }
        if self.queue_depth == 0 {
            return Err(LibraryError::Config("queue_depth must be nonzero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_default_is_valid_apart_from_roots() {
        let config = LibraryConfig::default();
        assert!(config.validate().is_err());

        let config = LibraryConfig::new(vec![PathBuf::from("/music")]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_extension_filter_is_case_insensitive() {
        let config = LibraryConfig::default();
        assert!(config.matches_extension(Path::new("/music/track.MP3")));
        assert!(config.matches_extension(Path::new("/music/track.flac")));
        assert!(!config.matches_extension(Path::new("/music/cover.jpg")));
        assert!(!config.matches_extension(Path::new("/music/noext")));
    }

    #[test]
    fn test_rejects_inverted_bpm_range() {
        let mut config = LibraryConfig::new(vec![PathBuf::from("/music")]);
        config.analysis.min_bpm = 180.0;
        assert!(config.validate().is_err());
    }
}

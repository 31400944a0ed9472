use super::{AcousticSignature, Fingerprint};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One of the twelve pitch classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PitchClass {
    C,
    Db,
    D,
    Eb,
    E,
    F,
    Gb,
    G,
    Ab,
    A,
    Bb,
    B,
}

impl PitchClass {
    /// Pitch class from a semitone index (0 = C); wraps modulo 12
    pub fn from_index(index: usize) -> Self {
        use PitchClass::*;
        match index % 12 {
            0 => C,
            1 => Db,
            2 => D,
            3 => Eb,
            4 => E,
            5 => F,
            6 => Gb,
            7 => G,
            8 => Ab,
            9 => A,
            10 => Bb,
            _ => B,
        }
    }

    /// Semitone index, 0 = C
    pub fn index(&self) -> usize {
        use PitchClass::*;
        match self {
            C => 0,
            Db => 1,
            D => 2,
            Eb => 3,
            E => 4,
            F => 5,
            Gb => 6,
            G => 7,
            Ab => 8,
            A => 9,
            Bb => 10,
            B => 11,
        }
    }

    pub fn name(&self) -> &'static str {
        use PitchClass::*;
        match self {
            C => "C",
            Db => "Db",
            D => "D",
            Eb => "Eb",
            E => "E",
            F => "F",
            Gb => "Gb",
            G => "G",
            Ab => "Ab",
            A => "A",
            Bb => "Bb",
            B => "B",
        }
    }
}

/// Major or minor mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Major,
    Minor,
}

/// A musical key: pitch class plus mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MusicalKey {
    pub pitch_class: PitchClass,
    pub mode: Mode,
}

impl MusicalKey {
    pub fn new(pitch_class: PitchClass, mode: Mode) -> Self {
        Self { pitch_class, mode }
    }

    /// The relative major of a minor key (A minor -> C major).
    /// Returns self for major keys.
    pub fn relative_major(&self) -> MusicalKey {
        match self.mode {
            Mode::Major => *self,
            Mode::Minor => MusicalKey::new(
                PitchClass::from_index(self.pitch_class.index() + 3),
                Mode::Major,
            ),
        }
    }

    /// Human-readable name, e.g. "C Major" or "A Minor"
    pub fn name(&self) -> String {
        let mode = match self.mode {
            Mode::Major => "Major",
            Mode::Minor => "Minor",
        };
        format!("{} {}", self.pitch_class.name(), mode)
    }
}

/// Tempo estimate with the confidence that produced it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoEstimate {
    /// Beats per minute
    pub bpm: f32,
    /// Confidence in [0, 1]
    pub confidence: f32,
}

/// Key estimate with the confidence that produced it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyEstimate {
    pub key: MusicalKey,
    /// Confidence in [0, 1]
    pub confidence: f32,
}

/// Where a track record stands in the analysis lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisStatus {
    /// Fingerprinted, analysis not yet run
    Pending,
    /// Analysis ran; individual estimates may still be absent
    Analyzed,
    /// Decoding or fingerprinting failed
    Failed(String),
}

/// Last-seen filesystem state for one path of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEntry {
    /// Modification time, seconds since the epoch
    pub mtime: i64,
    /// File size in bytes
    pub size: u64,
}

/// Everything the library knows about one unique piece of audio content
///
/// Keyed by fingerprint; paths are many-to-one. The path set is never empty
/// while the record is reachable from a scan; when the last path vanishes
/// the record is tombstoned (`empty_since`) instead of dropped, to absorb
/// transient filesystem unavailability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackRecord {
    pub fingerprint: Fingerprint,

    /// Duration of the decoded stream in seconds
    pub duration_secs: f64,

    /// Sample rate of the source file this record was first decoded from
    pub sample_rate: u32,

    pub tempo: Option<TempoEstimate>,

    pub key: Option<KeyEstimate>,

    /// Integrated loudness in LUFS
    pub loudness_lufs: Option<f64>,

    /// Coarse spectral sketch for near-duplicate grouping
    pub signature: Option<AcousticSignature>,

    /// Compact amplitude overview, one byte per column
    #[serde(default)]
    pub waveform: Vec<u8>,

    /// Known locations of this content with their last-seen state
    pub paths: BTreeMap<PathBuf, PathEntry>,

    pub status: AnalysisStatus,

    /// Free-form user tags
    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    /// Free-form user notes
    #[serde(default)]
    pub notes: String,

    /// When this record was created, seconds since the epoch
    pub first_seen: i64,

    /// Set when the path set became empty; cleared when a path returns
    pub empty_since: Option<i64>,
}

impl TrackRecord {
    /// Create a pending record for freshly fingerprinted content
    pub fn new(fingerprint: Fingerprint, duration_secs: f64, sample_rate: u32, now: i64) -> Self {
        Self {
            fingerprint,
            duration_secs,
            sample_rate,
            tempo: None,
            key: None,
            loudness_lufs: None,
            signature: None,
            waveform: Vec::new(),
            paths: BTreeMap::new(),
            status: AnalysisStatus::Pending,
            tags: BTreeMap::new(),
            notes: String::new(),
            first_seen: now,
            empty_since: None,
        }
    }

    /// True if all paths are gone and the grace timer is running
    pub fn is_tombstoned(&self) -> bool {
        self.empty_since.is_some()
    }

    /// Largest file size among the known paths, 0 if none
    pub fn largest_file_size(&self) -> u64 {
        self.paths.values().map(|entry| entry.size).max().unwrap_or(0)
    }

    /// Most recent modification time among the known paths
    pub fn newest_mtime(&self) -> Option<i64> {
        self.paths.values().map(|entry| entry.mtime).max()
    }

    /// First path in lexical order; deterministic tie-break anchor
    pub fn earliest_path(&self) -> Option<&PathBuf> {
        self.paths.keys().next()
    }
}

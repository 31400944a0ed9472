//! Core data model: fingerprints, acoustic signatures and track records

mod fingerprint;
mod track;

pub use fingerprint::{AcousticSignature, Fingerprint};
pub use track::{
    AnalysisStatus, KeyEstimate, Mode, MusicalKey, PathEntry, PitchClass, TempoEstimate,
    TrackRecord,
};

//! Audio decoding and content identification
//!
//! Decoding happens exactly once per file: the decoded, normalized sample
//! stream feeds both the fingerprint ([`identify`]) and the analyzer
//! (`crate::analysis`).

mod decode;
mod identify;

pub use decode::{decode_file, DecodedAudio, MIN_ANALYZABLE_SECS, TARGET_SAMPLE_RATE};
pub use identify::{fingerprint, raw_fingerprint, signature};

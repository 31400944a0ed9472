//! Error types for library operations
//!
//! Error strategy follows two tiers: per-file errors (decode failures,
//! unreadable paths) are recorded on the affected track and never abort a
//! batch; store-level errors (persistence, unknown fingerprints) propagate
//! to the caller.

use crate::model::Fingerprint;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for tunedex operations
#[derive(Debug, Error)]
pub enum LibraryError {
    /// The audio stream could not be decoded (corrupt file, unsupported codec)
    #[error("failed to decode '{path}': {reason}")]
    Decode { path: PathBuf, reason: String },

    /// Decoded audio is below the minimum analyzable duration
    #[error("'{path}' is too short to analyze ({seconds:.2}s)")]
    TooShort { path: PathBuf, seconds: f64 },

    /// Operation addressed a fingerprint the store does not know
    #[error("no track record for fingerprint {0}")]
    NotFound(Fingerprint),

    /// The persisted store snapshot could not be written or read back
    #[error("store persistence failed at '{path}': {reason}")]
    Persist { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for library operations
pub type Result<T> = std::result::Result<T, LibraryError>;

impl LibraryError {
    /// True if this error affects a single file and the batch should continue
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            LibraryError::Decode { .. } | LibraryError::TooShort { .. }
        )
    }

    pub(crate) fn decode(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        LibraryError::Decode {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn persist(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        LibraryError::Persist {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_file_classification() {
        let decode = LibraryError::decode("/music/a.mp3", "unsupported codec");
        assert!(decode.is_per_file());

        let persist = LibraryError::persist("/store.json", "disk full");
        assert!(!persist.is_per_file());
    }
}

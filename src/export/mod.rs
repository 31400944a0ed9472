//! Export surface for external integrations
//!
//! DJ-tool exporters and cloud sync consume the library through this
//! read-only contract; they never mutate track records directly. Incremental
//! sync subscribes to [`TrackChange`] events via
//! [`MetadataStore::subscribe`](crate::store::MetadataStore::subscribe),
//! which decouples any presentation or transport layer from the analysis
//! pipeline.

use crate::model::{Fingerprint, TrackRecord};
use crate::store::MetadataStore;

/// What happened to a track record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A record was created for freshly fingerprinted content
    Created,
    /// Analysis results were merged into the record
    Analyzed,
    /// Decoding or fingerprinting failed for the record
    AnalysisFailed,
    /// The path set changed (file added, moved or removed)
    PathsChanged,
    /// Tags or notes changed
    TagsChanged,
    /// The last path vanished; the grace timer started
    Tombstoned,
    /// The record was permanently removed after its grace period
    Purged,
}

/// A single change notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackChange {
    pub fingerprint: Fingerprint,
    pub kind: ChangeKind,
}

impl TrackChange {
    pub(crate) fn new(fingerprint: Fingerprint, kind: ChangeKind) -> Self {
        Self { fingerprint, kind }
    }
}

/// Read-only view of the library consumed by export adapters
pub trait ExportSource {
    /// Every track record, in stable fingerprint order
    fn list_tracks(&self) -> Vec<TrackRecord>;

    /// A single record by fingerprint
    fn get_track(&self, fingerprint: &Fingerprint) -> Option<TrackRecord>;
}

impl ExportSource for MetadataStore {
    fn list_tracks(&self) -> Vec<TrackRecord> {
        self.tracks()
    }

    fn get_track(&self, fingerprint: &Fingerprint) -> Option<TrackRecord> {
        self.lookup(fingerprint)
    }
}

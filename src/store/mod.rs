//! Metadata store
//!
//! A key-value store of track records keyed by fingerprint, plus a path
//! index (path -> fingerprint, mtime, size) used by the reconciler to skip
//! unchanged files without decoding them. The store is the only shared
//! mutable resource in the system: every mutating operation takes the
//! single inner lock, so updates are atomic per fingerprint and concurrent
//! upserts for the same fingerprint serialize without lost updates.
//!
//! Change observers are notified after the lock is released, so a slow
//! observer can never stall a walk.

mod persist;
mod stats;

pub use stats::{human_size, LibraryStats};

use crate::analysis::TrackAnalysis;
use crate::error::{LibraryError, Result};
use crate::export::{ChangeKind, TrackChange};
use crate::model::{AnalysisStatus, Fingerprint, PathEntry, TrackRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Last-seen filesystem state for a path, independent of its record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedPath {
    pub fingerprint: Fingerprint,
    pub mtime: i64,
    pub size: u64,
}

/// Outcome of registering a path under a fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new track record was created
    Created,
    /// The record existed; the path was added or moved to it
    PathAdded,
    /// The record and path were already known; mtime/size refreshed
    Refreshed,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct StoreInner {
    records: HashMap<Fingerprint, TrackRecord>,
    path_index: HashMap<PathBuf, IndexedPath>,
}

type Observer = Box<dyn Fn(&TrackChange) + Send + Sync>;

/// Thread-safe store of track records
pub struct MetadataStore {
    inner: Mutex<StoreInner>,
    observers: Mutex<Vec<Observer>>,
}

impl Default for MetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataStore {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Load a store from its persisted snapshot
    ///
    /// A missing file yields a fresh store; a corrupt file is a fatal
    /// persistence error, never silently discarded.
    pub fn load(path: &Path) -> Result<Self> {
        let inner = persist::load_snapshot(path)?;
        log::info!(
            "Store loaded from {:?}: {} records, {} indexed paths",
            path,
            inner.records.len(),
            inner.path_index.len()
        );
        Ok(Self {
            inner: Mutex::new(inner),
            observers: Mutex::new(Vec::new()),
        })
    }

    /// Persist a snapshot, crash-safe via write-then-atomic-rename
    pub fn save(&self, path: &Path) -> Result<()> {
        let inner = self.lock();
        persist::save_snapshot(&inner, path)?;
        log::info!("Store saved to {:?} ({} records)", path, inner.records.len());
        Ok(())
    }

    /// Register an observer for track changes (the export contract's
    /// `on_track_changed`)
    pub fn subscribe(&self, observer: Observer) {
        self.observers
            .lock()
            .expect("observer registry poisoned")
            .push(observer);
    }

    /// Look up a track record by fingerprint
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<TrackRecord> {
        self.lock().records.get(fingerprint).cloned()
    }

    /// Last-seen state for a path, if any
    pub fn path_state(&self, path: &Path) -> Option<IndexedPath> {
        self.lock().path_index.get(path).copied()
    }

    /// All paths currently known to the index
    pub fn indexed_paths(&self) -> Vec<PathBuf> {
        self.lock().path_index.keys().cloned().collect()
    }

    /// Snapshot of every track record, ordered by fingerprint
    pub fn tracks(&self) -> Vec<TrackRecord> {
        let inner = self.lock();
        let mut tracks: Vec<TrackRecord> = inner.records.values().cloned().collect();
        tracks.sort_by_key(|record| record.fingerprint);
        tracks
    }

    /// Number of track records, tombstoned included
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// Register freshly fingerprinted content at a path; the creation path
    /// of the track lifecycle
    ///
    /// Idempotent: re-registering a known (fingerprint, path) pair only
    /// refreshes mtime/size. If the path previously resolved to a different
    /// fingerprint (file content changed in place), it is detached from the
    /// old record first, which may start that record's tombstone timer.
    pub fn insert_track(
        &self,
        fingerprint: Fingerprint,
        duration_secs: f64,
        sample_rate: u32,
        path: &Path,
        mtime: i64,
        size: u64,
    ) -> InsertOutcome {
        let now = chrono::Utc::now().timestamp();
        let mut events = Vec::new();
        let outcome;
        {
            let mut inner = self.lock();

            detach_if_reassigned(&mut inner, path, fingerprint, now, &mut events);

            if !inner.records.contains_key(&fingerprint) {
                inner.records.insert(
                    fingerprint,
                    TrackRecord::new(fingerprint, duration_secs, sample_rate, now),
                );
                events.push(TrackChange::new(fingerprint, ChangeKind::Created));
                register_path_locked(&mut inner, fingerprint, path, mtime, size);
                outcome = InsertOutcome::Created;
            } else if register_path_locked(&mut inner, fingerprint, path, mtime, size) {
                outcome = InsertOutcome::Refreshed;
            } else {
                events.push(TrackChange::new(fingerprint, ChangeKind::PathsChanged));
                outcome = InsertOutcome::PathAdded;
            }
        }
        self.notify(&events);
        outcome
    }

    /// Record that a known fingerprint was seen at a path
    ///
    /// Idempotent: adds the path if missing, refreshes mtime if present.
    /// Unlike [`Self::insert_track`] this is not a creation path and fails
    /// with `NotFound` for unknown fingerprints.
    pub fn record_path_seen(
        &self,
        fingerprint: Fingerprint,
        path: &Path,
        mtime: i64,
        size: u64,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut events = Vec::new();
        {
            let mut inner = self.lock();
            if !inner.records.contains_key(&fingerprint) {
                return Err(LibraryError::NotFound(fingerprint));
            }
            detach_if_reassigned(&mut inner, path, fingerprint, now, &mut events);
            if !register_path_locked(&mut inner, fingerprint, path, mtime, size) {
                events.push(TrackChange::new(fingerprint, ChangeKind::PathsChanged));
            }
        }
        self.notify(&events);
        Ok(())
    }

    /// Record that a path no longer exists
    ///
    /// Removes the path from whichever record holds it; if that empties the
    /// record's path set, the tombstone grace timer starts. Returns the
    /// affected fingerprint, or None for paths the store never knew.
    pub fn record_path_gone(&self, path: &Path) -> Option<Fingerprint> {
        let now = chrono::Utc::now().timestamp();
        let mut events = Vec::new();
        let affected;
        {
            let mut inner = self.lock();
            let indexed = inner.path_index.remove(path)?;
            affected = indexed.fingerprint;

            if let Some(record) = inner.records.get_mut(&affected) {
                record.paths.remove(path);
                events.push(TrackChange::new(affected, ChangeKind::PathsChanged));
                if record.paths.is_empty() && record.empty_since.is_none() {
                    record.empty_since = Some(now);
                    events.push(TrackChange::new(affected, ChangeKind::Tombstoned));
                    log::debug!("Tombstoned {} (last path gone: {:?})", affected, path);
                }
            }
        }
        self.notify(&events);
        Some(affected)
    }

    /// Merge analysis results into a record
    ///
    /// Never degrades: absent incoming fields leave existing values alone,
    /// and a tempo/key estimate only replaces an existing one at equal or
    /// higher confidence, unless `force` is set, which overwrites
    /// unconditionally.
    pub fn upsert_analysis(
        &self,
        fingerprint: Fingerprint,
        analysis: &TrackAnalysis,
        force: bool,
    ) -> Result<()> {
        let mut events = Vec::new();
        {
            let mut inner = self.lock();
            let record = inner
                .records
                .get_mut(&fingerprint)
                .ok_or(LibraryError::NotFound(fingerprint))?;

            if let Some(incoming) = analysis.tempo {
                let keep_existing = !force
                    && record
                        .tempo
                        .map(|existing| incoming.confidence < existing.confidence)
                        .unwrap_or(false);
                if keep_existing {
                    log::debug!(
                        "Keeping higher-confidence tempo for {} ({:.2} > {:.2})",
                        fingerprint,
                        record.tempo.map(|t| t.confidence).unwrap_or(0.0),
                        incoming.confidence
                    );
                } else {
                    record.tempo = Some(incoming);
                }
            } else if force {
                record.tempo = None;
            }

            if let Some(incoming) = analysis.key {
                let keep_existing = !force
                    && record
                        .key
                        .map(|existing| incoming.confidence < existing.confidence)
                        .unwrap_or(false);
                if !keep_existing {
                    record.key = Some(incoming);
                }
            } else if force {
                record.key = None;
            }

            if analysis.loudness_lufs.is_some() || force {
                record.loudness_lufs = analysis.loudness_lufs;
            }
            if analysis.signature.is_some() || force {
                record.signature = analysis.signature.clone();
            }
            if !analysis.waveform.is_empty() || force {
                record.waveform = analysis.waveform.clone();
            }

            record.status = AnalysisStatus::Analyzed;
            events.push(TrackChange::new(fingerprint, ChangeKind::Analyzed));
        }
        self.notify(&events);
        Ok(())
    }

    /// Mark a record as failed
    ///
    /// Only pending records transition to failed: a re-analysis failure
    /// never clobbers previously analyzed data.
    pub fn record_failure(&self, fingerprint: Fingerprint, reason: &str) -> Result<()> {
        let mut events = Vec::new();
        {
            let mut inner = self.lock();
            let record = inner
                .records
                .get_mut(&fingerprint)
                .ok_or(LibraryError::NotFound(fingerprint))?;

            match record.status {
                AnalysisStatus::Analyzed => {
                    log::warn!(
                        "Ignoring failure for already-analyzed {}: {}",
                        fingerprint,
                        reason
                    );
                }
                _ => {
                    record.status = AnalysisStatus::Failed(reason.to_string());
                    events.push(TrackChange::new(fingerprint, ChangeKind::AnalysisFailed));
                }
            }
        }
        self.notify(&events);
        Ok(())
    }

    /// User tags for a record
    pub fn tags(&self, fingerprint: &Fingerprint) -> Result<std::collections::BTreeMap<String, String>> {
        let inner = self.lock();
        inner
            .records
            .get(fingerprint)
            .map(|record| record.tags.clone())
            .ok_or(LibraryError::NotFound(*fingerprint))
    }

    /// Set a user tag
    pub fn set_tag(&self, fingerprint: &Fingerprint, key: &str, value: &str) -> Result<()> {
        self.with_record(fingerprint, |record| {
            record.tags.insert(key.to_string(), value.to_string());
        })
    }

    /// Remove a user tag; removing an absent tag is not an error
    pub fn remove_tag(&self, fingerprint: &Fingerprint, key: &str) -> Result<()> {
        self.with_record(fingerprint, |record| {
            record.tags.remove(key);
        })
    }

    /// Replace the free-form notes on a record
    pub fn set_notes(&self, fingerprint: &Fingerprint, notes: &str) -> Result<()> {
        self.with_record(fingerprint, |record| {
            record.notes = notes.to_string();
        })
    }

    /// Permanently remove tombstoned records whose grace period has elapsed
    pub fn purge_tombstones(&self, grace_secs: u64) -> Vec<Fingerprint> {
        self.purge_tombstones_at(grace_secs, chrono::Utc::now().timestamp())
    }

    pub(crate) fn purge_tombstones_at(&self, grace_secs: u64, now: i64) -> Vec<Fingerprint> {
        let mut events = Vec::new();
        let purged: Vec<Fingerprint>;
        {
            let mut inner = self.lock();
            purged = inner
                .records
                .values()
                .filter(|record| {
                    record
                        .empty_since
                        .map(|since| now - since >= grace_secs as i64)
                        .unwrap_or(false)
                })
                .map(|record| record.fingerprint)
                .collect();

            for fingerprint in &purged {
                inner.records.remove(fingerprint);
                events.push(TrackChange::new(*fingerprint, ChangeKind::Purged));
                log::info!("Purged tombstoned record {}", fingerprint);
            }
        }
        self.notify(&events);
        purged
    }

    /// Aggregate statistics over the current records
    pub fn stats(&self) -> LibraryStats {
        let inner = self.lock();
        LibraryStats::compute(inner.records.values())
    }

    fn with_record<F: FnOnce(&mut TrackRecord)>(
        &self,
        fingerprint: &Fingerprint,
        mutate: F,
    ) -> Result<()> {
        let mut events = Vec::new();
        {
            let mut inner = self.lock();
            let record = inner
                .records
                .get_mut(fingerprint)
                .ok_or(LibraryError::NotFound(*fingerprint))?;
            mutate(record);
            events.push(TrackChange::new(*fingerprint, ChangeKind::TagsChanged));
        }
        self.notify(&events);
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        self.inner.lock().expect("store lock poisoned")
    }

    fn notify(&self, events: &[TrackChange]) {
        if events.is_empty() {
            return;
        }
        let observers = self.observers.lock().expect("observer registry poisoned");
        for event in events {
            for observer in observers.iter() {
                observer(event);
            }
        }
    }
}

/// Add or refresh a path on an existing record; true if the path was
/// already known to that record. Cancels any running tombstone timer.
fn register_path_locked(
    inner: &mut StoreInner,
    fingerprint: Fingerprint,
    path: &Path,
    mtime: i64,
    size: u64,
) -> bool {
    let record = inner
        .records
        .get_mut(&fingerprint)
        .expect("caller verified the record exists");
    record.empty_since = None;
    let was_known = record
        .paths
        .insert(path.to_path_buf(), PathEntry { mtime, size })
        .is_some();
    inner.path_index.insert(
        path.to_path_buf(),
        IndexedPath {
            fingerprint,
            mtime,
            size,
        },
    );
    was_known
}

/// Detach a path from its previous record when its content changed
fn detach_if_reassigned(
    inner: &mut StoreInner,
    path: &Path,
    new_fingerprint: Fingerprint,
    now: i64,
    events: &mut Vec<TrackChange>,
) {
    let Some(previous) = inner.path_index.get(path) else {
        return;
    };
    if previous.fingerprint == new_fingerprint {
        return;
    }
    let old_fingerprint = previous.fingerprint;
    if let Some(old_record) = inner.records.get_mut(&old_fingerprint) {
        old_record.paths.remove(path);
        events.push(TrackChange::new(old_fingerprint, ChangeKind::PathsChanged));
        if old_record.paths.is_empty() && old_record.empty_since.is_none() {
            old_record.empty_since = Some(now);
            events.push(TrackChange::new(old_fingerprint, ChangeKind::Tombstoned));
        }
    }
    log::debug!(
        "Path {:?} reassigned from {} to {}",
        path,
        old_fingerprint,
        new_fingerprint
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TempoEstimate;
    use std::sync::Arc;

    fn fp(byte: u8) -> Fingerprint {
        Fingerprint::from_bytes([byte; 16])
    }

    fn analysis_with_tempo(bpm: f32, confidence: f32) -> TrackAnalysis {
        TrackAnalysis {
            tempo: Some(TempoEstimate { bpm, confidence }),
            key: None,
            loudness_lufs: Some(-10.0),
            waveform: vec![1, 2, 3],
            signature: None,
        }
    }

    #[test]
    fn test_insert_then_lookup() {
        let store = MetadataStore::new();
        let outcome = store.insert_track(fp(1), 180.0, 44_100, Path::new("/m/a.mp3"), 10, 100);
        assert_eq!(outcome, InsertOutcome::Created);

        let record = store.lookup(&fp(1)).unwrap();
        assert_eq!(record.status, AnalysisStatus::Pending);
        assert_eq!(record.paths.len(), 1);
    }

    #[test]
    fn test_insert_is_idempotent() {
        let store = MetadataStore::new();
        store.insert_track(fp(1), 180.0, 44_100, Path::new("/m/a.mp3"), 10, 100);
        let outcome = store.insert_track(fp(1), 180.0, 44_100, Path::new("/m/a.mp3"), 20, 100);
        assert_eq!(outcome, InsertOutcome::Refreshed);
        assert_eq!(store.len(), 1);
        assert_eq!(store.path_state(Path::new("/m/a.mp3")).unwrap().mtime, 20);
    }

    #[test]
    fn test_second_path_maps_to_same_record() {
        let store = MetadataStore::new();
        store.insert_track(fp(1), 180.0, 44_100, Path::new("/m/a.flac"), 10, 100);
        let outcome = store.insert_track(fp(1), 180.0, 44_100, Path::new("/m/copy.mp3"), 11, 50);
        assert_eq!(outcome, InsertOutcome::PathAdded);

        let record = store.lookup(&fp(1)).unwrap();
        assert_eq!(record.paths.len(), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_content_change_detaches_old_record() {
        let store = MetadataStore::new();
        let path = Path::new("/m/a.mp3");
        store.insert_track(fp(1), 180.0, 44_100, path, 10, 100);
        // Same path, new content
        store.insert_track(fp(2), 190.0, 44_100, path, 20, 120);

        let old = store.lookup(&fp(1)).unwrap();
        assert!(old.paths.is_empty());
        assert!(old.is_tombstoned());

        let new = store.lookup(&fp(2)).unwrap();
        assert_eq!(new.paths.len(), 1);
        assert_eq!(store.path_state(path).unwrap().fingerprint, fp(2));
    }

    #[test]
    fn test_path_seen_requires_known_fingerprint() {
        let store = MetadataStore::new();
        let result = store.record_path_seen(fp(9), Path::new("/m/x.mp3"), 1, 1);
        assert!(matches!(result, Err(LibraryError::NotFound(_))));
    }

    #[test]
    fn test_path_gone_tombstones_only_when_empty() {
        let store = MetadataStore::new();
        store.insert_track(fp(1), 180.0, 44_100, Path::new("/m/a.flac"), 10, 100);
        store.insert_track(fp(1), 180.0, 44_100, Path::new("/m/b.mp3"), 11, 50);

        assert_eq!(store.record_path_gone(Path::new("/m/b.mp3")), Some(fp(1)));
        let record = store.lookup(&fp(1)).unwrap();
        assert_eq!(record.paths.len(), 1);
        assert!(!record.is_tombstoned());

        assert_eq!(store.record_path_gone(Path::new("/m/a.flac")), Some(fp(1)));
        assert!(store.lookup(&fp(1)).unwrap().is_tombstoned());
    }

    #[test]
    fn test_returning_path_cancels_tombstone() {
        let store = MetadataStore::new();
        store.insert_track(fp(1), 180.0, 44_100, Path::new("/m/a.mp3"), 10, 100);
        store.record_path_gone(Path::new("/m/a.mp3"));
        assert!(store.lookup(&fp(1)).unwrap().is_tombstoned());

        store.insert_track(fp(1), 180.0, 44_100, Path::new("/m/a.mp3"), 12, 100);
        assert!(!store.lookup(&fp(1)).unwrap().is_tombstoned());
    }

    #[test]
    fn test_upsert_never_degrades_confidence() {
        let store = MetadataStore::new();
        store.insert_track(fp(1), 180.0, 44_100, Path::new("/m/a.mp3"), 10, 100);

        store
            .upsert_analysis(fp(1), &analysis_with_tempo(128.0, 0.8), false)
            .unwrap();
        // Lower-confidence re-analysis must not win
        store
            .upsert_analysis(fp(1), &analysis_with_tempo(64.0, 0.4), false)
            .unwrap();
        assert_eq!(store.lookup(&fp(1)).unwrap().tempo.unwrap().bpm, 128.0);

        // Unless forced
        store
            .upsert_analysis(fp(1), &analysis_with_tempo(64.0, 0.4), true)
            .unwrap();
        assert_eq!(store.lookup(&fp(1)).unwrap().tempo.unwrap().bpm, 64.0);
    }

    #[test]
    fn test_absent_fields_do_not_clear() {
        let store = MetadataStore::new();
        store.insert_track(fp(1), 180.0, 44_100, Path::new("/m/a.mp3"), 10, 100);
        store
            .upsert_analysis(fp(1), &analysis_with_tempo(128.0, 0.8), false)
            .unwrap();

        let inconclusive = TrackAnalysis {
            tempo: None,
            key: None,
            loudness_lufs: None,
            waveform: Vec::new(),
            signature: None,
        };
        store.upsert_analysis(fp(1), &inconclusive, false).unwrap();

        let record = store.lookup(&fp(1)).unwrap();
        assert!(record.tempo.is_some());
        assert!(record.loudness_lufs.is_some());
        assert!(!record.waveform.is_empty());
    }

    #[test]
    fn test_failure_does_not_clobber_analyzed() {
        let store = MetadataStore::new();
        store.insert_track(fp(1), 180.0, 44_100, Path::new("/m/a.mp3"), 10, 100);
        store
            .upsert_analysis(fp(1), &analysis_with_tempo(128.0, 0.8), false)
            .unwrap();
        store.record_failure(fp(1), "transient read error").unwrap();
        assert_eq!(store.lookup(&fp(1)).unwrap().status, AnalysisStatus::Analyzed);
    }

    #[test]
    fn test_tag_round_trip() {
        let store = MetadataStore::new();
        store.insert_track(fp(1), 180.0, 44_100, Path::new("/m/a.mp3"), 10, 100);

        store.set_tag(&fp(1), "genre", "techno").unwrap();
        store.set_tag(&fp(1), "energy", "high").unwrap();
        store.remove_tag(&fp(1), "energy").unwrap();
        store.remove_tag(&fp(1), "never-set").unwrap();

        let tags = store.tags(&fp(1)).unwrap();
        assert_eq!(tags.get("genre").map(String::as_str), Some("techno"));
        assert_eq!(tags.len(), 1);

        assert!(store.set_tag(&fp(9), "a", "b").is_err());
    }

    #[test]
    fn test_purge_honors_grace_period() {
        let store = MetadataStore::new();
        store.insert_track(fp(1), 180.0, 44_100, Path::new("/m/a.mp3"), 10, 100);
        store.record_path_gone(Path::new("/m/a.mp3"));

        let since = store.lookup(&fp(1)).unwrap().empty_since.unwrap();
        // Before the grace period: kept
        assert!(store.purge_tombstones_at(3600, since + 10).is_empty());
        assert_eq!(store.len(), 1);
        // After: purged
        assert_eq!(store.purge_tombstones_at(3600, since + 3600), vec![fp(1)]);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_concurrent_inserts_same_fingerprint() {
        let store = Arc::new(MetadataStore::new());
        let mut handles = Vec::new();

        for worker in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                let path = PathBuf::from(format!("/m/copy{worker}.mp3"));
                for _ in 0..50 {
                    store.insert_track(fp(1), 180.0, 44_100, &path, worker, 100);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // One record with every path present, none lost or duplicated
        assert_eq!(store.len(), 1);
        assert_eq!(store.lookup(&fp(1)).unwrap().paths.len(), 8);
    }

    #[test]
    fn test_observer_sees_lifecycle() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let store = MetadataStore::new();
        let created = Arc::new(AtomicUsize::new(0));
        let created_clone = Arc::clone(&created);
        store.subscribe(Box::new(move |change| {
            if change.kind == ChangeKind::Created {
                created_clone.fetch_add(1, Ordering::SeqCst);
            }
        }));

        store.insert_track(fp(1), 180.0, 44_100, Path::new("/m/a.mp3"), 10, 100);
        store.insert_track(fp(1), 180.0, 44_100, Path::new("/m/b.mp3"), 10, 100);
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }
}

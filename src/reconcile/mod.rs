//! Library reconciliation
//!
//! Walks the configured roots, diffs discovered files against the store's
//! path index and drives fingerprinting/analysis for changed entries only.
//! The walk itself is sequential and I/O-bound; it feeds a bounded channel
//! consumed by a worker pool, so a fast walk cannot overwhelm memory with
//! buffered samples and the walk never blocks on analysis completion
//! beyond queue capacity.
//!
//! Unchanged files (same path, mtime and size) are skipped without
//! decoding. A changed or new file is fingerprinted; if the fingerprint is
//! already known only the path mapping moves, which is what makes renames
//! and moves cheap. Per-file errors are recorded on the affected track and
//! never abort the walk.

use crate::analysis::analyze_samples;
use crate::audio;
use crate::config::LibraryConfig;
use crate::error::{LibraryError, Result};
use crate::model::AnalysisStatus;
use crate::store::{InsertOutcome, MetadataStore};
use crossbeam_channel::Sender;
use rayon::iter::{ParallelBridge, ParallelIterator};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

/// Cooperative cancellation for an in-flight walk
///
/// Workers check the token between items, so a cancelled task either
/// completes its single-fingerprint store update or is discarded entirely,
/// never half-applied.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// A per-file error captured during a walk
#[derive(Debug, Clone)]
pub struct FileFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of one reconciliation run
///
/// A walk always completes and reports counts; it never fails atomically
/// over per-file problems.
#[derive(Debug, Default)]
pub struct WalkSummary {
    /// Files matching the extension filter that the walk visited
    pub discovered: usize,
    /// Files skipped entirely because (path, mtime, size) was unchanged
    pub unchanged: usize,
    /// Files whose content was analyzed this run
    pub analyzed: usize,
    /// Files resolved to an existing record: path mapping updated only
    pub moved: usize,
    /// Per-file failures with reasons
    pub failed: Vec<FileFailure>,
    /// Paths reported gone because the walk no longer found them
    pub removed_paths: usize,
    /// Tombstoned records permanently removed this run
    pub purged: usize,
    /// True if the run was cancelled before completing
    pub cancelled: bool,
}

impl fmt::Display for WalkSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} discovered, {} unchanged, {} analyzed, {} moved, {} failed, {} removed, {} purged{}",
            self.discovered,
            self.unchanged,
            self.analyzed,
            self.moved,
            self.failed.len(),
            self.removed_paths,
            self.purged,
            if self.cancelled { " (cancelled)" } else { "" }
        )
    }
}

struct WorkItem {
    path: PathBuf,
    mtime: i64,
    size: u64,
}

struct WorkCounters {
    analyzed: AtomicUsize,
    moved: AtomicUsize,
    failures: Mutex<Vec<FileFailure>>,
}

struct WalkerOutcome {
    seen: HashSet<PathBuf>,
    discovered: usize,
    unchanged: usize,
    failures: Vec<FileFailure>,
}

/// Drives reconciliation of the filesystem against the metadata store
pub struct Reconciler<'a> {
    store: &'a MetadataStore,
    config: &'a LibraryConfig,
    force: bool,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a MetadataStore, config: &'a LibraryConfig) -> Self {
        Self {
            store,
            config,
            force: false,
        }
    }

    /// Re-fingerprint and re-analyze every file, overwriting existing
    /// results regardless of confidence
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Walk all roots and reconcile the store against what is found
    pub fn walk(&self, cancel: &CancelToken) -> Result<WalkSummary> {
        self.config.validate()?;

        let threads = self.config.effective_threads();
        log::info!(
            "Reconciling {} root(s) with {} worker(s)",
            self.config.roots.len(),
            threads
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| LibraryError::Config(format!("cannot build worker pool: {e}")))?;

        let known_paths = self.store.indexed_paths();
        let (tx, rx) = crossbeam_channel::bounded::<WorkItem>(self.config.queue_depth);
        let counters = WorkCounters {
            analyzed: AtomicUsize::new(0),
            moved: AtomicUsize::new(0),
            failures: Mutex::new(Vec::new()),
        };

        let walker_outcome = std::thread::scope(|scope| {
            let walker = scope.spawn(|| self.walk_roots(tx, cancel));

            pool.install(|| {
                rx.into_iter()
                    .par_bridge()
                    .for_each(|item| self.process_item(item, &counters, cancel));
            });

            walker.join().expect("walker thread panicked")
        });

        let mut summary = WalkSummary {
            discovered: walker_outcome.discovered,
            unchanged: walker_outcome.unchanged,
            analyzed: counters.analyzed.load(Ordering::SeqCst),
            moved: counters.moved.load(Ordering::SeqCst),
            failed: walker_outcome.failures,
            cancelled: cancel.is_cancelled(),
            ..WalkSummary::default()
        };
        summary
            .failed
            .extend(counters.failures.into_inner().expect("failure list poisoned"));

        // A cancelled walk has not seen everything, so absence proves
        // nothing; skip the removal and purge phases entirely.
        if !summary.cancelled {
            summary.removed_paths = self.remove_vanished(&known_paths, &walker_outcome.seen);
            summary.purged = self
                .store
                .purge_tombstones(self.config.tombstone_grace_secs)
                .len();
        }

        log::info!("Walk complete: {}", summary);
        Ok(summary)
    }

    /// Sequential filesystem walk; sends changed entries to the workers
    fn walk_roots(&self, tx: Sender<WorkItem>, cancel: &CancelToken) -> WalkerOutcome {
        let mut outcome = WalkerOutcome {
            seen: HashSet::new(),
            discovered: 0,
            unchanged: 0,
            failures: Vec::new(),
        };

        'roots: for root in &self.config.roots {
            log::debug!("Walking root {:?}", root);
            for entry in WalkDir::new(root) {
                if cancel.is_cancelled() {
                    log::info!("Walk cancelled");
                    break 'roots;
                }

                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        // Unreadable directory or file: report, keep walking
                        let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                        log::warn!("Walk error at {:?}: {}", path, e);
                        outcome.failures.push(FileFailure {
                            path,
                            reason: e.to_string(),
                        });
                        continue;
                    }
                };

                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry.path();
                if !self.config.matches_extension(path) {
                    continue;
                }

                let (mtime, size) = match file_state(path) {
                    Ok(state) => state,
                    Err(e) => {
                        log::warn!("Cannot stat {:?}: {}", path, e);
                        outcome.failures.push(FileFailure {
                            path: path.to_path_buf(),
                            reason: e.to_string(),
                        });
                        continue;
                    }
                };

                outcome.discovered += 1;
                outcome.seen.insert(path.to_path_buf());

                if !self.force {
                    if let Some(indexed) = self.store.path_state(path) {
                        if indexed.mtime == mtime && indexed.size == size {
                            outcome.unchanged += 1;
                            continue;
                        }
                    }
                }

                let item = WorkItem {
                    path: path.to_path_buf(),
                    mtime,
                    size,
                };
                if tx.send(item).is_err() {
                    // Workers are gone; nothing more to schedule
                    break 'roots;
                }
            }
        }

        outcome
    }

    /// Decode, fingerprint and (when needed) analyze one file
    fn process_item(&self, item: WorkItem, counters: &WorkCounters, cancel: &CancelToken) {
        if cancel.is_cancelled() {
            return;
        }

        let audio = match audio::decode_file(&item.path) {
            Ok(audio) => audio,
            Err(e) => {
                self.record_undecodable(&item, &e, counters);
                return;
            }
        };

        let fingerprint = audio::fingerprint(&audio);
        let outcome = self.store.insert_track(
            fingerprint,
            audio.duration_secs(),
            audio.source_sample_rate,
            &item.path,
            item.mtime,
            item.size,
        );

        let needs_analysis = self.force
            || match outcome {
                InsertOutcome::Created => true,
                InsertOutcome::PathAdded | InsertOutcome::Refreshed => self
                    .store
                    .lookup(&fingerprint)
                    .map(|record| record.status == AnalysisStatus::Pending)
                    .unwrap_or(false),
            };

        if !needs_analysis {
            log::debug!(
                "Known content at {:?}, path mapping updated ({})",
                item.path,
                fingerprint
            );
            counters.moved.fetch_add(1, Ordering::SeqCst);
            return;
        }

        // Cancelled between registration and analysis: the registration was
        // a complete atomic update, the analysis is simply discarded.
        if cancel.is_cancelled() {
            return;
        }

        let mut analysis = analyze_samples(&audio, &self.config.analysis);
        analysis.signature = Some(audio::signature(&audio));

        match self.store.upsert_analysis(fingerprint, &analysis, self.force) {
            Ok(()) => {
                counters.analyzed.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                log::error!("Cannot persist analysis for {:?}: {}", item.path, e);
                counters
                    .failures
                    .lock()
                    .expect("failure list poisoned")
                    .push(FileFailure {
                        path: item.path,
                        reason: e.to_string(),
                    });
            }
        }
    }

    /// Track an undecodable file under a raw-bytes fallback fingerprint so
    /// the failure is visible and re-walks skip it
    fn record_undecodable(&self, item: &WorkItem, error: &LibraryError, counters: &WorkCounters) {
        log::warn!("{}", error);
        counters
            .failures
            .lock()
            .expect("failure list poisoned")
            .push(FileFailure {
                path: item.path.clone(),
                reason: error.to_string(),
            });

        match audio::raw_fingerprint(&item.path) {
            Ok(fingerprint) => {
                self.store
                    .insert_track(fingerprint, 0.0, 0, &item.path, item.mtime, item.size);
                if let Err(e) = self.store.record_failure(fingerprint, &error.to_string()) {
                    log::error!("Cannot record failure for {:?}: {}", item.path, e);
                }
            }
            Err(e) => {
                // File vanished or is unreadable at the byte level; the
                // failure list entry is all we can keep
                log::warn!("Cannot fingerprint raw bytes of {:?}: {}", item.path, e);
            }
        }
    }

    /// Report paths the walk no longer found under its roots
    fn remove_vanished(&self, known: &[PathBuf], seen: &HashSet<PathBuf>) -> usize {
        let mut removed = 0;
        for path in known {
            let under_walked_root = self.config.roots.iter().any(|root| path.starts_with(root));
            if under_walked_root && !seen.contains(path) {
                log::debug!("Path gone: {:?}", path);
                if self.store.record_path_gone(path).is_some() {
                    removed += 1;
                }
            }
        }
        removed
    }
}

/// (mtime seconds, size bytes) for a path
fn file_state(path: &Path) -> std::io::Result<(i64, u64)> {
    let metadata = std::fs::metadata(path)?;
    let mtime = metadata
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Ok((mtime, metadata.len()))
}

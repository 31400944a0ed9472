//! Aggregate library statistics

use crate::model::{AnalysisStatus, TrackRecord};
use std::collections::BTreeMap;

/// Summary counts over the current track records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryStats {
    pub total_tracks: usize,
    pub total_paths: usize,
    pub total_bytes: u64,
    pub analyzed: usize,
    pub pending: usize,
    pub failed: usize,
    pub tombstoned: usize,
    /// Path counts per lowercase file extension
    pub by_extension: BTreeMap<String, usize>,
    /// Usage count per tag key
    pub tag_keys: BTreeMap<String, usize>,
}

impl LibraryStats {
    /// Compute statistics from an iterator of records
    pub fn compute<'a>(records: impl Iterator<Item = &'a TrackRecord>) -> Self {
        let mut stats = LibraryStats::default();

        for record in records {
            stats.total_tracks += 1;
            stats.total_paths += record.paths.len();
            stats.total_bytes += record.paths.values().map(|entry| entry.size).sum::<u64>();

            match &record.status {
                AnalysisStatus::Analyzed => stats.analyzed += 1,
                AnalysisStatus::Pending => stats.pending += 1,
                AnalysisStatus::Failed(_) => stats.failed += 1,
            }
            if record.is_tombstoned() {
                stats.tombstoned += 1;
            }

            for path in record.paths.keys() {
                if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                    *stats.by_extension.entry(ext.to_lowercase()).or_insert(0) += 1;
                }
            }
            for key in record.tags.keys() {
                *stats.tag_keys.entry(key.clone()).or_insert(0) += 1;
            }
        }

        stats
    }
}

/// Format a byte count for humans
pub fn human_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} TB")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Fingerprint, PathEntry};
    use std::path::PathBuf;

    #[test]
    fn test_stats_counts() {
        let mut a = TrackRecord::new(Fingerprint::from_bytes([1; 16]), 180.0, 44_100, 0);
        a.status = AnalysisStatus::Analyzed;
        a.paths
            .insert(PathBuf::from("/m/a.flac"), PathEntry { mtime: 1, size: 1000 });
        a.paths
            .insert(PathBuf::from("/m/a.mp3"), PathEntry { mtime: 1, size: 500 });
        a.tags.insert("genre".into(), "dub".into());

        let mut b = TrackRecord::new(Fingerprint::from_bytes([2; 16]), 90.0, 44_100, 0);
        b.status = AnalysisStatus::Failed("corrupt".into());
        b.empty_since = Some(5);

        let stats = LibraryStats::compute([&a, &b].into_iter());
        assert_eq!(stats.total_tracks, 2);
        assert_eq!(stats.total_paths, 2);
        assert_eq!(stats.total_bytes, 1500);
        assert_eq!(stats.analyzed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.tombstoned, 1);
        assert_eq!(stats.by_extension.get("flac"), Some(&1));
        assert_eq!(stats.tag_keys.get("genre"), Some(&1));
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(512), "512.0 B");
        assert_eq!(human_size(2048), "2.0 KB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.0 MB");
    }
}

//! Store snapshot persistence
//!
//! One JSON document holding every record and the path index. Writes go to
//! a sibling temp file first and land via atomic rename, so a crash
//! mid-write leaves the previous snapshot intact.

use super::StoreInner;
use crate::error::{LibraryError, Result};
use std::fs;
use std::path::Path;

/// Read a snapshot; a missing file yields an empty store
pub(super) fn load_snapshot(path: &Path) -> Result<StoreInner> {
    let json = match fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("No snapshot at {:?}, starting fresh", path);
            return Ok(StoreInner::default());
        }
        Err(e) => return Err(LibraryError::persist(path, format!("cannot read snapshot: {e}"))),
    };

    serde_json::from_str(&json)
        .map_err(|e| LibraryError::persist(path, format!("corrupt snapshot: {e}")))
}

/// Write a snapshot via write-then-atomic-rename
pub(super) fn save_snapshot(inner: &StoreInner, path: &Path) -> Result<()> {
    let json = serde_json::to_vec_pretty(inner)
        .map_err(|e| LibraryError::persist(path, format!("cannot serialize snapshot: {e}")))?;

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| LibraryError::persist(path, "snapshot path has no file name"))?;
    let temp_path = path.with_file_name(format!("{file_name}.tmp"));

    fs::write(&temp_path, &json)
        .map_err(|e| LibraryError::persist(&temp_path, format!("cannot write snapshot: {e}")))?;

    fs::rename(&temp_path, path)
        .map_err(|e| LibraryError::persist(path, format!("cannot replace snapshot: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::model::Fingerprint;
    use crate::store::MetadataStore;
    use std::path::Path;

    fn fp(byte: u8) -> Fingerprint {
        Fingerprint::from_bytes([byte; 16])
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("store.json");

        let store = MetadataStore::new();
        store.insert_track(fp(1), 180.0, 44_100, Path::new("/m/a.mp3"), 10, 100);
        store.insert_track(fp(2), 200.0, 48_000, Path::new("/m/b.flac"), 11, 200);
        store.set_tag(&fp(1), "genre", "dub").unwrap();
        store.save(&snapshot).unwrap();

        let loaded = MetadataStore::load(&snapshot).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(
            loaded.tags(&fp(1)).unwrap().get("genre").map(String::as_str),
            Some("dub")
        );
        assert_eq!(loaded.path_state(Path::new("/m/b.flac")).unwrap().fingerprint, fp(2));
    }

    #[test]
    fn test_missing_snapshot_is_fresh_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::load(&dir.path().join("absent.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_corrupt_snapshot_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("store.json");
        std::fs::write(&snapshot, "{ not json").unwrap();
        assert!(MetadataStore::load(&snapshot).is_err());
    }

    #[test]
    fn test_save_replaces_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("store.json");

        let store = MetadataStore::new();
        store.insert_track(fp(1), 180.0, 44_100, Path::new("/m/a.mp3"), 10, 100);
        store.save(&snapshot).unwrap();
        store.insert_track(fp(2), 181.0, 44_100, Path::new("/m/b.mp3"), 10, 100);
        store.save(&snapshot).unwrap();

        // No temp file left behind, snapshot reflects the second save
        assert!(!dir.path().join("store.json.tmp").exists());
        assert_eq!(MetadataStore::load(&snapshot).unwrap().len(), 2);
    }
}

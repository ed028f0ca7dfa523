//! Legacy local progress storage.
//!
//! Before the remote table existed, completion state lived in per-browser
//! storage: one JSON blob per collection under a `playlist-<id>` or
//! `study-plan-<id>` key, mapping question id to completed. The migration
//! engine reads these blobs; nothing in this crate ever deletes them.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::warn;

/// Key prefix for playlist collections.
pub const PLAYLIST_PREFIX: &str = "playlist-";

/// Key prefix for study-plan collections.
pub const STUDY_PLAN_PREFIX: &str = "study-plan-";

/// Synchronous key-value view of the legacy store.
pub trait LocalStore: Send + Sync {
    /// All keys starting with `prefix`.
    fn list_keys(&self, prefix: &str) -> Vec<String>;

    /// Raw JSON text for a key, or None if absent.
    fn get(&self, key: &str) -> Option<String>;
}

/// Legacy blobs as a directory of `<key>.json` files.
pub struct BlobDir {
    dir: PathBuf,
}

impl BlobDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write a blob, creating the directory if needed. Used by tooling and
    /// tests to seed legacy data; the migration path itself never writes.
    pub fn put(&self, key: &str, value: &str) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.blob_path(key), value)
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        // Sanitize key for use as filename
        let safe_key: String = key
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", safe_key))
    }
}

impl LocalStore for BlobDir {
    fn list_keys(&self, prefix: &str) -> Vec<String> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut keys = Vec::new();
        for entry in entries.flatten() {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(key) = name.strip_suffix(".json") {
                    if key.starts_with(prefix) {
                        keys.push(key.to_string());
                    }
                }
            }
        }
        keys.sort();
        keys
    }

    fn get(&self, key: &str) -> Option<String> {
        match fs::read_to_string(self.blob_path(key)) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("failed to read local blob {}: {}", key, e);
                None
            }
        }
    }
}

/// Parse a legacy blob into its question-id → completed mapping.
pub fn parse_blob(raw: &str) -> serde_json::Result<HashMap<String, bool>> {
    serde_json::from_str(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_list_keys_filters_by_prefix() {
        let tmp = TempDir::new().unwrap();
        let store = BlobDir::new(tmp.path());
        store.put("playlist-1", r#"{"1":true}"#).unwrap();
        store.put("study-plan-1", r#"{"2":false}"#).unwrap();
        store.put("unrelated", "{}").unwrap();

        assert_eq!(store.list_keys(PLAYLIST_PREFIX), vec!["playlist-1"]);
        assert_eq!(store.list_keys(STUDY_PLAN_PREFIX), vec!["study-plan-1"]);
    }

    #[test]
    fn test_get_missing_key() {
        let tmp = TempDir::new().unwrap();
        let store = BlobDir::new(tmp.path());
        assert!(store.get("playlist-404").is_none());
    }

    #[test]
    fn test_parse_blob() {
        let blob = parse_blob(r#"{"1":true,"2":false}"#).unwrap();
        assert_eq!(blob.get("1"), Some(&true));
        assert_eq!(blob.get("2"), Some(&false));

        assert!(parse_blob("not json").is_err());
    }
}

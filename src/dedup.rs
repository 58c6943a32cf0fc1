//! Processed-document dedup store.
//!
//! An explicit on-disk set of opaque message identifiers, injected into
//! the orchestrator at construction. Loaded once at startup and
//! rewritten (not appended) after each processing batch, so a crash
//! between batches reprocesses at most the current batch — invoice-level
//! uniqueness in the record store backs that up.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::ConfigError;

/// Persisted set of already-processed message identifiers.
pub struct ProcessedSet {
    path: PathBuf,
    seen: HashSet<String>,
}

impl ProcessedSet {
    /// Load the set from disk. A missing file starts an empty set; an
    /// unreadable one is logged and treated as empty rather than
    /// blocking startup.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let seen = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<Vec<String>>(&contents) {
                Ok(ids) => {
                    info!(count = ids.len(), path = %path.display(), "Loaded processed-message set");
                    ids.into_iter().collect()
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Processed-message file is corrupt; starting empty");
                    HashSet::new()
                }
            },
            Err(_) => HashSet::new(),
        };
        Self { path, seen }
    }

    /// Whether this message id has been processed before.
    pub fn contains(&self, message_id: &str) -> bool {
        self.seen.contains(message_id)
    }

    /// Record a message id. Returns false if it was already present.
    pub fn insert(&mut self, message_id: &str) -> bool {
        self.seen.insert(message_id.to_string())
    }

    /// Rewrite the whole set to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let ids: Vec<&String> = self.seen.iter().collect();
        let contents = serde_json::to_string(&ids).map_err(|e| ConfigError::InvalidValue {
            key: "processed set".into(),
            message: e.to_string(),
        })?;
        std::fs::write(&self.path, contents)?;
        info!(count = self.seen.len(), "Saved processed-message set");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let set = ProcessedSet::load(dir.path().join("processed.json"));
        assert!(set.is_empty());
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.json");

        let mut set = ProcessedSet::load(&path);
        assert!(set.insert("<msg-1@mail>"));
        assert!(set.insert("<msg-2@mail>"));
        assert!(!set.insert("<msg-1@mail>"));
        set.save().unwrap();

        let reloaded = ProcessedSet::load(&path);
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.contains("<msg-1@mail>"));
        assert!(reloaded.contains("<msg-2@mail>"));
        assert!(!reloaded.contains("<msg-3@mail>"));
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.json");
        std::fs::write(&path, "not json at all").unwrap();
        let set = ProcessedSet::load(&path);
        assert!(set.is_empty());
    }

    #[test]
    fn save_rewrites_rather_than_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.json");

        let mut set = ProcessedSet::load(&path);
        set.insert("<a>");
        set.save().unwrap();
        set.insert("<b>");
        set.save().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let ids: Vec<String> = serde_json::from_str(&contents).unwrap();
        assert_eq!(ids.len(), 2);
    }
}

//! Per-path change classification
//!
//! The detector combines the current on-disk state of a path with its most
//! recently recorded state (resolved across the whole chain) and classifies
//! the change:
//!
//! | on disk | previous state | result                      |
//! |---------|----------------|-----------------------------|
//! | absent  | present        | Deleted (no state payload)  |
//! | absent  | absent         | nothing (never existed)     |
//! | present | absent         | Added with captured state   |
//! | present | present        | Modified if changed, else nothing |
//!
//! An unchanged path produces no entry at all; "unchanged" is represented
//! by absence throughout the engine.

use crate::error::Result;
use crate::strategy::DetectionStrategy;
use crate::types::{DiffEntry, RecordedState};
use std::path::Path;
use tracing::trace;

/// Classifies a single path against its resolved previous state
pub struct ChangeDetector<'a> {
    strategy: &'a dyn DetectionStrategy,
}

impl<'a> ChangeDetector<'a> {
    /// Create a detector for the active strategy
    ///
    /// Strategy construction has already validated the configuration (a
    /// Hash strategy cannot exist without an algorithm), so no
    /// configuration failure can surface after file reads begin.
    pub fn new(strategy: &'a dyn DetectionStrategy) -> Self {
        ChangeDetector { strategy }
    }

    /// Classify the change for one path
    ///
    /// `abs_path` is the on-disk location, `rel_path` the chain-relative
    /// path recorded in diff entries. Returns `Ok(None)` for unchanged
    /// paths and for paths that neither exist nor were ever recorded.
    pub fn detect(
        &self,
        abs_path: &Path,
        rel_path: &Path,
        previous: Option<&RecordedState>,
    ) -> Result<Option<DiffEntry>> {
        let on_disk = abs_path.is_file();
        let entry = match (on_disk, previous) {
            (false, Some(_)) => Some(DiffEntry::deleted(rel_path)),
            (false, None) => None,
            (true, None) => {
                let state = self.strategy.capture(abs_path)?;
                Some(DiffEntry::added(rel_path, state))
            }
            (true, Some(previous)) => {
                let current = self.strategy.capture(abs_path)?;
                if current == *previous {
                    None
                } else {
                    Some(DiffEntry::modified(rel_path, current))
                }
            }
        };
        trace!(path = ?rel_path, change = ?entry.as_ref().map(|e| e.kind), "detected");
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{strategy_for, ContentStrategy, HashAlgorithm, StrategyKind};
    use crate::types::ChangeKind;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_new_file_is_added_with_captured_state() {
        let dir = TempDir::new().unwrap();
        let abs = dir.path().join("new.txt");
        fs::write(&abs, b"fresh").unwrap();

        let detector = ChangeDetector::new(&ContentStrategy);
        let entry = detector
            .detect(&abs, Path::new("new.txt"), None)
            .unwrap()
            .unwrap();
        assert_eq!(entry.kind, ChangeKind::Added);
        assert_eq!(entry.state, Some(RecordedState::Content(b"fresh".to_vec())));
    }

    #[test]
    fn test_missing_file_with_history_is_deleted() {
        let dir = TempDir::new().unwrap();
        let abs = dir.path().join("test_sample2.txt");
        let previous = RecordedState::Content(b"was-here".to_vec());

        let detector = ChangeDetector::new(&ContentStrategy);
        let entry = detector
            .detect(&abs, Path::new("test_sample2.txt"), Some(&previous))
            .unwrap()
            .unwrap();
        assert_eq!(entry.kind, ChangeKind::Deleted);
        assert!(entry.state.is_none());
    }

    #[test]
    fn test_missing_file_without_history_is_nothing() {
        let dir = TempDir::new().unwrap();
        let abs = dir.path().join("never-existed.txt");

        let detector = ChangeDetector::new(&ContentStrategy);
        let entry = detector
            .detect(&abs, Path::new("never-existed.txt"), None)
            .unwrap();
        assert!(entry.is_none());
    }

    #[test]
    fn test_byte_identical_file_yields_no_entry() {
        let dir = TempDir::new().unwrap();
        let abs = dir.path().join("same.txt");
        fs::write(&abs, b"identical").unwrap();
        let previous = RecordedState::Content(b"identical".to_vec());

        let detector = ChangeDetector::new(&ContentStrategy);
        let entry = detector
            .detect(&abs, Path::new("same.txt"), Some(&previous))
            .unwrap();
        assert!(entry.is_none());
    }

    #[test]
    fn test_changed_digest_is_modified() {
        let dir = TempDir::new().unwrap();
        let abs = dir.path().join("doc.txt");
        fs::write(&abs, b"version 2").unwrap();

        let strategy = strategy_for(StrategyKind::Hash, Some(HashAlgorithm::Sha256)).unwrap();
        let previous = RecordedState::Hash {
            digest: HashAlgorithm::Sha256.digest_hex(b"version 1"),
            algorithm: HashAlgorithm::Sha256,
        };

        let detector = ChangeDetector::new(strategy.as_ref());
        let entry = detector
            .detect(&abs, Path::new("doc.txt"), Some(&previous))
            .unwrap()
            .unwrap();
        assert_eq!(entry.kind, ChangeKind::Modified);
        assert_eq!(
            entry.state,
            Some(RecordedState::Hash {
                digest: HashAlgorithm::Sha256.digest_hex(b"version 2"),
                algorithm: HashAlgorithm::Sha256,
            })
        );
    }

    #[test]
    fn test_mtime_change_is_modified() {
        let dir = TempDir::new().unwrap();
        let abs = dir.path().join("dated.txt");
        fs::write(&abs, b"contents").unwrap();

        let strategy = strategy_for(StrategyKind::Date, None).unwrap();
        let detector = ChangeDetector::new(strategy.as_ref());

        // Same mtime as recorded: no entry.
        let current = strategy.capture(&abs).unwrap();
        assert!(detector
            .detect(&abs, Path::new("dated.txt"), Some(&current))
            .unwrap()
            .is_none());

        // A different recorded mtime: modified.
        let previous = RecordedState::Date(12345.0);
        let entry = detector
            .detect(&abs, Path::new("dated.txt"), Some(&previous))
            .unwrap()
            .unwrap();
        assert_eq!(entry.kind, ChangeKind::Modified);
    }
}

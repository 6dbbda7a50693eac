//! Diff tree construction
//!
//! One backup run builds a fresh [`DiffTree`] from the live source tree
//! and the archive chain:
//!
//! 1. The source tree is walked recursively. Every directory is
//!    structural: it contributes a nested (possibly empty) subtree and is
//!    never itself diffed as an entry. Every file is resolved against the
//!    chain and classified by the detector; unchanged files are omitted.
//! 2. A deletion-reconciliation pass diffs the chain's live path set
//!    against the set of files observed during the walk. Every live path
//!    that was not walked becomes a Deleted entry at its original nested
//!    location, even if intervening directories no longer exist on disk.
//!
//! Per-file capture is read-only against the source tree and has no
//! required ordering between siblings, so it runs in parallel. The archive
//! listing is re-read at the start of every build.

use crate::archive::ArchiveStore;
use crate::detector::ChangeDetector;
use crate::error::Result;
use crate::resolver::StateResolver;
use crate::strategy::DetectionStrategy;
use crate::types::{DiffEntry, DiffTree, RecordedState};
use crate::utils::make_relative;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Result of one build: the diff tree plus the payload bytes to persist
///
/// Payloads are `(relative path, bytes)` pairs for every Added or Modified
/// entry; the archive store writes them under the same relative path.
#[derive(Debug)]
pub struct BuildOutput {
    /// The detected changes, mirroring the source directory structure
    pub tree: DiffTree,
    /// File bytes for every entry that carries a payload
    pub payloads: Vec<(PathBuf, Vec<u8>)>,
}

/// Builds the diff tree for one backup run
pub struct DiffTreeBuilder<'a> {
    store: &'a ArchiveStore,
    strategy: &'a dyn DetectionStrategy,
    exclude: Option<PathBuf>,
}

impl<'a> DiffTreeBuilder<'a> {
    /// Create a builder over the given store and strategy
    pub fn new(store: &'a ArchiveStore, strategy: &'a dyn DetectionStrategy) -> Self {
        DiffTreeBuilder {
            store,
            strategy,
            exclude: None,
        }
    }

    /// Exclude a directory subtree from the walk
    ///
    /// Used when the archive root lives inside the tracked source tree, so
    /// a backup never archives its own archives.
    pub fn exclude(mut self, path: impl Into<PathBuf>) -> Self {
        self.exclude = Some(path.into());
        self
    }

    /// Build the diff tree for `source_root` against the current chain
    pub fn build(&self, source_root: &Path) -> Result<BuildOutput> {
        let chain = self.store.list()?;
        let resolver = StateResolver::load(self.store, &chain, self.strategy)?;
        debug!(root = ?source_root, chain = chain.len(), "building diff tree");

        let mut files: Vec<(PathBuf, PathBuf)> = Vec::new();
        let mut dirs: Vec<PathBuf> = Vec::new();
        for entry in WalkDir::new(source_root)
            .into_iter()
            .filter_entry(|e| Some(e.path()) != self.exclude.as_deref())
        {
            let entry = entry?;
            if entry.path() == source_root {
                continue;
            }
            let rel = make_relative(entry.path(), source_root)?;
            if entry.file_type().is_dir() {
                dirs.push(rel);
            } else if entry.file_type().is_file() {
                files.push((entry.path().to_path_buf(), rel));
            }
            // Symlinks and other special files are not tracked.
        }

        let detector = ChangeDetector::new(self.strategy);
        let detected: Vec<Option<(DiffEntry, Option<Vec<u8>>)>> = files
            .par_iter()
            .map(|(abs, rel)| -> Result<Option<(DiffEntry, Option<Vec<u8>>)>> {
                let previous = resolver.resolve(rel)?;
                let entry = match detector.detect(abs, rel, previous.as_ref())? {
                    Some(entry) => entry,
                    None => return Ok(None),
                };
                let payload = if entry.carries_payload() {
                    // The Content strategy already holds the bytes.
                    Some(match &entry.state {
                        Some(RecordedState::Content(bytes)) => bytes.clone(),
                        _ => fs::read(abs)?,
                    })
                } else {
                    None
                };
                Ok(Some((entry, payload)))
            })
            .collect::<Result<_>>()?;

        let mut tree = DiffTree::new();
        for rel in &dirs {
            tree.ensure_dir(rel)?;
        }
        let mut payloads = Vec::new();
        for item in detected.into_iter().flatten() {
            let (entry, payload) = item;
            if let Some(bytes) = payload {
                payloads.push((entry.path.clone(), bytes));
            }
            tree.insert(entry)?;
        }

        // Deletion reconciliation: every path the chain still considers
        // alive that the walk did not observe is gone.
        let walked: BTreeSet<PathBuf> = files.into_iter().map(|(_, rel)| rel).collect();
        for missing in resolver.live_paths()?.difference(&walked) {
            tree.insert(DiffEntry::deleted(missing.clone()))?;
        }

        let stats = tree.stats();
        info!(
            added = stats.files_added,
            modified = stats.files_modified,
            deleted = stats.files_deleted,
            "diff tree built"
        );
        Ok(BuildOutput { tree, payloads })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{strategy_for, StrategyKind};
    use crate::types::ChangeKind;
    use tempfile::TempDir;

    fn content_build(source: &Path, store: &ArchiveStore) -> BuildOutput {
        let strategy = strategy_for(StrategyKind::Content, None).unwrap();
        DiffTreeBuilder::new(store, strategy.as_ref())
            .build(source)
            .unwrap()
    }

    fn archive_build(store: &ArchiveStore, output: &BuildOutput) {
        store
            .create(&output.tree, &output.payloads, StrategyKind::Content, None)
            .unwrap();
    }

    #[test]
    fn test_initial_build_adds_everything() {
        let source = TempDir::new().unwrap();
        let archives = TempDir::new().unwrap();
        fs::write(source.path().join("a.txt"), b"alpha").unwrap();
        fs::create_dir(source.path().join("subdir")).unwrap();
        fs::write(source.path().join("subdir/b.txt"), b"beta").unwrap();

        let store = ArchiveStore::open(archives.path()).unwrap();
        let output = content_build(source.path(), &store);

        let flat = output.tree.flatten();
        assert_eq!(flat.len(), 2);
        assert!(flat.iter().all(|(_, e)| e.kind == ChangeKind::Added));
        assert_eq!(output.payloads.len(), 2);
    }

    #[test]
    fn test_only_new_file_appears_in_second_build() {
        let source = TempDir::new().unwrap();
        let archives = TempDir::new().unwrap();
        fs::write(source.path().join("doc1.txt"), b"unchanged").unwrap();

        let store = ArchiveStore::open(archives.path()).unwrap();
        archive_build(&store, &content_build(source.path(), &store));

        fs::create_dir(source.path().join("subdir")).unwrap();
        fs::write(source.path().join("subdir/doc2.txt"), b"new").unwrap();

        let output = content_build(source.path(), &store);
        let flat = output.tree.flatten();
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].0, PathBuf::from("subdir/doc2.txt"));
        assert_eq!(flat[0].1.kind, ChangeKind::Added);
        assert!(output.tree.get(Path::new("doc1.txt")).is_none());
    }

    #[test]
    fn test_unchanged_rebuild_is_empty() {
        let source = TempDir::new().unwrap();
        let archives = TempDir::new().unwrap();
        fs::write(source.path().join("a.txt"), b"alpha").unwrap();

        let store = ArchiveStore::open(archives.path()).unwrap();
        archive_build(&store, &content_build(source.path(), &store));

        // Same tree, same chain: the next build detects nothing.
        let output = content_build(source.path(), &store);
        assert!(output.tree.is_empty());
        assert!(output.payloads.is_empty());
    }

    #[test]
    fn test_deleted_file_is_reconciled_at_nested_location() {
        let source = TempDir::new().unwrap();
        let archives = TempDir::new().unwrap();
        fs::create_dir(source.path().join("subdir")).unwrap();
        fs::write(source.path().join("subdir/gone.txt"), b"bye").unwrap();

        let store = ArchiveStore::open(archives.path()).unwrap();
        archive_build(&store, &content_build(source.path(), &store));

        // Remove the file *and* its parent directory.
        fs::remove_dir_all(source.path().join("subdir")).unwrap();

        let output = content_build(source.path(), &store);
        let entry = output.tree.get(Path::new("subdir/gone.txt")).unwrap();
        assert_eq!(entry.kind, ChangeKind::Deleted);
        assert!(entry.state.is_none());
    }

    #[test]
    fn test_empty_source_with_history_deletes_everything() {
        let source = TempDir::new().unwrap();
        let archives = TempDir::new().unwrap();
        fs::write(source.path().join("a.txt"), b"1").unwrap();
        fs::write(source.path().join("b.txt"), b"2").unwrap();

        let store = ArchiveStore::open(archives.path()).unwrap();
        archive_build(&store, &content_build(source.path(), &store));

        fs::remove_file(source.path().join("a.txt")).unwrap();
        fs::remove_file(source.path().join("b.txt")).unwrap();

        let output = content_build(source.path(), &store);
        let flat = output.tree.flatten();
        assert_eq!(flat.len(), 2);
        assert!(flat.iter().all(|(_, e)| e.kind == ChangeKind::Deleted));
    }

    #[test]
    fn test_excluded_subtree_is_not_walked() {
        let source = TempDir::new().unwrap();
        let nested_archives = source.path().join(".strata");
        fs::create_dir(&nested_archives).unwrap();
        fs::write(source.path().join("tracked.txt"), b"yes").unwrap();

        let store = ArchiveStore::open(&nested_archives).unwrap();
        let strategy = strategy_for(StrategyKind::Content, None).unwrap();
        let output = DiffTreeBuilder::new(&store, strategy.as_ref())
            .exclude(&nested_archives)
            .build(source.path())
            .unwrap();

        assert_eq!(output.tree.flatten().len(), 1);
        assert!(output.tree.get(Path::new("tracked.txt")).is_some());
    }

    #[test]
    fn test_modification_produces_payload() {
        let source = TempDir::new().unwrap();
        let archives = TempDir::new().unwrap();
        fs::write(source.path().join("f.txt"), b"v1").unwrap();

        let store = ArchiveStore::open(archives.path()).unwrap();
        archive_build(&store, &content_build(source.path(), &store));

        fs::write(source.path().join("f.txt"), b"v2").unwrap();
        let output = content_build(source.path(), &store);
        let flat = output.tree.flatten();
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].1.kind, ChangeKind::Modified);
        assert_eq!(output.payloads, vec![(PathBuf::from("f.txt"), b"v2".to_vec())]);
    }
}

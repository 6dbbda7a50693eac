//! Chain replay: point-in-time restore
//!
//! Restoring the source tree as it existed when archive `k` was created
//! means replaying every diff tree from the oldest archive up to and
//! including `k`, in strict chronological order. Later archives' entries
//! shadow earlier ones because every application fully overwrites or fully
//! removes, which makes archive order load-bearing for correctness.
//!
//! Within one archive, no two entries target the same path (a builder
//! invariant), so entry application is parallelized. Across archives the
//! replay is strictly serialized.
//!
//! Chain integrity (a contiguous sequence up to the target, and the target
//! being present at all) is verified before any destination mutation. A
//! destination write failure aborts the whole operation; already-applied
//! writes are not rolled back — after a failed restore the destination is
//! possibly incomplete but inspectable.

use crate::archive::{Archive, ArchiveStore};
use crate::difflog::DiffRecord;
use crate::error::{Result, StrataError};
use crate::types::{ChangeKind, RestoreResult};
use crate::utils::from_wire_path;
use rayon::prelude::*;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, info, trace};

/// Replays archive chains into a destination tree
pub struct ChainReplayer<'a> {
    store: &'a ArchiveStore,
}

impl<'a> ChainReplayer<'a> {
    /// Create a replayer over the given store
    pub fn new(store: &'a ArchiveStore) -> Self {
        ChainReplayer { store }
    }

    /// Restore `destination_root` to the state of archive `target_sequence`
    ///
    /// Replays archives oldest to newest up to and including the target.
    /// The destination directory is created if needed; existing files are
    /// overwritten or removed as the diff logs dictate.
    pub fn restore_to(
        &self,
        target_sequence: u64,
        destination_root: &Path,
    ) -> Result<RestoreResult> {
        let start = Instant::now();
        let chain = self.store.list()?;

        let target_index = chain
            .iter()
            .position(|archive| archive.sequence() == target_sequence)
            .ok_or(StrataError::ArchiveNotFound(target_sequence))?;
        let to_apply = &chain[..=target_index];
        verify_contiguous(to_apply)?;

        info!(
            target = target_sequence,
            archives = to_apply.len(),
            destination = ?destination_root,
            "restoring"
        );
        fs::create_dir_all(destination_root)?;

        let files_written = AtomicUsize::new(0);
        let files_removed = AtomicUsize::new(0);
        let bytes_written = AtomicU64::new(0);

        for archive in to_apply {
            let records = self.store.read_diff_log(archive)?;
            debug!(sequence = archive.sequence(), entries = records.len(), "applying archive");
            records.par_iter().try_for_each(|record| {
                self.apply(
                    archive,
                    record,
                    destination_root,
                    &files_written,
                    &files_removed,
                    &bytes_written,
                )
            })?;
        }

        Ok(RestoreResult {
            target_sequence,
            archives_applied: to_apply.len(),
            files_written: files_written.into_inner(),
            files_removed: files_removed.into_inner(),
            bytes_written: bytes_written.into_inner(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn apply(
        &self,
        archive: &Archive,
        record: &DiffRecord,
        destination_root: &Path,
        files_written: &AtomicUsize,
        files_removed: &AtomicUsize,
        bytes_written: &AtomicU64,
    ) -> Result<()> {
        let rel_path = from_wire_path(&record.filename)?;
        let destination = destination_root.join(&rel_path);
        trace!(path = %record.filename, kind = %record.kind, "applying entry");

        match record.kind {
            ChangeKind::Added => {
                let payload = self.store.read_payload(archive, &rel_path)?;
                if let Some(parent) = destination.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&destination, &payload)?;
                files_written.fetch_add(1, Ordering::Relaxed);
                bytes_written.fetch_add(payload.len() as u64, Ordering::Relaxed);
            }
            ChangeKind::Modified => {
                // Two-step so a missing file doesn't fail the removal.
                if destination.exists() {
                    fs::remove_file(&destination)?;
                }
                let payload = self.store.read_payload(archive, &rel_path)?;
                if let Some(parent) = destination.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&destination, &payload)?;
                files_written.fetch_add(1, Ordering::Relaxed);
                bytes_written.fetch_add(payload.len() as u64, Ordering::Relaxed);
            }
            ChangeKind::Deleted => {
                if destination.exists() {
                    fs::remove_file(&destination)?;
                    files_removed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        Ok(())
    }
}

/// Verify the archives to replay form a gapless ascending run starting
/// at the chain base
///
/// The store assigns sequence 1 to the first archive of every chain, so
/// an oldest archive with a higher sequence means the base was lost.
fn verify_contiguous(archives: &[Archive]) -> Result<()> {
    if let Some(first) = archives.first() {
        if first.sequence() != 1 {
            return Err(StrataError::chain_integrity(format!(
                "chain base is missing: oldest archive has sequence {}",
                first.sequence()
            )));
        }
    }
    for pair in archives.windows(2) {
        if pair[1].sequence() != pair[0].sequence() + 1 {
            return Err(StrataError::chain_integrity(format!(
                "gap in archive chain between sequence {} and {}",
                pair[0].sequence(),
                pair[1].sequence()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::StrategyKind;
    use crate::types::{DiffEntry, DiffTree, RecordedState};
    use tempfile::TempDir;

    fn create_archive(store: &ArchiveStore, entries: Vec<(DiffEntry, Option<&[u8]>)>) {
        let mut tree = DiffTree::new();
        let mut payloads = Vec::new();
        for (entry, payload) in entries {
            if let Some(bytes) = payload {
                payloads.push((entry.path.clone(), bytes.to_vec()));
            }
            tree.insert(entry).unwrap();
        }
        store
            .create(&tree, &payloads, StrategyKind::Content, None)
            .unwrap();
    }

    fn added(path: &str, content: &'static [u8]) -> (DiffEntry, Option<&'static [u8]>) {
        (
            DiffEntry::added(path, RecordedState::Content(content.to_vec())),
            Some(content),
        )
    }

    fn modified(path: &str, content: &'static [u8]) -> (DiffEntry, Option<&'static [u8]>) {
        (
            DiffEntry::modified(path, RecordedState::Content(content.to_vec())),
            Some(content),
        )
    }

    #[test]
    fn test_replay_order_determines_final_content() {
        let archives = TempDir::new().unwrap();
        let store = ArchiveStore::open(archives.path()).unwrap();
        create_archive(&store, vec![added("f.txt", b"A")]);
        create_archive(&store, vec![modified("f.txt", b"B")]);

        let replayer = ChainReplayer::new(&store);

        let dest1 = TempDir::new().unwrap();
        replayer.restore_to(1, dest1.path()).unwrap();
        assert_eq!(fs::read(dest1.path().join("f.txt")).unwrap(), b"A");

        let dest2 = TempDir::new().unwrap();
        let result = replayer.restore_to(2, dest2.path()).unwrap();
        assert_eq!(fs::read(dest2.path().join("f.txt")).unwrap(), b"B");
        assert_eq!(result.archives_applied, 2);
        assert_eq!(result.files_written, 2);
    }

    #[test]
    fn test_deletion_is_replayed() {
        let archives = TempDir::new().unwrap();
        let store = ArchiveStore::open(archives.path()).unwrap();
        create_archive(
            &store,
            vec![added("keep.txt", b"k"), added("gone.txt", b"g")],
        );
        create_archive(&store, vec![(DiffEntry::deleted("gone.txt"), None)]);

        let dest = TempDir::new().unwrap();
        let result = ChainReplayer::new(&store).restore_to(2, dest.path()).unwrap();

        assert!(dest.path().join("keep.txt").exists());
        assert!(!dest.path().join("gone.txt").exists());
        assert_eq!(result.files_removed, 1);
    }

    #[test]
    fn test_nested_parents_are_created() {
        let archives = TempDir::new().unwrap();
        let store = ArchiveStore::open(archives.path()).unwrap();
        create_archive(&store, vec![added("a/b/c.txt", b"deep")]);

        let dest = TempDir::new().unwrap();
        ChainReplayer::new(&store).restore_to(1, dest.path()).unwrap();
        assert_eq!(fs::read(dest.path().join("a/b/c.txt")).unwrap(), b"deep");
    }

    #[test]
    fn test_missing_target_is_chain_integrity_error() {
        let archives = TempDir::new().unwrap();
        let store = ArchiveStore::open(archives.path()).unwrap();
        create_archive(&store, vec![added("f.txt", b"x")]);

        let dest = TempDir::new().unwrap();
        let err = ChainReplayer::new(&store)
            .restore_to(5, dest.path())
            .unwrap_err();
        assert!(err.is_chain_integrity());
        // Raised before any destination mutation.
        assert_eq!(fs::read_dir(dest.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_gap_in_chain_is_fatal_before_mutation() {
        let archives = TempDir::new().unwrap();
        let store = ArchiveStore::open(archives.path()).unwrap();
        create_archive(&store, vec![added("f.txt", b"1")]);
        create_archive(&store, vec![modified("f.txt", b"2")]);
        create_archive(&store, vec![modified("f.txt", b"3")]);

        // Remove the middle archive to punch a hole in the chain.
        let middle = store
            .list()
            .unwrap()
            .into_iter()
            .find(|a| a.sequence() == 2)
            .unwrap();
        fs::remove_dir_all(middle.path()).unwrap();

        let dest = TempDir::new().unwrap();
        let err = ChainReplayer::new(&store)
            .restore_to(3, dest.path())
            .unwrap_err();
        assert!(err.is_chain_integrity());
        assert_eq!(fs::read_dir(dest.path()).unwrap().count(), 0);

        // Restoring to a point before the gap still works.
        ChainReplayer::new(&store).restore_to(1, dest.path()).unwrap();
        assert_eq!(fs::read(dest.path().join("f.txt")).unwrap(), b"1");
    }

    #[test]
    fn test_missing_base_archive_is_fatal_before_mutation() {
        let archives = TempDir::new().unwrap();
        let store = ArchiveStore::open(archives.path()).unwrap();
        create_archive(&store, vec![added("a.txt", b"only-in-base")]);
        create_archive(&store, vec![added("b.txt", b"later")]);

        // Losing the oldest archive leaves sequences [2], which is not a
        // gap between neighbors but still an incomplete chain.
        let base = store
            .list()
            .unwrap()
            .into_iter()
            .find(|a| a.sequence() == 1)
            .unwrap();
        fs::remove_dir_all(base.path()).unwrap();

        let dest = TempDir::new().unwrap();
        let err = ChainReplayer::new(&store)
            .restore_to(2, dest.path())
            .unwrap_err();
        assert!(err.is_chain_integrity());
        assert_eq!(fs::read_dir(dest.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_modified_overwrite_of_existing_destination() {
        let archives = TempDir::new().unwrap();
        let store = ArchiveStore::open(archives.path()).unwrap();
        create_archive(&store, vec![added("f.txt", b"new")]);

        let dest = TempDir::new().unwrap();
        fs::write(dest.path().join("f.txt"), b"stale").unwrap();
        ChainReplayer::new(&store).restore_to(1, dest.path()).unwrap();
        assert_eq!(fs::read(dest.path().join("f.txt")).unwrap(), b"new");
    }
}

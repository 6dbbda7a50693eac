//! State resolution across the archive chain
//!
//! No strategy compares "today vs. yesterday" directly. The baseline for
//! every detection is *the most recently recorded state across the whole
//! chain*, found by scanning diff logs newest to oldest. Two queries are
//! answered here:
//!
//! - [`StateResolver::resolve`]: the last Added/Modified state recorded
//!   for a path. Deleted markers encountered during the scan never
//!   short-circuit resolution; the answer is "last known value".
//! - [`StateResolver::live_paths`]: the set of paths alive at the end of
//!   the chain, i.e. whose most recent record is not a deletion. This is
//!   the baseline for deletion reconciliation in the builder.
//!
//! The resolver loads every diff log in the chain once at construction.
//! Diff logs are closed, immutable archive members, so the cache is valid
//! for the duration of one logical operation; the archive *listing* itself
//! is re-read by the caller at the start of every operation. An unreadable
//! archive anywhere in the chain fails the load; a broken chain link is
//! never soft-skipped.

use crate::archive::{Archive, ArchiveStore};
use crate::difflog::DiffRecord;
use crate::error::Result;
use crate::strategy::DetectionStrategy;
use crate::types::{ChangeKind, RecordedState};
use crate::utils::{from_wire_path, to_wire_path};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Resolves previously recorded per-path state against one chain snapshot
pub struct StateResolver<'a> {
    chain: &'a [Archive],
    /// Diff logs aligned with `chain`, ascending sequence order
    logs: Vec<Vec<DiffRecord>>,
    strategy: &'a dyn DetectionStrategy,
}

impl<'a> StateResolver<'a> {
    /// Load all diff logs for `chain` (ascending order) from `store`
    pub fn load(
        store: &ArchiveStore,
        chain: &'a [Archive],
        strategy: &'a dyn DetectionStrategy,
    ) -> Result<Self> {
        let logs = chain
            .iter()
            .map(|archive| store.read_diff_log(archive))
            .collect::<Result<Vec<_>>>()?;
        trace!(archives = chain.len(), "loaded chain diff logs");
        Ok(StateResolver {
            chain,
            logs,
            strategy,
        })
    }

    /// The most recently recorded state for `rel_path`, if any
    ///
    /// Scans newest to oldest and returns the state of the first Added or
    /// Modified record found. Deleted records are passed over: resolution
    /// is independent of deletion markers seen along the way. An empty
    /// chain or a never-seen path yields `None`.
    pub fn resolve(&self, rel_path: &Path) -> Result<Option<RecordedState>> {
        let wire = to_wire_path(rel_path)?;
        for log in self.logs.iter().rev() {
            for record in log {
                if record.filename != wire {
                    continue;
                }
                match record.kind {
                    ChangeKind::Added | ChangeKind::Modified => {
                        let text = record.diff.as_deref().unwrap_or_default();
                        return Ok(Some(self.strategy.decode(text)?));
                    }
                    // A deletion marker does not end the scan; keep
                    // looking for the last recorded value.
                    ChangeKind::Deleted => {}
                }
            }
        }
        Ok(None)
    }

    /// Paths alive at the end of the chain
    ///
    /// Replays records oldest to newest: Added/Modified insert the path,
    /// Deleted removes it. The result is the chain's most recently
    /// recorded full state set.
    pub fn live_paths(&self) -> Result<BTreeSet<PathBuf>> {
        let mut live = BTreeSet::new();
        for log in &self.logs {
            for record in log {
                let path = from_wire_path(&record.filename)?;
                match record.kind {
                    ChangeKind::Added | ChangeKind::Modified => {
                        live.insert(path);
                    }
                    ChangeKind::Deleted => {
                        live.remove(&path);
                    }
                }
            }
        }
        Ok(live)
    }

    /// Number of archives in the resolved chain
    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }
}

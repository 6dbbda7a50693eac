//! Archive container storage
//!
//! An archive is one immutable snapshot package produced by a backup run.
//! On disk it is a directory under the archive root:
//!
//! ```text
//! archive_root/
//! ├── arch-000001/
//! │   ├── metadata.json      # sequence number, strategy, timestamps
//! │   ├── diff-log.csv       # one row per Added/Modified/Deleted path
//! │   └── data/              # lz4-compressed payloads, keyed by path
//! │       └── subdir/doc2.txt
//! └── arch-000002/
//!     └── ...
//! ```
//!
//! The ordering key of the chain is the numeric `sequence` field inside
//! each archive's own metadata; the directory name is a human-readable
//! convenience and is never parsed for ordering. Sequence numbers are
//! strictly increasing and assigned at creation; the chain tolerates no
//! renumbering and no gaps.
//!
//! Archives are staged in a temporary directory and renamed into place, so
//! a crashed backup run never leaves a half-written archive in the chain.
//!
//! The core engine never touches compressed bytes: compression is an
//! implementation detail of this module.

use crate::difflog::{self, DiffRecord, DIFF_LOG_NAME};
use crate::error::{Result, StrataError};
use crate::strategy::{HashAlgorithm, StrategyKind};
use crate::types::{ChangeStats, DiffTree};
use crate::utils::{atomic_write, to_wire_path};
use chrono::{DateTime, Utc};
use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace};

/// File name of the per-archive metadata document
pub const METADATA_NAME: &str = "metadata.json";

/// Directory holding payload members inside an archive
pub const DATA_DIR: &str = "data";

/// Current on-disk archive format version
pub const FORMAT_VERSION: u32 = 1;

/// Metadata stored with every archive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    /// Archive format version
    pub format_version: u32,
    /// Position of this archive in the chain; strictly increasing
    pub sequence: u64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Strategy the diff log was captured under
    pub strategy: StrategyKind,
    /// Hash algorithm, when the strategy is Hash
    pub hash_algorithm: Option<HashAlgorithm>,
    /// Counts of entries captured in this archive
    pub files_added: usize,
    /// Number of modified entries
    pub files_modified: usize,
    /// Number of deleted entries
    pub files_deleted: usize,
}

/// A handle to one archive in the chain
#[derive(Debug, Clone)]
pub struct Archive {
    /// Parsed archive metadata
    pub metadata: ArchiveMetadata,
    /// Directory of this archive on disk
    path: PathBuf,
}

impl Archive {
    /// Chain position of this archive
    pub fn sequence(&self) -> u64 {
        self.metadata.sequence
    }

    /// Directory of this archive on disk
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Directory-backed store for the archive chain
///
/// The store re-reads the archive listing on every chain-dependent call;
/// nothing is cached between operations. Concurrent external mutation of
/// the archive directory during one logical operation is unsupported.
#[derive(Debug)]
pub struct ArchiveStore {
    root: PathBuf,
}

impl ArchiveStore {
    /// Open (creating if necessary) an archive store rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(ArchiveStore { root })
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List the full chain, sorted ascending by sequence number
    ///
    /// Any directory in the archive root that cannot be read as an archive
    /// is a fatal error; a broken chain link is never soft-skipped.
    pub fn list(&self) -> Result<Vec<Archive>> {
        let mut archives = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name();
            // Dot-entries are staging directories, not chain members.
            if !path.is_dir() || name.to_string_lossy().starts_with('.') {
                continue;
            }
            archives.push(self.read_archive(&path)?);
        }
        archives.sort_by_key(|archive| archive.sequence());
        for pair in archives.windows(2) {
            if pair[0].sequence() == pair[1].sequence() {
                return Err(StrataError::chain_integrity(format!(
                    "duplicate sequence number {} in {:?} and {:?}",
                    pair[0].sequence(),
                    pair[0].path(),
                    pair[1].path()
                )));
            }
        }
        trace!(count = archives.len(), "listed archive chain");
        Ok(archives)
    }

    /// Sequence number the next created archive will receive
    pub fn next_sequence(&self) -> Result<u64> {
        Ok(self
            .list()?
            .last()
            .map(|archive| archive.sequence() + 1)
            .unwrap_or(1))
    }

    /// Create a new archive from a built diff tree and its payload bytes
    ///
    /// Payloads are `(relative path, bytes)` pairs for every Added or
    /// Modified entry in the tree. The archive is staged in a temporary
    /// directory and renamed into place once complete.
    pub fn create(
        &self,
        tree: &DiffTree,
        payloads: &[(PathBuf, Vec<u8>)],
        strategy: StrategyKind,
        hash_algorithm: Option<HashAlgorithm>,
    ) -> Result<Archive> {
        let sequence = self.next_sequence()?;
        let stats: ChangeStats = tree.stats();
        let metadata = ArchiveMetadata {
            format_version: FORMAT_VERSION,
            sequence,
            created_at: Utc::now(),
            strategy,
            hash_algorithm,
            files_added: stats.files_added,
            files_modified: stats.files_modified,
            files_deleted: stats.files_deleted,
        };

        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.root)?;
        let staged = staging.path();

        atomic_write(
            &staged.join(DIFF_LOG_NAME),
            difflog::serialize(tree)?.as_bytes(),
        )?;
        atomic_write(
            &staged.join(METADATA_NAME),
            serde_json::to_vec_pretty(&metadata)?.as_slice(),
        )?;

        let data_root = staged.join(DATA_DIR);
        for (rel_path, bytes) in payloads {
            // Wire-form check also rejects traversal out of the data dir.
            to_wire_path(rel_path)?;
            let member = data_root.join(rel_path);
            if let Some(parent) = member.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&member, compress_prepend_size(bytes))?;
        }

        let final_path = self.root.join(format!("arch-{:06}", sequence));
        if final_path.exists() {
            return Err(StrataError::archive(format!(
                "archive directory already exists: {:?}",
                final_path
            )));
        }
        let staged = staging.keep();
        fs::rename(&staged, &final_path)?;

        info!(
            sequence,
            added = metadata.files_added,
            modified = metadata.files_modified,
            deleted = metadata.files_deleted,
            "created archive"
        );
        Ok(Archive {
            metadata,
            path: final_path,
        })
    }

    /// Read and parse an archive's diff log
    pub fn read_diff_log(&self, archive: &Archive) -> Result<Vec<DiffRecord>> {
        let text = fs::read_to_string(archive.path().join(DIFF_LOG_NAME))?;
        difflog::parse(&text)
    }

    /// Read and decompress one payload member of an archive
    ///
    /// Fails with [`StrataError::PayloadNotFound`] if the path was never
    /// Added or Modified in that archive.
    pub fn read_payload(&self, archive: &Archive, rel_path: &Path) -> Result<Vec<u8>> {
        let member = archive.path().join(DATA_DIR).join(rel_path);
        let compressed = match fs::read(&member) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StrataError::PayloadNotFound {
                    sequence: archive.sequence(),
                    path: rel_path.to_path_buf(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        decompress_size_prepended(&compressed).map_err(|e| {
            StrataError::Decompression(format!(
                "payload {:?} in archive {}: {}",
                rel_path,
                archive.sequence(),
                e
            ))
        })
    }

    fn read_archive(&self, path: &Path) -> Result<Archive> {
        let metadata_path = path.join(METADATA_NAME);
        let bytes = fs::read(&metadata_path).map_err(|e| {
            StrataError::archive(format!("unreadable metadata {:?}: {}", metadata_path, e))
        })?;
        let metadata: ArchiveMetadata = serde_json::from_slice(&bytes)?;
        if metadata.format_version > FORMAT_VERSION {
            return Err(StrataError::archive(format!(
                "archive {:?} uses unsupported format version {}",
                path, metadata.format_version
            )));
        }
        debug!(sequence = metadata.sequence, path = ?path, "read archive metadata");
        Ok(Archive {
            metadata,
            path: path.to_path_buf(),
        })
    }
}

//! Core data types used throughout the Strata library
//!
//! This module contains the data model shared by the change detector, the
//! diff tree builder and the chain replayer:
//!
//! - **Recorded state**: [`RecordedState`] - the value captured for a path
//!   when an archive was made; the comparison baseline for the next
//!   detection round
//! - **Diff entries**: [`ChangeKind`], [`DiffEntry`] - a typed change for a
//!   single path
//! - **Diff trees**: [`DiffNode`], [`DiffTree`] - the hierarchical result of
//!   one backup run, mirroring the source directory structure
//! - **Operation results**: [`ChangeStats`], [`RestoreResult`]
//!
//! ## Invariants
//!
//! - A [`DiffEntry`] with kind [`ChangeKind::Deleted`] never carries a
//!   state; restore only needs to know "remove".
//! - An unchanged path is represented by *absence*: no entry is ever
//!   emitted for it.
//! - Directories are structural only. They always nest a sub-[`DiffTree`]
//!   (even if empty) and are never themselves diffed as entries.

use crate::error::{Result, StrataError};
use crate::strategy::HashAlgorithm;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// State captured for a path at an archive point
///
/// Exactly one variant is active per configured strategy; the three are
/// never mixed within one chain.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedState {
    /// Modification timestamp as seconds since the Unix epoch
    Date(f64),
    /// Lowercase hex digest over the full file bytes
    Hash {
        /// Hex-encoded digest
        digest: String,
        /// Algorithm that produced the digest
        algorithm: HashAlgorithm,
    },
    /// Exact byte sequence of the file, no transcoding
    Content(Vec<u8>),
}

impl RecordedState {
    /// Encode this state for the `diff` field of a diff-log record
    ///
    /// Date states encode as decimal seconds, Hash states as the digest
    /// text, Content states as the hex-encoded payload.
    pub fn encode(&self) -> String {
        match self {
            RecordedState::Date(secs) => format!("{}", secs),
            RecordedState::Hash { digest, .. } => digest.clone(),
            RecordedState::Content(bytes) => hex::encode(bytes),
        }
    }
}

/// Classification of a detected change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Path present on disk with no previously recorded state
    Added,
    /// Path present on disk and different from its last recorded state
    Modified,
    /// Path absent on disk but previously recorded
    Deleted,
}

impl ChangeKind {
    /// Wire symbol used in the `modtype` field of the diff log
    pub fn symbol(&self) -> char {
        match self {
            ChangeKind::Added => '+',
            ChangeKind::Modified => '*',
            ChangeKind::Deleted => '-',
        }
    }

    /// Parse a wire symbol back into a change kind
    pub fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            '+' => Some(ChangeKind::Added),
            '*' => Some(ChangeKind::Modified),
            '-' => Some(ChangeKind::Deleted),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
        };
        write!(f, "{}", name)
    }
}

/// A single detected change for one path
///
/// The associated file payload itself is written by the archive store at
/// the same relative path; it is never held inside the entry.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffEntry {
    /// Path relative to the tracked source root
    pub path: PathBuf,
    /// What happened to the path
    pub kind: ChangeKind,
    /// Captured state for Added/Modified entries; `None` for Deleted
    pub state: Option<RecordedState>,
}

impl DiffEntry {
    /// Create an Added entry with its captured state
    pub fn added(path: impl Into<PathBuf>, state: RecordedState) -> Self {
        DiffEntry {
            path: path.into(),
            kind: ChangeKind::Added,
            state: Some(state),
        }
    }

    /// Create a Modified entry with its captured state
    pub fn modified(path: impl Into<PathBuf>, state: RecordedState) -> Self {
        DiffEntry {
            path: path.into(),
            kind: ChangeKind::Modified,
            state: Some(state),
        }
    }

    /// Create a Deleted entry; deleted entries carry no state
    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        DiffEntry {
            path: path.into(),
            kind: ChangeKind::Deleted,
            state: None,
        }
    }

    /// Whether this entry requires a payload in the archive
    pub fn carries_payload(&self) -> bool {
        matches!(self.kind, ChangeKind::Added | ChangeKind::Modified)
    }
}

/// One node of a diff tree: either a file entry or a nested subtree
///
/// A tagged sum, so that "is this a subtree" is expressed in the type
/// rather than as a positional flag.
#[derive(Debug, Clone, PartialEq)]
pub enum DiffNode {
    /// A file-level change
    Entry(DiffEntry),
    /// A nested directory
    Tree(DiffTree),
}

/// Hierarchical result of one backup run's change detection
///
/// Maps a path segment to either a [`DiffEntry`] (file) or a nested
/// [`DiffTree`] (directory). Sibling order is walk order and carries no
/// meaning; children are kept sorted for deterministic serialization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffTree {
    children: BTreeMap<String, DiffNode>,
}

impl DiffTree {
    /// Create an empty tree
    pub fn new() -> Self {
        DiffTree::default()
    }

    /// Whether the tree contains no entries anywhere (empty subtrees do
    /// not count as changes)
    pub fn is_empty(&self) -> bool {
        self.children.values().all(|node| match node {
            DiffNode::Entry(_) => false,
            DiffNode::Tree(tree) => tree.is_empty(),
        })
    }

    /// Total number of entries in the tree, recursively
    pub fn entry_count(&self) -> usize {
        self.children
            .values()
            .map(|node| match node {
                DiffNode::Entry(_) => 1,
                DiffNode::Tree(tree) => tree.entry_count(),
            })
            .sum()
    }

    /// Direct children of this tree, in sorted segment order
    pub fn children(&self) -> impl Iterator<Item = (&str, &DiffNode)> {
        self.children.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Ensure a nested subtree exists for the given relative directory
    /// path, creating empty intermediate trees as needed
    pub fn ensure_dir(&mut self, rel_path: &Path) -> Result<&mut DiffTree> {
        let mut current = self;
        for segment in path_segments(rel_path)? {
            let node = current
                .children
                .entry(segment.to_string())
                .or_insert_with(|| DiffNode::Tree(DiffTree::new()));
            current = match node {
                DiffNode::Tree(tree) => tree,
                DiffNode::Entry(_) => {
                    return Err(StrataError::diff_log(format!(
                        "path segment {:?} in {:?} is both a file and a directory",
                        segment, rel_path
                    )));
                }
            };
        }
        Ok(current)
    }

    /// Insert an entry at its nested location given by `entry.path`,
    /// creating intermediate subtrees as needed
    ///
    /// The builder guarantees no two entries in one run target the same
    /// path; a second insert for a path replaces the first.
    pub fn insert(&mut self, entry: DiffEntry) -> Result<()> {
        let rel_path = entry.path.clone();
        let parent = match rel_path.parent() {
            Some(parent) => self.ensure_dir(parent)?,
            None => self,
        };
        let name = rel_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StrataError::PathConversion(rel_path.clone()))?;
        if let Some(DiffNode::Tree(_)) = parent.children.get(name) {
            return Err(StrataError::diff_log(format!(
                "path {:?} is both a file and a directory",
                rel_path
            )));
        }
        parent.children.insert(name.to_string(), DiffNode::Entry(entry));
        Ok(())
    }

    /// Look up the entry for an exact relative path, if present
    pub fn get(&self, rel_path: &Path) -> Option<&DiffEntry> {
        let mut current = self;
        let mut segments = rel_path.iter().peekable();
        while let Some(segment) = segments.next() {
            let segment = segment.to_str()?;
            match current.children.get(segment)? {
                DiffNode::Tree(tree) if segments.peek().is_some() => current = tree,
                DiffNode::Entry(entry) if segments.peek().is_none() => return Some(entry),
                _ => return None,
            }
        }
        None
    }

    /// Flatten the tree into `(relative path, entry)` pairs
    pub fn flatten(&self) -> Vec<(PathBuf, &DiffEntry)> {
        let mut out = Vec::new();
        self.flatten_into(PathBuf::new(), &mut out);
        out
    }

    fn flatten_into<'a>(&'a self, prefix: PathBuf, out: &mut Vec<(PathBuf, &'a DiffEntry)>) {
        for (segment, node) in &self.children {
            let path = prefix.join(segment);
            match node {
                DiffNode::Entry(entry) => out.push((path, entry)),
                DiffNode::Tree(tree) => tree.flatten_into(path, out),
            }
        }
    }

    /// Summarize the tree into per-kind counts
    pub fn stats(&self) -> ChangeStats {
        let mut stats = ChangeStats::default();
        for (_, entry) in self.flatten() {
            match entry.kind {
                ChangeKind::Added => stats.files_added += 1,
                ChangeKind::Modified => stats.files_modified += 1,
                ChangeKind::Deleted => stats.files_deleted += 1,
            }
        }
        stats
    }
}

/// Split a relative path into UTF-8 segments
fn path_segments(rel_path: &Path) -> Result<Vec<&str>> {
    rel_path
        .iter()
        .map(|segment| {
            segment
                .to_str()
                .ok_or_else(|| StrataError::PathConversion(rel_path.to_path_buf()))
        })
        .collect()
}

/// Statistics about one backup run's detected changes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeStats {
    /// Number of files added
    pub files_added: usize,
    /// Number of files modified
    pub files_modified: usize,
    /// Number of files deleted
    pub files_deleted: usize,
}

impl ChangeStats {
    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.files_added > 0 || self.files_modified > 0 || self.files_deleted > 0
    }

    /// Get total number of file operations
    pub fn total_operations(&self) -> usize {
        self.files_added + self.files_modified + self.files_deleted
    }
}

/// Result of a restore operation
#[derive(Debug, Clone, Default)]
pub struct RestoreResult {
    /// Sequence number of the archive that was restored to
    pub target_sequence: u64,
    /// Number of archives replayed, oldest to newest
    pub archives_applied: usize,
    /// Number of files written to the destination
    pub files_written: usize,
    /// Number of files removed from the destination
    pub files_removed: usize,
    /// Total payload bytes written
    pub bytes_written: u64,
    /// Time taken for the restore in milliseconds
    pub duration_ms: u64,
}

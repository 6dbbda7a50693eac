//! Utility functions for Strata
//!
//! Small path and file helpers shared by the builder, the archive store and
//! the replayer: relative-path handling, the portable `/`-separated wire
//! form used inside diff logs and archives, and atomic file writing.

use crate::error::{Result, StrataError};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Make `path` relative to `base`
///
/// Fails if `path` does not live under `base`.
pub fn make_relative(path: &Path, base: &Path) -> Result<PathBuf> {
    path.strip_prefix(base)
        .map(|p| p.to_path_buf())
        .map_err(|_| StrataError::PathConversion(path.to_path_buf()))
}

/// Convert a relative path to its portable wire form
///
/// The wire form always uses `/` separators, independent of platform, so
/// diff logs and archive members are interchangeable across systems. Fails
/// on non-UTF-8 segments and on paths that are not plainly relative
/// (absolute, `.` or `..` components).
pub fn to_wire_path(rel_path: &Path) -> Result<String> {
    let mut segments = Vec::new();
    for component in rel_path.components() {
        match component {
            Component::Normal(segment) => {
                let segment = segment
                    .to_str()
                    .ok_or_else(|| StrataError::PathConversion(rel_path.to_path_buf()))?;
                segments.push(segment);
            }
            _ => return Err(StrataError::PathConversion(rel_path.to_path_buf())),
        }
    }
    if segments.is_empty() {
        return Err(StrataError::PathConversion(rel_path.to_path_buf()));
    }
    Ok(segments.join("/"))
}

/// Convert a wire-form path back to a platform path
pub fn from_wire_path(wire: &str) -> Result<PathBuf> {
    if wire.is_empty() {
        return Err(StrataError::PathConversion(PathBuf::new()));
    }
    let mut path = PathBuf::new();
    for segment in wire.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(StrataError::PathConversion(PathBuf::from(wire)));
        }
        path.push(segment);
    }
    Ok(path)
}

/// Write a file atomically via a temporary sibling and rename
///
/// Either the entire file is written or the previous content survives; no
/// partial writes are visible to other processes.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, content)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

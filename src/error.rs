//! Error types for the Strata library
//!
//! This module defines all error types that can occur during backup and
//! restore operations. The taxonomy follows the failure model of the core
//! engine: configuration problems are caught before any I/O, chain
//! integrity problems are caught before any destination mutation, and all
//! I/O failures are fatal to the enclosing operation.
//!
//! "No prior recorded state" is deliberately *not* an error: the state
//! resolver reports it as `Ok(None)`.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the Strata library
pub type Result<T> = std::result::Result<T, StrataError>;

/// Main error type for all Strata operations
#[derive(Debug, Error)]
pub enum StrataError {
    /// I/O errors during file or archive member operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization of metadata
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration, e.g. Hash strategy without an algorithm
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// A gap in the archive sequence, or a target archive missing from the
    /// chain. Raised before any destination mutation.
    #[error("Chain integrity error: {0}")]
    ChainIntegrity(String),

    /// Archive with the given sequence number does not exist in the chain
    #[error("Archive not found: sequence {0}")]
    ArchiveNotFound(u64),

    /// A payload was requested from an archive that never recorded it
    #[error("Payload not found in archive {sequence}: {path:?}")]
    PayloadNotFound {
        /// Sequence number of the archive that was searched
        sequence: u64,
        /// Relative path of the missing payload
        path: PathBuf,
    },

    /// Malformed diff-log record or state encoding
    #[error("Diff log error: {0}")]
    DiffLog(String),

    /// Archive container is structurally broken (missing metadata, bad
    /// member, undecodable payload)
    #[error("Archive error: {0}")]
    Archive(String),

    /// Decompression of an archived payload failed
    #[error("Decompression error: {0}")]
    Decompression(String),

    /// Restore operation failed
    #[error("Restore failed: {0}")]
    Restore(String),

    /// Walk directory error from walkdir crate
    #[error("Walk directory error")]
    WalkDir(#[from] walkdir::Error),

    /// A path outside the tracked root, or not representable as UTF-8
    #[error("Path conversion error: {0:?}")]
    PathConversion(PathBuf),
}

impl StrataError {
    /// Create a configuration error with a custom message
    pub fn configuration(msg: impl Into<String>) -> Self {
        StrataError::Configuration(msg.into())
    }

    /// Create a chain integrity error with a custom message
    pub fn chain_integrity(msg: impl Into<String>) -> Self {
        StrataError::ChainIntegrity(msg.into())
    }

    /// Create a diff log error with a custom message
    pub fn diff_log(msg: impl Into<String>) -> Self {
        StrataError::DiffLog(msg.into())
    }

    /// Create an archive error with a custom message
    pub fn archive(msg: impl Into<String>) -> Self {
        StrataError::Archive(msg.into())
    }

    /// Create a restore error with a custom message
    pub fn restore(msg: impl Into<String>) -> Self {
        StrataError::Restore(msg.into())
    }

    /// Check if this error indicates a broken chain rather than an
    /// environmental failure
    pub fn is_chain_integrity(&self) -> bool {
        matches!(
            self,
            StrataError::ChainIntegrity(_) | StrataError::ArchiveNotFound(_)
        )
    }
}

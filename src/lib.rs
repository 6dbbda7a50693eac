//! # Strata - Incremental archive-chain backups
//!
//! An incremental file-backup engine that detects per-file changes between
//! a live source tree and a chronologically ordered chain of snapshot
//! archives, and can reconstruct the source tree as it existed at any
//! point in that chain.
//!
//! ## Overview
//!
//! Every backup run produces one immutable *archive*: a diff log listing
//! each added, modified and deleted path, plus the payload bytes for every
//! added or modified file. The full ordered history of archives for one
//! source is the *chain*; its ordering key is a strictly increasing
//! sequence number stored in each archive's own metadata.
//!
//! Change detection never compares "today vs. yesterday" directly. Each
//! file's baseline is the most recently recorded state anywhere in the
//! chain, found by walking diff logs newest to oldest. Three detection
//! strategies are available:
//!
//! - **Date**: modification timestamps (cheap, no file reads)
//! - **Hash**: content digests (SHA-2 family)
//! - **Content**: raw byte comparison, full content in the diff log
//!
//! Restore replays every diff tree from the oldest archive up to the
//! target, in strict chronological order; later entries for a path shadow
//! earlier ones because each application fully overwrites or removes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use strata::{Strata, StrategyKind, HashAlgorithm};
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let strata = Strata::builder()
//!     .strategy(StrategyKind::Hash)
//!     .hash_algorithm(Some(HashAlgorithm::Sha256))
//!     .build(
//!         PathBuf::from("./my_project"),
//!         PathBuf::from("./backups"),
//!     )?;
//!
//! // Detect changes against the chain and store them as a new archive.
//! let report = strata.backup()?;
//! println!(
//!     "added {}, modified {}, deleted {}",
//!     report.stats.files_added,
//!     report.stats.files_modified,
//!     report.stats.files_deleted,
//! );
//!
//! // Reconstruct the tree as it existed at archive 1.
//! let result = strata.restore_to(1, Some(&PathBuf::from("./recovered")))?;
//! println!("restored {} files", result.files_written);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`]: top-level orchestration ([`Strata`], [`StrataBuilder`])
//! - [`builder`]: diff tree construction and deletion reconciliation
//! - [`replay`]: chain replay into a destination tree
//! - [`resolver`]: last-recorded-state resolution across the chain
//! - [`detector`]: per-path change classification
//! - [`strategy`]: the three detection strategies behind one trait
//! - [`archive`]: archive container storage and chain listing
//! - [`difflog`]: the per-archive diff-log text format
//! - [`types`]: the shared data model
//! - [`error`]: error types and handling
//!
//! ## Limitations
//!
//! Files are fully re-stored per change; there is no cross-archive
//! content-addressed deduplication. Overlapping backup or restore runs
//! against one archive directory are unsupported, and a failed restore is
//! not rolled back: the destination is left possibly incomplete but
//! inspectable.

// Public API modules
pub mod archive;
pub mod builder;
pub mod detector;
pub mod difflog;
pub mod engine;
pub mod error;
pub mod replay;
pub mod resolver;
pub mod strategy;
pub mod types;

// Internal modules (not part of public API)
mod utils;

// Re-export main types for convenience
pub use archive::{Archive, ArchiveMetadata, ArchiveStore};
pub use builder::{BuildOutput, DiffTreeBuilder};
pub use detector::ChangeDetector;
pub use engine::{BackupReport, Strata, StrataBuilder, StrataConfig};
pub use error::{Result, StrataError};
pub use replay::ChainReplayer;
pub use resolver::StateResolver;
pub use strategy::{DetectionStrategy, HashAlgorithm, StrategyKind};
pub use types::{ChangeKind, ChangeStats, DiffEntry, DiffNode, DiffTree, RecordedState, RestoreResult};

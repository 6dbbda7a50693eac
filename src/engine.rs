//! Top-level backup/restore orchestration
//!
//! [`Strata`] ties the core components together for one source/archive
//! pair: each backup run builds a diff tree against the chain and persists
//! it as a new archive; each restore replays the chain into a destination
//! tree. Both are single synchronous logical operations, and the archive
//! directory is exclusively owned for the duration of a run.
//!
//! ## Example
//!
//! ```rust,no_run
//! use strata::{Strata, StrategyKind};
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let strata = Strata::builder()
//!     .strategy(StrategyKind::Date)
//!     .build(
//!         PathBuf::from("./my_project"),
//!         PathBuf::from("./backups"),
//!     )?;
//!
//! let report = strata.backup()?;
//! if let Some(archive) = &report.archive {
//!     println!("created archive {}", archive.sequence());
//! }
//!
//! // Later: reconstruct the tree as of archive 1.
//! strata.restore_to(1, Some(&PathBuf::from("./recovered")))?;
//! # Ok(())
//! # }
//! ```

use crate::archive::{Archive, ArchiveStore};
use crate::builder::DiffTreeBuilder;
use crate::error::{Result, StrataError};
use crate::replay::ChainReplayer;
use crate::strategy::{strategy_for, DetectionStrategy, HashAlgorithm, StrategyKind};
use crate::types::{ChangeStats, RestoreResult};
use crate::utils::atomic_write;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Persisted backup configuration for one source/archive pair
///
/// Written by `strata init` and read back by every subsequent command, so
/// a chain is always driven by the strategy it was started with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrataConfig {
    /// Directory being backed up
    pub source_root: PathBuf,
    /// Directory holding the archive chain
    pub archive_root: PathBuf,
    /// Active change-detection strategy
    pub strategy: StrategyKind,
    /// Hash algorithm, required when `strategy` is Hash
    pub hash_algorithm: Option<HashAlgorithm>,
}

impl StrataConfig {
    /// Load a configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Save this configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        atomic_write(path, serde_json::to_vec_pretty(self)?.as_slice())
    }
}

/// Result of one backup run
#[derive(Debug)]
pub struct BackupReport {
    /// The created archive; `None` if an empty diff was skipped
    pub archive: Option<Archive>,
    /// Change counts detected in this run
    pub stats: ChangeStats,
    /// Time taken for the run in milliseconds
    pub duration_ms: u64,
}

/// The backup engine for one source/archive pair
pub struct Strata {
    source_root: PathBuf,
    store: ArchiveStore,
    strategy_kind: StrategyKind,
    hash_algorithm: Option<HashAlgorithm>,
    strategy: Box<dyn DetectionStrategy>,
    skip_empty: bool,
}

impl Strata {
    /// Open an engine with default settings (Date strategy)
    pub fn open(source_root: impl Into<PathBuf>, archive_root: impl Into<PathBuf>) -> Result<Self> {
        StrataBuilder::new().build(source_root, archive_root)
    }

    /// Start building a customized engine
    pub fn builder() -> StrataBuilder {
        StrataBuilder::new()
    }

    /// Open an engine from a persisted configuration
    pub fn from_config(config: &StrataConfig) -> Result<Self> {
        StrataBuilder::new()
            .strategy(config.strategy)
            .hash_algorithm(config.hash_algorithm)
            .build(&config.source_root, &config.archive_root)
    }

    /// Directory being backed up
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// The underlying archive store
    pub fn store(&self) -> &ArchiveStore {
        &self.store
    }

    /// List the archive chain, oldest first
    pub fn archives(&self) -> Result<Vec<Archive>> {
        self.store.list()
    }

    /// Run one backup: detect changes against the chain and persist them
    /// as a new archive
    ///
    /// An entirely empty diff still creates an archive (uniform sequence
    /// numbering) unless the engine was built with `skip_empty`.
    pub fn backup(&self) -> Result<BackupReport> {
        let start = Instant::now();
        info!(source = ?self.source_root, "starting backup");
        self.check_chain_strategy()?;

        let mut builder = DiffTreeBuilder::new(&self.store, self.strategy.as_ref());
        if self.store.root().starts_with(&self.source_root) {
            builder = builder.exclude(self.store.root());
        }
        let output = builder.build(&self.source_root)?;
        let stats = output.tree.stats();

        if self.skip_empty && output.tree.is_empty() {
            debug!("empty diff, skipping archive creation");
            return Ok(BackupReport {
                archive: None,
                stats,
                duration_ms: start.elapsed().as_millis() as u64,
            });
        }

        let archive = self.store.create(
            &output.tree,
            &output.payloads,
            self.strategy_kind,
            self.hash_algorithm,
        )?;
        Ok(BackupReport {
            archive: Some(archive),
            stats,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Restore the tree as it existed when archive `target_sequence` was
    /// created
    ///
    /// With `destination` unset the source root itself is restored.
    pub fn restore_to(
        &self,
        target_sequence: u64,
        destination: Option<&Path>,
    ) -> Result<RestoreResult> {
        let destination = destination.unwrap_or(&self.source_root);
        ChainReplayer::new(&self.store).restore_to(target_sequence, destination)
    }

    /// A chain never mixes strategies; refuse to extend one recorded under
    /// a different strategy or hash algorithm than this engine is
    /// configured with.
    fn check_chain_strategy(&self) -> Result<()> {
        if let Some(first) = self.store.list()?.first() {
            if first.metadata.strategy != self.strategy_kind {
                warn!(
                    chain = %first.metadata.strategy,
                    configured = %self.strategy_kind,
                    "strategy mismatch"
                );
                return Err(StrataError::configuration(format!(
                    "chain was recorded under the {} strategy, engine is configured for {}",
                    first.metadata.strategy, self.strategy_kind
                )));
            }
            if first.metadata.hash_algorithm != self.hash_algorithm {
                return Err(StrataError::configuration(format!(
                    "chain was recorded with hash algorithm {:?}, engine is configured for {:?}",
                    first.metadata.hash_algorithm, self.hash_algorithm
                )));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Strata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strata")
            .field("source_root", &self.source_root)
            .field("archive_root", &self.store.root())
            .field("strategy", &self.strategy_kind)
            .field("hash_algorithm", &self.hash_algorithm)
            .field("skip_empty", &self.skip_empty)
            .finish()
    }
}

/// Fluent construction of [`Strata`] engines
#[derive(Debug, Clone, Default)]
pub struct StrataBuilder {
    strategy: Option<StrategyKind>,
    hash_algorithm: Option<HashAlgorithm>,
    skip_empty: bool,
}

impl StrataBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        StrataBuilder::default()
    }

    /// Set the change-detection strategy (default: Date)
    pub fn strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Set the hash algorithm used by the Hash strategy
    pub fn hash_algorithm(mut self, algorithm: Option<HashAlgorithm>) -> Self {
        self.hash_algorithm = algorithm;
        self
    }

    /// Skip archive creation when a backup run detects no changes
    /// (default: always create, keeping sequence numbering uniform)
    pub fn skip_empty(mut self, skip: bool) -> Self {
        self.skip_empty = skip;
        self
    }

    /// Build the engine
    ///
    /// Configuration is validated here, before any file is read: the Hash
    /// strategy requires an algorithm.
    pub fn build(
        self,
        source_root: impl Into<PathBuf>,
        archive_root: impl Into<PathBuf>,
    ) -> Result<Strata> {
        let source_root = source_root.into();
        let strategy_kind = self.strategy.unwrap_or(StrategyKind::Date);
        let strategy = strategy_for(strategy_kind, self.hash_algorithm)?;
        let store = ArchiveStore::open(archive_root)?;
        Ok(Strata {
            source_root,
            store,
            strategy_kind,
            hash_algorithm: self.hash_algorithm,
            strategy,
            skip_empty: self.skip_empty,
        })
    }
}

//! # Strata CLI - Incremental archive-chain backups
//!
//! Thin command-line front end over the `strata` library.
//!
//! ## Usage
//! ```bash
//! # Write a configuration for this source/archive pair
//! strata init --source ./project --archives ./backups --strategy hash --algorithm sha256
//!
//! # Run a backup against the chain
//! strata backup
//!
//! # List the chain
//! strata list
//!
//! # Reconstruct the tree as of archive 3
//! strata restore 3 --dest ./recovered
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use strata::{HashAlgorithm, Strata, StrataConfig, StrategyKind};
use tracing_subscriber::EnvFilter;

/// Default configuration file name
const CONFIG_NAME: &str = "strata.json";

/// Strata CLI - incremental backups with point-in-time restore
#[derive(Parser)]
#[command(name = "strata")]
#[command(version)]
#[command(about = "Incremental archive-chain backups with point-in-time restore")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = CONFIG_NAME)]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a configuration file for a source/archive pair
    Init {
        /// Directory to back up
        #[arg(long)]
        source: PathBuf,

        /// Directory to store archives in
        #[arg(long)]
        archives: PathBuf,

        /// Change-detection strategy (date, hash, content)
        #[arg(long, default_value = "date")]
        strategy: StrategyKind,

        /// Hash algorithm (sha256, sha384, sha512); required for `hash`
        #[arg(long)]
        algorithm: Option<HashAlgorithm>,

        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Detect changes and create a new archive
    Backup {
        /// Do not create an archive when nothing changed
        #[arg(long)]
        skip_empty: bool,
    },

    /// List the archive chain
    List,

    /// Restore the tree as of a given archive
    Restore {
        /// Sequence number of the target archive
        sequence: u64,

        /// Restore into this directory instead of the source root
        #[arg(long)]
        dest: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("strata=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("strata=warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Init {
            source,
            archives,
            strategy,
            algorithm,
            force,
        } => {
            if cli.config.exists() && !force {
                bail!(
                    "configuration {:?} already exists (use --force to overwrite)",
                    cli.config
                );
            }
            if strategy == StrategyKind::Hash && algorithm.is_none() {
                bail!("the hash strategy requires --algorithm");
            }
            let config = StrataConfig {
                source_root: source,
                archive_root: archives,
                strategy,
                hash_algorithm: algorithm,
            };
            config.save(&cli.config)?;
            println!("wrote {:?}", cli.config);
        }

        Commands::Backup { skip_empty } => {
            let config = load_config(&cli.config)?;
            let strata = Strata::builder()
                .strategy(config.strategy)
                .hash_algorithm(config.hash_algorithm)
                .skip_empty(skip_empty)
                .build(&config.source_root, &config.archive_root)?;
            let report = strata.backup()?;
            match report.archive {
                Some(archive) => println!(
                    "archive {}: +{} *{} -{} ({} ms)",
                    archive.sequence(),
                    report.stats.files_added,
                    report.stats.files_modified,
                    report.stats.files_deleted,
                    report.duration_ms,
                ),
                None => println!("no changes, archive skipped"),
            }
        }

        Commands::List => {
            let config = load_config(&cli.config)?;
            let strata = Strata::from_config(&config)?;
            let chain = strata.archives()?;
            if chain.is_empty() {
                println!("no archives yet");
            }
            for archive in chain {
                let meta = &archive.metadata;
                println!(
                    "{:>6}  {}  +{} *{} -{}",
                    meta.sequence,
                    meta.created_at.format("%Y-%m-%d %H:%M:%S"),
                    meta.files_added,
                    meta.files_modified,
                    meta.files_deleted,
                );
            }
        }

        Commands::Restore { sequence, dest } => {
            let config = load_config(&cli.config)?;
            let strata = Strata::from_config(&config)?;
            let result = strata.restore_to(sequence, dest.as_deref())?;
            println!(
                "restored archive {}: {} files written, {} removed, {} bytes ({} ms)",
                result.target_sequence,
                result.files_written,
                result.files_removed,
                result.bytes_written,
                result.duration_ms,
            );
        }
    }

    Ok(())
}

fn load_config(path: &PathBuf) -> anyhow::Result<StrataConfig> {
    StrataConfig::load(path)
        .with_context(|| format!("cannot read configuration {:?} (run `strata init` first)", path))
}

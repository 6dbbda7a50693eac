//! Change-detection strategies
//!
//! A strategy decides what value is captured for a file when an archive is
//! made, and how to tell whether the file has changed relative to the most
//! recently recorded state anywhere in the chain. Three strategies exist:
//!
//! - **Date**: compares modification timestamps (cheap, no file reads)
//! - **Hash**: compares content digests (reads files, stores only digests)
//! - **Content**: compares raw bytes (reads files, stores full content in
//!   the diff log)
//!
//! All three are implementations of one [`DetectionStrategy`] trait; the
//! detector and builder are generic over it, so adding a fourth strategy
//! means one new impl, not edits scattered across call sites.

use crate::error::{Result, StrataError};
use crate::types::RecordedState;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::UNIX_EPOCH;

/// Hash algorithms available to the Hash strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-256 (default)
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

impl HashAlgorithm {
    /// Compute the lowercase hex digest of `data`
    pub fn digest_hex(&self, data: &[u8]) -> String {
        match self {
            HashAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
            HashAlgorithm::Sha384 => hex::encode(Sha384::digest(data)),
            HashAlgorithm::Sha512 => hex::encode(Sha512::digest(data)),
        }
    }

    /// Length of the hex digest produced by this algorithm
    pub fn digest_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Sha384 => 96,
            HashAlgorithm::Sha512 => 128,
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for HashAlgorithm {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha384" => Ok(HashAlgorithm::Sha384),
            "sha512" => Ok(HashAlgorithm::Sha512),
            other => Err(StrataError::configuration(format!(
                "unknown hash algorithm: {}",
                other
            ))),
        }
    }
}

/// Identifier for the active strategy, used in configuration and archive
/// metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Modification timestamp comparison
    Date,
    /// Content digest comparison
    Hash,
    /// Raw byte comparison
    Content,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StrategyKind::Date => "date",
            StrategyKind::Hash => "hash",
            StrategyKind::Content => "content",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for StrategyKind {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "date" => Ok(StrategyKind::Date),
            "hash" => Ok(StrategyKind::Hash),
            "content" => Ok(StrategyKind::Content),
            other => Err(StrataError::configuration(format!(
                "unknown strategy: {}",
                other
            ))),
        }
    }
}

/// One change-detection strategy
///
/// Implementations capture the current state of a file and decode a state
/// from its diff-log text form. Comparison against a previously recorded
/// state is plain equality on [`RecordedState`].
pub trait DetectionStrategy: std::fmt::Debug + Send + Sync {
    /// Which strategy this is
    fn kind(&self) -> StrategyKind;

    /// Capture the current on-disk state of `path`
    ///
    /// The captured value becomes the next round's previous state.
    fn capture(&self, path: &Path) -> Result<RecordedState>;

    /// Decode a state from the `diff` field of a diff-log record
    fn decode(&self, text: &str) -> Result<RecordedState>;
}

/// Build the strategy for a configured kind
///
/// Fails with a configuration error when the Hash strategy is selected
/// without an algorithm. This check runs before any file is read.
pub fn strategy_for(
    kind: StrategyKind,
    hash_algorithm: Option<HashAlgorithm>,
) -> Result<Box<dyn DetectionStrategy>> {
    match kind {
        StrategyKind::Date => Ok(Box::new(MtimeStrategy)),
        StrategyKind::Hash => {
            let algorithm = hash_algorithm.ok_or_else(|| {
                StrataError::configuration("hash strategy selected without a hash algorithm")
            })?;
            Ok(Box::new(HashStrategy { algorithm }))
        }
        StrategyKind::Content => Ok(Box::new(ContentStrategy)),
    }
}

/// Detects changes via the file modification timestamp
#[derive(Debug, Clone, Copy)]
pub struct MtimeStrategy;

impl DetectionStrategy for MtimeStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Date
    }

    fn capture(&self, path: &Path) -> Result<RecordedState> {
        let modified = fs::metadata(path)?.modified()?;
        let since_epoch = modified
            .duration_since(UNIX_EPOCH)
            .map_err(|e| StrataError::configuration(format!("mtime before epoch: {}", e)))?;
        Ok(RecordedState::Date(since_epoch.as_secs_f64()))
    }

    fn decode(&self, text: &str) -> Result<RecordedState> {
        let secs: f64 = text
            .parse()
            .map_err(|_| StrataError::diff_log(format!("invalid date state: {:?}", text)))?;
        Ok(RecordedState::Date(secs))
    }
}

/// Detects changes via a content digest
#[derive(Debug, Clone, Copy)]
pub struct HashStrategy {
    /// Algorithm used for all captures and comparisons in this chain
    pub algorithm: HashAlgorithm,
}

impl DetectionStrategy for HashStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Hash
    }

    fn capture(&self, path: &Path) -> Result<RecordedState> {
        let content = fs::read(path)?;
        Ok(RecordedState::Hash {
            digest: self.algorithm.digest_hex(&content),
            algorithm: self.algorithm,
        })
    }

    fn decode(&self, text: &str) -> Result<RecordedState> {
        if text.len() != self.algorithm.digest_len()
            || !text.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(StrataError::diff_log(format!(
                "invalid {} digest: {:?}",
                self.algorithm, text
            )));
        }
        Ok(RecordedState::Hash {
            digest: text.to_ascii_lowercase(),
            algorithm: self.algorithm,
        })
    }
}

/// Detects changes by comparing raw file bytes
#[derive(Debug, Clone, Copy)]
pub struct ContentStrategy;

impl DetectionStrategy for ContentStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Content
    }

    fn capture(&self, path: &Path) -> Result<RecordedState> {
        Ok(RecordedState::Content(fs::read(path)?))
    }

    fn decode(&self, text: &str) -> Result<RecordedState> {
        let bytes = hex::decode(text)
            .map_err(|e| StrataError::diff_log(format!("invalid content state: {}", e)))?;
        Ok(RecordedState::Content(bytes))
    }
}

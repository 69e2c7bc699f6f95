//! Error types for tierkv
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using TierError
pub type Result<T> = std::result::Result<T, TierError>;

/// Unified error type for tierkv operations
#[derive(Debug, Error)]
pub enum TierError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Integrity Errors
    // -------------------------------------------------------------------------
    #[error("Corrupted table {}: {reason}", path.display())]
    Corruption { path: PathBuf, reason: String },

    #[error("Manifest corruption: {0}")]
    ManifestCorruption(String),

    // -------------------------------------------------------------------------
    // Caller Errors
    // -------------------------------------------------------------------------
    #[error("Tier {tier} out of range (engine has {num_tiers} tiers)")]
    InvalidTier { tier: u32, num_tiers: u32 },

    #[error("No tables provided for compaction")]
    EmptyCompaction,

    // -------------------------------------------------------------------------
    // Compaction Errors
    // -------------------------------------------------------------------------
    #[error(
        "Compaction output {} is live but {} input(s) could not be removed: {}",
        output.display(),
        failed.len(),
        failed.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
    )]
    PartialCompaction {
        output: PathBuf,
        failed: Vec<PathBuf>,
    },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Background worker has shut down")]
    Shutdown,

    #[error("Background task failed: {0}")]
    Background(String),

    #[error("{count} flushed snapshot(s) could not be written to disk")]
    Unflushed { count: usize },
}

impl TierError {
    /// Build a corruption error for the table at `path`
    pub(crate) fn corruption(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        TierError::Corruption {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

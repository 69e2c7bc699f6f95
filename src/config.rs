//! Configuration for tierkv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, TierError};

/// Main configuration for a tierkv instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── MANIFEST         (filename → tier records)
    ///     └── tables/
    ///         ├── T0/          (freshly flushed tables)
    ///         ├── T1/
    ///         └── ...
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Byte budget of the memtable (sum of key + value UTF-8 lengths)
    pub memtable_size_limit: usize,

    // -------------------------------------------------------------------------
    // Tier Configuration
    // -------------------------------------------------------------------------
    /// Number of tables a tier may hold before it is compacted
    pub tier_threshold: usize,

    /// Fixed number of tiers; the last one compacts into itself
    pub num_tiers: u32,

    /// Bloom filter bits allocated per key in a table
    pub bloom_bits_per_key: usize,

    // -------------------------------------------------------------------------
    // Flush Configuration
    // -------------------------------------------------------------------------
    /// Period of the background timer flush
    pub flush_interval: Duration,

    /// Where flush and compaction I/O runs
    pub flush_mode: FlushMode,
}

/// Where the write-to-disk half of a flush runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// The triggering call writes the table and runs the compaction cascade
    Inline,

    /// The triggering call only freezes the memtable; a single worker
    /// thread writes tables and compacts in submission order
    Background,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./tierkv_data"),
            memtable_size_limit: 4 * 1024 * 1024, // 4 MB
            tier_threshold: 5,
            num_tiers: 5,
            bloom_bits_per_key: 10,
            flush_interval: Duration::from_secs(180),
            flush_mode: FlushMode::Background,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.memtable_size_limit == 0 {
            return Err(TierError::Config(
                "memtable_size_limit must be greater than zero".to_string(),
            ));
        }
        // A threshold of 1 would make the last tier compact into itself forever
        if self.tier_threshold < 2 {
            return Err(TierError::Config(format!(
                "tier_threshold must be at least 2, got {}",
                self.tier_threshold
            )));
        }
        if self.num_tiers == 0 {
            return Err(TierError::Config("num_tiers must be at least 1".to_string()));
        }
        if self.bloom_bits_per_key == 0 {
            return Err(TierError::Config(
                "bloom_bits_per_key must be greater than zero".to_string(),
            ));
        }
        if self.flush_interval.is_zero() {
            return Err(TierError::Config(
                "flush_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the memtable size limit (in bytes)
    pub fn memtable_size_limit(mut self, size: usize) -> Self {
        self.config.memtable_size_limit = size;
        self
    }

    /// Set the per-tier table count that triggers compaction
    pub fn tier_threshold(mut self, threshold: usize) -> Self {
        self.config.tier_threshold = threshold;
        self
    }

    /// Set the number of tiers
    pub fn num_tiers(mut self, tiers: u32) -> Self {
        self.config.num_tiers = tiers;
        self
    }

    /// Set the bloom filter density
    pub fn bloom_bits_per_key(mut self, bits: usize) -> Self {
        self.config.bloom_bits_per_key = bits;
        self
    }

    /// Set the periodic flush interval
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.config.flush_interval = interval;
        self
    }

    /// Set the flush mode
    pub fn flush_mode(mut self, mode: FlushMode) -> Self {
        self.config.flush_mode = mode;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

//! Table Metadata
//!
//! In-memory descriptor for each live on-disk table: where it lives, which
//! tier holds it, its key range, a bloom filter over its keys, and (once a
//! lookup has needed it) the parsed index block.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::bloom::BloomFilter;
use crate::error::{Result, TierError};

use super::sstable::{self, TableIndex};
use super::TABLE_EXTENSION;

// =============================================================================
// Table Names
// =============================================================================

/// Creation stamp embedded in a table's file name: `sstable_<millis>_<seq>.sst`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableName {
    /// Unix millis when the name was issued
    pub created_at: u64,
    /// Per-engine sequence number, unique within a data directory
    pub sequence: u64,
}

impl TableName {
    /// File name for this stamp
    pub fn file_name(&self) -> String {
        format!(
            "sstable_{}_{:06}.{}",
            self.created_at, self.sequence, TABLE_EXTENSION
        )
    }

    /// "sstable_1700000000000_000042.sst" → Some(TableName { .. })
    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name
            .strip_suffix(TABLE_EXTENSION)?
            .strip_suffix('.')?
            .strip_prefix("sstable_")?;
        let (created_at, sequence) = stem.split_once('_')?;
        Some(Self {
            created_at: created_at.parse().ok()?,
            sequence: sequence.parse().ok()?,
        })
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// Issues table names for one engine instance
///
/// The counter lives in the engine, not in a global, so two engines in one
/// process never share sequence numbers.
#[derive(Debug)]
pub struct TableNamer {
    next_sequence: AtomicU64,
}

impl TableNamer {
    /// Start issuing sequence numbers at `next_sequence`
    pub fn new(next_sequence: u64) -> Self {
        Self {
            next_sequence: AtomicU64::new(next_sequence),
        }
    }

    /// Issue a fresh name stamped with the current time
    pub fn next_name(&self) -> TableName {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        TableName {
            created_at,
            sequence: self.next_sequence.fetch_add(1, AtomicOrdering::SeqCst),
        }
    }
}

// =============================================================================
// Table Metadata
// =============================================================================

/// Descriptor of a live table
///
/// Ordered by creation stamp (older first). Two descriptors compare equal
/// only when they name the same file.
#[derive(Debug, Clone)]
pub struct TableMeta {
    name: TableName,
    path: PathBuf,
    tier: u32,
    /// Smallest key (empty for an empty table)
    min_key: String,
    /// Largest key (empty for an empty table)
    max_key: String,
    entry_count: usize,
    bloom: BloomFilter,
    /// Loaded on the first lookup that gets past the bloom filter
    index: OnceLock<TableIndex>,
}

impl TableMeta {
    /// Derive metadata from a table's full contents
    pub fn new(
        path: &Path,
        tier: u32,
        entries: &BTreeMap<String, String>,
        bloom_bits_per_key: usize,
    ) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(TableName::parse)
            .ok_or_else(|| TierError::corruption(path, "unrecognized table file name"))?;

        let min_key = entries.keys().next().cloned().unwrap_or_default();
        let max_key = entries.keys().next_back().cloned().unwrap_or_default();
        let bloom = BloomFilter::from_keys(entries.keys().map(String::as_str), bloom_bits_per_key);

        Ok(Self {
            name,
            path: path.to_path_buf(),
            tier,
            min_key,
            max_key,
            entry_count: entries.len(),
            bloom,
            index: OnceLock::new(),
        })
    }

    /// Quick check if a key might be in this table.
    /// Range check first, then the bloom filter.
    pub fn might_contain(&self, key: &str) -> bool {
        self.entry_count > 0
            && key >= self.min_key.as_str()
            && key <= self.max_key.as_str()
            && self.bloom.might_contain(key)
    }

    /// Point lookup: one seek through the cached index
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        sstable::get_with_index(&self.path, self.index()?, key)
    }

    fn index(&self) -> Result<&TableIndex> {
        if let Some(index) = self.index.get() {
            return Ok(index);
        }
        // Two racing loads parse the same immutable file; either result is fine
        let loaded = TableIndex::load(&self.path)?;
        Ok(self.index.get_or_init(|| loaded))
    }

    pub fn name(&self) -> TableName {
        self.name
    }

    /// Bare file name, the manifest key
    pub fn file_name(&self) -> String {
        self.name.file_name()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tier(&self) -> u32 {
        self.tier
    }

    pub fn min_key(&self) -> &str {
        &self.min_key
    }

    pub fn max_key(&self) -> &str {
        &self.max_key
    }

    pub fn entry_count(&self) -> usize {
        self.entry_count
    }
}

impl PartialEq for TableMeta {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TableMeta {}

impl PartialOrd for TableMeta {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TableMeta {
    fn cmp(&self, other: &Self) -> Ordering {
        // Sequence numbers are unique per directory, so equal stamps mean
        // the same file
        self.name.cmp(&other.name)
    }
}

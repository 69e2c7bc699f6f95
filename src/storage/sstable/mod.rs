//! SSTable Module
//!
//! Sorted String Table - immutable on-disk sorted key-value storage.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (12 bytes)                                       │
//! │   IndexOffset: u64 (8) | Magic: u32 (4)                 │
//! ├─────────────────────────────────────────────────────────┤
//! │ Data Block (variable)                                   │
//! │   [KeyLen: u32][Key][ValLen: u32][Value]                │
//! │   ... repeated for each entry, ascending key order ...  │
//! ├─────────────────────────────────────────────────────────┤
//! │ Index Block (at IndexOffset)                            │
//! │   Count: u32                                            │
//! │   [KeyLen: u32][Key][DataOffset: u64]                   │
//! │   ... Count entries, ascending key order ...            │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. The header is written as zeros first and
//! backpatched once the index is complete, so a half-written file never
//! carries a valid magic. Every read path rejects a bad magic.

mod builder;
mod iterator;
mod reader;

use std::path::PathBuf;

pub use builder::{write_table, SSTableBuilder};
pub use iterator::SSTableIterator;
pub use reader::{delete_table, get_by_key, get_with_index, read_all, SSTableReader, TableIndex};

// =============================================================================
// Shared Constants (used by builder, reader, iterator)
// =============================================================================

/// Magic number identifying a tierkv sorted table ("TKV1")
pub(crate) const MAGIC: u32 = 0x544B_5631;

/// Header size: IndexOffset (8) + Magic (4) = 12 bytes
pub(crate) const HEADER_SIZE: u64 = 12;

/// Size of the entry count that opens the index block
pub(crate) const INDEX_COUNT_SIZE: u64 = 4;

// =============================================================================
// SSTable Summary
// =============================================================================

/// What the builder reports about a table it has just written
#[derive(Debug, Clone)]
pub struct SSTableInfo {
    /// Path the table was written to
    pub path: PathBuf,
    /// Number of entries in this table
    pub entry_count: u64,
    /// Smallest key, None for an empty table
    pub min_key: Option<String>,
    /// Largest key, None for an empty table
    pub max_key: Option<String>,
    /// File size in bytes
    pub file_size: u64,
}

impl SSTableInfo {
    /// Get the number of entries
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }
}

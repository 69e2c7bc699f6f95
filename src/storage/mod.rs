//! Storage Module
//!
//! Persistent storage layer: sorted tables, their metadata, the tier index,
//! and the manifest that records which tier owns each file.
//!
//! ## On-disk layout
//! ```text
//! {data_dir}/
//!   ├── MANIFEST                  #CRC=<crc32 of the lines below>
//!   │                             T<tier> <file name>
//!   └── tables/
//!       ├── T0/sstable_<millis>_<seq>.sst
//!       ├── T1/...
//!       └── T{num_tiers - 1}/...
//! ```
//!
//! Tables are written as `<name>.sst.tmp` and renamed into place, so a file
//! with the final name is always complete.

pub mod manifest;
pub mod metadata;
pub mod sstable;
pub mod tiers;

use std::path::{Path, PathBuf};

pub use manifest::Manifest;
pub use metadata::{TableMeta, TableName, TableNamer};
pub use sstable::{SSTableBuilder, SSTableInfo, SSTableIterator, SSTableReader};
pub use tiers::TierIndex;

/// Extension of a complete table file
pub const TABLE_EXTENSION: &str = "sst";

/// Suffix appended while a table is being written
pub const TEMP_SUFFIX: &str = ".tmp";

/// Directory holding the tables of `tier`
pub fn tier_dir(tables_dir: &Path, tier: u32) -> PathBuf {
    tables_dir.join(format!("T{}", tier))
}

/// "T3" → Some(3)
pub fn parse_tier_dir(name: &str) -> Option<u32> {
    let digits = name.strip_prefix('T')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Final path of a table
pub fn table_path(tables_dir: &Path, tier: u32, name: TableName) -> PathBuf {
    tier_dir(tables_dir, tier).join(name.file_name())
}

/// Temporary path a table is written to before its rename
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut os = final_path.as_os_str().to_owned();
    os.push(TEMP_SUFFIX);
    PathBuf::from(os)
}

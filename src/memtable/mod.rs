//! MemTable Module
//!
//! In-memory data structure for recent writes.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Exact byte-size accounting against a fixed budget
//! - Ordered snapshots for sorted table creation
//!
//! ## Data Structure Choice
//! BTreeMap wrapped in a parking_lot RwLock:
//! - Ordered keys (required for sorted table generation)
//! - One lock guards both the map and its size counter
//!
//! Deletes remove the key outright. Nothing marks the key as deleted on
//! disk, so an older flushed value becomes visible again.

mod table;

pub use table::MemTable;

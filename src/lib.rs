//! # tierkv
//!
//! An embeddable, tiered log-structured key-value store with:
//! - A byte-budgeted in-memory write buffer
//! - Immutable sorted tables carrying a full key index
//! - Per-table bloom filters and key-range pre-filtering
//! - Tiered compaction cascading up a fixed number of tiers
//! - A checksummed manifest, rebuilt from disk when it cannot be trusted
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Engine                                │
//! │          put / get / delete / flush / close                  │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │  MemTable   │ ──take──▶│   Pending   │
//!   │  (RwLock)   │          │  snapshots  │
//!   └─────────────┘          └──────┬──────┘
//!                                   │ flush (inline or worker)
//!                                   ▼
//!                    ┌──────────────────────────────┐
//!                    │  T0 ─▶ T1 ─▶ ... ─▶ T{n-1} ⟲  │
//!                    │  sorted tables + manifest    │
//!                    └──────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod bloom;
pub mod memtable;
pub mod storage;
pub mod compaction;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, TierError};
pub use config::{Config, FlushMode};
pub use engine::Engine;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of tierkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

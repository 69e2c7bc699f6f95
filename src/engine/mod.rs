//! Engine Module
//!
//! The storage engine that coordinates all components.
//!
//! ## Responsibilities
//! - Route put/get/delete to the memtable and tiers
//! - Flush the memtable when it reaches its byte budget
//! - Cascade compactions up the tiers when a tier overflows
//! - Recover tier assignment from the manifest on startup
//! - Run the periodic flush timer and (in background mode) the flush worker

mod worker;

use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam::channel::{self, Sender};
use parking_lot::{Mutex, RwLock};

use crate::compaction::Compactor;
use crate::config::{Config, FlushMode};
use crate::error::{Result, TierError};
use crate::memtable::MemTable;
use crate::storage::manifest::{remove_stale_temp_files, MANIFEST_FILE};
use crate::storage::sstable::{self, write_table};
use crate::storage::{
    table_path, temp_path, tier_dir, Manifest, TableMeta, TableName, TableNamer, TierIndex,
};

use worker::{FlushTimer, Task, Worker};

/// Tier every memtable flush lands on unless told otherwise
pub const TIER_ZERO: u32 = 0;

/// The main storage engine
///
/// ## Concurrency Model
///
/// - **put/delete**: touch only the memtable (one lock per call)
/// - **flush**: under `flush_lock`, the memtable is drained into a frozen
///   snapshot and queued in `pending`, then `pending` is written front to
///   back either inline or by the background worker. A snapshot that failed
///   to write stays at the front and is retried before anything newer
/// - **get**: memtable → pending snapshots (newest first) → tiers (tier 0
///   first, newest table first). The tier index read lock is held while
///   tables are read, so compaction cannot delete a file mid-lookup
///
/// Lock order where two are held: `pending` → memtable. Every other lock is
/// taken alone.
pub struct Engine {
    shared: Arc<Shared>,
    worker: Option<Worker>,
    timer: Option<FlushTimer>,
    closed: bool,
}

/// A drained memtable waiting to become a table
struct FrozenTable {
    name: TableName,
    tier: u32,
    entries: BTreeMap<String, String>,
}

/// Where the disk half of a flush runs
enum Dispatch {
    Inline,
    Background(Sender<Task>),
}

/// State shared between the engine handle, the worker, and the timer
pub(crate) struct Shared {
    config: Config,
    tables_dir: PathBuf,
    memtable: MemTable,
    /// Snapshots not yet published in `tiers`, oldest first
    pending: RwLock<VecDeque<Arc<FrozenTable>>>,
    tiers: TierIndex,
    manifest: Mutex<Manifest>,
    namer: TableNamer,
    compactor: Compactor,
    dispatch: Dispatch,
    /// Serializes freezing (and, inline, the disk work) so names follow
    /// snapshot order
    flush_lock: Mutex<()>,
    /// First failure of work that ran off the caller's thread
    background_error: Mutex<Option<TierError>>,
}

impl Engine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const TABLES_DIR: &'static str = "tables";

    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Create the data directory and one directory per tier
    /// 2. Remove temp files left by interrupted writes
    /// 3. Load (or rebuild) the manifest
    /// 4. Rebuild table metadata from every live table
    /// 5. Compact any tier already at its threshold
    /// 6. Start the flush timer and, in background mode, the worker
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        // Step 1: Directory tree
        let tables_dir = config.data_dir.join(Self::TABLES_DIR);
        for tier in 0..config.num_tiers {
            fs::create_dir_all(tier_dir(&tables_dir, tier))?;
        }

        // Step 2: Leftovers of a crash mid-write are never live
        remove_stale_temp_files(&tables_dir, config.num_tiers)?;

        // Step 3: Manifest
        let manifest = Manifest::load(
            &config.data_dir.join(MANIFEST_FILE),
            &tables_dir,
            config.num_tiers,
        )?;

        // Step 4: Metadata for every live table
        let tiers = TierIndex::new(config.num_tiers);
        let mut next_sequence = 1;
        for (file_name, &tier) in manifest.file_tiers() {
            let path = tier_dir(&tables_dir, tier).join(file_name);
            let entries = sstable::read_all(&path)?;
            let meta = TableMeta::new(&path, tier, &entries, config.bloom_bits_per_key)?;
            next_sequence = next_sequence.max(meta.name().sequence + 1);
            tiers.insert(Arc::new(meta))?;
        }

        let (sender, receiver) = channel::unbounded();
        let dispatch = match config.flush_mode {
            FlushMode::Inline => Dispatch::Inline,
            FlushMode::Background => Dispatch::Background(sender.clone()),
        };

        let shared = Arc::new(Shared {
            tables_dir,
            memtable: MemTable::new(config.memtable_size_limit),
            pending: RwLock::new(VecDeque::new()),
            tiers,
            manifest: Mutex::new(manifest),
            namer: TableNamer::new(next_sequence),
            compactor: Compactor::new(config.bloom_bits_per_key),
            dispatch,
            flush_lock: Mutex::new(()),
            background_error: Mutex::new(None),
            config,
        });

        // Step 5: Catch up on tiers that overflowed before the last shutdown
        shared.run_compactions(TIER_ZERO)?;

        tracing::info!(
            data_dir = %shared.config.data_dir.display(),
            tables = shared.tiers.total_len(),
            mode = ?shared.config.flush_mode,
            "Engine opened"
        );

        // Step 6: Background threads
        let worker = match shared.config.flush_mode {
            FlushMode::Background => Some(Worker::spawn(Arc::clone(&shared), sender, receiver)?),
            FlushMode::Inline => None,
        };
        let timer = FlushTimer::spawn(Arc::clone(&shared), shared.config.flush_interval)?;

        Ok(Self {
            shared,
            worker,
            timer: Some(timer),
            closed: false,
        })
    }

    /// Open with a data directory, memtable budget, and tier threshold
    ///
    /// Uses defaults for everything else
    pub fn open_with(
        path: &Path,
        memtable_size_limit: usize,
        tier_threshold: usize,
    ) -> Result<Self> {
        let config = Config::builder()
            .data_dir(path)
            .memtable_size_limit(memtable_size_limit)
            .tier_threshold(tier_threshold)
            .build();
        Self::open(config)
    }

    /// Put a key-value pair
    ///
    /// Flushes to tier 0 when the write fills the memtable.
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        if self.shared.memtable.put(key.to_string(), value.to_string()) {
            self.shared.flush(TIER_ZERO)?;
        }
        Ok(())
    }

    /// Get a value by key
    ///
    /// Search order:
    /// 1. MemTable (most recent writes)
    /// 2. Snapshots being flushed (newest first)
    /// 3. Tiers in ascending order, newest table first within a tier
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.shared.get(key)
    }

    /// Delete a key from the memtable
    ///
    /// Nothing is written to disk: if a flushed table still holds the key,
    /// later lookups return that older value.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.shared.memtable.delete(key);
        Ok(())
    }

    /// Flush the memtable to `tier`
    ///
    /// Also retries snapshots an earlier flush failed to write; no-op when
    /// there is nothing to write. In background mode this returns once the
    /// work is queued; see [`Engine::flush_wait`].
    pub fn flush(&self, tier: u32) -> Result<()> {
        self.shared.flush(tier)
    }

    /// Flush to tier 0 and wait until all queued disk work has finished
    pub fn flush_wait(&self) -> Result<()> {
        self.shared.flush(TIER_ZERO)?;
        if let Some(worker) = &self.worker {
            worker.barrier()?;
        }
        self.shared.take_background_error().map_or(Ok(()), Err)
    }

    /// Close the engine gracefully
    ///
    /// Stops the timer, flushes the memtable, lets the worker drain every
    /// queued task, and reports the first error any of that hit. Fails with
    /// [`TierError::Unflushed`] if any snapshot never reached disk.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Some(timer) = self.timer.take() {
            timer.stop();
        }

        let flushed = self.shared.flush(TIER_ZERO);

        let drained = match self.worker.take() {
            Some(worker) => worker.shutdown(),
            None => Ok(()),
        };

        tracing::info!(
            data_dir = %self.shared.config.data_dir.display(),
            tables = self.shared.tiers.total_len(),
            "Engine closed"
        );

        flushed?;
        drained?;
        if let Some(e) = self.shared.take_background_error() {
            return Err(e);
        }

        let count = self.shared.pending.read().len();
        if count > 0 {
            tracing::error!(count, "Closing with snapshots still in memory");
            return Err(TierError::Unflushed { count });
        }
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.shared.config.data_dir
    }

    /// Directory holding the tier subdirectories
    pub fn tables_dir(&self) -> &Path {
        &self.shared.tables_dir
    }

    /// Get the current memtable size in bytes
    pub fn memtable_size(&self) -> usize {
        self.shared.memtable.size()
    }

    /// Get the memtable entry count
    pub fn memtable_entry_count(&self) -> usize {
        self.shared.memtable.entry_count()
    }

    /// Snapshots frozen but not yet published as tables
    pub fn pending_flushes(&self) -> usize {
        self.shared.pending.read().len()
    }

    /// Number of live tables in `tier`
    pub fn tier_table_count(&self, tier: u32) -> usize {
        self.shared.tiers.tier_len(tier)
    }

    /// Number of live tables across all tiers
    pub fn table_count(&self) -> usize {
        self.shared.tiers.total_len()
    }

    /// File names in `tier`, oldest first
    pub fn tier_files(&self, tier: u32) -> Vec<String> {
        self.shared
            .tiers
            .tables(tier)
            .iter()
            .map(|meta| meta.file_name())
            .collect()
    }

    /// Copy of the manifest's file → tier map
    pub fn manifest_entries(&self) -> BTreeMap<String, u32> {
        self.shared.manifest.lock().file_tiers().clone()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.shared.config
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::error!(error = %e, "Engine shutdown failed during drop");
        }
    }
}

impl Shared {
    fn get(&self, key: &str) -> Result<Option<String>> {
        // Step 1: Check MemTable first (most recent data)
        if let Some(value) = self.memtable.get(key) {
            return Ok(Some(value));
        }

        // Step 2: Snapshots on their way to disk
        {
            let pending = self.pending.read();
            for frozen in pending.iter().rev() {
                if let Some(value) = frozen.entries.get(key) {
                    return Ok(Some(value.clone()));
                }
            }
        }

        // Step 3: Published tables; a bloom false positive just moves on
        let view = self.tiers.view();
        for meta in view.lookup_order() {
            if !meta.might_contain(key) {
                continue;
            }
            if let Some(value) = meta.get(key)? {
                return Ok(Some(value));
            }
        }

        Ok(None)
    }

    /// Freeze the memtable for `tier`, then write every pending snapshot,
    /// inline or via the worker
    pub(crate) fn flush(&self, tier: u32) -> Result<()> {
        self.check_tier(tier)?;

        let _flush_guard = self.flush_lock.lock();

        if let Dispatch::Background(_) = self.dispatch {
            if let Some(e) = self.take_background_error() {
                return Err(e);
            }
        }

        {
            // Holding `pending` while draining keeps every key visible to get()
            let mut pending = self.pending.write();
            let entries = self.memtable.take();
            if !entries.is_empty() {
                pending.push_back(Arc::new(FrozenTable {
                    name: self.namer.next_name(),
                    tier,
                    entries,
                }));
            }
            if pending.is_empty() {
                return Ok(());
            }
        }

        match &self.dispatch {
            Dispatch::Inline => self.write_pending(),
            Dispatch::Background(sender) => sender
                .send(Task::WritePending)
                .map_err(|_| TierError::Shutdown),
        }
    }

    /// Write pending snapshots oldest first, stopping at the first failure
    ///
    /// Only one thread runs this at a time: the flushing caller (under
    /// `flush_lock`) inline, the worker in background mode.
    pub(crate) fn write_pending(&self) -> Result<()> {
        loop {
            let front = self.pending.read().front().cloned();
            match front {
                Some(frozen) => self.write_frozen(&frozen)?,
                None => return Ok(()),
            }
        }
    }

    /// Write a frozen snapshot as a table, publish it, then compact
    ///
    /// Safe to repeat after a failure: the temp file is truncated, the
    /// rename replaces, and the manifest entry is keyed by file name.
    fn write_frozen(&self, frozen: &Arc<FrozenTable>) -> Result<()> {
        let path = table_path(&self.tables_dir, frozen.tier, frozen.name);
        let tmp = temp_path(&path);

        // Never visible under its final name until complete
        let info = write_table(&frozen.entries, &tmp)?;
        fs::rename(&tmp, &path)?;

        let meta = TableMeta::new(
            &path,
            frozen.tier,
            &frozen.entries,
            self.config.bloom_bits_per_key,
        )?;

        self.manifest
            .lock()
            .add_file(&meta.file_name(), frozen.tier)?;
        self.tiers.insert(Arc::new(meta))?;
        self.pending
            .write()
            .retain(|pending| !Arc::ptr_eq(pending, frozen));

        tracing::debug!(
            file = %frozen.name,
            tier = frozen.tier,
            entries = info.entry_count,
            bytes = info.file_size,
            "Flushed memtable"
        );

        self.run_compactions(frozen.tier)
    }

    /// Compact every tier from `start` upward that has reached the threshold.
    /// A loop over tiers, bounded by the tier count.
    pub(crate) fn run_compactions(&self, start: u32) -> Result<()> {
        let last = self.config.num_tiers - 1;
        for tier in start..=last {
            while self.tiers.tier_len(tier) >= self.config.tier_threshold {
                self.compact_tier(tier)?;
            }
        }
        Ok(())
    }

    /// Merge the oldest `threshold` tables of `tier` into the next tier
    /// (the last tier compacts into itself)
    fn compact_tier(&self, tier: u32) -> Result<()> {
        let inputs = self.tiers.oldest(tier, self.config.tier_threshold);
        if inputs.is_empty() {
            return Ok(());
        }

        let target = (tier + 1).min(self.config.num_tiers - 1);
        let output = table_path(&self.tables_dir, target, self.namer.next_name());

        let merged = Arc::new(self.compactor.merge(&inputs, &output, target)?);

        let removed: Vec<String> = inputs.iter().map(|meta| meta.file_name()).collect();
        self.manifest
            .lock()
            .apply_compaction_result(&removed, &merged.file_name(), target)?;
        self.tiers.replace(&inputs, merged)?;

        // Only now is no lookup able to reach the inputs
        self.compactor.remove_inputs(&inputs, &output)
    }

    fn check_tier(&self, tier: u32) -> Result<()> {
        if tier >= self.config.num_tiers {
            return Err(TierError::InvalidTier {
                tier,
                num_tiers: self.config.num_tiers,
            });
        }
        Ok(())
    }

    pub(crate) fn record_background_error(&self, error: TierError) {
        let mut slot = self.background_error.lock();
        if slot.is_none() {
            *slot = Some(error);
        }
    }

    fn take_background_error(&self) -> Option<TierError> {
        self.background_error.lock().take()
    }
}

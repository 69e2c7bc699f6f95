//! Tests for Engine
//!
//! These tests verify:
//! - Basic get/put/delete operations
//! - Flush on budget and on demand
//! - Compaction cascade across tiers
//! - Recovery from the manifest and from a bare directory scan
//! - Both flush modes, including concurrent access
//! - Engine lifecycle (open/close/drop)

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tierkv::storage::manifest::MANIFEST_FILE;
use tierkv::storage::tier_dir;
use tierkv::{Config, Engine, FlushMode, TierError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn config(dir: &TempDir, mode: FlushMode, budget: usize, threshold: usize) -> Config {
    Config::builder()
        .data_dir(dir.path())
        .memtable_size_limit(budget)
        .tier_threshold(threshold)
        .flush_mode(mode)
        .build()
}

fn setup_temp_engine(mode: FlushMode) -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open(config(&temp_dir, mode, 1024 * 1024, 5)).unwrap();
    (temp_dir, engine)
}

/// Every put fills the memtable and flushes
fn setup_flush_every_put(mode: FlushMode, threshold: usize) -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open(config(&temp_dir, mode, 1, threshold)).unwrap();
    (temp_dir, engine)
}

const BOTH_MODES: [FlushMode; 2] = [FlushMode::Inline, FlushMode::Background];

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_engine_open_creates_directories() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("mydb");

    let engine = Engine::open(Config::builder().data_dir(&data_dir).build()).unwrap();

    for tier in 0..engine.config().num_tiers {
        assert!(tier_dir(engine.tables_dir(), tier).is_dir());
    }
    assert!(data_dir.join(MANIFEST_FILE).exists());
    assert_eq!(engine.data_dir(), data_dir.as_path());
}

#[test]
fn test_engine_put_get() {
    for mode in BOTH_MODES {
        let (_temp, engine) = setup_temp_engine(mode);

        engine.put("hello", "world").unwrap();

        assert_eq!(engine.get("hello").unwrap(), Some("world".to_string()));
        assert_eq!(engine.get("nonexistent").unwrap(), None);
    }
}

#[test]
fn test_engine_overwrite() {
    let (_temp, engine) = setup_temp_engine(FlushMode::Inline);

    engine.put("key", "value1").unwrap();
    engine.put("key", "value2").unwrap();

    assert_eq!(engine.get("key").unwrap(), Some("value2".to_string()));
    assert_eq!(engine.memtable_entry_count(), 1);
    assert_eq!(engine.memtable_size(), 3 + 6);
}

#[test]
fn test_engine_delete_from_memtable() {
    let (_temp, engine) = setup_temp_engine(FlushMode::Inline);

    engine.put("key", "value").unwrap();
    engine.delete("key").unwrap();

    assert_eq!(engine.get("key").unwrap(), None);
    assert_eq!(engine.memtable_size(), 0);
}

#[test]
fn test_delete_does_not_reach_flushed_tables() {
    let (_temp, engine) = setup_temp_engine(FlushMode::Inline);

    engine.put("key", "on-disk").unwrap();
    engine.flush(0).unwrap();
    engine.put("key", "in-memory").unwrap();
    engine.delete("key").unwrap();

    // No tombstones: the flushed value shows through again
    assert_eq!(engine.get("key").unwrap(), Some("on-disk".to_string()));
}

#[test]
fn test_open_with() {
    let temp_dir = TempDir::new().unwrap();

    let engine = Engine::open_with(temp_dir.path(), 64, 3).unwrap();

    assert_eq!(engine.config().memtable_size_limit, 64);
    assert_eq!(engine.config().tier_threshold, 3);
    engine.put("a", "1").unwrap();
    assert_eq!(engine.get("a").unwrap(), Some("1".to_string()));
}

#[test]
fn test_invalid_config_rejected() {
    let temp_dir = TempDir::new().unwrap();

    let result = Engine::open(config(&temp_dir, FlushMode::Inline, 1024, 1));

    assert!(matches!(result, Err(TierError::Config(_))));
}

// =============================================================================
// Flush Tests
// =============================================================================

#[test]
fn test_budget_triggers_flush() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open(config(&temp_dir, FlushMode::Inline, 100, 50)).unwrap();

    for i in 0..50 {
        engine
            .put(&format!("key{:03}", i), "some value bytes")
            .unwrap();
    }

    assert!(engine.tier_table_count(0) > 0);
    assert!(engine.memtable_size() < 100);
    for i in 0..50 {
        assert_eq!(
            engine.get(&format!("key{:03}", i)).unwrap(),
            Some("some value bytes".to_string())
        );
    }
}

#[test]
fn test_flush_empty_memtable_is_noop() {
    let (_temp, engine) = setup_temp_engine(FlushMode::Inline);

    engine.flush(0).unwrap();

    assert_eq!(engine.table_count(), 0);
    assert!(engine.manifest_entries().is_empty());
}

#[test]
fn test_flush_to_named_tier() {
    let (_temp, engine) = setup_temp_engine(FlushMode::Inline);

    engine.put("a", "1").unwrap();
    engine.flush(2).unwrap();

    assert_eq!(engine.tier_table_count(0), 0);
    assert_eq!(engine.tier_table_count(2), 1);
    let files = engine.tier_files(2);
    assert!(tier_dir(engine.tables_dir(), 2).join(&files[0]).exists());
    assert_eq!(engine.manifest_entries().get(&files[0]), Some(&2));
    assert_eq!(engine.get("a").unwrap(), Some("1".to_string()));
}

#[test]
fn test_flush_to_invalid_tier_rejected() {
    let (_temp, engine) = setup_temp_engine(FlushMode::Inline);
    engine.put("a", "1").unwrap();

    let result = engine.flush(5);

    assert!(matches!(
        result,
        Err(TierError::InvalidTier { tier: 5, num_tiers: 5 })
    ));
    // Nothing was drained
    assert_eq!(engine.memtable_entry_count(), 1);
}

#[test]
fn test_newest_table_wins_within_tier() {
    let (_temp, engine) = setup_temp_engine(FlushMode::Inline);

    engine.put("key", "old").unwrap();
    engine.flush(0).unwrap();
    engine.put("key", "new").unwrap();
    engine.flush(0).unwrap();

    assert_eq!(engine.tier_table_count(0), 2);
    assert_eq!(engine.get("key").unwrap(), Some("new".to_string()));
}

#[test]
fn test_overlapping_newer_tables_do_not_hide_older_key() {
    let (_temp, engine) = setup_temp_engine(FlushMode::Inline);

    // Older table holds the key; newer tables span it without holding it
    engine.put("m", "found").unwrap();
    engine.flush(0).unwrap();
    for i in 0..3 {
        engine.put("a", "x").unwrap();
        engine.put(&format!("z{}", i), "y").unwrap();
        engine.flush(0).unwrap();
    }

    assert_eq!(engine.get("m").unwrap(), Some("found".to_string()));
}

// =============================================================================
// Compaction Tests
// =============================================================================

#[test]
fn test_cascade_keeps_every_key_reachable() {
    for mode in BOTH_MODES {
        let (_temp, engine) = setup_flush_every_put(mode, 2);

        for i in 1..=5 {
            engine.put(&format!("k{}", i), &format!("v{}", i)).unwrap();
        }
        engine.flush_wait().unwrap();

        for i in 1..=5 {
            assert_eq!(
                engine.get(&format!("k{}", i)).unwrap(),
                Some(format!("v{}", i)),
                "mode {:?}",
                mode
            );
        }
        assert!(engine.tier_table_count(0) < 2);
        // Five flushes at threshold 2: one table on T0, one on T2
        assert_eq!(engine.tier_table_count(0), 1);
        assert_eq!(engine.tier_table_count(1), 0);
        assert_eq!(engine.tier_table_count(2), 1);
    }
}

#[test]
fn test_every_tier_stays_below_threshold() {
    let (_temp, engine) = setup_flush_every_put(FlushMode::Inline, 3);

    for i in 0..200 {
        engine.put(&format!("key{:04}", i), "v").unwrap();
    }

    for tier in 0..engine.config().num_tiers {
        assert!(engine.tier_table_count(tier) < 3, "tier {} overflowed", tier);
    }
    assert_eq!(engine.get("key0000").unwrap(), Some("v".to_string()));
    assert_eq!(engine.get("key0199").unwrap(), Some("v".to_string()));
}

#[test]
fn test_last_tier_compacts_into_itself() {
    let temp_dir = TempDir::new().unwrap();
    let mut cfg = config(&temp_dir, FlushMode::Inline, 1, 2);
    cfg.num_tiers = 2;
    let engine = Engine::open(cfg).unwrap();

    for i in 0..20 {
        engine.put(&format!("k{:02}", i), &i.to_string()).unwrap();
    }

    assert!(engine.tier_table_count(1) < 2);
    assert_eq!(engine.table_count(), engine.manifest_entries().len());
    for i in 0..20 {
        assert_eq!(engine.get(&format!("k{:02}", i)).unwrap(), Some(i.to_string()));
    }
}

#[test]
fn test_compaction_prefers_newer_values() {
    let (_temp, engine) = setup_flush_every_put(FlushMode::Inline, 2);

    engine.put("key", "v1").unwrap();
    engine.put("key", "v2").unwrap();
    // Both tables merged into T1
    assert_eq!(engine.tier_table_count(1), 1);
    assert_eq!(engine.get("key").unwrap(), Some("v2".to_string()));

    engine.put("key", "v3").unwrap();
    assert_eq!(engine.get("key").unwrap(), Some("v3".to_string()));
}

#[test]
fn test_compaction_removes_input_files() {
    let (_temp, engine) = setup_flush_every_put(FlushMode::Inline, 2);

    engine.put("a", "1").unwrap();
    engine.put("b", "2").unwrap();

    let t0_files = fs::read_dir(tier_dir(engine.tables_dir(), 0)).unwrap().count();
    let t1_files = fs::read_dir(tier_dir(engine.tables_dir(), 1)).unwrap().count();
    assert_eq!(t0_files, 0);
    assert_eq!(t1_files, 1);
    assert_eq!(engine.manifest_entries().len(), 1);
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_reopen_restores_tables() {
    let temp_dir = TempDir::new().unwrap();

    {
        let engine = Engine::open(config(&temp_dir, FlushMode::Inline, 1024, 10)).unwrap();
        engine.put("persisted", "yes").unwrap();
        engine.flush(0).unwrap();
        engine.put("unflushed", "also").unwrap();
        engine.close().unwrap();
    }

    let engine = Engine::open(config(&temp_dir, FlushMode::Inline, 1024, 10)).unwrap();
    assert_eq!(engine.get("persisted").unwrap(), Some("yes".to_string()));
    // close() flushed the memtable
    assert_eq!(engine.get("unflushed").unwrap(), Some("also".to_string()));
    assert_eq!(engine.tier_table_count(0), 2);
}

#[test]
fn test_reopen_never_reuses_table_names() {
    let temp_dir = TempDir::new().unwrap();

    let first_files = {
        let engine = Engine::open(config(&temp_dir, FlushMode::Inline, 1024, 10)).unwrap();
        engine.put("a", "1").unwrap();
        engine.flush(0).unwrap();
        engine.tier_files(0)
    };

    let engine = Engine::open(config(&temp_dir, FlushMode::Inline, 1024, 10)).unwrap();
    engine.put("b", "2").unwrap();
    engine.flush(0).unwrap();

    let files = engine.tier_files(0);
    assert_eq!(files.len(), 2);
    assert_eq!(files[0], first_files[0]);
    assert_ne!(files[1], first_files[0]);
}

#[test]
fn test_drop_flushes_memtable() {
    let temp_dir = TempDir::new().unwrap();

    {
        let engine = Engine::open(config(&temp_dir, FlushMode::Background, 1024, 5)).unwrap();
        engine.put("key", "value").unwrap();
        // Dropped without close()
    }

    let engine = Engine::open(config(&temp_dir, FlushMode::Inline, 1024, 5)).unwrap();
    assert_eq!(engine.get("key").unwrap(), Some("value".to_string()));
}

#[test]
fn test_missing_manifest_rebuilt_on_open() {
    let temp_dir = TempDir::new().unwrap();

    {
        let engine = Engine::open(config(&temp_dir, FlushMode::Inline, 1024, 10)).unwrap();
        engine.put("a", "1").unwrap();
        engine.flush(0).unwrap();
        engine.put("b", "2").unwrap();
        engine.flush(3).unwrap();
    }
    fs::remove_file(temp_dir.path().join(MANIFEST_FILE)).unwrap();

    let engine = Engine::open(config(&temp_dir, FlushMode::Inline, 1024, 10)).unwrap();
    assert_eq!(engine.tier_table_count(0), 1);
    assert_eq!(engine.tier_table_count(3), 1);
    assert_eq!(engine.get("a").unwrap(), Some("1".to_string()));
    assert_eq!(engine.get("b").unwrap(), Some("2".to_string()));
    assert!(temp_dir.path().join(MANIFEST_FILE).exists());
}

#[test]
fn test_corrupt_manifest_rebuilt_on_open() {
    let temp_dir = TempDir::new().unwrap();

    {
        let engine = Engine::open(config(&temp_dir, FlushMode::Inline, 1024, 10)).unwrap();
        engine.put("a", "1").unwrap();
        engine.flush(1).unwrap();
    }
    fs::write(temp_dir.path().join(MANIFEST_FILE), "#CRC=0\nT4 bogus\n").unwrap();

    let engine = Engine::open(config(&temp_dir, FlushMode::Inline, 1024, 10)).unwrap();
    assert_eq!(engine.tier_table_count(1), 1);
    assert_eq!(engine.get("a").unwrap(), Some("1".to_string()));
}

#[test]
fn test_stale_temp_files_removed_on_open() {
    let temp_dir = TempDir::new().unwrap();
    drop(Engine::open(config(&temp_dir, FlushMode::Inline, 1024, 5)).unwrap());

    let stale = tier_dir(&temp_dir.path().join("tables"), 0).join("sstable_1_000001.sst.tmp");
    fs::write(&stale, b"half written").unwrap();

    let engine = Engine::open(config(&temp_dir, FlushMode::Inline, 1024, 5)).unwrap();
    assert!(!stale.exists());
    assert_eq!(engine.table_count(), 0);
}

#[test]
fn test_startup_compacts_overflowing_tier() {
    let temp_dir = TempDir::new().unwrap();

    {
        let engine = Engine::open(config(&temp_dir, FlushMode::Inline, 1024, 10)).unwrap();
        for i in 0..4 {
            engine.put(&format!("k{}", i), "v").unwrap();
            engine.flush(0).unwrap();
        }
        assert_eq!(engine.tier_table_count(0), 4);
    }

    let engine = Engine::open(config(&temp_dir, FlushMode::Inline, 1024, 2)).unwrap();
    assert!(engine.tier_table_count(0) < 2);
    for i in 0..4 {
        assert_eq!(engine.get(&format!("k{}", i)).unwrap(), Some("v".to_string()));
    }
}

// =============================================================================
// Background Mode Tests
// =============================================================================

#[test]
fn test_background_flush_wait_publishes_tables() {
    let (_temp, engine) = setup_flush_every_put(FlushMode::Background, 10);

    for i in 0..5 {
        engine.put(&format!("k{}", i), "v").unwrap();
    }
    engine.flush_wait().unwrap();

    assert_eq!(engine.pending_flushes(), 0);
    assert_eq!(engine.tier_table_count(0), 5);
    assert_eq!(engine.manifest_entries().len(), 5);
}

#[test]
fn test_background_failure_surfaces_and_data_stays_readable() {
    let (_temp, engine) = setup_temp_engine(FlushMode::Background);
    engine.put("key", "value").unwrap();

    fs::remove_dir_all(tier_dir(engine.tables_dir(), 0)).unwrap();

    assert!(matches!(engine.flush_wait(), Err(TierError::Io(_))));
    assert_eq!(engine.get("key").unwrap(), Some("value".to_string()));
    assert_eq!(engine.pending_flushes(), 1);
}

#[test]
fn test_inline_failure_surfaces_and_data_stays_readable() {
    let (_temp, engine) = setup_temp_engine(FlushMode::Inline);
    engine.put("key", "value").unwrap();

    fs::remove_dir_all(tier_dir(engine.tables_dir(), 0)).unwrap();

    assert!(matches!(engine.flush(0), Err(TierError::Io(_))));
    assert_eq!(engine.get("key").unwrap(), Some("value".to_string()));
}

#[test]
fn test_failed_snapshot_retried_before_newer_writes() {
    for mode in BOTH_MODES {
        let (_temp, engine) = setup_temp_engine(mode);
        let tier0 = tier_dir(engine.tables_dir(), 0);
        engine.put("key", "v1").unwrap();
        engine.put("only_old", "x").unwrap();

        fs::remove_dir_all(&tier0).unwrap();
        assert!(matches!(engine.flush_wait(), Err(TierError::Io(_))));
        assert_eq!(engine.pending_flushes(), 1);

        fs::create_dir_all(&tier0).unwrap();
        engine.put("key", "v2").unwrap();
        engine.flush_wait().unwrap();

        assert_eq!(engine.get("key").unwrap(), Some("v2".to_string()));
        assert_eq!(engine.get("only_old").unwrap(), Some("x".to_string()));
        assert_eq!(engine.pending_flushes(), 0);
        assert_eq!(engine.tier_table_count(0), 2);
        assert_eq!(engine.manifest_entries().len(), 2);
    }
}

#[test]
fn test_flush_retries_pending_with_empty_memtable() {
    for mode in BOTH_MODES {
        let (_temp, engine) = setup_temp_engine(mode);
        let tier0 = tier_dir(engine.tables_dir(), 0);
        engine.put("key", "value").unwrap();

        fs::remove_dir_all(&tier0).unwrap();
        assert!(engine.flush_wait().is_err());

        fs::create_dir_all(&tier0).unwrap();
        engine.flush_wait().unwrap();

        assert_eq!(engine.pending_flushes(), 0);
        assert_eq!(engine.tier_table_count(0), 1);
        assert_eq!(engine.get("key").unwrap(), Some("value".to_string()));
    }
}

#[test]
fn test_close_fails_while_snapshot_unwritten() {
    for mode in BOTH_MODES {
        let (_temp, engine) = setup_temp_engine(mode);
        engine.put("key", "value").unwrap();

        fs::remove_dir_all(tier_dir(engine.tables_dir(), 0)).unwrap();
        // Takes the stored error; close must still notice the lost snapshot
        assert!(engine.flush_wait().is_err());

        assert!(engine.close().is_err());
    }
}

#[test]
fn test_close_writes_snapshot_left_by_failed_flush() {
    for mode in BOTH_MODES {
        let temp_dir = TempDir::new().unwrap();
        let engine = Engine::open(config(&temp_dir, mode, 1024 * 1024, 5)).unwrap();
        let tier0 = tier_dir(engine.tables_dir(), 0);
        engine.put("key", "value").unwrap();

        fs::remove_dir_all(&tier0).unwrap();
        assert!(engine.flush_wait().is_err());
        fs::create_dir_all(&tier0).unwrap();

        engine.close().unwrap();

        let engine = Engine::open(config(&temp_dir, mode, 1024 * 1024, 5)).unwrap();
        assert_eq!(engine.get("key").unwrap(), Some("value".to_string()));
        assert_eq!(engine.table_count(), 1);
    }
}

#[test]
fn test_timer_flushes_periodically() {
    let temp_dir = TempDir::new().unwrap();
    let mut cfg = config(&temp_dir, FlushMode::Background, 1024 * 1024, 10);
    cfg.flush_interval = Duration::from_millis(20);
    let engine = Engine::open(cfg).unwrap();

    engine.put("key", "value").unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while engine.table_count() == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(engine.table_count(), 1);
    assert_eq!(engine.memtable_entry_count(), 0);
    assert_eq!(engine.get("key").unwrap(), Some("value".to_string()));
}

#[test]
fn test_close_reports_clean_shutdown() {
    let (_temp, engine) = setup_flush_every_put(FlushMode::Background, 2);

    for i in 0..10 {
        engine.put(&format!("k{}", i), "v").unwrap();
    }

    engine.close().unwrap();
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_writers_and_readers() {
    for mode in BOTH_MODES {
        let temp_dir = TempDir::new().unwrap();
        let engine = Arc::new(Engine::open(config(&temp_dir, mode, 256, 3)).unwrap());
        let mut handles = vec![];

        for t in 0..4 {
            let engine = Arc::clone(&engine);
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    let key = format!("t{}_k{:03}", t, i);
                    engine.put(&key, &format!("value_{}", i)).unwrap();
                    // A key just written is visible at every stage of its flush
                    assert_eq!(engine.get(&key).unwrap(), Some(format!("value_{}", i)));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
        engine.flush_wait().unwrap();

        for t in 0..4 {
            for i in 0..100 {
                assert_eq!(
                    engine.get(&format!("t{}_k{:03}", t, i)).unwrap(),
                    Some(format!("value_{}", i)),
                    "mode {:?}",
                    mode
                );
            }
        }
        for tier in 0..engine.config().num_tiers {
            assert!(engine.tier_table_count(tier) < 3);
        }
    }
}

//! Tier Index
//!
//! Maps each tier to the ordered set of its live tables.
//!
//! ## Concurrency:
//! - One RwLock covers every tier, so a compaction swaps its inputs for its
//!   output in a single step and readers never see a half-updated tier
//! - `get` callers hold the read guard while they touch disk; files are
//!   only deleted after they have left the index

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};

use crate::error::{Result, TierError};

use super::TableMeta;

/// Tables per tier, each tier ordered oldest → newest
pub struct TierIndex {
    tiers: RwLock<Vec<BTreeSet<Arc<TableMeta>>>>,
}

/// Read-only view held for the duration of a lookup
pub struct TierView<'a> {
    guard: RwLockReadGuard<'a, Vec<BTreeSet<Arc<TableMeta>>>>,
}

impl TierIndex {
    /// Create an index with `num_tiers` empty tiers
    pub fn new(num_tiers: u32) -> Self {
        Self {
            tiers: RwLock::new(vec![BTreeSet::new(); num_tiers as usize]),
        }
    }

    /// Register a new table in its tier
    pub fn insert(&self, meta: Arc<TableMeta>) -> Result<()> {
        let mut tiers = self.tiers.write();
        let num_tiers = tiers.len() as u32;
        let set = tiers
            .get_mut(meta.tier() as usize)
            .ok_or(TierError::InvalidTier {
                tier: meta.tier(),
                num_tiers,
            })?;
        set.insert(meta);
        Ok(())
    }

    /// Atomically drop `removed` (from whichever tier holds them) and add `added`
    pub fn replace(&self, removed: &[Arc<TableMeta>], added: Arc<TableMeta>) -> Result<()> {
        let mut tiers = self.tiers.write();
        let num_tiers = tiers.len() as u32;
        if added.tier() >= num_tiers {
            return Err(TierError::InvalidTier {
                tier: added.tier(),
                num_tiers,
            });
        }

        for meta in removed {
            if let Some(set) = tiers.get_mut(meta.tier() as usize) {
                set.remove(meta);
            }
        }
        tiers[added.tier() as usize].insert(added);
        Ok(())
    }

    /// Oldest `limit` tables of `tier`, oldest first
    pub fn oldest(&self, tier: u32, limit: usize) -> Vec<Arc<TableMeta>> {
        self.tiers
            .read()
            .get(tier as usize)
            .map(|set| set.iter().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    /// Number of tables in `tier`
    pub fn tier_len(&self, tier: u32) -> usize {
        self.tiers
            .read()
            .get(tier as usize)
            .map(BTreeSet::len)
            .unwrap_or(0)
    }

    /// Number of tables across all tiers
    pub fn total_len(&self) -> usize {
        self.tiers.read().iter().map(BTreeSet::len).sum()
    }

    /// Tables of `tier`, oldest first
    pub fn tables(&self, tier: u32) -> Vec<Arc<TableMeta>> {
        self.oldest(tier, usize::MAX)
    }

    /// Lock the index for reading
    pub fn view(&self) -> TierView<'_> {
        TierView {
            guard: self.tiers.read(),
        }
    }
}

impl TierView<'_> {
    /// Tables in lookup order: tier 0 first, newest first within a tier
    pub fn lookup_order(&self) -> impl Iterator<Item = &Arc<TableMeta>> {
        self.guard.iter().flat_map(|set| set.iter().rev())
    }
}

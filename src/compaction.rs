//! Compaction
//!
//! Merges a batch of tables into one table on a target tier.
//!
//! Inputs are read in list order into one ordered map, so on a duplicate key
//! the later table's value wins. Callers pass inputs oldest first. The
//! merged map is written through a temp file and renamed into place before
//! any input is deleted.
//!
//! The engine uses the two phases separately (`merge`, then publish, then
//! `remove_inputs`) so no lookup ever holds a table that is being deleted.
//! `compact` runs both phases back to back.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Result, TierError};
use crate::storage::sstable::{self, write_table};
use crate::storage::{temp_path, TableMeta};

/// Merges tables and retires their files
#[derive(Debug, Clone)]
pub struct Compactor {
    bloom_bits_per_key: usize,
}

impl Compactor {
    pub fn new(bloom_bits_per_key: usize) -> Self {
        Self { bloom_bits_per_key }
    }

    /// Merge `inputs`, write the result at `output`, delete the inputs.
    ///
    /// If the merge succeeds but some input cannot be deleted, the output
    /// stays in place and `TierError::PartialCompaction` names the leftovers.
    pub fn compact(
        &self,
        inputs: &[Arc<TableMeta>],
        output: &Path,
        target_tier: u32,
    ) -> Result<TableMeta> {
        let meta = self.merge(inputs, output, target_tier)?;
        self.remove_inputs(inputs, output)?;
        Ok(meta)
    }

    /// Phase 1: read every input, last one wins, write the merged table
    pub fn merge(
        &self,
        inputs: &[Arc<TableMeta>],
        output: &Path,
        target_tier: u32,
    ) -> Result<TableMeta> {
        if inputs.is_empty() {
            return Err(TierError::EmptyCompaction);
        }

        let mut merged = BTreeMap::new();
        for input in inputs {
            merged.extend(sstable::read_all(input.path())?);
        }

        let tmp = temp_path(output);
        write_table(&merged, &tmp)?;
        fs::rename(&tmp, output)?;

        tracing::debug!(
            inputs = inputs.len(),
            entries = merged.len(),
            output = %output.display(),
            tier = target_tier,
            "Compacted tables"
        );

        TableMeta::new(output, target_tier, &merged, self.bloom_bits_per_key)
    }

    /// Phase 2: delete the input files, reporting every one that failed
    pub fn remove_inputs(&self, inputs: &[Arc<TableMeta>], output: &Path) -> Result<()> {
        let mut failed: Vec<PathBuf> = Vec::new();

        for input in inputs {
            if let Err(e) = sstable::delete_table(input.path()) {
                tracing::warn!(
                    path = %input.path().display(),
                    error = %e,
                    "Failed to delete compacted table"
                );
                failed.push(input.path().to_path_buf());
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(TierError::PartialCompaction {
                output: output.to_path_buf(),
                failed,
            })
        }
    }
}

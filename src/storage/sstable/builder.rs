//! SSTable Builder
//!
//! Writes sorted key-value entries to a new SSTable file.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::{BufMut, BytesMut};

use crate::error::{Result, TierError};

use super::{SSTableInfo, HEADER_SIZE, MAGIC};

/// Builder for creating new SSTables from sorted entries
pub struct SSTableBuilder {
    /// Output file path
    path: PathBuf,
    /// Buffered writer for performance
    writer: BufWriter<File>,
    /// Number of entries written
    entry_count: u64,
    /// Current write position (for index)
    current_offset: u64,
    /// Index: key → file offset of entry, built as entries are written
    index: Vec<(String, u64)>,
    /// Reused encoding buffer
    scratch: BytesMut,
}

impl SSTableBuilder {
    /// Create a new SSTable builder
    ///
    /// Reserves the header immediately; call `add()` in ascending key order,
    /// then `finish()` to write the index and backpatch the header.
    pub fn new(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut writer = BufWriter::new(file);

        // Placeholder header: zero offset, zero magic
        writer.write_all(&[0u8; HEADER_SIZE as usize])?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            entry_count: 0,
            current_offset: HEADER_SIZE,
            index: Vec::new(),
            scratch: BytesMut::new(),
        })
    }

    /// Add a key-value pair (must be called in ascending key order)
    pub fn add(&mut self, key: &str, value: &str) -> Result<()> {
        if let Some((last, _)) = self.index.last() {
            if key <= last.as_str() {
                return Err(TierError::corruption(
                    &self.path,
                    format!("keys out of order: {:?} after {:?}", key, last),
                ));
            }
        }

        self.index.push((key.to_string(), self.current_offset));

        // Record: [key_len(4)][key][val_len(4)][value]
        self.scratch.clear();
        self.scratch.put_u32_le(len_u32(&self.path, key.len())?);
        self.scratch.put_slice(key.as_bytes());
        self.scratch.put_u32_le(len_u32(&self.path, value.len())?);
        self.scratch.put_slice(value.as_bytes());

        self.writer.write_all(&self.scratch)?;

        self.current_offset += self.scratch.len() as u64;
        self.entry_count += 1;

        Ok(())
    }

    /// Finish building: write index block, backpatch the header, fsync
    pub fn finish(mut self) -> Result<SSTableInfo> {
        // Record where index block starts
        let index_offset = self.current_offset;

        // Index block: [count(4)] then [key_len(4)][key][offset(8)] per entry
        self.scratch.clear();
        self.scratch
            .put_u32_le(len_u32(&self.path, self.index.len())?);
        for (key, offset) in &self.index {
            self.scratch.put_u32_le(len_u32(&self.path, key.len())?);
            self.scratch.put_slice(key.as_bytes());
            self.scratch.put_u64_le(*offset);
        }
        self.writer.write_all(&self.scratch)?;
        self.writer.flush()?;

        // Seek back and write the real header
        let mut file = self.writer.into_inner().map_err(|e| e.into_error())?;
        let mut header = BytesMut::with_capacity(HEADER_SIZE as usize);
        header.put_u64_le(index_offset);
        header.put_u32_le(MAGIC);
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header)?;
        file.sync_all()?;

        let file_size = file.metadata()?.len();

        Ok(SSTableInfo {
            path: self.path,
            entry_count: self.entry_count,
            min_key: self.index.first().map(|(k, _)| k.clone()),
            max_key: self.index.last().map(|(k, _)| k.clone()),
            file_size,
        })
    }
}

/// Write an ordered map as a complete table at `path`
pub fn write_table(entries: &BTreeMap<String, String>, path: &Path) -> Result<SSTableInfo> {
    let mut builder = SSTableBuilder::new(path)?;
    for (key, value) in entries {
        builder.add(key, value)?;
    }
    builder.finish()
}

/// Length prefixes are u32 on disk
fn len_u32(path: &Path, len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        TierError::corruption(path, format!("length {} does not fit a u32 prefix", len))
    })
}

//! SSTable Iterator
//!
//! Sequential iteration over all entries in an SSTable's data block.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{Result, TierError};

use super::HEADER_SIZE;

/// Iterator over SSTable entries in sorted key order
pub struct SSTableIterator<'a> {
    file: &'a mut BufReader<File>,
    path: &'a Path,
    /// Stop reading when we reach this offset (start of index block)
    end_offset: u64,
    /// Current position in file
    current_offset: u64,
    /// Set after an error so the iterator fuses
    failed: bool,
}

impl<'a> SSTableIterator<'a> {
    /// Create a new iterator starting from the data block
    pub(super) fn new(
        file: &'a mut BufReader<File>,
        path: &'a Path,
        end_offset: u64,
    ) -> Result<Self> {
        // Seek to start of data (after header)
        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        Ok(Self {
            file,
            path,
            end_offset,
            current_offset: HEADER_SIZE,
            failed: false,
        })
    }

    fn read_entry(&mut self) -> Result<(String, String)> {
        let key_len = read_u32(&mut *self.file)?;
        self.check_room(4 + u64::from(key_len))?;
        let key = read_string(&mut *self.file, self.path, key_len)?;

        let val_len = read_u32(&mut *self.file)?;
        self.check_room(8 + u64::from(key_len) + u64::from(val_len))?;
        let value = read_string(&mut *self.file, self.path, val_len)?;

        self.current_offset += 8 + u64::from(key_len) + u64::from(val_len);
        Ok((key, value))
    }

    /// Entry of `len` bytes starting at the current offset must end inside the data block
    fn check_room(&self, len: u64) -> Result<()> {
        if self.current_offset + len > self.end_offset {
            return Err(TierError::corruption(
                self.path,
                format!("entry at {} runs past the data block", self.current_offset),
            ));
        }
        Ok(())
    }
}

impl<'a> Iterator for SSTableIterator<'a> {
    type Item = Result<(String, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        // Stop at index block
        if self.failed || self.current_offset >= self.end_offset {
            return None;
        }

        let entry = self.read_entry();
        if entry.is_err() {
            self.failed = true;
        }
        Some(entry)
    }
}

// =============================================================================
// Record decoding helpers (shared with the reader)
// =============================================================================

pub(super) fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

pub(super) fn read_string<R: Read>(reader: &mut R, path: &Path, len: u32) -> Result<String> {
    let mut bytes = vec![0u8; len as usize];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|_| TierError::corruption(path, "entry is not valid UTF-8"))
}

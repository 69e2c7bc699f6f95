//! SSTable Reader
//!
//! Opens SSTable files, validates the header, and serves point lookups by
//! binary search over the index block.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use bytes::Buf;

use crate::error::{Result, TierError};

use super::iterator::{read_string, read_u32, SSTableIterator};
use super::{HEADER_SIZE, INDEX_COUNT_SIZE, MAGIC};

/// Parsed index block of one table: key → data offset, ascending
///
/// Held by [`TableMeta`](crate::storage::TableMeta) so a point lookup costs
/// one seek instead of a full index decode.
#[derive(Debug, Clone)]
pub struct TableIndex {
    entries: Vec<(String, u64)>,
    /// Index block starting offset (end of the data block)
    index_offset: u64,
}

impl TableIndex {
    /// Validate the header of `path` and decode its index block
    pub fn load(path: &Path) -> Result<Self> {
        let (_, index) = open_table(path)?;
        Ok(index)
    }

    /// Data offset of `key`, if indexed
    pub fn offset_of(&self, key: &str) -> Option<u64> {
        self.entries
            .binary_search_by(|(candidate, _)| candidate.as_str().cmp(key))
            .ok()
            .map(|pos| self.entries[pos].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// End of the data block
    pub fn data_end(&self) -> u64 {
        self.index_offset
    }
}

/// Reader for SSTable files with an in-memory copy of the index block
pub struct SSTableReader {
    path: PathBuf,
    /// File handle for reading entries
    file: BufReader<File>,
    index: TableIndex,
}

impl SSTableReader {
    /// Open an SSTable for reading
    ///
    /// Rejects the file if the magic does not match or the index block does
    /// not fit inside the file.
    pub fn open(path: &Path) -> Result<Self> {
        let (file, index) = open_table(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: BufReader::new(file),
            index,
        })
    }

    /// Get a value by key: binary search over the index, then one seek
    ///
    /// Returns `Ok(None)` if the key is not indexed in this table.
    pub fn get(&mut self, key: &str) -> Result<Option<String>> {
        match self.index.offset_of(key) {
            Some(offset) => {
                read_value_at(&mut self.file, &self.path, offset, self.index.data_end()).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Get entry count
    pub fn entry_count(&self) -> usize {
        self.index.len()
    }

    /// Get the minimum key in this SSTable
    pub fn min_key(&self) -> Option<&str> {
        self.index.entries.first().map(|(k, _)| k.as_str())
    }

    /// Get the maximum key in this SSTable
    pub fn max_key(&self) -> Option<&str> {
        self.index.entries.last().map(|(k, _)| k.as_str())
    }

    /// Create an iterator over the data block
    pub fn iter(&mut self) -> Result<SSTableIterator<'_>> {
        SSTableIterator::new(&mut self.file, &self.path, self.index.data_end())
    }

    /// Decode the entire data block into an ordered map
    pub fn read_all(&mut self) -> Result<BTreeMap<String, String>> {
        let expected = self.index.len();
        let entries = self.iter()?.collect::<Result<BTreeMap<_, _>>>()?;

        if entries.len() != expected {
            return Err(TierError::corruption(
                &self.path,
                format!(
                    "data block holds {} entries but index lists {}",
                    entries.len(),
                    expected
                ),
            ));
        }
        Ok(entries)
    }
}

/// Open `path`, check its header, and decode the index block
fn open_table(path: &Path) -> Result<(File, TableIndex)> {
    let mut file = File::open(path)?;
    let file_size = file.metadata()?.len();

    if file_size < HEADER_SIZE + INDEX_COUNT_SIZE {
        return Err(TierError::corruption(
            path,
            format!("file is {} bytes, too short for a table", file_size),
        ));
    }

    // Read and validate header
    let mut header = [0u8; HEADER_SIZE as usize];
    file.read_exact(&mut header)?;
    let mut buf = &header[..];
    let index_offset = buf.get_u64_le();
    let magic = buf.get_u32_le();

    if magic != MAGIC {
        return Err(TierError::corruption(
            path,
            format!("invalid magic: expected {:#010x}, got {:#010x}", MAGIC, magic),
        ));
    }

    let index_fits = index_offset
        .checked_add(INDEX_COUNT_SIZE)
        .map_or(false, |end| end <= file_size);
    if index_offset < HEADER_SIZE || !index_fits {
        return Err(TierError::corruption(
            path,
            format!("index offset {} outside file of {} bytes", index_offset, file_size),
        ));
    }

    // Load the whole index block into memory
    file.seek(SeekFrom::Start(index_offset))?;
    let mut index_data = vec![0u8; (file_size - index_offset) as usize];
    file.read_exact(&mut index_data)?;

    let entries = parse_index(path, &index_data, index_offset)?;

    Ok((
        file,
        TableIndex {
            entries,
            index_offset,
        },
    ))
}

/// Read the value of the entry at `offset`, which must end by `data_end`
fn read_value_at<R: Read + Seek>(
    file: &mut R,
    path: &Path,
    offset: u64,
    data_end: u64,
) -> Result<String> {
    file.seek(SeekFrom::Start(offset))?;

    // Skip the key (the index already matched it)
    let key_len = read_u32(file)?;
    file.seek(SeekFrom::Current(i64::from(key_len)))?;

    let val_len = read_u32(file)?;
    let end = offset + 8 + u64::from(key_len) + u64::from(val_len);
    if end > data_end {
        return Err(TierError::corruption(
            path,
            format!("entry at {} runs past the data block", offset),
        ));
    }

    read_string(file, path, val_len)
}

/// Parse `[count][key_len][key][offset]...` and check each offset lands in
/// the data block.
fn parse_index(path: &Path, data: &[u8], index_offset: u64) -> Result<Vec<(String, u64)>> {
    let truncated = || TierError::corruption(path, "index block truncated");

    let mut buf = data;
    if buf.remaining() < 4 {
        return Err(truncated());
    }
    let count = buf.get_u32_le() as usize;

    // Each entry needs at least 12 bytes, which caps a sane count
    if count > buf.remaining() / 12 {
        return Err(TierError::corruption(
            path,
            format!("index claims {} entries in {} bytes", count, buf.remaining()),
        ));
    }

    let mut index = Vec::with_capacity(count);
    for _ in 0..count {
        if buf.remaining() < 4 {
            return Err(truncated());
        }
        let key_len = buf.get_u32_le() as usize;
        if buf.remaining() < key_len + 8 {
            return Err(truncated());
        }
        let key = String::from_utf8(buf[..key_len].to_vec())
            .map_err(|_| TierError::corruption(path, "index key is not valid UTF-8"))?;
        buf.advance(key_len);
        let offset = buf.get_u64_le();

        if offset < HEADER_SIZE || offset >= index_offset {
            return Err(TierError::corruption(
                path,
                format!("index entry for {:?} points outside the data block", key),
            ));
        }
        if let Some((prev, _)) = index.last() {
            if &key <= prev {
                return Err(TierError::corruption(path, "index keys are not ascending"));
            }
        }

        index.push((key, offset));
    }

    Ok(index)
}

// =============================================================================
// Path-based helpers
// =============================================================================

/// Open `path` and look up one key
pub fn get_by_key(path: &Path, key: &str) -> Result<Option<String>> {
    SSTableReader::open(path)?.get(key)
}

/// Look up one key in `path` through an already parsed index
pub fn get_with_index(path: &Path, index: &TableIndex, key: &str) -> Result<Option<String>> {
    let offset = match index.offset_of(key) {
        Some(offset) => offset,
        None => return Ok(None),
    };
    let mut file = BufReader::new(File::open(path)?);
    read_value_at(&mut file, path, offset, index.data_end()).map(Some)
}

/// Open `path` and decode every entry
pub fn read_all(path: &Path) -> Result<BTreeMap<String, String>> {
    SSTableReader::open(path)?.read_all()
}

/// Remove a table file; any failure is returned to the caller
pub fn delete_table(path: &Path) -> Result<()> {
    fs::remove_file(path)?;
    Ok(())
}

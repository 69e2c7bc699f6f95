//! MemTable implementation
//!
//! BTreeMap-based memtable with RwLock for concurrency.

use std::collections::BTreeMap;

use parking_lot::RwLock;

/// Map contents plus their byte accounting, always mutated together
#[derive(Default)]
struct Inner {
    entries: BTreeMap<String, String>,
    /// Sum of key + value UTF-8 lengths of live entries
    size: usize,
}

/// In-memory table for recent writes
///
/// ## Concurrency:
/// - Every operation takes the lock once, so the map and its size counter
///   never disagree
/// - Readers share the lock; put/delete/take are exclusive
pub struct MemTable {
    inner: RwLock<Inner>,
    /// Byte budget; `is_full()` once size reaches it
    capacity: usize,
}

impl MemTable {
    /// Create a new empty MemTable with the given byte budget
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            capacity,
        }
    }

    /// Insert or overwrite a key.
    ///
    /// Returns true if the table is at or over its budget after the write,
    /// which is the caller's signal to flush.
    pub fn put(&self, key: String, value: String) -> bool {
        let mut inner = self.inner.write();

        let added = value.len();
        let key_len = key.len();
        match inner.entries.insert(key, value) {
            // Key bytes are already accounted for; only the value changes
            Some(old) => inner.size = inner.size - old.len() + added,
            None => inner.size += key_len + added,
        }

        inner.size >= self.capacity
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.read().entries.get(key).cloned()
    }

    /// Remove a key from the buffer. No tombstone is kept.
    pub fn delete(&self, key: &str) {
        let mut inner = self.inner.write();
        if let Some(old) = inner.entries.remove(key) {
            inner.size -= key.len() + old.len();
        }
    }

    /// Ordered copy of the current contents
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.inner.read().entries.clone()
    }

    /// Empty the buffer and reset the size counter
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.size = 0;
    }

    /// Snapshot and clear in one critical section.
    ///
    /// Writes that race with a flush land either in the returned map or in
    /// the emptied table, never in neither.
    pub fn take(&self) -> BTreeMap<String, String> {
        let mut inner = self.inner.write();
        inner.size = 0;
        std::mem::take(&mut inner.entries)
    }

    /// Current size in bytes
    pub fn size(&self) -> usize {
        self.inner.read().size
    }

    /// Get entry count
    pub fn entry_count(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// True iff size has reached the byte budget
    pub fn is_full(&self) -> bool {
        self.size() >= self.capacity
    }

    /// Configured byte budget
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

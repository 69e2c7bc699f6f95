//! Bloom Filter
//!
//! Probabilistic membership test attached to every on-disk table.
//!
//! - If any probed bit is 0 → key is DEFINITELY NOT in the table
//! - If all probed bits are 1 → key is PROBABLY in the table
//!
//! Each filter owns a fixed-size bit array and a fixed, ordered list of hash
//! functions. `add` sets bit `hash(key) mod num_bits` for every function.
//! Filters are built once from a table's full key set and never updated.

use xxhash_rust::xxh3::{xxh3_64, xxh3_64_with_seed};
use xxhash_rust::xxh64::xxh64;

/// A hash function usable by the filter
pub type HashFn = fn(&[u8]) -> u64;

/// Smallest bit array the engine will allocate
pub const MIN_BITS: usize = 64;

/// Seed for the second xxh3 probe
const XXH3_SEED: u64 = 0x9E37_79B9_7F4A_7C15;

fn xxh3_plain(key: &[u8]) -> u64 {
    xxh3_64(key)
}

fn xxh3_seeded(key: &[u8]) -> u64 {
    xxh3_64_with_seed(key, XXH3_SEED)
}

fn xxh64_plain(key: &[u8]) -> u64 {
    xxh64(key, 0)
}

/// Hash family used for table filters
pub const DEFAULT_HASHERS: [HashFn; 3] = [xxh3_plain, xxh3_seeded, xxh64_plain];

/// Fixed-size bloom filter over string keys
#[derive(Clone)]
pub struct BloomFilter {
    /// Bit array packed into u64 words
    bits: Vec<u64>,
    num_bits: usize,
    hashers: Vec<HashFn>,
}

impl BloomFilter {
    /// Create an empty filter with `num_bits` bits and the given hash functions.
    ///
    /// # Panics
    /// Panics if `num_bits` is 0 or fewer than two hash functions are given.
    pub fn new(num_bits: usize, hashers: &[HashFn]) -> Self {
        assert!(num_bits > 0, "num_bits must be > 0");
        assert!(hashers.len() >= 2, "a bloom filter needs at least two hash functions");

        let num_words = num_bits.div_ceil(64);
        Self {
            bits: vec![0u64; num_words],
            num_bits,
            hashers: hashers.to_vec(),
        }
    }

    /// Size a filter for `keys` at `bits_per_key` and add every key
    pub fn from_keys<'a, I>(keys: I, bits_per_key: usize) -> Self
    where
        I: IntoIterator<Item = &'a str>,
        I::IntoIter: ExactSizeIterator,
    {
        let keys = keys.into_iter();
        let num_bits = keys
            .len()
            .saturating_mul(bits_per_key.max(1))
            .max(MIN_BITS);

        let mut filter = Self::new(num_bits, &DEFAULT_HASHERS);
        for key in keys {
            filter.add(key);
        }
        filter
    }

    /// Add a key to the filter
    pub fn add(&mut self, key: &str) {
        for i in 0..self.hashers.len() {
            let pos = self.position(i, key);
            self.bits[pos / 64] |= 1 << (pos % 64);
        }
    }

    /// Check if a key MIGHT be in the set.
    /// false → definitely not here. true → possibly here.
    pub fn might_contain(&self, key: &str) -> bool {
        (0..self.hashers.len()).all(|i| {
            let pos = self.position(i, key);
            (self.bits[pos / 64] >> (pos % 64)) & 1 == 1
        })
    }

    /// Total number of bits in the filter
    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    /// Number of hash functions probed per key
    pub fn num_hashes(&self) -> usize {
        self.hashers.len()
    }

    fn position(&self, hasher: usize, key: &str) -> usize {
        ((self.hashers[hasher])(key.as_bytes()) % self.num_bits as u64) as usize
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("num_bits", &self.num_bits)
            .field("num_hashes", &self.hashers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basics() {
        let mut bf = BloomFilter::new(1024, &DEFAULT_HASHERS);
        bf.add("hello");
        assert!(bf.might_contain("hello"));
        assert!(!bf.might_contain("world"));
    }

    #[test]
    fn test_bits_round_up_to_whole_words() {
        let bf = BloomFilter::new(65, &DEFAULT_HASHERS);
        assert_eq!(bf.bits.len(), 2);
        assert_eq!(bf.num_bits(), 65);
    }

    #[test]
    fn test_from_keys_enforces_minimum_size() {
        let bf = BloomFilter::from_keys(["a"], 10);
        assert_eq!(bf.num_bits(), MIN_BITS);
        assert!(bf.might_contain("a"));
    }

    #[test]
    #[should_panic(expected = "at least two hash functions")]
    fn test_single_hash_rejected() {
        let _ = BloomFilter::new(64, &DEFAULT_HASHERS[..1]);
    }
}

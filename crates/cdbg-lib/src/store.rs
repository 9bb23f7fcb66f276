//! k-mer membership stores.
//!
//! The compactor treats the store as a membership oracle: insert a hash,
//! learn whether it was new, test presence later. It never iterates the
//! store. Both backends here are exact; probabilistic backends would report
//! a nonzero `estimated_fp`.

use ahash::RandomState;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

use crate::hasher::Hash;

/// Set-or-counter of k-mer hashes.
///
/// Methods take `&self`: the store must behave as a thread-safe oracle so
/// segmentation can run without holding the cDBG node lock.
pub trait KmerStore: Send + Sync {
    /// Insert `h`; return `true` iff it was not previously present.
    fn insert_and_test(&self, h: Hash) -> bool;

    /// Whether `h` has been inserted.
    fn contains(&self, h: Hash) -> bool;

    /// Observed multiplicity of `h`. Set-only backends saturate at 1.
    fn count(&self, h: Hash) -> u32;

    /// Number of distinct hashes inserted.
    fn n_unique(&self) -> u64;

    /// Expected false-positive rate; zero for exact backends.
    fn estimated_fp(&self) -> f64 {
        0.0
    }
}

/// Exact hash-set store.
pub struct SparseSetStore {
    set: Mutex<HashSet<Hash, RandomState>>,
}

impl SparseSetStore {
    /// Create an empty store.
    pub fn new() -> Self {
        SparseSetStore {
            set: Mutex::new(HashSet::default()),
        }
    }
}

impl Default for SparseSetStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KmerStore for SparseSetStore {
    fn insert_and_test(&self, h: Hash) -> bool {
        self.set.lock().insert(h)
    }

    fn contains(&self, h: Hash) -> bool {
        self.set.lock().contains(&h)
    }

    fn count(&self, h: Hash) -> u32 {
        self.contains(h) as u32
    }

    fn n_unique(&self) -> u64 {
        self.set.lock().len() as u64
    }
}

/// Exact counting store: multiplicity per hash.
pub struct CountingStore {
    counts: Mutex<HashMap<Hash, u32, RandomState>>,
}

impl CountingStore {
    /// Create an empty store.
    pub fn new() -> Self {
        CountingStore {
            counts: Mutex::new(HashMap::default()),
        }
    }
}

impl Default for CountingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KmerStore for CountingStore {
    fn insert_and_test(&self, h: Hash) -> bool {
        let mut counts = self.counts.lock();
        let slot = counts.entry(h).or_insert(0);
        *slot = slot.saturating_add(1);
        *slot == 1
    }

    fn contains(&self, h: Hash) -> bool {
        self.counts.lock().contains_key(&h)
    }

    fn count(&self, h: Hash) -> u32 {
        self.counts.lock().get(&h).copied().unwrap_or(0)
    }

    fn n_unique(&self) -> u64 {
        self.counts.lock().len() as u64
    }
}

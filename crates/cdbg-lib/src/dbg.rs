//! The underlying de Bruijn graph: a k-mer store addressed through a
//! rolling hasher.
//!
//! The graph is implicit; only k-mer membership is recorded. Sequences are
//! validated before any insertion so a bad read never leaves a partial
//! trace in the store.

use crate::encoding;
use crate::error::{CdbgError, Result};
use crate::hasher::{Hash, KmerHasher};
use crate::store::KmerStore;

/// A de Bruijn graph of order K over a membership store.
pub struct Dbg<S, H> {
    k: usize,
    store: S,
    hasher: H,
}

impl<S: KmerStore, H: KmerHasher> Dbg<S, H> {
    /// Create a graph of order `k` with the given store; `seed` fixes the
    /// hash function.
    pub fn new(k: usize, seed: u64, store: S) -> Self {
        Dbg {
            k,
            store,
            hasher: H::new(k, seed),
        }
    }

    /// The k-mer length.
    pub fn k(&self) -> usize {
        self.k
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// A fresh unseeded hasher configured like this graph's.
    pub fn make_hasher(&self) -> H {
        self.hasher.clone()
    }

    /// Hash the first K symbols of `kmer`.
    pub fn hash_kmer(&self, kmer: &[u8]) -> Result<Hash> {
        self.hasher.hash_kmer(kmer)
    }

    /// Hashes of every k-mer of `seq`, in order. Validates first; a bad
    /// read produces no side effects.
    pub fn hashes(&self, seq: &[u8]) -> Result<Vec<Hash>> {
        self.check_sequence(seq)?;
        let mut hasher = self.make_hasher();
        let mut out = Vec::with_capacity(seq.len() - self.k + 1);
        out.push(hasher.seed(seq)?);
        for &sym in &seq[self.k..] {
            out.push(hasher.shift_right(sym)?);
        }
        Ok(out)
    }

    /// Insert every k-mer of `seq`, reporting each hash and whether it was
    /// new to the store.
    pub fn add_sequence(&self, seq: &[u8]) -> Result<(Vec<Hash>, Vec<bool>)> {
        let hashes = self.hashes(seq)?;
        let novel = hashes
            .iter()
            .map(|&h| self.store.insert_and_test(h))
            .collect();
        Ok((hashes, novel))
    }

    /// Insert every k-mer of `seq`; return how many were new.
    pub fn insert_sequence(&self, seq: &[u8]) -> Result<u64> {
        let (_, novel) = self.add_sequence(seq)?;
        Ok(novel.iter().filter(|&&n| n).count() as u64)
    }

    /// Whether `h` is present.
    pub fn contains(&self, h: Hash) -> bool {
        self.store.contains(h)
    }

    /// Number of distinct k-mers inserted.
    pub fn n_unique(&self) -> u64 {
        self.store.n_unique()
    }

    /// False-positive estimate of the backing store.
    pub fn estimated_fp(&self) -> f64 {
        self.store.estimated_fp()
    }

    fn check_sequence(&self, seq: &[u8]) -> Result<()> {
        if seq.len() < self.k {
            return Err(CdbgError::LengthError {
                k: self.k,
                actual: seq.len(),
            });
        }
        encoding::validate(seq)
    }
}

//! Rolling k-mer hashing.
//!
//! A hasher owns a K-symbol window packed two bits per base (base `i` at
//! bits `2i`) and rolls it by one symbol in either direction in O(1). The
//! window is finalized to a [`Hash`] with a seeded `ahash` state, so hash
//! values are deterministic per seed and independent of platform.
//!
//! Two variants: [`FwdKmerHasher`] hashes the forward window only;
//! [`CanKmerHasher`] maintains the reverse-complement window alongside and
//! hashes `min(forward, reverse complement)`, making hash values invariant
//! under reverse complement of the input.

use ahash::RandomState;
use std::collections::VecDeque;
use std::hash::{BuildHasher, Hasher};

use crate::constants::is_valid_k;
use crate::encoding::{complement_bits, encode_base};
use crate::error::{CdbgError, Result};

/// Opaque k-mer identifier. Two k-mers are equal iff their hashes are equal.
pub type Hash = u64;

/// Side of a k-mer or unitig.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Towards the prefix / 5' side.
    Left,
    /// Towards the suffix / 3' side.
    Right,
}

/// A candidate neighbor produced by window enumeration: the hash the window
/// would take after shifting in `symbol`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Shift {
    /// Hash of the shifted window
    pub hash: Hash,
    /// Symbol shifted in
    pub symbol: u8,
}

/// Alphabet symbols paired with their 2-bit encodings.
const SYMBOLS: [(u8, u8); 4] = [(b'A', 0b00), (b'C', 0b01), (b'G', 0b11), (b'T', 0b10)];

/// Rolling hasher over a K-symbol window.
///
/// `seed` must be called before any rolling or enumeration; using an
/// unseeded hasher is a programmer error reported as
/// [`CdbgError::Uninitialized`].
pub trait KmerHasher: Clone {
    /// Construct an unseeded hasher for k-mers of length `k`.
    fn new(k: usize, seed: u64) -> Self;

    /// The k-mer length.
    fn k(&self) -> usize;

    /// Whether `seed` has been called.
    fn is_initialized(&self) -> bool;

    /// Load the window from the first K symbols of `seq`.
    ///
    /// # Errors
    /// `LengthError` if `seq` is shorter than K, `BadAlphabet` on a
    /// non-ACGT symbol.
    fn seed(&mut self, seq: &[u8]) -> Result<Hash>;

    /// Hash of the current window.
    fn get(&self) -> Result<Hash>;

    /// Roll one symbol to the right: drop the leftmost symbol, append `sym`.
    fn shift_right(&mut self, sym: u8) -> Result<Hash>;

    /// Roll one symbol to the left: drop the rightmost symbol, prepend `sym`.
    fn shift_left(&mut self, sym: u8) -> Result<Hash>;

    /// Candidate hashes for prepending each alphabet symbol. Pure; the
    /// window is not mutated.
    fn enumerate_left(&self) -> Result<[Shift; 4]>;

    /// Candidate hashes for appending each alphabet symbol.
    fn enumerate_right(&self) -> Result<[Shift; 4]>;

    /// Hash the first K symbols of `kmer` without touching the window.
    fn hash_kmer(&self, kmer: &[u8]) -> Result<Hash>;

    /// The symbols currently in the window, left to right.
    fn cursor(&self) -> Vec<u8>;

    /// First symbol of the window.
    fn front(&self) -> Option<u8>;

    /// Last symbol of the window.
    fn back(&self) -> Option<u8>;
}

/// Packed forward and reverse-complement windows plus the symbol ring.
#[derive(Clone)]
struct Window {
    k: usize,
    mask: u128,
    fw: u128,
    rc: u128,
    symbols: VecDeque<u8>,
    initialized: bool,
}

impl Window {
    fn new(k: usize) -> Self {
        assert!(is_valid_k(k), "unsupported k-mer length {}", k);
        Window {
            k,
            mask: (1u128 << (2 * k)) - 1,
            fw: 0,
            rc: 0,
            symbols: VecDeque::with_capacity(k),
            initialized: false,
        }
    }

    fn seed(&mut self, seq: &[u8]) -> Result<()> {
        if seq.len() < self.k {
            return Err(CdbgError::LengthError {
                k: self.k,
                actual: seq.len(),
            });
        }
        let mut fw = 0u128;
        let mut rc = 0u128;
        for (pos, &base) in seq[..self.k].iter().enumerate() {
            let bits = encode_base(base).ok_or(CdbgError::BadAlphabet { base, pos })?;
            fw |= (bits as u128) << (2 * pos);
            rc |= (complement_bits(bits) as u128) << (2 * (self.k - 1 - pos));
        }
        self.fw = fw;
        self.rc = rc;
        self.symbols.clear();
        self.symbols
            .extend(seq[..self.k].iter().map(|b| b.to_ascii_uppercase()));
        self.initialized = true;
        Ok(())
    }

    fn check_init(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(CdbgError::Uninitialized)
        }
    }

    fn encode_checked(&self, sym: u8) -> Result<u8> {
        encode_base(sym).ok_or(CdbgError::BadAlphabet { base: sym, pos: 0 })
    }

    fn shifted_right(&self, bits: u8) -> (u128, u128) {
        let fw = (self.fw >> 2) | ((bits as u128) << (2 * (self.k - 1)));
        let rc = ((self.rc << 2) & self.mask) | complement_bits(bits) as u128;
        (fw, rc)
    }

    fn shifted_left(&self, bits: u8) -> (u128, u128) {
        let fw = ((self.fw << 2) & self.mask) | bits as u128;
        let rc = (self.rc >> 2) | ((complement_bits(bits) as u128) << (2 * (self.k - 1)));
        (fw, rc)
    }

    fn shift_right(&mut self, sym: u8) -> Result<()> {
        self.check_init()?;
        let bits = self.encode_checked(sym)?;
        let (fw, rc) = self.shifted_right(bits);
        self.fw = fw;
        self.rc = rc;
        self.symbols.pop_front();
        self.symbols.push_back(sym.to_ascii_uppercase());
        Ok(())
    }

    fn shift_left(&mut self, sym: u8) -> Result<()> {
        self.check_init()?;
        let bits = self.encode_checked(sym)?;
        let (fw, rc) = self.shifted_left(bits);
        self.fw = fw;
        self.rc = rc;
        self.symbols.pop_back();
        self.symbols.push_front(sym.to_ascii_uppercase());
        Ok(())
    }

    fn pack(&self, kmer: &[u8]) -> Result<(u128, u128)> {
        if kmer.len() < self.k {
            return Err(CdbgError::LengthError {
                k: self.k,
                actual: kmer.len(),
            });
        }
        let mut fw = 0u128;
        let mut rc = 0u128;
        for (pos, &base) in kmer[..self.k].iter().enumerate() {
            let bits = encode_base(base).ok_or(CdbgError::BadAlphabet { base, pos })?;
            fw |= (bits as u128) << (2 * pos);
            rc |= (complement_bits(bits) as u128) << (2 * (self.k - 1 - pos));
        }
        Ok((fw, rc))
    }
}

/// Deterministic finalizer over packed windows (seeded `ahash`).
#[derive(Clone)]
struct Finalizer {
    state: RandomState,
}

impl Finalizer {
    fn new(seed: u64) -> Self {
        Finalizer {
            state: RandomState::with_seeds(seed, !seed, seed, !seed),
        }
    }

    #[inline]
    fn finish(&self, bits: u128) -> Hash {
        let mut hasher = self.state.build_hasher();
        hasher.write_u128(bits);
        hasher.finish()
    }
}

macro_rules! impl_kmer_hasher {
    ($name:ident, |$fw:ident, $rc:ident| $select:expr) => {
        impl KmerHasher for $name {
            fn new(k: usize, seed: u64) -> Self {
                $name {
                    window: Window::new(k),
                    finalizer: Finalizer::new(seed),
                }
            }

            fn k(&self) -> usize {
                self.window.k
            }

            fn is_initialized(&self) -> bool {
                self.window.initialized
            }

            fn seed(&mut self, seq: &[u8]) -> Result<Hash> {
                self.window.seed(seq)?;
                self.get()
            }

            fn get(&self) -> Result<Hash> {
                self.window.check_init()?;
                let ($fw, $rc) = (self.window.fw, self.window.rc);
                Ok(self.finalizer.finish($select))
            }

            fn shift_right(&mut self, sym: u8) -> Result<Hash> {
                self.window.shift_right(sym)?;
                self.get()
            }

            fn shift_left(&mut self, sym: u8) -> Result<Hash> {
                self.window.shift_left(sym)?;
                self.get()
            }

            fn enumerate_left(&self) -> Result<[Shift; 4]> {
                self.window.check_init()?;
                let mut out = [Shift { hash: 0, symbol: 0 }; 4];
                for (slot, &(symbol, bits)) in out.iter_mut().zip(SYMBOLS.iter()) {
                    let ($fw, $rc) = self.window.shifted_left(bits);
                    *slot = Shift {
                        hash: self.finalizer.finish($select),
                        symbol,
                    };
                }
                Ok(out)
            }

            fn enumerate_right(&self) -> Result<[Shift; 4]> {
                self.window.check_init()?;
                let mut out = [Shift { hash: 0, symbol: 0 }; 4];
                for (slot, &(symbol, bits)) in out.iter_mut().zip(SYMBOLS.iter()) {
                    let ($fw, $rc) = self.window.shifted_right(bits);
                    *slot = Shift {
                        hash: self.finalizer.finish($select),
                        symbol,
                    };
                }
                Ok(out)
            }

            fn hash_kmer(&self, kmer: &[u8]) -> Result<Hash> {
                let ($fw, $rc) = self.window.pack(kmer)?;
                Ok(self.finalizer.finish($select))
            }

            fn cursor(&self) -> Vec<u8> {
                self.window.symbols.iter().copied().collect()
            }

            fn front(&self) -> Option<u8> {
                self.window.symbols.front().copied()
            }

            fn back(&self) -> Option<u8> {
                self.window.symbols.back().copied()
            }
        }
    };
}

/// Forward-strand rolling hasher.
#[derive(Clone)]
pub struct FwdKmerHasher {
    window: Window,
    finalizer: Finalizer,
}

impl_kmer_hasher!(FwdKmerHasher, |fw, _rc| fw);

/// Canonical rolling hasher: hashes the smaller of the forward and
/// reverse-complement windows.
#[derive(Clone)]
pub struct CanKmerHasher {
    window: Window,
    finalizer: Finalizer,
}

impl_kmer_hasher!(CanKmerHasher, |fw, rc| fw.min(rc));

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::reverse_complement;

    #[test]
    fn test_uninitialized_is_an_error() {
        let hasher = FwdKmerHasher::new(5, 1);
        assert_eq!(hasher.get(), Err(CdbgError::Uninitialized));
        assert!(hasher.enumerate_left().is_err());

        let mut hasher = FwdKmerHasher::new(5, 1);
        assert_eq!(hasher.shift_right(b'A'), Err(CdbgError::Uninitialized));
    }

    #[test]
    fn test_seed_errors() {
        let mut hasher = FwdKmerHasher::new(5, 1);
        assert_eq!(
            hasher.seed(b"ACG"),
            Err(CdbgError::LengthError { k: 5, actual: 3 })
        );
        assert_eq!(
            hasher.seed(b"ACGNA"),
            Err(CdbgError::BadAlphabet { base: b'N', pos: 3 })
        );
    }

    #[test]
    fn test_shift_right_matches_reseed() {
        let seq = b"ACGTGGTACCA";
        let mut rolling = FwdKmerHasher::new(5, 1);
        rolling.seed(seq).unwrap();

        let mut fresh = FwdKmerHasher::new(5, 1);
        for start in 1..=seq.len() - 5 {
            let rolled = rolling.shift_right(seq[start + 4]).unwrap();
            let seeded = fresh.seed(&seq[start..]).unwrap();
            assert_eq!(rolled, seeded, "window starting at {}", start);
        }
    }

    #[test]
    fn test_shift_left_undoes_shift_right() {
        let seq = b"ACGTGGTAC";
        let mut hasher = FwdKmerHasher::new(5, 1);
        let h0 = hasher.seed(seq).unwrap();
        hasher.shift_right(seq[5]).unwrap();
        let back = hasher.shift_left(seq[0]).unwrap();
        assert_eq!(h0, back);
        assert_eq!(hasher.cursor(), b"ACGTG".to_vec());
    }

    #[test]
    fn test_enumerate_right_matches_shift() {
        let mut hasher = FwdKmerHasher::new(5, 1);
        hasher.seed(b"ACGTG").unwrap();
        let candidates = hasher.enumerate_right().unwrap();
        for shift in candidates {
            let mut probe = hasher.clone();
            assert_eq!(probe.shift_right(shift.symbol).unwrap(), shift.hash);
        }
        // enumeration must not move the window
        assert_eq!(hasher.cursor(), b"ACGTG".to_vec());
    }

    #[test]
    fn test_enumerate_left_matches_shift() {
        let mut hasher = CanKmerHasher::new(5, 1);
        hasher.seed(b"ACGTG").unwrap();
        for shift in hasher.enumerate_left().unwrap() {
            let mut probe = hasher.clone();
            assert_eq!(probe.shift_left(shift.symbol).unwrap(), shift.hash);
        }
    }

    #[test]
    fn test_hash_kmer_matches_seed() {
        let mut hasher = FwdKmerHasher::new(7, 42);
        let seeded = hasher.seed(b"GATTACA").unwrap();
        assert_eq!(hasher.hash_kmer(b"GATTACA").unwrap(), seeded);
    }

    #[test]
    fn test_canonical_is_strand_agnostic() {
        let hasher = CanKmerHasher::new(7, 1);
        let kmer = b"GATTACA";
        let rc = reverse_complement(kmer);
        assert_eq!(
            hasher.hash_kmer(kmer).unwrap(),
            hasher.hash_kmer(&rc).unwrap()
        );

        // rolling over a sequence and its reverse complement visits the
        // same hash set
        let seq = b"ACGTGGTACCATTTG";
        let rc_seq = reverse_complement(seq);
        let mut fwd_hashes = hashes_of(seq, 7);
        let mut rc_hashes = hashes_of(&rc_seq, 7);
        fwd_hashes.sort_unstable();
        rc_hashes.sort_unstable();
        assert_eq!(fwd_hashes, rc_hashes);
    }

    #[test]
    fn test_forward_is_strand_sensitive() {
        let hasher = FwdKmerHasher::new(7, 1);
        let kmer = b"GATTACA";
        let rc = reverse_complement(kmer);
        assert_ne!(
            hasher.hash_kmer(kmer).unwrap(),
            hasher.hash_kmer(&rc).unwrap()
        );
    }

    #[test]
    fn test_seed_changes_hashes() {
        let a = FwdKmerHasher::new(5, 1);
        let b = FwdKmerHasher::new(5, 2);
        assert_ne!(
            a.hash_kmer(b"ACGTG").unwrap(),
            b.hash_kmer(b"ACGTG").unwrap()
        );
    }

    fn hashes_of(seq: &[u8], k: usize) -> Vec<Hash> {
        let mut hasher = CanKmerHasher::new(k, 1);
        let mut out = vec![hasher.seed(seq).unwrap()];
        for &sym in &seq[k..] {
            out.push(hasher.shift_right(sym).unwrap());
        }
        out
    }
}

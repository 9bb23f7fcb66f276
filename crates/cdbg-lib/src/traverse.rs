//! Local traversal over the implicit de Bruijn graph.
//!
//! A [`Traverser`] is a hasher cursor paired with the dBG membership
//! oracle: it can enumerate the present neighbors of the current k-mer,
//! classify it as a decision k-mer, and walk maximal non-branching paths.
//! All answers are pure functions of (cursor position, store contents).

use ahash::RandomState;
use std::collections::HashSet;

use crate::dbg::Dbg;
use crate::error::{CdbgError, Result};
use crate::hasher::{Hash, KmerHasher, Shift};
use crate::store::KmerStore;

/// A dBG neighbor of some k-mer: its hash and its symbols.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Neighbor {
    /// Hash of the neighbor k-mer
    pub hash: Hash,
    /// The neighbor k-mer itself
    pub kmer: Vec<u8>,
}

/// The present left and right neighbors of a k-mer, captured together.
#[derive(Clone, Debug, Default)]
pub struct NeighborBundle {
    /// Neighbors reached by prepending a symbol
    pub left: Vec<Neighbor>,
    /// Neighbors reached by appending a symbol
    pub right: Vec<Neighbor>,
}

/// Why a compaction walk stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalkStop {
    /// The current k-mer has no further neighbor in the walk direction.
    DeadEnd,
    /// The current k-mer branches in the walk direction.
    BranchForward,
    /// The current k-mer branches against the walk direction; it was
    /// removed from the walk.
    BranchReverse,
    /// The next k-mer is masked or already visited.
    Masked(Hash),
}

/// Record of a compaction walk. `visited[0]` is the start k-mer; each later
/// entry is one further step. The last entry is where compaction ended.
#[derive(Clone, Debug)]
pub struct Walk {
    /// Hashes of the k-mers accepted into the walk, in step order
    pub visited: Vec<Hash>,
    /// Why the walk stopped
    pub stop: WalkStop,
}

impl Walk {
    /// Hash of the final accepted k-mer, if any survived.
    pub fn end_hash(&self) -> Option<Hash> {
        self.visited.last().copied()
    }
}

/// A positioned cursor over the dBG.
pub struct Traverser<'a, S, H> {
    dbg: &'a Dbg<S, H>,
    hasher: H,
}

impl<'a, S: KmerStore, H: KmerHasher> Traverser<'a, S, H> {
    /// Position a cursor at the first K symbols of `kmer`.
    pub fn at(dbg: &'a Dbg<S, H>, kmer: &[u8]) -> Result<Self> {
        let mut hasher = dbg.make_hasher();
        hasher.seed(kmer)?;
        Ok(Traverser { dbg, hasher })
    }

    /// Adopt an already-seeded hasher as the cursor.
    pub fn from_hasher(dbg: &'a Dbg<S, H>, hasher: H) -> Result<Self> {
        if !hasher.is_initialized() {
            return Err(CdbgError::Uninitialized);
        }
        Ok(Traverser { dbg, hasher })
    }

    /// Hash of the k-mer under the cursor.
    pub fn get(&self) -> Result<Hash> {
        self.hasher.get()
    }

    /// Symbols of the k-mer under the cursor.
    pub fn cursor(&self) -> Vec<u8> {
        self.hasher.cursor()
    }

    /// Candidate left extensions present in the dBG.
    pub fn filter_left(&self) -> Result<Vec<Shift>> {
        let candidates = self.hasher.enumerate_left()?;
        Ok(candidates
            .into_iter()
            .filter(|s| self.dbg.contains(s.hash))
            .collect())
    }

    /// Candidate right extensions present in the dBG.
    pub fn filter_right(&self) -> Result<Vec<Shift>> {
        let candidates = self.hasher.enumerate_right()?;
        Ok(candidates
            .into_iter()
            .filter(|s| self.dbg.contains(s.hash))
            .collect())
    }

    /// In-degree of the current k-mer.
    pub fn left_degree(&self) -> Result<usize> {
        Ok(self.filter_left()?.len())
    }

    /// Out-degree of the current k-mer.
    pub fn right_degree(&self) -> Result<usize> {
        Ok(self.filter_right()?.len())
    }

    /// Whether the current k-mer branches on either side.
    pub fn is_decision(&self) -> Result<bool> {
        Ok(self.left_degree()? > 1 || self.right_degree()? > 1)
    }

    /// Present left neighbors with their k-mer symbols.
    pub fn left_neighbors(&self) -> Result<Vec<Neighbor>> {
        let window = self.cursor();
        Ok(self
            .filter_left()?
            .into_iter()
            .map(|s| {
                let mut kmer = Vec::with_capacity(window.len());
                kmer.push(s.symbol);
                kmer.extend_from_slice(&window[..window.len() - 1]);
                Neighbor { hash: s.hash, kmer }
            })
            .collect())
    }

    /// Present right neighbors with their k-mer symbols.
    pub fn right_neighbors(&self) -> Result<Vec<Neighbor>> {
        let window = self.cursor();
        Ok(self
            .filter_right()?
            .into_iter()
            .map(|s| {
                let mut kmer = Vec::with_capacity(window.len());
                kmer.extend_from_slice(&window[1..]);
                kmer.push(s.symbol);
                Neighbor { hash: s.hash, kmer }
            })
            .collect())
    }

    /// Left and right neighbors when the current k-mer is a decision
    /// k-mer; `None` when it is linear.
    pub fn decision_neighbors(&self) -> Result<Option<NeighborBundle>> {
        let left = self.left_neighbors()?;
        let right = self.right_neighbors()?;
        if left.len() > 1 || right.len() > 1 {
            Ok(Some(NeighborBundle { left, right }))
        } else {
            Ok(None)
        }
    }

    /// Move the cursor one symbol left.
    pub fn shift_left(&mut self, sym: u8) -> Result<Hash> {
        self.hasher.shift_left(sym)
    }

    /// Move the cursor one symbol right.
    pub fn shift_right(&mut self, sym: u8) -> Result<Hash> {
        self.hasher.shift_right(sym)
    }

    /// Walk leftward along the non-branching path from the cursor, never
    /// entering a hash in `mask`, until compaction must stop.
    pub fn walk_left(&mut self, mask: &HashSet<Hash, RandomState>) -> Result<Walk> {
        self.walk(mask, true)
    }

    /// Walk rightward along the non-branching path from the cursor.
    pub fn walk_right(&mut self, mask: &HashSet<Hash, RandomState>) -> Result<Walk> {
        self.walk(mask, false)
    }

    fn walk(&mut self, mask: &HashSet<Hash, RandomState>, leftward: bool) -> Result<Walk> {
        let start = self.get()?;
        let mut visited = vec![start];
        let mut seen: HashSet<Hash, RandomState> = HashSet::default();
        seen.insert(start);

        loop {
            // Branching against the walk direction makes the current k-mer
            // a decision k-mer: it cannot belong to the path.
            let reverse_degree = if leftward {
                self.right_degree()?
            } else {
                self.left_degree()?
            };
            if reverse_degree > 1 {
                visited.pop();
                return Ok(Walk {
                    visited,
                    stop: WalkStop::BranchReverse,
                });
            }

            let forward = if leftward {
                self.filter_left()?
            } else {
                self.filter_right()?
            };
            match forward.len() {
                0 => {
                    return Ok(Walk {
                        visited,
                        stop: WalkStop::DeadEnd,
                    })
                }
                1 => {}
                _ => {
                    visited.pop();
                    return Ok(Walk {
                        visited,
                        stop: WalkStop::BranchForward,
                    });
                }
            }

            let next = forward[0];
            if seen.contains(&next.hash) || mask.contains(&next.hash) {
                return Ok(Walk {
                    visited,
                    stop: WalkStop::Masked(next.hash),
                });
            }

            if leftward {
                self.shift_left(next.symbol)?;
            } else {
                self.shift_right(next.symbol)?;
            }
            visited.push(next.hash);
            seen.insert(next.hash);
        }
    }
}

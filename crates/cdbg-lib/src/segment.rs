//! Segmentation of incoming reads against the current graph state.
//!
//! A read decomposes into an ordered list of segments delimited by null
//! sentinels: runs of already-known k-mers contribute nothing, each new
//! decision k-mer gets a single-k-mer segment of its own, and every
//! maximal run of new linear k-mers becomes a unitig-slice segment. The
//! list always begins and ends with a null sentinel.
//!
//! Segmentation inserts the read's k-mers into the dBG store as a side
//! effect; it never touches the compacted graph and so needs no lock.

use ahash::RandomState;
use std::collections::HashSet;

use crate::dbg::Dbg;
use crate::error::Result;
use crate::hasher::{Hash, KmerHasher};
use crate::store::KmerStore;
use crate::traverse::{NeighborBundle, Traverser};

/// One segment of a read, relative to the graph state at ingest time.
///
/// Anchors are the hashes of the first and last k-mer inside the segment.
/// Flanks are the hash just outside: the adjacent k-mer in the read, or at
/// a read boundary the unique dBG neighbor if exactly one exists, else the
/// anchor itself. A decision segment uses its own hash for both anchors.
#[derive(Clone, Debug, Default)]
pub struct Segment {
    /// Hash of the first k-mer in the segment
    pub left_anchor: Hash,
    /// Hash of the last k-mer in the segment
    pub right_anchor: Hash,
    /// Hash just outside the segment on the left
    pub left_flank: Hash,
    /// Hash just outside the segment on the right
    pub right_flank: Hash,
    /// Whether this segment is a single decision k-mer
    pub is_decision: bool,
    /// Start of the segment in the read, in symbols
    pub start_pos: usize,
    /// Length in symbols, first k-mer start to last k-mer end
    pub length: usize,
    /// Sampled interior k-mer hashes
    pub tags: Vec<Hash>,
    /// For decision segments: the neighbors observed at discovery
    pub neighbors: Option<NeighborBundle>,
}

impl Segment {
    /// A null sentinel.
    pub fn null() -> Self {
        Segment::default()
    }

    /// Whether this is a null sentinel rather than real content.
    pub fn is_null(&self) -> bool {
        self.length == 0
    }
}

/// The outcome of segmenting one read.
pub struct SegmentedRead {
    /// Segments in read order, bracketed by null sentinels
    pub segments: Vec<Segment>,
    /// Hashes of every k-mer this read introduced
    pub new_kmers: HashSet<Hash, RandomState>,
    /// The subset of `new_kmers` that are decision k-mers
    pub new_decision_kmers: HashSet<Hash, RandomState>,
    /// Hash of every k-mer of the read, in position order
    pub hashes: Vec<Hash>,
}

impl SegmentedRead {
    /// Whether the read introduced anything at all.
    pub fn is_trivial(&self) -> bool {
        self.segments.len() < 3
    }
}

/// Segment `sequence` against `dbg`, inserting its k-mers as a side
/// effect. `tag_density` controls interior tag sampling on unitig slices.
pub fn find_new_segments<S: KmerStore, H: KmerHasher>(
    dbg: &Dbg<S, H>,
    sequence: &[u8],
    tag_density: usize,
) -> Result<SegmentedRead> {
    let k = dbg.k();
    let (hashes, novel) = dbg.add_sequence(sequence)?;
    let n = hashes.len();

    let mut segments = vec![Segment::null()];
    let mut new_kmers: HashSet<Hash, RandomState> = HashSet::default();
    let mut new_decision_kmers: HashSet<Hash, RandomState> = HashSet::default();

    let mut cursor = Traverser::at(dbg, sequence)?;
    let mut open: Option<Segment> = None;
    let mut prev_hash = hashes[0];
    let mut prev_new = false;
    let mut prev_decision = false;

    for pos in 0..n {
        if pos > 0 {
            cursor.shift_right(sequence[pos + k - 1])?;
        }
        let cur_hash = hashes[pos];
        let cur_new = novel[pos];
        let mut is_decision = false;

        if cur_new {
            new_kmers.insert(cur_hash);

            if !prev_new || prev_decision {
                let mut left_flank = prev_hash;
                if pos == 0 {
                    let outside = cursor.filter_left()?;
                    if outside.len() == 1 {
                        left_flank = outside[0].hash;
                    }
                }
                open = Some(open_segment(cur_hash, left_flank, pos));
            }

            if let Some(bundle) = cursor.decision_neighbors()? {
                is_decision = true;
                new_decision_kmers.insert(cur_hash);

                if pos > 0 && prev_new && !prev_decision {
                    if let Some(segment) = open.take() {
                        segments.push(close_segment(
                            segment, pos - 1, prev_hash, cur_hash, &hashes, k, tag_density,
                        ));
                    }
                } else {
                    // the freshly opened segment is the decision k-mer
                    // itself; it gets a dedicated segment instead
                    open = None;
                }

                segments.push(decision_segment(cur_hash, prev_hash, pos, k, bundle));
            }
        } else if prev_new {
            if let Some(segment) = open.take() {
                segments.push(close_segment(
                    segment, pos - 1, prev_hash, cur_hash, &hashes, k, tag_density,
                ));
            }
            segments.push(Segment::null());
        }

        prev_hash = cur_hash;
        prev_new = cur_new;
        prev_decision = is_decision;
    }

    if prev_new {
        if let Some(segment) = open.take() {
            // the read ended inside a segment; flank from the unique dBG
            // neighbor beyond the read, if there is exactly one
            let mut right_flank = hashes[n - 1];
            let outside = cursor.filter_right()?;
            if outside.len() == 1 {
                right_flank = outside[0].hash;
            }
            segments.push(close_segment(
                segment,
                n - 1,
                hashes[n - 1],
                right_flank,
                &hashes,
                k,
                tag_density,
            ));
        }
        segments.push(Segment::null());
    }

    Ok(SegmentedRead {
        segments,
        new_kmers,
        new_decision_kmers,
        hashes,
    })
}

fn open_segment(left_anchor: Hash, left_flank: Hash, start_pos: usize) -> Segment {
    Segment {
        left_anchor,
        left_flank,
        start_pos,
        ..Segment::default()
    }
}

fn close_segment(
    mut segment: Segment,
    end: usize,
    right_anchor: Hash,
    right_flank: Hash,
    hashes: &[Hash],
    k: usize,
    tag_density: usize,
) -> Segment {
    segment.length = end - segment.start_pos + k;
    segment.right_anchor = right_anchor;
    segment.right_flank = right_flank;

    // sample interior tags: every tag_density-th k-mer, endpoints excluded
    let start = segment.start_pos;
    let mut offset = tag_density;
    while start + offset < end {
        segment.tags.push(hashes[start + offset]);
        offset += tag_density;
    }
    segment
}

fn decision_segment(
    hash: Hash,
    left_flank: Hash,
    pos: usize,
    k: usize,
    neighbors: NeighborBundle,
) -> Segment {
    Segment {
        left_anchor: hash,
        right_anchor: hash,
        left_flank,
        right_flank: left_flank,
        is_decision: true,
        start_pos: pos,
        length: k,
        tags: Vec::new(),
        neighbors: Some(neighbors),
    }
}

//! The streaming compactor: drives segmentation and graph mutation.
//!
//! Each read is applied in three phases under a single exclusive lock on
//! the compacted graph:
//!
//! 1. materialize the read's own new decision k-mers and find every old
//!    k-mer the read has induced into a decision k-mer;
//! 2. build the induced decision nodes, then repair the unitigs they used
//!    to live in (clip at ends, split in the interior);
//! 3. apply the read's unitig-slice segments as build / extend / merge /
//!    circularize mutations.
//!
//! Segmentation itself runs before the lock is taken; it only touches the
//! dBG store, which is a thread-safe oracle.

use ahash::RandomState;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::constants::{is_valid_k, DEFAULT_SEED, DEFAULT_TAG_DENSITY};
use crate::dbg::Dbg;
use crate::error::{CdbgError, Result};
use crate::events::EventSink;
use crate::events::NullSink;
use crate::graph::Cdbg;
use crate::hasher::{Direction, Hash, KmerHasher};
use crate::node::{DecisionNode, NodeId, UnitigNode};
use crate::segment::{find_new_segments, Segment, SegmentedRead};
use crate::store::KmerStore;
use crate::traverse::{Neighbor, NeighborBundle, Traverser};

/// Construction-time parameters for the compactor.
#[derive(Clone, Copy, Debug)]
pub struct CompactorConfig {
    /// k-mer length, 5 to 63
    pub k: usize,
    /// Spacing between interior unitig tags, in k-mers
    pub tag_density: usize,
    /// Seed for the k-mer hash function
    pub seed: u64,
}

impl CompactorConfig {
    /// Create a configuration, validating the k-mer length.
    pub fn new(k: usize) -> Result<Self> {
        if !is_valid_k(k) {
            return Err(CdbgError::LengthError { k, actual: k });
        }
        Ok(CompactorConfig {
            k,
            tag_density: DEFAULT_TAG_DENSITY,
            seed: DEFAULT_SEED,
        })
    }
}

/// Snapshot of the compaction state for reporting.
#[derive(Clone, Copy, Debug, Default)]
pub struct StreamingCompactorReport {
    /// Reads applied through the compactor
    pub n_reads: u64,
    /// Unitigs connected on both sides
    pub n_full: u64,
    /// Unitigs connected on one side
    pub n_tips: u64,
    /// Unconnected unitigs longer than K
    pub n_islands: u64,
    /// Single-k-mer unconnected unitigs
    pub n_trivial: u64,
    /// Circular unitigs
    pub n_circular: u64,
    /// Decision nodes
    pub n_dnodes: u64,
    /// Unitig nodes
    pub n_unodes: u64,
    /// Indexed tag hashes
    pub n_tags: u64,
    /// Indexed end hashes
    pub n_unitig_ends: u64,
    /// Mutations applied
    pub n_updates: u64,
    /// Distinct k-mers in the dBG store
    pub n_unique: u64,
    /// Store false-positive estimate
    pub estimated_fp: f64,
}

/// One induced decision k-mer awaiting unitig repair.
struct InducedKmer {
    neighbor: Neighbor,
    bundle: NeighborBundle,
}

/// Streaming constructor of the compacted de Bruijn graph.
pub struct StreamingCompactor<S, H> {
    dbg: Arc<Dbg<S, H>>,
    cdbg: Arc<Mutex<Cdbg<S, H>>>,
    tag_density: usize,
    n_reads: AtomicU64,
}

impl<S: KmerStore, H: KmerHasher> StreamingCompactor<S, H> {
    /// Create a compactor over a fresh graph with a silent event sink.
    pub fn new(config: CompactorConfig, store: S) -> Self {
        Self::with_sink(config, store, Box::new(NullSink))
    }

    /// Create a compactor whose graph announces mutations to `sink`.
    pub fn with_sink(config: CompactorConfig, store: S, sink: Box<dyn EventSink>) -> Self {
        let dbg = Arc::new(Dbg::new(config.k, config.seed, store));
        let cdbg = Arc::new(Mutex::new(Cdbg::new(
            Arc::clone(&dbg),
            config.tag_density,
            sink,
        )));
        StreamingCompactor {
            dbg,
            cdbg,
            tag_density: config.tag_density,
            n_reads: AtomicU64::new(0),
        }
    }

    /// The k-mer length.
    pub fn k(&self) -> usize {
        self.dbg.k()
    }

    /// The underlying de Bruijn graph.
    pub fn dbg(&self) -> &Arc<Dbg<S, H>> {
        &self.dbg
    }

    /// Shared handle to the compacted graph. Readers must lock; the
    /// compactor holds the same lock for the whole of one read's update.
    pub fn cdbg(&self) -> Arc<Mutex<Cdbg<S, H>>> {
        Arc::clone(&self.cdbg)
    }

    /// Apply one read to the graph.
    ///
    /// # Errors
    /// `BadAlphabet` / `LengthError` reject the read before any state
    /// changes; `Invariant` signals a compactor bug.
    pub fn update_sequence(&self, sequence: &[u8]) -> Result<()> {
        let read = sequence.to_ascii_uppercase();
        let segmented = find_new_segments(&self.dbg, &read, self.tag_density)?;
        self.n_reads.fetch_add(1, Ordering::Relaxed);
        if segmented.is_trivial() {
            return Ok(());
        }

        let mut graph = self.cdbg.lock();
        self.update_from_segments(&mut graph, &read, &segmented)
    }

    /// Insert a read's k-mers into the dBG store without compaction.
    /// Returns the number of new k-mers.
    pub fn insert_sequence(&self, sequence: &[u8]) -> Result<u64> {
        self.dbg.insert_sequence(sequence)
    }

    /// Positions and hashes of the decision k-mers of `sequence` under
    /// the current dBG state. Diagnostic; inserts nothing.
    pub fn find_decision_kmers(&self, sequence: &[u8]) -> Result<(Vec<usize>, Vec<Hash>)> {
        let read = sequence.to_ascii_uppercase();
        let k = self.k();
        let hashes = self.dbg.hashes(&read)?;
        // hashes() validated the read, but did not insert it; degree
        // queries below see only previously ingested k-mers
        let mut cursor = Traverser::at(&self.dbg, &read)?;
        let mut positions = Vec::new();
        let mut found = Vec::new();
        for (pos, &hash) in hashes.iter().enumerate() {
            if pos > 0 {
                cursor.shift_right(read[pos + k - 1])?;
            }
            if cursor.is_decision()? {
                positions.push(pos);
                found.push(hash);
            }
        }
        Ok((positions, found))
    }

    /// Snapshot the compaction state.
    pub fn report(&self) -> StreamingCompactorReport {
        let graph = self.cdbg.lock();
        let meta = graph.meta_counts();
        StreamingCompactorReport {
            n_reads: self.n_reads.load(Ordering::Relaxed),
            n_full: meta.full,
            n_tips: meta.tip,
            n_islands: meta.island,
            n_trivial: meta.trivial,
            n_circular: meta.circular,
            n_dnodes: graph.n_decision_nodes(),
            n_unodes: graph.n_unitig_nodes(),
            n_tags: graph.n_tags(),
            n_unitig_ends: graph.n_unitig_ends(),
            n_updates: graph.n_updates(),
            n_unique: self.dbg.n_unique(),
            estimated_fp: self.dbg.estimated_fp(),
        }
    }

    /// Audit the graph invariants.
    pub fn validate(&self) -> Result<()> {
        self.cdbg.lock().validate()
    }

    /*
     * Cloned-query conveniences; hold the lock only for the lookup.
     */

    /// Decision node by hash.
    pub fn query_dnode(&self, hash: Hash) -> Option<DecisionNode> {
        self.cdbg.lock().query_dnode(hash).cloned()
    }

    /// Whether a decision node exists for `hash`.
    pub fn has_dnode(&self, hash: Hash) -> bool {
        self.cdbg.lock().has_dnode(hash)
    }

    /// Unitig by end hash.
    pub fn query_unode_end(&self, hash: Hash) -> Option<UnitigNode> {
        self.cdbg.lock().query_unode_end(hash).cloned()
    }

    /// Unitig by tag hash.
    pub fn query_unode_tag(&self, hash: Hash) -> Option<UnitigNode> {
        self.cdbg.lock().query_unode_tag(hash).cloned()
    }

    /// Unitig by id.
    pub fn query_unode_id(&self, id: NodeId) -> Option<UnitigNode> {
        self.cdbg.lock().query_unode_id(id).cloned()
    }

    /*
     * The three-phase update
     */

    fn update_from_segments(
        &self,
        graph: &mut Cdbg<S, H>,
        read: &[u8],
        segmented: &SegmentedRead,
    ) -> Result<()> {
        let k = self.k();
        let segments = &segmented.segments;
        debug!(n_segments = segments.len(), "applying segmented read");

        // Phase 1: materialize this read's decision k-mers and collect the
        // old k-mers they induce into decision k-mers.
        let mut induced: Vec<InducedKmer> = Vec::new();
        let mut induced_hashes: HashSet<Hash, RandomState> = HashSet::default();

        for i in 1..segments.len() - 1 {
            let v = &segments[i];
            if v.is_null() {
                continue;
            }
            let seq = &read[v.start_pos..v.start_pos + v.length];
            if v.is_decision {
                graph.build_dnode(v.left_anchor, seq)?;
                if let Some(bundle) = &v.neighbors {
                    for neighbor in bundle.left.iter().chain(bundle.right.iter()) {
                        self.try_induce(
                            graph,
                            neighbor,
                            &segmented.new_kmers,
                            &mut induced,
                            &mut induced_hashes,
                        )?;
                    }
                }
            } else {
                if segments[i - 1].is_null() {
                    let cursor = Traverser::at(&self.dbg, &seq[..k])?;
                    for neighbor in cursor.left_neighbors()? {
                        self.try_induce(
                            graph,
                            &neighbor,
                            &segmented.new_kmers,
                            &mut induced,
                            &mut induced_hashes,
                        )?;
                    }
                }
                if segments[i + 1].is_null() {
                    let cursor = Traverser::at(&self.dbg, &seq[seq.len() - k..])?;
                    for neighbor in cursor.right_neighbors()? {
                        self.try_induce(
                            graph,
                            &neighbor,
                            &segmented.new_kmers,
                            &mut induced,
                            &mut induced_hashes,
                        )?;
                    }
                }
            }
        }

        // Phase 2: build the induced decision nodes, then repair the
        // unitigs they came from. An induced k-mer whose repair is blocked
        // by another not-yet-applied induction is retried after the rest.
        for item in &induced {
            graph.build_dnode(item.neighbor.hash, &item.neighbor.kmer)?;
        }
        let mut mask: HashSet<Hash, RandomState> = segmented.new_kmers.clone();
        mask.extend(induced_hashes.iter().copied());

        let mut pending: VecDeque<InducedKmer> = induced.into();
        let mut stalled = 0usize;
        while let Some(item) = pending.pop_front() {
            if self.apply_induction(graph, &item, &mask)? {
                stalled = 0;
            } else {
                stalled += 1;
                pending.push_back(item);
                if stalled > pending.len() {
                    return Err(CdbgError::Invariant(
                        "induced decision k-mers could not be resolved".into(),
                    ));
                }
            }
        }

        // Phase 3: apply the unitig-slice segments.
        for segment in segments {
            if !segment.is_null() && !segment.is_decision {
                self.update_unode(graph, segment, read)?;
            }
        }

        Ok(())
    }

    /// Check whether `neighbor` (an old k-mer adjacent to this read) has
    /// become a decision k-mer, and queue it for induction if so.
    fn try_induce(
        &self,
        graph: &Cdbg<S, H>,
        neighbor: &Neighbor,
        new_kmers: &HashSet<Hash, RandomState>,
        induced: &mut Vec<InducedKmer>,
        induced_hashes: &mut HashSet<Hash, RandomState>,
    ) -> Result<()> {
        // this read's own k-mers classify themselves during segmentation,
        // and known decision nodes cannot be induced twice
        if new_kmers.contains(&neighbor.hash)
            || graph.has_dnode(neighbor.hash)
            || induced_hashes.contains(&neighbor.hash)
        {
            return Ok(());
        }
        let cursor = Traverser::at(&self.dbg, &neighbor.kmer)?;
        if let Some(bundle) = cursor.decision_neighbors()? {
            debug!(hash = neighbor.hash, "induced decision k-mer");
            induced_hashes.insert(neighbor.hash);
            induced.push(InducedKmer {
                neighbor: neighbor.clone(),
                bundle,
            });
        }
        Ok(())
    }

    /// Repair the unitig containing the induced decision k-mer `item`.
    /// Returns `false` when the repair must wait for another induction.
    fn apply_induction(
        &self,
        graph: &mut Cdbg<S, H>,
        item: &InducedKmer,
        mask: &HashSet<Hash, RandomState>,
    ) -> Result<bool> {
        let k = self.k();
        let hash = item.neighbor.hash;

        // an end k-mer only needs the unitig trimmed
        enum EndRepair {
            Circular(NodeId),
            Clip(Direction, Hash),
        }
        let repair = match graph.query_unode_end(hash) {
            Some(unode) if unode.is_circular() => Some(EndRepair::Circular(unode.id)),
            Some(unode) if unode.len() == k => {
                // clip_unode deletes a single-k-mer unitig outright
                Some(EndRepair::Clip(Direction::Left, hash))
            }
            Some(unode) if unode.left_end == hash => {
                let new_end = self.dbg.hash_kmer(&unode.sequence[1..1 + k])?;
                Some(EndRepair::Clip(Direction::Left, new_end))
            }
            Some(unode) => {
                let len = unode.len();
                let new_end = self.dbg.hash_kmer(&unode.sequence[len - 1 - k..len - 1])?;
                Some(EndRepair::Clip(Direction::Right, new_end))
            }
            None => None,
        };
        match repair {
            Some(EndRepair::Circular(id)) => {
                // the induced k-mer is the circle's recorded end
                graph.split_circular(id, 0)?;
                return Ok(true);
            }
            Some(EndRepair::Clip(dir, new_end)) => {
                graph.clip_unode(dir, hash, new_end)?;
                return Ok(true);
            }
            None => {}
        }

        // interior: walk from an old, still-linear neighbor to a live
        // unitig end; the walk length fixes the split position
        for side in [Direction::Left, Direction::Right] {
            let candidates = match side {
                Direction::Left => &item.bundle.left,
                Direction::Right => &item.bundle.right,
            };
            let start = candidates
                .iter()
                .find(|n| !mask.contains(&n.hash) && !graph.has_dnode(n.hash));
            let Some(start) = start else { continue };

            let mut cursor = Traverser::at(&self.dbg, &start.kmer)?;
            let walk = match side {
                Direction::Left => cursor.walk_left(mask)?,
                Direction::Right => cursor.walk_right(mask)?,
            };
            let Some(end_hash) = walk.end_hash() else {
                continue;
            };

            let linear_host = match graph.query_unode_end(end_hash) {
                Some(unode) if !unode.is_circular() => {
                    let n_kmers = unode.n_kmers(k);
                    let split_at = match side {
                        Direction::Left => Some(walk.visited.len()),
                        Direction::Right => n_kmers.checked_sub(walk.visited.len() + 1),
                    };
                    split_at.map(|at| (unode.id, n_kmers, at))
                }
                _ => None,
            };
            if let Some((id, n_kmers, split_at)) = linear_host {
                if split_at == 0 || split_at + 1 >= n_kmers {
                    // the walk does not place the k-mer interior to this
                    // unitig; another induction must land first
                    continue;
                }
                let (left_new_right, right_new_left) = {
                    let sequence = &graph
                        .query_unode_id(id)
                        .ok_or_else(|| CdbgError::Invariant(format!("lost unitig {}", id)))?
                        .sequence;
                    (
                        self.dbg.hash_kmer(&sequence[split_at - 1..split_at - 1 + k])?,
                        self.dbg.hash_kmer(&sequence[split_at + 1..split_at + 1 + k])?,
                    )
                };
                debug!(unitig = id, split_at, "splitting around induced decision k-mer");
                graph.split_unode(id, split_at, left_new_right, right_new_left)?;
                return Ok(true);
            }

            // circular host: its single recorded end lies somewhere along
            // the walk, which fixes the induced k-mer's circle position
            let mut circular_host = None;
            for (step, &visited) in walk.visited.iter().enumerate() {
                if let Some(unode) = graph.query_unode_end(visited) {
                    if unode.is_circular() {
                        let split_at = match side {
                            Direction::Left => Some(step + 1),
                            Direction::Right => unode.n_kmers(k).checked_sub(step + 1),
                        };
                        circular_host = split_at.map(|at| (unode.id, at));
                        break;
                    }
                }
            }
            if let Some((id, split_at)) = circular_host {
                debug!(unitig = id, split_at, "linearizing circular unitig");
                graph.split_circular(id, split_at)?;
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Apply one unitig-slice segment: build, extend, merge, or
    /// circularize depending on which flanks resolve to live unitig ends.
    fn update_unode(&self, graph: &mut Cdbg<S, H>, segment: &Segment, read: &[u8]) -> Result<()> {
        let k = self.k();
        let seq = &read[segment.start_pos..segment.start_pos + segment.length];
        let has_left = graph.has_unode_end(segment.left_flank);
        let has_right = graph.has_unode_end(segment.right_flank);

        match (has_left, has_right) {
            (true, false) => graph.extend_unode(
                Direction::Right,
                &seq[k - 1..],
                segment.left_flank,
                segment.right_anchor,
                segment.tags.clone(),
            ),
            (false, true) => graph.extend_unode(
                Direction::Left,
                &seq[..seq.len() - (k - 1)],
                segment.right_flank,
                segment.left_anchor,
                segment.tags.clone(),
            ),
            (true, true) => {
                let left_id = graph.query_unode_end(segment.left_flank).map(|n| n.id);
                let right_id = graph.query_unode_end(segment.right_flank).map(|n| n.id);
                if left_id == right_id {
                    // the segment ties a unitig back to itself
                    let id = left_id.ok_or_else(|| {
                        CdbgError::Invariant("flank resolved to no unitig".into())
                    })?;
                    graph.circularize_unode(id, &seq[k - 1..], segment.tags.clone())
                } else {
                    let n_span_kmers = segment.length + 1 - k;
                    let span = if segment.length >= 2 * (k - 1) {
                        &seq[k - 1..segment.length - (k - 1)]
                    } else {
                        &seq[0..0]
                    };
                    graph
                        .merge_unodes(
                            span,
                            n_span_kmers,
                            segment.left_flank,
                            segment.right_flank,
                            segment.tags.clone(),
                        )
                        .map(|_| ())
                }
            }
            (false, false) => graph
                .build_unode(
                    seq.to_vec(),
                    segment.tags.clone(),
                    segment.left_anchor,
                    segment.right_anchor,
                )
                .map(|_| ()),
        }
    }
}

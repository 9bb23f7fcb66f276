//! The compacted de Bruijn graph: typed node storage, index maps, and the
//! primitive mutations that keep them consistent.
//!
//! Ownership is deliberately simple: `unodes` is the single owner of
//! unitig storage, keyed by [`NodeId`]; `unitig_ends` and `unitig_tags`
//! store plain `NodeId`s, never references. Lookups are two-step and every
//! mutation updates the owner and the indices in the same call.
//!
//! Each primitive is atomic with respect to the index invariants and
//! reports itself to the [`EventSink`] once its changes have landed.

use ahash::RandomState;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::dbg::Dbg;
use crate::error::{CdbgError, Result};
use crate::events::{EventSink, HistoryEvent};
use crate::hasher::{Direction, Hash, KmerHasher};
use crate::node::{DecisionNode, NodeId, NodeMeta, NodeRef, UnitigNode};
use crate::store::KmerStore;
use crate::traverse::Traverser;

/// Unitig counts per meta class, for reporting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetaCounts {
    /// Unitigs connected on both sides
    pub full: u64,
    /// Unitigs connected on one side
    pub tip: u64,
    /// Unconnected unitigs longer than K
    pub island: u64,
    /// Unconnected single k-mer unitigs
    pub trivial: u64,
    /// Closed loops
    pub circular: u64,
}

/// The compacted graph.
pub struct Cdbg<S, H> {
    dbg: Arc<Dbg<S, H>>,
    dnodes: HashMap<Hash, DecisionNode, RandomState>,
    unodes: HashMap<NodeId, UnitigNode, RandomState>,
    unitig_ends: HashMap<Hash, NodeId, RandomState>,
    unitig_tags: HashMap<Hash, NodeId, RandomState>,
    sink: Box<dyn EventSink>,
    tag_density: usize,
    unitig_id_counter: NodeId,
    component_id_counter: u64,
    n_updates: u64,
}

impl<S: KmerStore, H: KmerHasher> Cdbg<S, H> {
    /// Create an empty graph over `dbg`, announcing mutations to `sink`.
    pub fn new(dbg: Arc<Dbg<S, H>>, tag_density: usize, sink: Box<dyn EventSink>) -> Self {
        Cdbg {
            dbg,
            dnodes: HashMap::default(),
            unodes: HashMap::default(),
            unitig_ends: HashMap::default(),
            unitig_tags: HashMap::default(),
            sink,
            tag_density,
            unitig_id_counter: 0,
            component_id_counter: 0,
            n_updates: 0,
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

    /// Swap the event sink, returning the previous one. Useful for
    /// attaching a recorder after construction.
    pub fn set_sink(&mut self, sink: Box<dyn EventSink>) -> Box<dyn EventSink> {
        std::mem::replace(&mut self.sink, sink)
    }

    /// Number of decision nodes.
    pub fn n_decision_nodes(&self) -> u64 {
        self.dnodes.len() as u64
    }

    /// Number of unitig nodes.
    pub fn n_unitig_nodes(&self) -> u64 {
        self.unodes.len() as u64
    }

    /// Number of distinct end hashes indexed.
    pub fn n_unitig_ends(&self) -> u64 {
        self.unitig_ends.len() as u64
    }

    /// Number of tag hashes indexed.
    pub fn n_tags(&self) -> u64 {
        self.unitig_tags.len() as u64
    }

    /// Number of mutations applied so far.
    pub fn n_updates(&self) -> u64 {
        self.n_updates
    }

    /// Iterate decision nodes.
    pub fn dnodes(&self) -> impl Iterator<Item = &DecisionNode> {
        self.dnodes.values()
    }

    /// Iterate unitig nodes.
    pub fn unodes(&self) -> impl Iterator<Item = &UnitigNode> {
        self.unodes.values()
    }

    /// Unitig counts per meta class.
    pub fn meta_counts(&self) -> MetaCounts {
        let mut counts = MetaCounts::default();
        for node in self.unodes.values() {
            match node.meta {
                NodeMeta::Full => counts.full += 1,
                NodeMeta::Tip => counts.tip += 1,
                NodeMeta::Island => counts.island += 1,
                NodeMeta::Trivial => counts.trivial += 1,
                NodeMeta::Circular => counts.circular += 1,
                NodeMeta::Decision => {}
            }
        }
        counts
    }

    /*
     * Queries
     */

    /// Decision node by k-mer hash.
    pub fn query_dnode(&self, hash: Hash) -> Option<&DecisionNode> {
        self.dnodes.get(&hash)
    }

    /// Whether a decision node exists for `hash`.
    pub fn has_dnode(&self, hash: Hash) -> bool {
        self.dnodes.contains_key(&hash)
    }

    /// Unitig whose end k-mer hashes to `hash`.
    pub fn query_unode_end(&self, hash: Hash) -> Option<&UnitigNode> {
        self.unitig_ends
            .get(&hash)
            .and_then(|id| self.unodes.get(id))
    }

    /// Whether some unitig ends at `hash`.
    pub fn has_unode_end(&self, hash: Hash) -> bool {
        self.unitig_ends.contains_key(&hash)
    }

    /// Unitig located by one of its interior tag hashes.
    pub fn query_unode_tag(&self, hash: Hash) -> Option<&UnitigNode> {
        self.unitig_tags
            .get(&hash)
            .and_then(|id| self.unodes.get(id))
    }

    /// Unitig by node id.
    pub fn query_unode_id(&self, id: NodeId) -> Option<&UnitigNode> {
        self.unodes.get(&id)
    }

    /// Live dBG degrees of a decision k-mer (the cached fields on
    /// [`DecisionNode`] are observation-time snapshots).
    pub fn dnode_degrees(&self, hash: Hash) -> Result<(u8, u8)> {
        let dnode = self
            .dnodes
            .get(&hash)
            .ok_or_else(|| CdbgError::Invariant(format!("no decision node for hash {}", hash)))?;
        let cursor = Traverser::at(&self.dbg, &dnode.sequence)?;
        Ok((cursor.left_degree()? as u8, cursor.right_degree()? as u8))
    }

    /*
     * Mutation primitives
     */

    /// Create a decision node for `hash`, or bump its observation count if
    /// it already exists. Returns whether the node was created.
    pub fn build_dnode(&mut self, hash: Hash, kmer: &[u8]) -> Result<bool> {
        if let Some(dnode) = self.dnodes.get_mut(&hash) {
            dnode.count += 1;
            return Ok(false);
        }
        let cursor = Traverser::at(&self.dbg, kmer)?;
        let left_degree = cursor.left_degree()? as u8;
        let right_degree = cursor.right_degree()? as u8;
        let sequence = kmer[..self.k()].to_vec();
        self.dnodes.insert(
            hash,
            DecisionNode::new(hash, sequence.clone(), left_degree, right_degree),
        );
        self.n_updates += 1;
        self.sink.notify(&HistoryEvent::New {
            id: hash,
            sequence,
            meta: NodeMeta::Decision,
        });
        Ok(true)
    }

    /// Create a unitig covering `sequence` with the given end hashes.
    pub fn build_unode(
        &mut self,
        sequence: Vec<u8>,
        tags: Vec<Hash>,
        left_end: Hash,
        right_end: Hash,
    ) -> Result<NodeId> {
        let meta = self.compute_meta(&sequence, left_end, right_end)?;
        let id = self.unitig_id_counter;
        self.unitig_id_counter += 1;

        let node = UnitigNode::new(id, sequence.clone(), left_end, right_end, tags, meta);
        self.index_node(&node);
        self.unodes.insert(id, node);
        self.n_updates += 1;
        self.sink.notify(&HistoryEvent::New { id, sequence, meta });
        Ok(id)
    }

    /// Grow the unitig ending at `old_end` by `new_sequence` on the `dir`
    /// side; its endpoint hash on that side becomes `new_end`.
    pub fn extend_unode(
        &mut self,
        dir: Direction,
        new_sequence: &[u8],
        old_end: Hash,
        new_end: Hash,
        new_tags: Vec<Hash>,
    ) -> Result<()> {
        let id = self.locate_end(old_end)?;
        let (left_end, right_end) = self.ends_of(id)?;
        self.unitig_ends.remove(&left_end);
        self.unitig_ends.remove(&right_end);

        {
            let node = self.node_mut(id)?;
            match dir {
                Direction::Right => {
                    node.sequence.extend_from_slice(new_sequence);
                    node.right_end = new_end;
                }
                Direction::Left => {
                    let mut grown = new_sequence.to_vec();
                    grown.extend_from_slice(&node.sequence);
                    node.sequence = grown;
                    node.left_end = new_end;
                }
            }
            node.tags.extend_from_slice(&new_tags);
        }

        self.reindex_and_emit(id, &new_tags, |id, sequence, meta| HistoryEvent::Extend {
            id,
            sequence,
            meta,
        })
    }

    /// Remove one symbol from the `dir` side of the unitig ending at
    /// `old_end`. A unitig of length K is deleted outright: its only k-mer
    /// has become a decision k-mer.
    pub fn clip_unode(&mut self, dir: Direction, old_end: Hash, new_end: Hash) -> Result<()> {
        let id = self.locate_end(old_end)?;
        if self.node_ref(id)?.len() == self.k() {
            return self.delete_unode(id);
        }

        let (left_end, right_end) = self.ends_of(id)?;
        self.unitig_ends.remove(&left_end);
        self.unitig_ends.remove(&right_end);
        self.unitig_tags.remove(&old_end);

        {
            let node = self.node_mut(id)?;
            match dir {
                Direction::Left => {
                    node.sequence.remove(0);
                    node.left_end = new_end;
                }
                Direction::Right => {
                    node.sequence.pop();
                    node.right_end = new_end;
                }
            }
            node.tags.retain(|&t| t != old_end);
        }

        self.reindex_and_emit(id, &[], |id, sequence, meta| HistoryEvent::Clip {
            id,
            sequence,
            meta,
        })
    }

    /// Split a unitig around the decision k-mer at k-mer position
    /// `split_at`. The k-mer itself belongs to neither half. The left half
    /// keeps the parent id; the right half gets a fresh one, which is
    /// returned. For a circular unitig the split linearizes it in place
    /// and `None` is returned.
    pub fn split_unode(
        &mut self,
        id: NodeId,
        split_at: usize,
        left_new_right_end: Hash,
        right_new_left_end: Hash,
    ) -> Result<Option<NodeId>> {
        if self.node_ref(id)?.is_circular() {
            self.split_circular(id, split_at)?;
            return Ok(None);
        }

        let k = self.k();
        let parent = self
            .unodes
            .remove(&id)
            .ok_or_else(|| CdbgError::Invariant(format!("split of unknown unitig {}", id)))?;
        let n_kmers = parent.n_kmers(k);
        if split_at == 0 || split_at + 1 >= n_kmers {
            self.unodes.insert(id, parent);
            return Err(CdbgError::Invariant(format!(
                "split position {} not interior to unitig {}",
                split_at, id
            )));
        }

        self.unindex_node(&parent);

        let lsequence = parent.sequence[..split_at + k - 1].to_vec();
        let rsequence = parent.sequence[split_at + 1..].to_vec();
        let rchild = self.unitig_id_counter;
        self.unitig_id_counter += 1;

        let lmeta = self.compute_meta(&lsequence, parent.left_end, left_new_right_end)?;
        let rmeta = self.compute_meta(&rsequence, right_new_left_end, parent.right_end)?;

        let mut left = UnitigNode::new(
            id,
            lsequence.clone(),
            parent.left_end,
            left_new_right_end,
            self.sample_tags(&lsequence)?,
            lmeta,
        );
        left.component_id = parent.component_id;
        let right = UnitigNode::new(
            rchild,
            rsequence.clone(),
            right_new_left_end,
            parent.right_end,
            self.sample_tags(&rsequence)?,
            rmeta,
        );

        self.index_node(&left);
        self.index_node(&right);
        self.unodes.insert(id, left);
        self.unodes.insert(rchild, right);
        self.n_updates += 1;
        self.sink.notify(&HistoryEvent::Split {
            parent: id,
            lchild: id,
            rchild,
            lsequence,
            rsequence,
            lmeta,
            rmeta,
        });
        Ok(Some(rchild))
    }

    /// Linearize a circular unitig by removing the k-mer at position
    /// `split_at` on the circle. The node id is preserved.
    pub fn split_circular(&mut self, id: NodeId, split_at: usize) -> Result<()> {
        let k = self.k();
        let parent = self
            .unodes
            .remove(&id)
            .ok_or_else(|| CdbgError::Invariant(format!("split of unknown unitig {}", id)))?;
        let n_kmers = parent.n_kmers(k);
        if !parent.is_circular() || n_kmers <= 1 {
            self.unodes.insert(id, parent);
            return Err(CdbgError::Invariant(format!(
                "circular split of non-splittable unitig {}",
                id
            )));
        }

        self.unindex_node(&parent);

        // The stored sequence is the circle linearized from the recorded
        // end; its first n_kmers symbols are the pure circle.
        let circle = &parent.sequence[..n_kmers];
        let sequence: Vec<u8> = (split_at + 1..)
            .map(|i| circle[i % n_kmers])
            .take(n_kmers + k - 2)
            .collect();

        let left_end = self.dbg.hash_kmer(&sequence[..k])?;
        let right_end = self.dbg.hash_kmer(&sequence[sequence.len() - k..])?;
        let meta = self.compute_meta(&sequence, left_end, right_end)?;
        let mut node = UnitigNode::new(
            id,
            sequence.clone(),
            left_end,
            right_end,
            self.sample_tags(&sequence)?,
            meta,
        );
        node.component_id = parent.component_id;

        self.index_node(&node);
        self.unodes.insert(id, node);
        self.n_updates += 1;
        self.sink
            .notify(&HistoryEvent::SplitCircular { id, sequence, meta });
        Ok(())
    }

    /// Fuse the unitig whose right end is `left_end` with the unitig whose
    /// left end is `right_end`, across `n_span_kmers` bridging k-mers.
    /// When the bridge is shorter than K-1 k-mers the two end k-mers
    /// overlap and `span_sequence` is empty. The left parent's id
    /// survives.
    pub fn merge_unodes(
        &mut self,
        span_sequence: &[u8],
        n_span_kmers: usize,
        left_end: Hash,
        right_end: Hash,
        new_tags: Vec<Hash>,
    ) -> Result<NodeId> {
        let k = self.k();
        let lid = self.locate_end(left_end)?;
        let rid = self.locate_end(right_end)?;
        if lid == rid {
            return Err(CdbgError::Invariant(
                "merge of a unitig with itself; circularize instead".into(),
            ));
        }

        let right = self
            .unodes
            .remove(&rid)
            .ok_or_else(|| CdbgError::Invariant(format!("merge of unknown unitig {}", rid)))?;
        self.unindex_node(&right);

        let (l_left, l_right) = self.ends_of(lid)?;
        self.unitig_ends.remove(&l_left);
        self.unitig_ends.remove(&l_right);

        {
            let node = self.node_mut(lid)?;
            if n_span_kmers + 1 >= k {
                node.sequence.extend_from_slice(span_sequence);
                node.sequence.extend_from_slice(&right.sequence);
            } else {
                // The bridging k-mers are too few to separate the two end
                // k-mers; the parents overlap inside the read.
                node.sequence
                    .extend_from_slice(&right.sequence[k - 1 - n_span_kmers..]);
            }
            node.right_end = right.right_end;
            node.tags.extend_from_slice(&right.tags);
            node.tags.extend_from_slice(&new_tags);
        }

        for &tag in &right.tags {
            self.unitig_tags.insert(tag, lid);
        }
        self.reindex_and_emit(lid, &new_tags, move |child, sequence, meta| {
            HistoryEvent::Merge {
                lparent: child,
                rparent: rid,
                child,
                sequence,
                meta,
            }
        })?;
        Ok(lid)
    }

    /// Close a unitig into a loop: a segment connected its right end back
    /// to its own left end. `appended` is the segment's novel suffix. The
    /// single surviving end hash is the left end.
    pub fn circularize_unode(
        &mut self,
        id: NodeId,
        appended: &[u8],
        new_tags: Vec<Hash>,
    ) -> Result<()> {
        let (left_end, right_end) = self.ends_of(id)?;
        self.unitig_ends.remove(&left_end);
        self.unitig_ends.remove(&right_end);

        let sequence = {
            let node = self.node_mut(id)?;
            node.sequence.extend_from_slice(appended);
            node.right_end = node.left_end;
            node.meta = NodeMeta::Circular;
            node.tags.extend_from_slice(&new_tags);
            node.sequence.clone()
        };

        self.unitig_ends.insert(left_end, id);
        for &tag in &new_tags {
            self.unitig_tags.insert(tag, id);
        }
        self.n_updates += 1;
        self.sink.notify(&HistoryEvent::Extend {
            id,
            sequence,
            meta: NodeMeta::Circular,
        });
        Ok(())
    }

    /// Remove a unitig from the owner map and every index.
    pub fn delete_unode(&mut self, id: NodeId) -> Result<()> {
        let node = self
            .unodes
            .remove(&id)
            .ok_or_else(|| CdbgError::Invariant(format!("delete of unknown unitig {}", id)))?;
        self.unindex_node(&node);
        self.n_updates += 1;
        self.sink.notify(&HistoryEvent::Delete { id });
        Ok(())
    }

    /// Remove a decision node.
    pub fn delete_dnode(&mut self, hash: Hash) -> Result<()> {
        self.dnodes
            .remove(&hash)
            .ok_or_else(|| CdbgError::Invariant(format!("delete of unknown dnode {}", hash)))?;
        self.n_updates += 1;
        self.sink.notify(&HistoryEvent::Delete { id: hash });
        Ok(())
    }

    /*
     * Neighborhood and traversal
     */

    /// Unitigs adjacent to a decision node, split by side.
    pub fn find_dnode_neighbors(&self, hash: Hash) -> Result<(Vec<NodeId>, Vec<NodeId>)> {
        let dnode = self
            .dnodes
            .get(&hash)
            .ok_or_else(|| CdbgError::Invariant(format!("no decision node for hash {}", hash)))?;
        let cursor = Traverser::at(&self.dbg, &dnode.sequence)?;
        let collect = |shifts: Vec<crate::hasher::Shift>| -> Vec<NodeId> {
            shifts
                .into_iter()
                .filter_map(|s| self.unitig_ends.get(&s.hash).copied())
                .collect()
        };
        Ok((
            collect(cursor.filter_left()?),
            collect(cursor.filter_right()?),
        ))
    }

    /// Decision nodes adjacent to a unitig's endpoints, if any.
    pub fn find_unode_neighbors(&self, id: NodeId) -> Result<(Option<Hash>, Option<Hash>)> {
        let node = self
            .unodes
            .get(&id)
            .ok_or_else(|| CdbgError::Invariant(format!("no unitig with id {}", id)))?;
        let k = self.k();

        let left_cursor = Traverser::at(&self.dbg, &node.sequence[..k])?;
        let left = left_cursor
            .filter_left()?
            .into_iter()
            .map(|s| s.hash)
            .find(|h| self.dnodes.contains_key(h));

        let right_cursor = Traverser::at(&self.dbg, &node.sequence[node.len() - k..])?;
        let right = right_cursor
            .filter_right()?
            .into_iter()
            .map(|s| s.hash)
            .find(|h| self.dnodes.contains_key(h));

        Ok((left, right))
    }

    /// Breadth-first traversal over compact nodes starting from `root`.
    pub fn traverse_breadth_first(&self, root: NodeRef) -> Result<Vec<NodeRef>> {
        let mut order = Vec::new();
        let mut seen: HashSet<NodeRef, RandomState> = HashSet::default();
        let mut queue = VecDeque::new();
        seen.insert(root);
        queue.push_back(root);

        while let Some(node) = queue.pop_front() {
            order.push(node);
            for neighbor in self.compact_neighbors(node)? {
                if seen.insert(neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }
        Ok(order)
    }

    /// Label weakly-connected components and return their members.
    pub fn find_connected_components(&mut self) -> Result<HashMap<u64, Vec<NodeRef>>> {
        let mut roots: Vec<NodeRef> = self
            .unodes
            .keys()
            .map(|&id| NodeRef::Unode(id))
            .chain(self.dnodes.keys().map(|&h| NodeRef::Dnode(h)))
            .collect();
        roots.sort_unstable();

        let mut components: HashMap<u64, Vec<NodeRef>> = HashMap::new();
        let mut assigned: HashSet<NodeRef, RandomState> = HashSet::default();
        for root in roots {
            if assigned.contains(&root) {
                continue;
            }
            let component_id = self.component_id_counter;
            self.component_id_counter += 1;
            let members = self.traverse_breadth_first(root)?;
            for &member in &members {
                assigned.insert(member);
                if let NodeRef::Unode(id) = member {
                    if let Some(node) = self.unodes.get_mut(&id) {
                        node.component_id = component_id;
                    }
                }
            }
            components.insert(component_id, members);
        }
        Ok(components)
    }

    /// Compact-graph neighbors of a node: the nodes reachable through the
    /// dBG from its boundary k-mers.
    fn compact_neighbors(&self, node: NodeRef) -> Result<Vec<NodeRef>> {
        let mut out = Vec::new();
        let mut push = |hash: Hash| {
            if self.dnodes.contains_key(&hash) {
                out.push(NodeRef::Dnode(hash));
            } else if let Some(&id) = self.unitig_ends.get(&hash) {
                out.push(NodeRef::Unode(id));
            }
        };
        match node {
            NodeRef::Dnode(hash) => {
                let dnode = self.dnodes.get(&hash).ok_or_else(|| {
                    CdbgError::Invariant(format!("no decision node for hash {}", hash))
                })?;
                let cursor = Traverser::at(&self.dbg, &dnode.sequence)?;
                for s in cursor.filter_left()? {
                    push(s.hash);
                }
                for s in cursor.filter_right()? {
                    push(s.hash);
                }
            }
            NodeRef::Unode(id) => {
                let unode = self
                    .unodes
                    .get(&id)
                    .ok_or_else(|| CdbgError::Invariant(format!("no unitig with id {}", id)))?;
                let k = self.k();
                let left = Traverser::at(&self.dbg, &unode.sequence[..k])?;
                for s in left.filter_left()? {
                    push(s.hash);
                }
                let right = Traverser::at(&self.dbg, &unode.sequence[unode.len() - k..])?;
                for s in right.filter_right()? {
                    push(s.hash);
                }
            }
        }
        Ok(out)
    }

    /*
     * Consistency
     */

    /// Audit the reachable-state invariants. Expensive; intended for tests
    /// and post-hoc checks, not the streaming path.
    pub fn validate(&self) -> Result<()> {
        let k = self.k();
        let mut expected_ends = 0u64;

        for node in self.unodes.values() {
            // endpoint hashes must map back to the node
            for (label, end) in [("left", node.left_end), ("right", node.right_end)] {
                match self.unitig_ends.get(&end) {
                    Some(&id) if id == node.id => {}
                    _ => {
                        return Err(CdbgError::Invariant(format!(
                            "unitig {} {} end {} not indexed",
                            node.id, label, end
                        )))
                    }
                }
            }
            expected_ends += if node.left_end == node.right_end { 1 } else { 2 };

            // every covered k-mer must be known to the dBG, and interior
            // k-mers must not be decision nodes
            for pos in 0..node.n_kmers(k) {
                let hash = self.dbg.hash_kmer(&node.sequence[pos..pos + k])?;
                if !self.dbg.contains(hash) {
                    return Err(CdbgError::Invariant(format!(
                        "unitig {} k-mer at {} missing from dBG",
                        node.id, pos
                    )));
                }
                let interior = pos != 0 && pos != node.n_kmers(k) - 1;
                if interior && self.dnodes.contains_key(&hash) {
                    return Err(CdbgError::Invariant(format!(
                        "unitig {} interior k-mer at {} is a decision node",
                        node.id, pos
                    )));
                }
            }
        }

        // no end hash may be shared between unitigs
        if expected_ends != self.unitig_ends.len() as u64 {
            return Err(CdbgError::Invariant(format!(
                "end index holds {} hashes, expected {}",
                self.unitig_ends.len(),
                expected_ends
            )));
        }

        for dnode in self.dnodes.values() {
            if !self.dbg.contains(dnode.id) {
                return Err(CdbgError::Invariant(format!(
                    "decision node {} missing from dBG",
                    dnode.id
                )));
            }
            let cursor = Traverser::at(&self.dbg, &dnode.sequence)?;
            if !cursor.is_decision()? {
                return Err(CdbgError::Invariant(format!(
                    "decision node {} is linear in the dBG",
                    dnode.id
                )));
            }
        }

        // coverage: unitig k-mers plus decision k-mers account for every
        // distinct k-mer in the dBG
        let covered: u64 = self
            .unodes
            .values()
            .map(|n| n.n_kmers(k) as u64)
            .sum::<u64>()
            + self.dnodes.len() as u64;
        if covered != self.dbg.n_unique() {
            return Err(CdbgError::Invariant(format!(
                "cDBG covers {} k-mers, dBG holds {}",
                covered,
                self.dbg.n_unique()
            )));
        }

        Ok(())
    }

    /// Sample interior tags from a sequence: one hash per `tag_density`
    /// k-mers, endpoints excluded.
    pub fn sample_tags(&self, sequence: &[u8]) -> Result<Vec<Hash>> {
        let k = self.k();
        if sequence.len() < k {
            return Err(CdbgError::LengthError {
                k,
                actual: sequence.len(),
            });
        }
        let n_kmers = sequence.len() + 1 - k;
        let mut tags = Vec::new();
        let mut pos = self.tag_density;
        while pos + 1 < n_kmers {
            tags.push(self.dbg.hash_kmer(&sequence[pos..pos + k])?);
            pos += self.tag_density;
        }
        Ok(tags)
    }

    /*
     * Internal helpers
     */

    fn locate_end(&self, end: Hash) -> Result<NodeId> {
        self.unitig_ends
            .get(&end)
            .copied()
            .ok_or_else(|| CdbgError::Invariant(format!("no unitig ends at hash {}", end)))
    }

    fn node_ref(&self, id: NodeId) -> Result<&UnitigNode> {
        self.unodes
            .get(&id)
            .ok_or_else(|| CdbgError::Invariant(format!("no unitig with id {}", id)))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut UnitigNode> {
        self.unodes
            .get_mut(&id)
            .ok_or_else(|| CdbgError::Invariant(format!("no unitig with id {}", id)))
    }

    fn ends_of(&self, id: NodeId) -> Result<(Hash, Hash)> {
        let node = self.node_ref(id)?;
        Ok((node.left_end, node.right_end))
    }

    fn index_node(&mut self, node: &UnitigNode) {
        self.unitig_ends.insert(node.left_end, node.id);
        self.unitig_ends.insert(node.right_end, node.id);
        for &tag in &node.tags {
            self.unitig_tags.insert(tag, node.id);
        }
    }

    fn unindex_node(&mut self, node: &UnitigNode) {
        self.unitig_ends.remove(&node.left_end);
        self.unitig_ends.remove(&node.right_end);
        for tag in &node.tags {
            if self.unitig_tags.get(tag) == Some(&node.id) {
                self.unitig_tags.remove(tag);
            }
        }
    }

    /// Re-derive meta, refresh the end and tag indices for `id`, bump the
    /// update counter, and emit the event built by `make_event`.
    fn reindex_and_emit(
        &mut self,
        id: NodeId,
        new_tags: &[Hash],
        make_event: impl FnOnce(NodeId, Vec<u8>, NodeMeta) -> HistoryEvent,
    ) -> Result<()> {
        let (sequence, left_end, right_end) = {
            let node = self.node_ref(id)?;
            (node.sequence.clone(), node.left_end, node.right_end)
        };
        let meta = self.compute_meta(&sequence, left_end, right_end)?;
        self.node_mut(id)?.meta = meta;
        self.unitig_ends.insert(left_end, id);
        self.unitig_ends.insert(right_end, id);
        for &tag in new_tags {
            self.unitig_tags.insert(tag, id);
        }
        self.n_updates += 1;
        self.sink.notify(&make_event(id, sequence, meta));
        Ok(())
    }

    /// Classify a unitig from its endpoint connectivity in the dBG.
    fn compute_meta(&self, sequence: &[u8], left_end: Hash, right_end: Hash) -> Result<NodeMeta> {
        let k = self.k();
        if left_end == right_end && sequence.len() > k {
            return Ok(NodeMeta::Circular);
        }
        let left_cursor = Traverser::at(&self.dbg, &sequence[..k])?;
        let left_degree = left_cursor.left_degree()?;
        let right_cursor = Traverser::at(&self.dbg, &sequence[sequence.len() - k..])?;
        let right_degree = right_cursor.right_degree()?;

        Ok(match (left_degree, right_degree) {
            (0, 0) if sequence.len() == k => NodeMeta::Trivial,
            (0, 0) => NodeMeta::Island,
            (0, _) | (_, 0) => NodeMeta::Tip,
            _ => NodeMeta::Full,
        })
    }
}

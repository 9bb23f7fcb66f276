//! Compact graph node types: decision nodes and unitigs.

use std::fmt;

use crate::constants::NULL_COMPONENT;
use crate::hasher::Hash;

/// Identifier for unitig nodes, allocated from a counter. Decision nodes
/// use their k-mer hash as identifier instead.
pub type NodeId = u64;

/// Classification of a node by endpoint connectivity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeMeta {
    /// Single k-mer with no neighbors on either side
    Trivial,
    /// Longer than K, no neighbors on either side
    Island,
    /// Connected on exactly one side
    Tip,
    /// Connected on both sides
    Full,
    /// Closed loop; left and right end coincide
    Circular,
    /// A branching k-mer
    Decision,
}

impl fmt::Display for NodeMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            NodeMeta::Trivial => "TRIVIAL",
            NodeMeta::Island => "ISLAND",
            NodeMeta::Tip => "TIP",
            NodeMeta::Full => "FULL",
            NodeMeta::Circular => "CIRCULAR",
            NodeMeta::Decision => "DECISION",
        };
        f.write_str(repr)
    }
}

/// A k-mer with branching in- or out-degree, kept out of every unitig.
#[derive(Clone, Debug)]
pub struct DecisionNode {
    /// Hash of the k-mer; doubles as the node id
    pub id: Hash,
    /// The k-mer itself, exactly K symbols
    pub sequence: Vec<u8>,
    /// Observed in-degree (0-4)
    pub left_degree: u8,
    /// Observed out-degree (0-4)
    pub right_degree: u8,
    /// How many times this k-mer was observed during streaming
    pub count: u32,
}

impl DecisionNode {
    /// Create a node for a freshly observed decision k-mer.
    pub fn new(id: Hash, sequence: Vec<u8>, left_degree: u8, right_degree: u8) -> Self {
        DecisionNode {
            id,
            sequence,
            left_degree,
            right_degree,
            count: 1,
        }
    }

    /// Total degree across both sides.
    pub fn degree(&self) -> u8 {
        self.left_degree + self.right_degree
    }
}

impl fmt::Display for DecisionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<DNode id/hash={} kmer={} count={}>",
            self.id,
            String::from_utf8_lossy(&self.sequence),
            self.count
        )
    }
}

/// A maximal non-branching path of k-mers, collapsed to one node.
#[derive(Clone, Debug)]
pub struct UnitigNode {
    /// Allocated node id
    pub id: NodeId,
    /// At least K symbols
    pub sequence: Vec<u8>,
    /// Hash of the first k-mer
    pub left_end: Hash,
    /// Hash of the last k-mer
    pub right_end: Hash,
    /// Sparse sample of interior k-mer hashes
    pub tags: Vec<Hash>,
    /// Endpoint connectivity class
    pub meta: NodeMeta,
    /// Weakly-connected component label, recomputed lazily
    pub component_id: u64,
}

impl UnitigNode {
    /// Create a unitig covering `sequence` with the given end hashes.
    pub fn new(
        id: NodeId,
        sequence: Vec<u8>,
        left_end: Hash,
        right_end: Hash,
        tags: Vec<Hash>,
        meta: NodeMeta,
    ) -> Self {
        UnitigNode {
            id,
            sequence,
            left_end,
            right_end,
            tags,
            meta,
            component_id: NULL_COMPONENT,
        }
    }

    /// Length in symbols.
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    /// Whether the sequence is empty (never true for a live node).
    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Number of k-mers covered for order `k`.
    pub fn n_kmers(&self, k: usize) -> usize {
        self.sequence.len() + 1 - k
    }

    /// Whether this unitig forms a closed loop.
    pub fn is_circular(&self) -> bool {
        self.meta == NodeMeta::Circular
    }
}

impl fmt::Display for UnitigNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<UNode id={} left_end={} right_end={} length={} meta={}>",
            self.id,
            self.left_end,
            self.right_end,
            self.sequence.len(),
            self.meta
        )
    }
}

/// Reference to either kind of compact node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeRef {
    /// A decision node, addressed by its k-mer hash
    Dnode(Hash),
    /// A unitig node, addressed by its allocated id
    Unode(NodeId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unitig_kmer_count() {
        let node = UnitigNode::new(1, b"AAAAACCCCC".to_vec(), 10, 20, vec![], NodeMeta::Island);
        assert_eq!(node.len(), 10);
        assert_eq!(node.n_kmers(5), 6);
        assert!(!node.is_circular());
    }

    #[test]
    fn test_meta_repr() {
        assert_eq!(NodeMeta::Full.to_string(), "FULL");
        assert_eq!(NodeMeta::Decision.to_string(), "DECISION");
    }

    #[test]
    fn test_decision_node_degree() {
        let dnode = DecisionNode::new(99, b"ACGTA".to_vec(), 1, 3);
        assert_eq!(dnode.degree(), 4);
        assert_eq!(dnode.count, 1);
    }
}

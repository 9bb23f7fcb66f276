// Streaming compacted de Bruijn graph construction.
//
// Maintains, one read at a time, the compacted representation of the
// implicit de Bruijn graph of order K: maximal non-branching paths are
// collapsed into unitig nodes and branching k-mers are kept as decision
// nodes.

#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

pub mod compactor;
pub mod constants;
pub mod dbg;
pub mod encoding;
pub mod error;
pub mod events;
pub mod graph;
pub mod hasher;
pub mod node;
pub mod segment;
pub mod serialize;
pub mod store;
pub mod traverse;

// Re-export the common types at crate root
pub use compactor::{CompactorConfig, StreamingCompactor, StreamingCompactorReport};
pub use dbg::Dbg;
pub use error::CdbgError;
pub use events::{EventSink, HistoryEvent, MemorySink, NullSink};
pub use graph::Cdbg;
pub use hasher::{CanKmerHasher, Direction, FwdKmerHasher, Hash, KmerHasher};
pub use node::{DecisionNode, NodeId, NodeMeta, NodeRef, UnitigNode};
pub use segment::{Segment, SegmentedRead};
pub use serialize::SnapshotFormat;
pub use store::{CountingStore, KmerStore, SparseSetStore};

/// Version information
pub fn version() -> (u8, u8, u8) {
    constants::VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let (major, minor, patch) = version();
        assert_eq!(major, 0);
        assert_eq!(minor, 1);
        assert_eq!(patch, 0);
    }
}

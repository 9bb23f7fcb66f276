//! History events emitted by graph mutations.
//!
//! Every structural change to the compacted graph is announced through an
//! [`EventSink`] at the point the mutation commits, so external consumers
//! can replay the DAG of edits. Sinks may be no-ops; any buffering or
//! threading is the sink's concern, not the graph's.

use crate::node::{NodeId, NodeMeta};

/// One committed mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HistoryEvent {
    /// A node came into existence. For decision nodes `id` is the k-mer
    /// hash and `meta` is `Decision`.
    New {
        /// Node id
        id: u64,
        /// Node sequence at creation
        sequence: Vec<u8>,
        /// Meta at creation
        meta: NodeMeta,
    },
    /// A unitig grew on one side.
    Extend {
        /// Node id
        id: NodeId,
        /// Sequence after the extension
        sequence: Vec<u8>,
        /// Meta after the extension
        meta: NodeMeta,
    },
    /// A unitig lost one symbol from one side.
    Clip {
        /// Node id
        id: NodeId,
        /// Sequence after the clip
        sequence: Vec<u8>,
        /// Meta after the clip
        meta: NodeMeta,
    },
    /// A unitig split around an induced decision k-mer.
    Split {
        /// The unitig that was split
        parent: NodeId,
        /// Left half (keeps the parent id)
        lchild: NodeId,
        /// Right half (freshly allocated)
        rchild: NodeId,
        /// Left half sequence
        lsequence: Vec<u8>,
        /// Right half sequence
        rsequence: Vec<u8>,
        /// Left half meta
        lmeta: NodeMeta,
        /// Right half meta
        rmeta: NodeMeta,
    },
    /// A circular unitig was linearized by a split.
    SplitCircular {
        /// Node id (preserved)
        id: NodeId,
        /// Sequence after linearization
        sequence: Vec<u8>,
        /// Meta after linearization
        meta: NodeMeta,
    },
    /// Two unitigs fused across a bridging segment.
    Merge {
        /// Parent contributing the left side (its id survives)
        lparent: NodeId,
        /// Parent contributing the right side (deleted)
        rparent: NodeId,
        /// Resulting node id
        child: NodeId,
        /// Merged sequence
        sequence: Vec<u8>,
        /// Merged meta
        meta: NodeMeta,
    },
    /// A node was removed.
    Delete {
        /// Node id (k-mer hash for decision nodes)
        id: u64,
    },
}

/// Observer of committed mutations.
pub trait EventSink: Send {
    /// Called once per committed mutation, in commit order.
    fn notify(&mut self, event: &HistoryEvent);
}

/// Sink that discards everything.
#[derive(Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn notify(&mut self, _event: &HistoryEvent) {}
}

/// Sink that records the event stream in order; the library-level stand-in
/// for an external history DAG recorder.
#[derive(Default)]
pub struct MemorySink {
    events: Vec<HistoryEvent>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Events recorded so far.
    pub fn events(&self) -> &[HistoryEvent] {
        &self.events
    }

    /// Drain the recorded events.
    pub fn take(&mut self) -> Vec<HistoryEvent> {
        std::mem::take(&mut self.events)
    }
}

impl EventSink for MemorySink {
    fn notify(&mut self, event: &HistoryEvent) {
        self.events.push(event.clone());
    }
}

/// Shorthand used in tests and reports: the operation name of an event.
pub fn event_op(event: &HistoryEvent) -> &'static str {
    match event {
        HistoryEvent::New { .. } => "new",
        HistoryEvent::Extend { .. } => "extend",
        HistoryEvent::Clip { .. } => "clip",
        HistoryEvent::Split { .. } => "split",
        HistoryEvent::SplitCircular { .. } => "split_circular",
        HistoryEvent::Merge { .. } => "merge",
        HistoryEvent::Delete { .. } => "delete",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_preserves_order() {
        let mut sink = MemorySink::new();
        sink.notify(&HistoryEvent::New {
            id: 1,
            sequence: b"AAAAA".to_vec(),
            meta: NodeMeta::Trivial,
        });
        sink.notify(&HistoryEvent::Delete { id: 1 });
        let ops: Vec<_> = sink.events().iter().map(event_op).collect();
        assert_eq!(ops, vec!["new", "delete"]);
        assert_eq!(sink.take().len(), 2);
        assert!(sink.events().is_empty());
    }
}

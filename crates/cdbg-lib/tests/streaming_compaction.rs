//! Integration tests for the streaming compactor.
//!
//! These exercise the full pipeline: segmentation, decision-k-mer
//! induction, unitig repair, and the history event stream. All scenarios
//! use K=5 with forward hashing unless stated otherwise.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

use cdbg_lib::events::{event_op, EventSink, HistoryEvent};
use cdbg_lib::{
    CanKmerHasher, CompactorConfig, FwdKmerHasher, NodeMeta, SparseSetStore, StreamingCompactor,
};

type FwdCompactor = StreamingCompactor<SparseSetStore, FwdKmerHasher>;
type CanCompactor = StreamingCompactor<SparseSetStore, CanKmerHasher>;

/// Sink sharing its event log with the test body.
struct RecordingSink(Arc<Mutex<Vec<HistoryEvent>>>);

impl EventSink for RecordingSink {
    fn notify(&mut self, event: &HistoryEvent) {
        self.0.lock().push(event.clone());
    }
}

fn compactor() -> FwdCompactor {
    StreamingCompactor::new(CompactorConfig::new(5).unwrap(), SparseSetStore::new())
}

fn recording_compactor() -> (FwdCompactor, Arc<Mutex<Vec<HistoryEvent>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let compactor = StreamingCompactor::with_sink(
        CompactorConfig::new(5).unwrap(),
        SparseSetStore::new(),
        Box::new(RecordingSink(Arc::clone(&log))),
    );
    (compactor, log)
}

fn unitig_sequences(compactor: &FwdCompactor) -> Vec<Vec<u8>> {
    let graph = compactor.cdbg();
    let graph = graph.lock();
    let mut sequences: Vec<Vec<u8>> = graph.unodes().map(|n| n.sequence.clone()).collect();
    sequences.sort();
    sequences
}

#[test]
fn test_single_read_builds_one_island() {
    let compactor = compactor();
    compactor.update_sequence(b"GATTACAGT").unwrap();

    let report = compactor.report();
    assert_eq!(report.n_unodes, 1);
    assert_eq!(report.n_dnodes, 0);
    assert_eq!(report.n_islands, 1);
    assert_eq!(report.n_unique, 5);

    let left_end = compactor.dbg().hash_kmer(b"GATTA").unwrap();
    let node = compactor.query_unode_end(left_end).unwrap();
    assert_eq!(node.sequence, b"GATTACAGT".to_vec());
    assert_eq!(node.meta, NodeMeta::Island);
    compactor.validate().unwrap();
}

#[test]
fn test_single_kmer_read_is_trivial_unitig() {
    let compactor = compactor();
    compactor.update_sequence(b"GATTA").unwrap();

    let report = compactor.report();
    assert_eq!(report.n_unodes, 1);
    assert_eq!(report.n_trivial, 1);
    let node = compactor
        .query_unode_end(compactor.dbg().hash_kmer(b"GATTA").unwrap())
        .unwrap();
    assert_eq!(node.meta, NodeMeta::Trivial);
    assert_eq!(node.left_end, node.right_end);
    compactor.validate().unwrap();
}

#[test]
fn test_repeated_read_is_idempotent() {
    let (compactor, log) = recording_compactor();
    compactor.update_sequence(b"GATTACAGTCCA").unwrap();
    let events_after_first = log.lock().len();
    let report_first = compactor.report();

    compactor.update_sequence(b"GATTACAGTCCA").unwrap();
    assert_eq!(log.lock().len(), events_after_first);
    let report_second = compactor.report();
    assert_eq!(report_second.n_unodes, report_first.n_unodes);
    assert_eq!(report_second.n_updates, report_first.n_updates);
    assert_eq!(report_second.n_unique, report_first.n_unique);
    compactor.validate().unwrap();
}

#[test]
fn test_short_and_bad_reads_leave_no_trace() {
    let compactor = compactor();
    assert!(compactor.update_sequence(b"ACG").is_err());
    assert!(compactor.update_sequence(b"GATTANCAGT").is_err());

    let report = compactor.report();
    assert_eq!(report.n_unodes, 0);
    assert_eq!(report.n_unique, 0);
    assert_eq!(report.n_updates, 0);
}

#[test]
fn test_extend_right_keeps_node_id() {
    let (compactor, log) = recording_compactor();
    compactor.update_sequence(b"GATTACAGT").unwrap();
    let left_end = compactor.dbg().hash_kmer(b"GATTA").unwrap();
    let id = compactor.query_unode_end(left_end).unwrap().id;

    // same read plus three extra symbols on the right
    compactor.update_sequence(b"GATTACAGTCCA").unwrap();

    let report = compactor.report();
    assert_eq!(report.n_unodes, 1);
    let node = compactor.query_unode_end(left_end).unwrap();
    assert_eq!(node.id, id);
    assert_eq!(node.sequence, b"GATTACAGTCCA".to_vec());

    let ops: Vec<_> = log.lock().iter().map(event_op).collect();
    assert_eq!(ops, vec!["new", "extend"]);
    compactor.validate().unwrap();
}

#[test]
fn test_extend_left_keeps_node_id() {
    let compactor = compactor();
    compactor.update_sequence(b"TTACAGT").unwrap();
    let old_left = compactor.dbg().hash_kmer(b"TTACA").unwrap();
    let id = compactor.query_unode_end(old_left).unwrap().id;

    compactor.update_sequence(b"GATTACAGT").unwrap();

    let new_left = compactor.dbg().hash_kmer(b"GATTA").unwrap();
    let node = compactor.query_unode_end(new_left).unwrap();
    assert_eq!(node.id, id);
    assert_eq!(node.sequence, b"GATTACAGT".to_vec());
    assert_eq!(compactor.report().n_unodes, 1);
    compactor.validate().unwrap();
}

#[test]
fn test_bridge_read_merges_two_unitigs() {
    let (compactor, log) = recording_compactor();
    compactor.update_sequence(b"GATTACAGT").unwrap();
    compactor.update_sequence(b"CCAGGTTCA").unwrap();
    assert_eq!(compactor.report().n_unodes, 2);

    // bridges ...ACAGT to CCAGG... with exactly K-1 new k-mers
    compactor.update_sequence(b"ACAGTCCAGG").unwrap();

    let report = compactor.report();
    assert_eq!(report.n_unodes, 1);
    assert_eq!(report.n_dnodes, 0);
    let node = compactor
        .query_unode_end(compactor.dbg().hash_kmer(b"GATTA").unwrap())
        .unwrap();
    assert_eq!(node.sequence, b"GATTACAGTCCAGGTTCA".to_vec());

    // the interior ends are gone from the end index
    assert!(compactor
        .query_unode_end(compactor.dbg().hash_kmer(b"ACAGT").unwrap())
        .is_none());
    assert!(compactor
        .query_unode_end(compactor.dbg().hash_kmer(b"CCAGG").unwrap())
        .is_none());

    let ops: Vec<_> = log.lock().iter().map(event_op).collect();
    assert_eq!(ops, vec!["new", "new", "merge"]);
    compactor.validate().unwrap();
}

#[test]
fn test_branch_read_splits_existing_unitig() {
    let (compactor, log) = recording_compactor();
    compactor.update_sequence(b"GATTACAGTCCA").unwrap();

    // shares GATTACA then branches: TACAG gains a second right extension
    compactor.update_sequence(b"TTACAGCTT").unwrap();

    let report = compactor.report();
    assert_eq!(report.n_dnodes, 1);
    assert_eq!(report.n_unodes, 3);
    assert_eq!(report.n_unitig_ends, 6);

    let dnode_hash = compactor.dbg().hash_kmer(b"TACAG").unwrap();
    let dnode = compactor.query_dnode(dnode_hash).unwrap();
    assert_eq!(dnode.sequence, b"TACAG".to_vec());
    assert_eq!(dnode.left_degree, 1);
    assert_eq!(dnode.right_degree, 2);

    let mut sequences = unitig_sequences(&compactor);
    sequences.sort();
    assert_eq!(
        sequences,
        vec![
            b"ACAGCTT".to_vec(),
            b"ACAGTCCA".to_vec(),
            b"GATTACA".to_vec(),
        ]
    );

    // the split k-mer belongs to no unitig
    assert!(compactor.query_unode_end(dnode_hash).is_none());
    assert!(compactor.query_unode_tag(dnode_hash).is_none());

    // read 2: induced decision node, then the split, then the new branch
    let ops: Vec<_> = log.lock().iter().map(event_op).collect();
    assert_eq!(ops, vec!["new", "new", "split", "new"]);
    compactor.validate().unwrap();
}

#[test]
fn test_branch_into_unitig_end_clips() {
    let (compactor, log) = recording_compactor();
    // two reads sharing their first k-mer GCAGT, diverging after it
    compactor.update_sequence(b"GCAGTTACA").unwrap();
    compactor.update_sequence(b"GCAGTGGTT").unwrap();

    let report = compactor.report();
    assert_eq!(report.n_dnodes, 1);
    assert_eq!(report.n_unodes, 2);
    assert_eq!(report.n_unitig_ends, 4);

    let dnode_hash = compactor.dbg().hash_kmer(b"GCAGT").unwrap();
    assert!(compactor.has_dnode(dnode_hash));

    let top = compactor
        .query_unode_end(compactor.dbg().hash_kmer(b"CAGTT").unwrap())
        .unwrap();
    assert_eq!(top.sequence, b"CAGTTACA".to_vec());
    let bottom = compactor
        .query_unode_end(compactor.dbg().hash_kmer(b"CAGTG").unwrap())
        .unwrap();
    assert_eq!(bottom.sequence, b"CAGTGGTT".to_vec());

    let ops: Vec<_> = log.lock().iter().map(event_op).collect();
    assert_eq!(ops, vec!["new", "new", "clip", "new"]);
    compactor.validate().unwrap();
}

#[test]
fn test_mid_unitig_induction_from_read_end() {
    let compactor = compactor();
    compactor.update_sequence(b"GATTACAGTCCA").unwrap();

    // the read's last k-mer GTTAC gives TTACA a second left neighbor
    compactor.update_sequence(b"CGGTTAC").unwrap();

    let report = compactor.report();
    assert_eq!(report.n_dnodes, 1);
    assert_eq!(report.n_unodes, 3);
    assert!(compactor.has_dnode(compactor.dbg().hash_kmer(b"TTACA").unwrap()));

    let sequences = unitig_sequences(&compactor);
    assert_eq!(
        sequences,
        vec![
            b"CGGTTAC".to_vec(),
            b"GATTAC".to_vec(),
            b"TACAGTCCA".to_vec(),
        ]
    );
    compactor.validate().unwrap();
}

#[test]
fn test_split_and_extend_in_one_read() {
    let compactor = compactor();
    compactor.update_sequence(b"GATTACAGTCCA").unwrap();

    // one read: a new branch into TTACA, a known run, then a right
    // extension past the old end
    compactor.update_sequence(b"GGTTACAGTCCAA").unwrap();

    let report = compactor.report();
    assert_eq!(report.n_dnodes, 1);
    assert_eq!(report.n_unodes, 3);

    let sequences = unitig_sequences(&compactor);
    assert_eq!(
        sequences,
        vec![
            b"GATTAC".to_vec(),
            b"GGTTAC".to_vec(),
            b"TACAGTCCAA".to_vec(),
        ]
    );
    compactor.validate().unwrap();
}

#[test]
fn test_circularize_and_split_circular() {
    let (compactor, log) = recording_compactor();
    // the first six k-mers of a circle over GATTACAG
    compactor.update_sequence(b"GATTACAGGA").unwrap();
    // close the loop back to GATTA
    compactor.update_sequence(b"CAGGATTAC").unwrap();

    let report = compactor.report();
    assert_eq!(report.n_unodes, 1);
    assert_eq!(report.n_circular, 1);
    assert_eq!(report.n_unitig_ends, 1);

    let left_end = compactor.dbg().hash_kmer(b"GATTA").unwrap();
    let node = compactor.query_unode_end(left_end).unwrap();
    assert!(node.is_circular());
    assert_eq!(node.sequence, b"GATTACAGGATT".to_vec());
    compactor.validate().unwrap();

    // a new left neighbor for TTACA linearizes the circle around it
    compactor.update_sequence(b"GTTACAG").unwrap();

    let report = compactor.report();
    assert_eq!(report.n_circular, 0);
    assert_eq!(report.n_dnodes, 1);
    assert_eq!(report.n_unodes, 2);
    let sequences = unitig_sequences(&compactor);
    assert_eq!(sequences, vec![b"GTTAC".to_vec(), b"TACAGGATTAC".to_vec()]);

    let ops: Vec<_> = log.lock().iter().map(event_op).collect();
    assert_eq!(
        ops,
        vec!["new", "extend", "new", "split_circular", "new"]
    );
    compactor.validate().unwrap();
}

#[test]
fn test_homopolymer_fork() {
    // the seed scenario: AAAAACCCCC then AAAAACCCCG. Homopolymer ends
    // are self-adjacent in the dBG, so AAAAA and CCCCC are decision
    // k-mers from the start; the second read induces ACCCC as well.
    let compactor = compactor();
    compactor.update_sequence(b"AAAAACCCCC").unwrap();

    let report = compactor.report();
    assert_eq!(report.n_unodes, 1);
    assert_eq!(report.n_dnodes, 2);
    let unode = compactor
        .query_unode_end(compactor.dbg().hash_kmer(b"AAAAC").unwrap())
        .unwrap();
    assert_eq!(unode.sequence, b"AAAACCCC".to_vec());
    compactor.validate().unwrap();

    compactor.update_sequence(b"AAAAACCCCG").unwrap();

    let report = compactor.report();
    assert_eq!(report.n_dnodes, 4);
    assert_eq!(report.n_unodes, 1);
    let acccc = compactor.dbg().hash_kmer(b"ACCCC").unwrap();
    assert!(compactor.has_dnode(acccc));
    let unode = compactor
        .query_unode_end(compactor.dbg().hash_kmer(b"AAAAC").unwrap())
        .unwrap();
    assert_eq!(unode.sequence, b"AAAACCC".to_vec());
    compactor.validate().unwrap();
}

#[test]
fn test_canonical_hashing_is_strand_agnostic() {
    let compactor: CanCompactor = StreamingCompactor::new(
        CompactorConfig::new(5).unwrap(),
        SparseSetStore::new(),
    );
    compactor.update_sequence(b"GATTACAGT").unwrap();
    assert_eq!(compactor.report().n_unodes, 1);
    assert_eq!(compactor.report().n_unique, 5);

    // the reverse complement contributes nothing new
    compactor.update_sequence(b"ACTGTAATC").unwrap();
    let report = compactor.report();
    assert_eq!(report.n_unodes, 1);
    assert_eq!(report.n_dnodes, 0);
    assert_eq!(report.n_unique, 5);
}

#[test]
fn test_ingest_order_does_not_change_final_shape() {
    let reads: Vec<&[u8]> = vec![b"GATTACAGTCCA", b"TTACAGCTT"];

    let forward = compactor();
    for read in &reads {
        forward.update_sequence(read).unwrap();
    }
    let reversed = compactor();
    for read in reads.iter().rev() {
        reversed.update_sequence(read).unwrap();
    }

    assert_eq!(unitig_sequences(&forward), unitig_sequences(&reversed));
    let (fwd_report, rev_report) = (forward.report(), reversed.report());
    assert_eq!(fwd_report.n_dnodes, rev_report.n_dnodes);
    assert_eq!(fwd_report.n_unique, rev_report.n_unique);
    forward.validate().unwrap();
    reversed.validate().unwrap();
}

#[test]
fn test_find_decision_kmers_diagnostic() {
    let compactor = compactor();
    compactor.update_sequence(b"GATTACAGTCCA").unwrap();
    compactor.update_sequence(b"TTACAGCTT").unwrap();

    let (positions, hashes) = compactor.find_decision_kmers(b"GATTACAGTCCA").unwrap();
    assert_eq!(positions, vec![3]);
    assert_eq!(hashes, vec![compactor.dbg().hash_kmer(b"TACAG").unwrap()]);
}

#[test]
fn test_tag_lookup_finds_unitig_by_interior_kmer() {
    let mut config = CompactorConfig::new(5).unwrap();
    config.tag_density = 4;
    let compactor: FwdCompactor = StreamingCompactor::new(config, SparseSetStore::new());
    let read = b"GATTACAGTCCAGGTTCAAT";
    compactor.update_sequence(read).unwrap();

    // k-mer position 4 is a sampled tag
    let tag = compactor.dbg().hash_kmer(&read[4..9]).unwrap();
    let node = compactor.query_unode_tag(tag).unwrap();
    assert_eq!(node.sequence, read.to_vec());

    // untagged interior k-mers are not in the tag index
    let untagged = compactor.dbg().hash_kmer(&read[5..10]).unwrap();
    assert!(compactor.query_unode_tag(untagged).is_none());
}

#[test]
fn test_neighbors_and_components() {
    let compactor = compactor();
    compactor.update_sequence(b"GATTACAGTCCA").unwrap();
    compactor.update_sequence(b"TTACAGCTT").unwrap();
    compactor.update_sequence(b"CCCGGCCGGCC").unwrap();

    let graph = compactor.cdbg();
    let mut graph = graph.lock();

    let dnode_hash = graph.dbg().hash_kmer(b"TACAG").unwrap();
    let (left, right) = graph.find_dnode_neighbors(dnode_hash).unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(right.len(), 2);

    // walking back from an adjacent unitig finds the decision node
    let (l_dnode, r_dnode) = graph.find_unode_neighbors(left[0]).unwrap();
    assert_eq!(r_dnode, Some(dnode_hash));
    assert_eq!(l_dnode, None);

    // the fork is one component, the unrelated island another
    let components = graph.find_connected_components().unwrap();
    assert_eq!(components.len(), 2);
    let mut sizes: Vec<usize> = components.values().map(|m| m.len()).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![1, 4]);
}

#[test]
fn test_insert_sequence_bypasses_compaction() {
    let compactor = compactor();
    assert_eq!(compactor.insert_sequence(b"GATTACAGT").unwrap(), 5);
    assert_eq!(compactor.insert_sequence(b"GATTACAGT").unwrap(), 0);
    assert_eq!(compactor.report().n_unodes, 0);
    assert_eq!(compactor.report().n_unique, 5);
}

#[test]
fn test_resequenced_substrings_keep_invariants() {
    let mut rng = StdRng::seed_from_u64(7);
    let genome: Vec<u8> = (0..200).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect();

    let config = CompactorConfig::new(11).unwrap();
    let compactor: StreamingCompactor<SparseSetStore, FwdKmerHasher> =
        StreamingCompactor::new(config, SparseSetStore::new());

    // overlapping fragments arrive in random order; the graph must stay
    // consistent after every one
    for _ in 0..30 {
        let start = rng.gen_range(0..genome.len() - 30);
        let len = rng.gen_range(20..=30);
        compactor.update_sequence(&genome[start..start + len]).unwrap();
        compactor.validate().unwrap();
    }

    // the full genome ties the fragments together
    compactor.update_sequence(&genome).unwrap();
    compactor.validate().unwrap();

    // a second pass changes nothing
    let before = compactor.report();
    compactor.update_sequence(&genome).unwrap();
    let after = compactor.report();
    assert_eq!(before.n_unodes, after.n_unodes);
    assert_eq!(before.n_updates, after.n_updates);
}

#[test]
fn test_mixed_case_reads_are_normalized() {
    let compactor = compactor();
    compactor.update_sequence(b"gattacagt").unwrap();
    let node = compactor
        .query_unode_end(compactor.dbg().hash_kmer(b"GATTA").unwrap())
        .unwrap();
    assert_eq!(node.sequence, b"GATTACAGT".to_vec());
}

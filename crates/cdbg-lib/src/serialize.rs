//! Snapshot serializers for the compacted graph.
//!
//! Three formats: FASTA (one record per unitig), GFA1 (unitigs and
//! decision nodes as `S` segments, adjacencies as `L` links with a K-1
//! overlap), and GraphML. Serializers read the graph; callers are
//! expected to hold the graph lock for the duration of a write.

use std::io::{self, Write};

use crate::graph::Cdbg;
use crate::hasher::KmerHasher;
use crate::store::KmerStore;

/// Snapshot output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotFormat {
    /// One FASTA record per unitig
    Fasta,
    /// GFA version 1
    Gfa1,
    /// GraphML with sequence/meta attributes
    GraphMl,
}

impl SnapshotFormat {
    /// Conventional file extension for the format.
    pub fn extension(&self) -> &'static str {
        match self {
            SnapshotFormat::Fasta => "fasta",
            SnapshotFormat::Gfa1 => "gfa",
            SnapshotFormat::GraphMl => "graphml",
        }
    }
}

/// Write a snapshot of `cdbg` in the requested format.
pub fn write_snapshot<S, H, W>(cdbg: &Cdbg<S, H>, format: SnapshotFormat, out: W) -> io::Result<()>
where
    S: KmerStore,
    H: KmerHasher,
    W: Write,
{
    match format {
        SnapshotFormat::Fasta => write_fasta(cdbg, out),
        SnapshotFormat::Gfa1 => write_gfa1(cdbg, out),
        SnapshotFormat::GraphMl => write_graphml(cdbg, out),
    }
}

/// Write one FASTA record per unitig.
pub fn write_fasta<S, H, W>(cdbg: &Cdbg<S, H>, mut out: W) -> io::Result<()>
where
    S: KmerStore,
    H: KmerHasher,
    W: Write,
{
    let mut unodes: Vec<_> = cdbg.unodes().collect();
    unodes.sort_by_key(|n| n.id);
    for node in unodes {
        writeln!(
            out,
            ">NODE{} meta={} length={}",
            node.id,
            node.meta,
            node.len()
        )?;
        out.write_all(&node.sequence)?;
        writeln!(out)?;
    }
    Ok(())
}

/// Write a GFA1 snapshot: `S` segments for unitigs and decision nodes,
/// `L` links for their adjacencies.
pub fn write_gfa1<S, H, W>(cdbg: &Cdbg<S, H>, mut out: W) -> io::Result<()>
where
    S: KmerStore,
    H: KmerHasher,
    W: Write,
{
    let overlap = cdbg.k() - 1;
    writeln!(out, "H\tVN:Z:1.0")?;

    let mut unodes: Vec<_> = cdbg.unodes().collect();
    unodes.sort_by_key(|n| n.id);
    for node in unodes {
        writeln!(
            out,
            "S\tNODE{}\t{}\tLN:i:{}",
            node.id,
            String::from_utf8_lossy(&node.sequence),
            node.len()
        )?;
    }

    let mut dnodes: Vec<_> = cdbg.dnodes().collect();
    dnodes.sort_by_key(|d| d.id);
    for dnode in dnodes {
        writeln!(
            out,
            "S\tDNODE{}\t{}\tLN:i:{}",
            dnode.id,
            String::from_utf8_lossy(&dnode.sequence),
            dnode.sequence.len()
        )?;
        let (left, right) = cdbg
            .find_dnode_neighbors(dnode.id)
            .map_err(io::Error::other)?;
        for unode in left {
            writeln!(out, "L\tNODE{}\t+\tDNODE{}\t+\t{}M", unode, dnode.id, overlap)?;
        }
        for unode in right {
            writeln!(out, "L\tDNODE{}\t+\tNODE{}\t+\t{}M", dnode.id, unode, overlap)?;
        }
    }
    Ok(())
}

/// Write a GraphML snapshot with `node_class`, `sequence`, `meta`, and
/// `length` attributes.
pub fn write_graphml<S, H, W>(cdbg: &Cdbg<S, H>, mut out: W) -> io::Result<()>
where
    S: KmerStore,
    H: KmerHasher,
    W: Write,
{
    writeln!(out, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>")?;
    writeln!(
        out,
        "<graphml xmlns=\"http://graphml.graphdrawing.org/xmlns\">"
    )?;
    writeln!(out, "<key id=\"node_class\" for=\"node\" attr.name=\"node_class\" attr.type=\"string\"/>")?;
    writeln!(out, "<key id=\"sequence\" for=\"node\" attr.name=\"sequence\" attr.type=\"string\"/>")?;
    writeln!(out, "<key id=\"meta\" for=\"node\" attr.name=\"meta\" attr.type=\"string\"/>")?;
    writeln!(out, "<key id=\"length\" for=\"node\" attr.name=\"length\" attr.type=\"long\"/>")?;
    writeln!(out, "<graph id=\"cDBG\" edgedefault=\"directed\">")?;

    let mut unodes: Vec<_> = cdbg.unodes().collect();
    unodes.sort_by_key(|n| n.id);
    for node in unodes {
        writeln!(out, "<node id=\"NODE{}\">", node.id)?;
        writeln!(out, "    <data key=\"node_class\">unitig</data>")?;
        writeln!(
            out,
            "    <data key=\"sequence\">{}</data>",
            String::from_utf8_lossy(&node.sequence)
        )?;
        writeln!(out, "    <data key=\"meta\">{}</data>", node.meta)?;
        writeln!(out, "    <data key=\"length\">{}</data>", node.len())?;
        writeln!(out, "</node>")?;
    }

    let mut dnodes: Vec<_> = cdbg.dnodes().collect();
    dnodes.sort_by_key(|d| d.id);
    let mut edge_id = 0u64;
    let mut edges = Vec::new();
    for dnode in dnodes {
        writeln!(out, "<node id=\"DNODE{}\">", dnode.id)?;
        writeln!(out, "    <data key=\"node_class\">decision</data>")?;
        writeln!(
            out,
            "    <data key=\"sequence\">{}</data>",
            String::from_utf8_lossy(&dnode.sequence)
        )?;
        writeln!(
            out,
            "    <data key=\"meta\">{}</data>",
            crate::node::NodeMeta::Decision
        )?;
        writeln!(
            out,
            "    <data key=\"length\">{}</data>",
            dnode.sequence.len()
        )?;
        writeln!(out, "</node>")?;

        let (left, right) = cdbg
            .find_dnode_neighbors(dnode.id)
            .map_err(io::Error::other)?;
        for unode in left {
            edges.push((format!("NODE{}", unode), format!("DNODE{}", dnode.id)));
        }
        for unode in right {
            edges.push((format!("DNODE{}", dnode.id), format!("NODE{}", unode)));
        }
    }
    for (source, target) in edges {
        writeln!(
            out,
            "<edge id=\"e{}\" source=\"{}\" target=\"{}\"/>",
            edge_id, source, target
        )?;
        edge_id += 1;
    }

    writeln!(out, "</graph>")?;
    writeln!(out, "</graphml>")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compactor::{CompactorConfig, StreamingCompactor};
    use crate::hasher::FwdKmerHasher;
    use crate::store::SparseSetStore;

    fn forked_graph() -> StreamingCompactor<SparseSetStore, FwdKmerHasher> {
        let compactor = StreamingCompactor::new(
            CompactorConfig::new(5).unwrap(),
            SparseSetStore::new(),
        );
        compactor.update_sequence(b"GATTACAGTCCA").unwrap();
        compactor.update_sequence(b"TTACAGCTT").unwrap();
        compactor
    }

    #[test]
    fn test_fasta_has_one_record_per_unitig() {
        let compactor = forked_graph();
        let graph = compactor.cdbg();
        let graph = graph.lock();
        let mut buffer = Vec::new();
        write_fasta(&graph, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let n_records = text.lines().filter(|l| l.starts_with('>')).count();
        assert_eq!(n_records as u64, graph.n_unitig_nodes());
        assert!(text.contains("meta="));
    }

    #[test]
    fn test_gfa1_links_through_decision_nodes() {
        let compactor = forked_graph();
        let graph = compactor.cdbg();
        let graph = graph.lock();
        let mut buffer = Vec::new();
        write_gfa1(&graph, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert!(text.starts_with("H\tVN:Z:1.0"));
        let n_segments = text.lines().filter(|l| l.starts_with("S\t")).count() as u64;
        assert_eq!(n_segments, graph.n_unitig_nodes() + graph.n_decision_nodes());
        // the fork: one unitig into the decision node, two out
        let n_links = text.lines().filter(|l| l.starts_with("L\t")).count();
        assert_eq!(n_links, 3);
        assert!(text.contains("4M"));
    }

    #[test]
    fn test_graphml_is_well_formed_enough() {
        let compactor = forked_graph();
        let graph = compactor.cdbg();
        let graph = graph.lock();
        let mut buffer = Vec::new();
        write_graphml(&graph, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("<graphml"));
        assert!(text.ends_with("</graphml>\n"));
        assert_eq!(
            text.matches("<node ").count() as u64,
            graph.n_unitig_nodes() + graph.n_decision_nodes()
        );
        assert_eq!(text.matches("<edge ").count(), 3);
    }
}

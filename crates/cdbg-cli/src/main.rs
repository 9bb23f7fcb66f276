use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::{info, warn};

use cdbg_lib::serialize::{write_snapshot, SnapshotFormat};
use cdbg_lib::{
    CanKmerHasher, CompactorConfig, FwdKmerHasher, KmerHasher, SparseSetStore, StreamingCompactor,
    StreamingCompactorReport,
};

#[derive(Parser)]
#[command(name = "cdbg")]
#[command(version = "0.1.0")]
#[command(about = "Streaming compacted de Bruijn graph construction", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Fasta,
    Gfa1,
    Graphml,
}

impl From<OutputFormat> for SnapshotFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Fasta => SnapshotFormat::Fasta,
            OutputFormat::Gfa1 => SnapshotFormat::Gfa1,
            OutputFormat::Graphml => SnapshotFormat::GraphMl,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build a compacted graph from sequencing reads
    Build {
        /// Input FASTA/FASTQ file (may be gzipped)
        #[arg(short, long)]
        input: PathBuf,

        /// K-mer length (5-63)
        #[arg(short, long)]
        k: usize,

        /// Output file prefix; one file per requested format
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Snapshot formats to write
        #[arg(short, long, value_enum)]
        format: Vec<OutputFormat>,

        /// Use canonical (strand-agnostic) k-mer hashing
        #[arg(long, default_value = "false")]
        canonical: bool,

        /// Interior tag spacing, in k-mers
        #[arg(long, default_value = "8")]
        tag_density: usize,

        /// Hash seed
        #[arg(long, default_value = "1")]
        seed: u64,

        /// Log a progress report every N reads (0 disables)
        #[arg(long, default_value = "100000")]
        report_interval: u64,
    },

    /// Report graph statistics without writing a snapshot
    Stats {
        /// Input FASTA/FASTQ file (may be gzipped)
        #[arg(short, long)]
        input: PathBuf,

        /// K-mer length (5-63)
        #[arg(short, long)]
        k: usize,

        /// Use canonical (strand-agnostic) k-mer hashing
        #[arg(long, default_value = "false")]
        canonical: bool,
    },
}

fn main() -> Result<()> {
    // Initialize tracing: use RUST_LOG if set, otherwise default to info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            k,
            output,
            format,
            canonical,
            tag_density,
            seed,
            report_interval,
        } => {
            let mut config = CompactorConfig::new(k).map_err(|e| anyhow::anyhow!("{}", e))?;
            config.tag_density = tag_density;
            config.seed = seed;
            if canonical {
                build_command::<CanKmerHasher>(config, input, output, format, report_interval)
            } else {
                build_command::<FwdKmerHasher>(config, input, output, format, report_interval)
            }
        }
        Commands::Stats { input, k, canonical } => {
            let config = CompactorConfig::new(k).map_err(|e| anyhow::anyhow!("{}", e))?;
            if canonical {
                stats_command::<CanKmerHasher>(config, input)
            } else {
                stats_command::<FwdKmerHasher>(config, input)
            }
        }
    }
}

/// Stream reads from `input` through a compactor.
fn stream_reads<H: KmerHasher>(
    config: CompactorConfig,
    input: &PathBuf,
    report_interval: u64,
) -> Result<StreamingCompactor<SparseSetStore, H>> {
    let compactor: StreamingCompactor<SparseSetStore, H> =
        StreamingCompactor::new(config, SparseSetStore::new());

    let mut reader = needletail::parse_fastx_file(input)
        .with_context(|| format!("Failed to open sequence file: {}", input.display()))?;

    let mut n_reads = 0u64;
    let mut n_skipped = 0u64;
    while let Some(record) = reader.next() {
        let record = record
            .with_context(|| format!("Failed to parse sequence record in {}", input.display()))?;
        let seq = record.seq();

        // a bad read is skipped and logged, never fatal
        if let Err(err) = compactor.update_sequence(&seq) {
            match err {
                cdbg_lib::CdbgError::BadAlphabet { .. } | cdbg_lib::CdbgError::LengthError { .. } => {
                    warn!(read = n_reads + n_skipped, %err, "skipping read");
                    n_skipped += 1;
                    continue;
                }
                fatal => return Err(fatal.into()),
            }
        }
        n_reads += 1;

        if report_interval > 0 && n_reads % report_interval == 0 {
            log_report(&compactor.report());
        }
    }

    info!(n_reads, n_skipped, "ingest finished");
    log_report(&compactor.report());
    Ok(compactor)
}

fn log_report(report: &StreamingCompactorReport) {
    info!(
        n_reads = report.n_reads,
        n_unodes = report.n_unodes,
        n_dnodes = report.n_dnodes,
        n_full = report.n_full,
        n_tips = report.n_tips,
        n_islands = report.n_islands,
        n_trivial = report.n_trivial,
        n_circular = report.n_circular,
        n_unique_kmers = report.n_unique,
        n_updates = report.n_updates,
        "compaction state"
    );
}

fn build_command<H: KmerHasher>(
    config: CompactorConfig,
    input: PathBuf,
    output: Option<PathBuf>,
    formats: Vec<OutputFormat>,
    report_interval: u64,
) -> Result<()> {
    info!("Building compacted de Bruijn graph...");
    info!("  Input: {}", input.display());
    info!("  k: {}", config.k);
    info!("  Tag density: {}", config.tag_density);

    let compactor = stream_reads::<H>(config, &input, report_interval)?;

    let formats = if formats.is_empty() {
        vec![OutputFormat::Gfa1]
    } else {
        formats
    };
    let prefix = output.unwrap_or_else(|| PathBuf::from("cdbg"));

    let graph = compactor.cdbg();
    let graph = graph.lock();
    for format in formats {
        let snapshot: SnapshotFormat = format.into();
        let path = prefix.with_extension(snapshot.extension());
        let file = File::create(&path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        write_snapshot(&graph, snapshot, BufWriter::new(file))
            .with_context(|| format!("Failed to write snapshot: {}", path.display()))?;
        info!("Wrote {}", path.display());
    }
    Ok(())
}

fn stats_command<H: KmerHasher>(config: CompactorConfig, input: PathBuf) -> Result<()> {
    let compactor = stream_reads::<H>(config, &input, 0)?;
    let report = compactor.report();
    println!("reads           {}", report.n_reads);
    println!("unique k-mers   {}", report.n_unique);
    println!("unitigs         {}", report.n_unodes);
    println!("  full          {}", report.n_full);
    println!("  tips          {}", report.n_tips);
    println!("  islands       {}", report.n_islands);
    println!("  trivial       {}", report.n_trivial);
    println!("  circular      {}", report.n_circular);
    println!("decision nodes  {}", report.n_dnodes);
    println!("tags            {}", report.n_tags);
    println!("updates         {}", report.n_updates);
    Ok(())
}

use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;

use crate::config::{CycleRange, DemuxConfig};
use crate::error::Result;
use crate::pipeline::{check_outputs, DemuxPipeline, RunSummary};

/// Demultiplex per-cycle base-call files into per-sample FASTQ files.
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory containing the per-cycle base-call files (C<cycle>[_<tile>].bcl[.gz]).
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Sample sheet CSV with sampleId and barcode columns.
    #[arg(short, long)]
    pub samplesheet: Option<PathBuf>,

    /// Output directory for per-sample FASTQ files.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Maximum barcode mismatches for a read to be assigned [default: 1].
    #[arg(short, long)]
    pub max_mismatches: Option<usize>,

    /// Cycles holding the barcode, 1-based inclusive (e.g. "1-8") [default: first L cycles].
    #[arg(short, long)]
    pub barcode_cycles: Option<CycleRange>,

    /// Number of matcher threads [default: number of CPUs].
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Reads per parallel work unit.
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Gzip-compress the output FASTQ files.
    #[arg(long)]
    pub gzip: bool,

    /// Re-read every written file and check its record count.
    #[arg(long)]
    pub verify: bool,

    /// Name of the bucket for reads that match no sample [default: unassigned].
    #[arg(long)]
    pub unassigned_name: Option<String>,

    /// File name of the JSON run summary inside the output directory.
    #[arg(long)]
    pub stats_file: Option<String>,

    /// JSON configuration file; command-line flags override its values.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Builds the run configuration: file values (or defaults) overridden by flags.
    pub fn into_config(self) -> Result<DemuxConfig> {
        let mut config = match &self.config {
            Some(path) => {
                info!("Loading configuration from {:?}", path);
                DemuxConfig::from_json_file(path)?
            }
            None => DemuxConfig::default(),
        };

        if let Some(input) = self.input {
            config.input_dir = input;
        }
        if let Some(samplesheet) = self.samplesheet {
            config.sample_sheet = samplesheet;
        }
        if let Some(output) = self.output {
            config.output_dir = output;
        }
        if let Some(max_mismatches) = self.max_mismatches {
            config.max_mismatches = max_mismatches;
        }
        if let Some(range) = self.barcode_cycles {
            config.barcode_cycles = Some(range);
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size;
        }
        if self.gzip {
            config.compress = true;
        }
        if self.verify {
            config.verify = true;
        }
        if let Some(name) = self.unassigned_name {
            config.unassigned_name = name;
        }
        if let Some(stats_file) = self.stats_file {
            config.stats_file = stats_file;
        }
        Ok(config)
    }
}

/// Main entry point for CLI
pub fn run_cli(cli: Cli) -> Result<RunSummary> {
    let config = cli.into_config()?;
    info!(
        "Demultiplexing {:?} with {:?} into {:?}",
        config.input_dir, config.sample_sheet, config.output_dir
    );

    let pipeline = DemuxPipeline::new(config)?;
    let summary = pipeline.run()?;

    for failed in summary.failed_buckets() {
        warn!(
            "Output for '{}' is incomplete: {}",
            failed.name,
            failed.error.as_deref().unwrap_or("unknown error")
        );
    }
    check_outputs(&summary)?;

    info!(
        "Demultiplexing completed: {} reads in {:.2}s",
        summary.total_reads, summary.processing_time_seconds
    );
    Ok(summary)
}

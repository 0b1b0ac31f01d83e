//! Main entry point for the bcl_demux application.
//!
//! Demultiplexes raw sequencer output into per-sample FASTQ files:
//! 1. Load and validate the sample sheet.
//! 2. Decode per-cycle base-call files into reads.
//! 3. Match each read's barcode segment against the sample barcodes.
//! 4. Route reads into per-sample buckets.
//! 5. Write one FASTQ file per bucket plus a JSON run summary.

use bcl_demux::cli::{run_cli, Cli};
use bcl_demux::error::EXIT_USAGE;

// External Crate Imports
use clap::Parser;
use log::error;

/// Main function: parses arguments and runs the pipeline, mapping each
/// failure class to its own exit code.
fn main() -> anyhow::Result<()> {
    // Initialize logging; RUST_LOG overrides the default level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { EXIT_USAGE } else { 0 };
            // --help and --version print to stdout and exit successfully
            e.print()?;
            std::process::exit(code);
        }
    };

    if let Err(e) = run_cli(cli) {
        error!("{}", e);
        std::process::exit(e.exit_code());
    }
    Ok(())
}

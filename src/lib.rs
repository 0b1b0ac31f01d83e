//! Demultiplexing of per-cycle base-call files into per-sample FASTQ files.
//!
//! Reads are decoded from binary cycle files ([`io::bcl`]), matched to the
//! samples of a sample sheet by barcode Hamming distance
//! ([`pipeline::matcher`]), grouped per sample ([`pipeline::router`]) and
//! written as FASTQ ([`io::fastq`]).

pub mod bio;
pub mod cli;
pub mod config;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod utils;

pub use config::{CycleRange, DemuxConfig};
pub use error::{ConfigError, DemuxError, FormatError};
pub use pipeline::{DemuxPipeline, RunSummary};

//! Input/Output operations module.
//!
//! Handles reading the run inputs (per-cycle base-call files, the sample
//! sheet) and writing per-sample FASTQ files.

pub mod bcl; // Per-cycle binary base calls
pub mod fastq; // FASTQ writing and re-reading
pub mod samplesheet; // Sample-to-barcode table

pub use bcl::BclRun;
pub use samplesheet::{load_sample_sheet, SampleBarcode, SampleSheet};

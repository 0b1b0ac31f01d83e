//! Error taxonomy for the demultiplexer.
//!
//! Errors fall into three classes that callers can tell apart by exit code:
//! configuration problems (sample sheet, cycle ranges), malformed base-call
//! data, and I/O failures. Unassigned reads are not errors.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::utils::parallel::ParallelError;

/// Exit code for usage / argument errors (reported by clap).
pub const EXIT_USAGE: i32 = 1;
/// Exit code for [`ConfigError`].
pub const EXIT_CONFIG: i32 = 2;
/// Exit code for [`FormatError`].
pub const EXIT_FORMAT: i32 = 3;
/// Exit code for I/O failures, including partial write failures.
pub const EXIT_IO: i32 = 4;
/// Exit code for internal errors.
pub const EXIT_INTERNAL: i32 = 5;

/// Problems with the sample sheet or the run configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("empty sample sheet: {0:?}")]
    EmptySampleSheet(PathBuf),

    #[error(
        "inconsistent barcode length: sample '{sample_id}' has {found} bases, expected {expected}"
    )]
    InconsistentBarcodeLength {
        sample_id: String,
        expected: usize,
        found: usize,
    },

    #[error("duplicate barcode {barcode}: used by '{first}' and '{second}'")]
    DuplicateBarcode {
        barcode: String,
        first: String,
        second: String,
    },

    #[error("duplicate sample id '{0}'")]
    DuplicateSampleId(String),

    #[error("invalid barcode '{barcode}' for sample '{sample_id}': only A, C, G, T and N are allowed")]
    InvalidBarcode { sample_id: String, barcode: String },

    #[error("invalid sample id '{sample_id}': {reason}")]
    InvalidSampleId { sample_id: String, reason: String },

    #[error("chunk size must be at least 1")]
    InvalidChunkSize,

    #[error("invalid {setting} '{name}': {reason}")]
    InvalidFileName {
        setting: &'static str,
        name: String,
        reason: &'static str,
    },

    #[error("sample sheet {path:?} is missing a '{column}' column")]
    MissingColumn { path: PathBuf, column: String },

    #[error("failed to parse sample sheet {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("invalid cycle range '{0}': expected START-END with 1 <= START <= END")]
    InvalidCycleRange(String),

    #[error("barcode cycles {range} cover {found} cycles but sample barcodes are {expected} bases long")]
    BarcodeRangeLength {
        range: String,
        expected: usize,
        found: usize,
    },

    #[error("barcode cycles {range} exceed the {cycles} cycles available")]
    BarcodeRangeOutOfBounds { range: String, cycles: usize },

    #[error("failed to load config file {path:?}: {reason}")]
    ConfigFile { path: PathBuf, reason: String },

    #[error("missing required setting '{0}'")]
    MissingSetting(&'static str),
}

/// Malformed or inconsistent base-call data.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("{path:?}: file is too short to hold a cluster count")]
    MissingHeader { path: PathBuf },

    #[error("{first:?} and {second:?} both hold the same cycle and tile")]
    DuplicateCycleFile { first: PathBuf, second: PathBuf },

    #[error("{path:?}: cluster count {found} disagrees with {expected} seen in earlier cycles of this tile")]
    ClusterCountMismatch {
        path: PathBuf,
        expected: u32,
        found: u32,
    },

    #[error("{path:?}: truncated, expected {expected} bytes of base calls, found {found}")]
    Truncated {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("{path:?}: {extra} unexpected bytes after the last cluster")]
    TrailingBytes { path: PathBuf, extra: usize },
}

/// Top-level error returned by every pipeline stage.
#[derive(Error, Debug)]
pub enum DemuxError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("format error: {0}")]
    Format(#[from] FormatError),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{failed} of {total} output files could not be written")]
    PartialWrite { failed: usize, total: usize },

    #[error("{reads} reads but {assignments} assignments")]
    AssignmentMismatch { reads: usize, assignments: usize },

    #[error("parallel execution error: {0}")]
    Parallel(#[from] ParallelError),
}

impl DemuxError {
    /// Wraps an I/O error with the path it occurred on.
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        DemuxError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Process exit code for this error class.
    pub fn exit_code(&self) -> i32 {
        match self {
            DemuxError::Config(ConfigError::MissingSetting(_)) => EXIT_USAGE,
            DemuxError::Config(_) => EXIT_CONFIG,
            DemuxError::Format(_) => EXIT_FORMAT,
            DemuxError::Io { .. } | DemuxError::PartialWrite { .. } => EXIT_IO,
            DemuxError::AssignmentMismatch { .. } | DemuxError::Parallel(_) => EXIT_INTERNAL,
        }
    }
}

pub type Result<T> = std::result::Result<T, DemuxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_per_class() {
        let config: DemuxError = ConfigError::EmptySampleSheet(PathBuf::from("s.csv")).into();
        let format: DemuxError = FormatError::MissingHeader {
            path: PathBuf::from("C1.bcl"),
        }
        .into();
        let io = DemuxError::io("out", io::Error::new(io::ErrorKind::NotFound, "gone"));
        let partial = DemuxError::PartialWrite { failed: 1, total: 3 };

        assert_eq!(config.exit_code(), EXIT_CONFIG);
        assert_eq!(format.exit_code(), EXIT_FORMAT);
        assert_eq!(io.exit_code(), EXIT_IO);
        assert_eq!(partial.exit_code(), EXIT_IO);
        let missing: DemuxError = ConfigError::MissingSetting("input").into();
        assert_eq!(missing.exit_code(), EXIT_USAGE);
    }

    #[test]
    fn test_messages_name_the_file() {
        let err: DemuxError = FormatError::ClusterCountMismatch {
            path: PathBuf::from("run/C3.bcl"),
            expected: 10,
            found: 9,
        }
        .into();
        let msg = err.to_string();
        assert!(msg.contains("run/C3.bcl"));
        assert!(msg.contains("10"));
    }
}

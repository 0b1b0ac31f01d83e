//! Run configuration.
//!
//! A [`DemuxConfig`] can be built from command-line flags, loaded from a JSON
//! file, or both (flags win). Cycle numbers are 1-based throughout, matching
//! how instruments number their cycle files.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ConfigError;

/// Default maximum number of mismatches tolerated between a read barcode and
/// a sample barcode.
pub const DEFAULT_MAX_MISMATCHES: usize = 1;

/// Name of the bucket (and output file) for reads that match no sample.
pub const DEFAULT_UNASSIGNED_NAME: &str = "unassigned";

/// Default name of the JSON run summary written next to the FASTQ files.
pub const DEFAULT_STATS_FILE: &str = "demux_stats.json";

/// Reads per parallel work unit in the matcher.
pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

/// An inclusive, 1-based range of sequencing cycles, e.g. `1-8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleRange {
    pub start: usize,
    pub end: usize,
}

impl CycleRange {
    pub fn new(start: usize, end: usize) -> Result<Self, ConfigError> {
        if start == 0 || end < start {
            return Err(ConfigError::InvalidCycleRange(format!("{}-{}", start, end)));
        }
        Ok(CycleRange { start, end })
    }

    /// The first `len` cycles of the run.
    pub fn leading(len: usize) -> Result<Self, ConfigError> {
        Self::new(1, len)
    }

    /// Number of cycles covered.
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    /// Zero-based half-open index range, suitable for slicing per-cycle data.
    pub fn as_index_range(&self) -> Range<usize> {
        (self.start - 1)..self.end
    }
}

impl fmt::Display for CycleRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for CycleRange {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidCycleRange(s.to_string());
        let trimmed = s.trim();
        let (start, end) = match trimmed.split_once('-') {
            Some((a, b)) => (a.trim(), b.trim()),
            None => (trimmed, trimmed),
        };
        let start: usize = start.parse().map_err(|_| invalid())?;
        let end: usize = end.parse().map_err(|_| invalid())?;
        CycleRange::new(start, end).map_err(|_| invalid())
    }
}

/// Reports why `name` cannot be used as a file name directly inside the
/// output directory, or `None` if it can.
pub fn file_name_problem(name: &str) -> Option<&'static str> {
    if name.is_empty() {
        Some("name is empty")
    } else if name.contains('/') || name.contains('\\') {
        Some("name contains a path separator")
    } else if name == "." || name == ".." {
        Some("name is not a valid file name")
    } else {
        None
    }
}

/// Settings for one demultiplexing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemuxConfig {
    /// Directory holding the per-cycle base-call files.
    pub input_dir: PathBuf,
    /// Two-column `sampleId,barcode` CSV.
    pub sample_sheet: PathBuf,
    /// Destination for per-sample FASTQ files.
    pub output_dir: PathBuf,
    pub max_mismatches: usize,
    /// Cycles holding the barcode. `None` means the first L cycles, where L
    /// is the sample-sheet barcode length.
    pub barcode_cycles: Option<CycleRange>,
    pub threads: usize,
    pub chunk_size: usize,
    /// Gzip-compress the FASTQ output.
    pub compress: bool,
    /// Re-parse every written file and check its record count.
    pub verify: bool,
    pub unassigned_name: String,
    pub stats_file: String,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        DemuxConfig {
            input_dir: PathBuf::new(),
            sample_sheet: PathBuf::new(),
            output_dir: PathBuf::new(),
            max_mismatches: DEFAULT_MAX_MISMATCHES,
            barcode_cycles: None,
            threads: num_cpus::get(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            compress: false,
            verify: false,
            unassigned_name: DEFAULT_UNASSIGNED_NAME.to_string(),
            stats_file: DEFAULT_STATS_FILE.to_string(),
        }
    }
}

impl DemuxConfig {
    /// Loads a configuration from a JSON file. Missing keys take their
    /// default values.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| ConfigError::ConfigFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| ConfigError::ConfigFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Checks that the required paths are set and the numeric settings are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingSetting("input"));
        }
        if self.sample_sheet.as_os_str().is_empty() {
            return Err(ConfigError::MissingSetting("samplesheet"));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingSetting("output"));
        }
        if self.unassigned_name.is_empty() {
            return Err(ConfigError::MissingSetting("unassigned_name"));
        }
        // Both end up as file names inside the output directory.
        for (setting, name) in [
            ("unassigned_name", &self.unassigned_name),
            ("stats_file", &self.stats_file),
        ] {
            if let Some(reason) = file_name_problem(name) {
                return Err(ConfigError::InvalidFileName {
                    setting,
                    name: name.clone(),
                    reason,
                });
            }
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize);
        }
        // Ranges read from JSON skip FromStr.
        if let Some(range) = self.barcode_cycles {
            CycleRange::new(range.start, range.end)?;
        }
        Ok(())
    }

    /// File name (without directory) for a bucket's FASTQ output.
    pub fn fastq_file_name(&self, bucket: &str) -> String {
        if self.compress {
            format!("{}.fastq.gz", bucket)
        } else {
            format!("{}.fastq", bucket)
        }
    }
}

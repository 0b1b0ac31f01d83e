//! Run summary.
//!
//! Collected after the FASTQ files are written; saved as JSON next to the
//! output and logged as a table.

use serde::Serialize;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{DemuxError, Result};
use crate::io::fastq::WriteOutcome;
use crate::pipeline::router::{Buckets, SampleBucket};

/// Per-bucket statistics.
#[derive(Debug, Clone, Serialize)]
pub struct BucketStats {
    pub name: String,
    pub barcode: Option<String>,
    pub reads: usize,
    pub perfect: usize,
    pub mismatched: usize,
    pub path: PathBuf,
    /// Write (or verification) failure, if any.
    pub error: Option<String>,
}

/// Summary of one demultiplexing run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub total_reads: usize,
    pub assigned_reads: usize,
    pub unassigned_reads: usize,
    pub cycles: usize,
    pub tiles: usize,
    pub barcode_cycles: Option<String>,
    pub barcode_len: usize,
    pub max_mismatches: usize,
    pub buckets: Vec<BucketStats>,
    pub processing_time_seconds: f64,
}

/// Run-level values that do not come from the buckets.
#[derive(Debug, Clone, Default)]
pub struct RunInfo {
    pub cycles: usize,
    pub tiles: usize,
    pub barcode_cycles: Option<String>,
    pub barcode_len: usize,
    pub max_mismatches: usize,
}

fn bucket_stats(bucket: &SampleBucket, outcome: Option<&WriteOutcome>) -> BucketStats {
    BucketStats {
        name: bucket.name.clone(),
        barcode: bucket.barcode.clone(),
        reads: bucket.len(),
        perfect: bucket.perfect,
        mismatched: bucket.mismatched(),
        path: outcome.map(|o| o.path.clone()).unwrap_or_default(),
        error: outcome.and_then(|o| o.error.as_ref().map(|e| e.to_string())),
    }
}

impl RunSummary {
    /// Builds the summary from the routed buckets and their write outcomes.
    ///
    /// `outcomes` are matched to buckets by name.
    pub fn new(info: RunInfo, buckets: &Buckets, outcomes: &[WriteOutcome]) -> Self {
        let stats: Vec<BucketStats> = buckets
            .iter()
            .map(|bucket| {
                let outcome = outcomes.iter().find(|o| o.name == bucket.name);
                bucket_stats(bucket, outcome)
            })
            .collect();

        let unassigned_reads = buckets.unassigned.len();
        let total_reads = buckets.total_reads();
        RunSummary {
            total_reads,
            assigned_reads: total_reads - unassigned_reads,
            unassigned_reads,
            cycles: info.cycles,
            tiles: info.tiles,
            barcode_cycles: info.barcode_cycles,
            barcode_len: info.barcode_len,
            max_mismatches: info.max_mismatches,
            buckets: stats,
            processing_time_seconds: 0.0,
        }
    }

    /// Buckets whose output could not be written or verified.
    pub fn failed_buckets(&self) -> impl Iterator<Item = &BucketStats> {
        self.buckets.iter().filter(|b| b.error.is_some())
    }

    /// Writes the summary as pretty-printed JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| DemuxError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(|e| DemuxError::io(path, e.into()))?;
        writer
            .write_all(b"\n")
            .and_then(|_| writer.flush())
            .map_err(|e| DemuxError::io(path, e))
    }

    /// Renders a plain-text table of the buckets.
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<24} {:<16} {:>12} {:>10} {:>10} {:>8}",
            "sample", "barcode", "reads", "perfect", "mismatch", "pct"
        );
        for bucket in &self.buckets {
            let pct = if self.total_reads > 0 {
                100.0 * bucket.reads as f64 / self.total_reads as f64
            } else {
                0.0
            };
            let _ = writeln!(
                out,
                "{:<24} {:<16} {:>12} {:>10} {:>10} {:>7.2}%{}",
                bucket.name,
                bucket.barcode.as_deref().unwrap_or("-"),
                bucket.reads,
                bucket.perfect,
                bucket.mismatched,
                pct,
                if bucket.error.is_some() { "  FAILED" } else { "" }
            );
        }
        let _ = write!(
            out,
            "total {} reads, {} assigned, {} unassigned",
            self.total_reads, self.assigned_reads, self.unassigned_reads
        );
        out
    }
}

//! Routing reads into per-sample buckets.

use log::info;

use crate::bio::Read;
use crate::error::{DemuxError, Result};
use crate::io::samplesheet::SampleSheet;
use crate::pipeline::matcher::{Assignment, AssignmentResult};

/// Reads destined for one output file.
#[derive(Debug, Clone)]
pub struct SampleBucket {
    /// Sample id, or the reserved unassigned name.
    pub name: String,
    /// Expected barcode; `None` for the unassigned bucket.
    pub barcode: Option<String>,
    pub reads: Vec<Read>,
    /// Reads matched with zero mismatches.
    pub perfect: usize,
}

impl SampleBucket {
    fn new(name: String, barcode: Option<String>) -> Self {
        SampleBucket {
            name,
            barcode,
            reads: Vec::new(),
            perfect: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.reads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reads.is_empty()
    }

    /// Reads matched with at least one mismatch.
    pub fn mismatched(&self) -> usize {
        if self.barcode.is_some() {
            self.reads.len() - self.perfect
        } else {
            0
        }
    }
}

/// All buckets of a run: one per sample in sample-sheet order, plus the
/// unassigned bucket.
#[derive(Debug, Clone)]
pub struct Buckets {
    pub samples: Vec<SampleBucket>,
    pub unassigned: SampleBucket,
}

impl Buckets {
    /// Total number of reads across every bucket.
    pub fn total_reads(&self) -> usize {
        self.samples.iter().map(SampleBucket::len).sum::<usize>() + self.unassigned.len()
    }

    /// Sample buckets followed by the unassigned bucket.
    pub fn iter(&self) -> impl Iterator<Item = &SampleBucket> {
        self.samples.iter().chain(std::iter::once(&self.unassigned))
    }
}

/// Partitions reads by their assignment.
///
/// Every sample gets a bucket even if no read matched it. Reads keep their
/// original relative order within a bucket; each read ends up in exactly one
/// bucket.
///
/// # Arguments
///
/// * `reads` - Reads in decode order; ownership moves into the buckets.
/// * `assignments` - One assignment per read, in the same order.
/// * `sheet` - The sample sheet the assignments index into.
/// * `unassigned_name` - Name of the bucket for unmatched reads.
pub fn route(
    reads: Vec<Read>,
    assignments: &[AssignmentResult],
    sheet: &SampleSheet,
    unassigned_name: &str,
) -> Result<Buckets> {
    if reads.len() != assignments.len() {
        return Err(DemuxError::AssignmentMismatch {
            reads: reads.len(),
            assignments: assignments.len(),
        });
    }

    let mut samples: Vec<SampleBucket> = sheet
        .samples()
        .iter()
        .map(|s| SampleBucket::new(s.sample_id.clone(), Some(s.barcode_str())))
        .collect();
    let mut unassigned = SampleBucket::new(unassigned_name.to_string(), None);

    for (read, result) in reads.into_iter().zip(assignments) {
        debug_assert_eq!(read.id, result.read_id);
        match result.assignment {
            Assignment::Sample { index, mismatches } if index < samples.len() => {
                let bucket = &mut samples[index];
                if mismatches == 0 {
                    bucket.perfect += 1;
                }
                bucket.reads.push(read);
            }
            _ => unassigned.reads.push(read),
        }
    }

    for bucket in &samples {
        info!("{}: {} reads", bucket.name, bucket.len());
    }
    info!("{}: {} reads", unassigned.name, unassigned.len());

    Ok(Buckets {
        samples,
        unassigned,
    })
}

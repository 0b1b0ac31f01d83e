//! Barcode matching.
//!
//! Every read barcode is compared against every sample barcode by Hamming
//! distance. The smallest distance wins; among equal distances the sample
//! that comes first in the sample sheet wins. A read is assigned only if the
//! winning distance is within `max_mismatches`.
//!
//! Matching runs as a data-parallel map: barcode segments and the sample
//! table are packed into flat read-only buffers, and each task fills a
//! disjoint chunk of a pre-allocated assignment array.

use log::{debug, info};
use serde::Serialize;

use crate::bio::{hamming_distance, Read};
use crate::io::samplesheet::SampleSheet;
use crate::utils::parallel::ParallelExecutor;

/// Outcome of matching one read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Assignment {
    /// Assigned to the sample at `index` in sample-sheet order, with the
    /// number of mismatching barcode bases.
    Sample { index: usize, mismatches: usize },
    Unassigned,
}

impl Assignment {
    pub fn sample_index(&self) -> Option<usize> {
        match self {
            Assignment::Sample { index, .. } => Some(*index),
            Assignment::Unassigned => None,
        }
    }
}

/// The assignment for a single read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AssignmentResult {
    pub read_id: u64,
    pub assignment: Assignment,
}

/// Sample barcodes packed into one contiguous buffer.
#[derive(Debug, Clone)]
struct BarcodeTable {
    packed: Vec<u8>,
    barcode_len: usize,
}

impl BarcodeTable {
    fn from_sheet(sheet: &SampleSheet) -> Self {
        let barcode_len = sheet.barcode_len();
        let mut packed = Vec::with_capacity(sheet.len() * barcode_len);
        for sample in sheet.samples() {
            packed.extend_from_slice(&sample.barcode);
        }
        BarcodeTable {
            packed,
            barcode_len,
        }
    }

    fn iter(&self) -> impl Iterator<Item = &[u8]> {
        // chunks_exact panics on a zero size
        self.packed.chunks_exact(self.barcode_len.max(1))
    }
}

/// Assigns reads to samples by nearest barcode.
///
/// Stateless apart from the read-only sample table; safe to reuse across
/// runs and to call concurrently.
#[derive(Debug, Clone)]
pub struct BarcodeMatcher {
    table: BarcodeTable,
    max_mismatches: usize,
}

impl BarcodeMatcher {
    pub fn new(sheet: &SampleSheet, max_mismatches: usize) -> Self {
        BarcodeMatcher {
            table: BarcodeTable::from_sheet(sheet),
            max_mismatches,
        }
    }

    /// Matches one barcode against the sample table.
    ///
    /// Scans every sample and keeps the first index holding the running
    /// minimum; an exact match does not end the scan early.
    pub fn assign(&self, barcode: &[u8]) -> Assignment {
        let mut best: Option<(usize, usize)> = None;
        for (index, sample) in self.table.iter().enumerate() {
            let distance = hamming_distance(barcode, sample);
            match best {
                Some((_, best_distance)) if distance >= best_distance => {}
                _ => best = Some((index, distance)),
            }
        }
        match best {
            Some((index, mismatches)) if mismatches <= self.max_mismatches => {
                Assignment::Sample { index, mismatches }
            }
            _ => Assignment::Unassigned,
        }
    }

    /// Matches every read serially. Reference implementation for
    /// [`assign_all`](Self::assign_all).
    pub fn assign_serial(&self, reads: &[Read]) -> Vec<AssignmentResult> {
        reads
            .iter()
            .map(|read| AssignmentResult {
                read_id: read.id,
                assignment: self.assign(&read.barcode),
            })
            .collect()
    }

    /// Matches every read on the executor's thread pool.
    ///
    /// The output is indexed by read position and equals
    /// [`assign_serial`](Self::assign_serial) for the same input.
    pub fn assign_all(&self, reads: &[Read], executor: &ParallelExecutor) -> Vec<AssignmentResult> {
        let barcode_len = self.table.barcode_len;

        // Stage all barcode segments in one buffer before dispatch.
        let mut segments = Vec::with_capacity(reads.len() * barcode_len);
        for read in reads {
            debug_assert_eq!(read.barcode.len(), barcode_len);
            segments.extend_from_slice(&read.barcode);
        }
        debug!(
            "Matching {} reads against {} samples ({} threads)",
            reads.len(),
            self.table.packed.len() / barcode_len.max(1),
            executor.threads()
        );

        let mut slots = vec![Assignment::Unassigned; reads.len()];
        executor.fill_slots(&mut slots, |i| {
            let start = i * barcode_len;
            self.assign(&segments[start..start + barcode_len])
        });

        let results: Vec<AssignmentResult> = reads
            .iter()
            .zip(slots)
            .map(|(read, assignment)| AssignmentResult {
                read_id: read.id,
                assignment,
            })
            .collect();

        let assigned = results
            .iter()
            .filter(|r| r.assignment != Assignment::Unassigned)
            .count();
        info!(
            "Assigned {} of {} reads (max {} mismatches)",
            assigned,
            results.len(),
            self.max_mismatches
        );
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::parallel::ParallelConfig;
    use std::path::Path;

    fn sheet(entries: &[(&str, &str)]) -> SampleSheet {
        SampleSheet::from_entries(
            entries.iter().map(|&(s, b)| (s, b)),
            "unassigned",
            Path::new("test.csv"),
        )
        .unwrap()
    }

    fn scenario_sheet() -> SampleSheet {
        sheet(&[("S1", "ACGT"), ("S2", "ACGG")])
    }

    fn read(id: u64, barcode: &str) -> Read {
        Read::new(id, 0, id as u32, barcode.as_bytes().to_vec(), b"AC".to_vec(), b"II".to_vec())
    }

    fn executor(threads: usize, chunk_size: usize) -> ParallelExecutor {
        ParallelExecutor::new(Some(ParallelConfig {
            threads,
            chunk_size,
        }))
        .unwrap()
    }

    #[test]
    fn test_scenario_a_exact_match() {
        let matcher = BarcodeMatcher::new(&scenario_sheet(), 1);
        assert_eq!(
            matcher.assign(b"ACGT"),
            Assignment::Sample {
                index: 0,
                mismatches: 0
            }
        );
    }

    #[test]
    fn test_scenario_b_single_mismatch() {
        let matcher = BarcodeMatcher::new(&scenario_sheet(), 1);
        assert_eq!(
            matcher.assign(b"ACGA"),
            Assignment::Sample {
                index: 0,
                mismatches: 1
            }
        );
    }

    #[test]
    fn test_scenario_c_too_distant() {
        let matcher = BarcodeMatcher::new(&scenario_sheet(), 1);
        assert_eq!(matcher.assign(b"TTTT"), Assignment::Unassigned);
    }

    #[test]
    fn test_exact_match_wins_at_any_threshold() {
        let sheet = sheet(&[("S1", "AAAA"), ("S2", "CCCC"), ("S3", "GGGG")]);
        for max_mismatches in 0..5 {
            let matcher = BarcodeMatcher::new(&sheet, max_mismatches);
            assert_eq!(matcher.assign(b"CCCC").sample_index(), Some(1));
            assert_eq!(matcher.assign(b"GGGG").sample_index(), Some(2));
        }
    }

    #[test]
    fn test_exact_match_later_in_sheet_beats_earlier_near_match() {
        // S1 is one mismatch away, S2 is exact: the minimum wins, not the first
        // match within threshold.
        let sheet = sheet(&[("S1", "ACGA"), ("S2", "ACGT")]);
        let matcher = BarcodeMatcher::new(&sheet, 1);
        assert_eq!(
            matcher.assign(b"ACGT"),
            Assignment::Sample {
                index: 1,
                mismatches: 0
            }
        );
    }

    #[test]
    fn test_tie_break_prefers_earlier_sample() {
        // ACGC is one away from both ACGT and ACGG.
        let matcher = BarcodeMatcher::new(&scenario_sheet(), 1);
        for _ in 0..10 {
            assert_eq!(matcher.assign(b"ACGC").sample_index(), Some(0));
        }

        let reversed = sheet(&[("S2", "ACGG"), ("S1", "ACGT")]);
        let matcher = BarcodeMatcher::new(&reversed, 1);
        assert_eq!(matcher.assign(b"ACGC").sample_index(), Some(0));
    }

    #[test]
    fn test_zero_threshold_requires_exact_match() {
        let matcher = BarcodeMatcher::new(&scenario_sheet(), 0);
        assert_eq!(matcher.assign(b"ACGA"), Assignment::Unassigned);
        assert_eq!(matcher.assign(b"ACGT").sample_index(), Some(0));
    }

    #[test]
    fn test_minimum_above_threshold_is_unassigned() {
        let sheet = sheet(&[("S1", "AAAAAA"), ("S2", "CCCCCC")]);
        let matcher = BarcodeMatcher::new(&sheet, 2);
        // three away from S1, three away from S2
        assert_eq!(matcher.assign(b"AAACCC"), Assignment::Unassigned);
        assert_eq!(matcher.assign(b"AAAACC").sample_index(), Some(0));
    }

    #[test]
    fn test_no_calls_count_as_mismatches() {
        let matcher = BarcodeMatcher::new(&scenario_sheet(), 1);
        assert_eq!(
            matcher.assign(b"NCGT"),
            Assignment::Sample {
                index: 0,
                mismatches: 1
            }
        );
        assert_eq!(matcher.assign(b"NNGT"), Assignment::Unassigned);
    }

    #[test]
    fn test_parallel_matches_serial() {
        let sheet = sheet(&[
            ("S1", "ACGTAC"),
            ("S2", "TTGACC"),
            ("S3", "GGCATA"),
            ("S4", "CATGCA"),
        ]);
        let matcher = BarcodeMatcher::new(&sheet, 2);
        let alphabet = b"ACGTN";
        let reads: Vec<Read> = (0..1000u64)
            .map(|i| {
                let barcode: String = (0..6)
                    .map(|j| alphabet[((i * 7 + j * 13 + i / 5) % 5) as usize] as char)
                    .collect();
                read(i, &barcode)
            })
            .collect();

        let serial = matcher.assign_serial(&reads);
        for (threads, chunk) in [(1, 1000), (4, 7), (8, 1)] {
            let parallel = matcher.assign_all(&reads, &executor(threads, chunk));
            assert_eq!(parallel, serial);
        }
        assert!(serial
            .iter()
            .enumerate()
            .all(|(i, r)| r.read_id == i as u64));
    }

    #[test]
    fn test_assign_all_empty() {
        let matcher = BarcodeMatcher::new(&scenario_sheet(), 1);
        assert!(matcher.assign_all(&[], &executor(2, 4)).is_empty());
    }
}

//! Decoded sequencing reads.
//!
//! Each cycle file stores one byte per cluster. The low two bits select the
//! base and the upper six bits carry the Phred quality; a zero byte is a
//! no-call.

use crate::bio::PHRED_OFFSET;

const BASES: [u8; 4] = [b'A', b'C', b'G', b'T'];

/// Base emitted for a no-call.
pub const NO_CALL_BASE: u8 = b'N';

/// Decodes one base-call byte into `(base, quality symbol)`.
///
/// The quality symbol is Phred+33. A zero byte decodes to `N` with quality 0.
#[inline]
pub fn decode_base_call(byte: u8) -> (u8, u8) {
    if byte == 0 {
        return (NO_CALL_BASE, PHRED_OFFSET);
    }
    let base = BASES[(byte & 0b11) as usize];
    let quality = (byte >> 2) + PHRED_OFFSET;
    (base, quality)
}

/// Encodes a base and a Phred quality back into a base-call byte.
///
/// `N` (or any non-ACGT byte) encodes to a no-call. Qualities above 63 are
/// clamped. Used to build cycle files for tests and fixtures.
pub fn encode_base_call(base: u8, quality: u8) -> u8 {
    let code = match base {
        b'A' => 0,
        b'C' => 1,
        b'G' => 2,
        b'T' => 3,
        _ => return 0,
    };
    let byte = (quality.min(63) << 2) | code;
    // A/Q0 would collide with the no-call byte.
    if byte == 0 {
        1 << 2
    } else {
        byte
    }
}

/// One cluster's read, split into its barcode segment and payload.
///
/// Invariant: `quality.len() == sequence.len()`. Reads are built once by the
/// base-call reader and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Read {
    /// Ordinal of the read across the whole run.
    pub id: u64,
    /// Tile the cluster was imaged on (0 for single-tile layouts).
    pub tile: u32,
    /// Cluster index within the tile.
    pub cluster: u32,
    /// Bases from the configured barcode cycles.
    pub barcode: Vec<u8>,
    /// Bases from every non-barcode cycle, in cycle order.
    pub sequence: Vec<u8>,
    /// Phred+33 quality symbols matching `sequence`.
    pub quality: Vec<u8>,
}

impl Read {
    pub fn new(
        id: u64,
        tile: u32,
        cluster: u32,
        barcode: Vec<u8>,
        sequence: Vec<u8>,
        quality: Vec<u8>,
    ) -> Self {
        debug_assert_eq!(sequence.len(), quality.len());
        Read {
            id,
            tile,
            cluster,
            barcode,
            sequence,
            quality,
        }
    }

    /// FASTQ header text (without the leading `@`).
    pub fn header(&self) -> String {
        format!(
            "{}:{}:{} BC:{}",
            self.id,
            self.tile,
            self.cluster,
            String::from_utf8_lossy(&self.barcode)
        )
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

//! Sequence-level building blocks.
//!
//! `read` holds the decoded read record and the base-call byte encoding;
//! `barcode` holds barcode validation and distance functions.

pub mod barcode;
pub mod read;

pub use barcode::hamming_distance;
pub use read::Read;

/// Bases a sample barcode may contain.
pub const BARCODE_ALPHABET: &[u8] = b"ACGTN";

/// Offset added to Phred quality values when rendering FASTQ.
pub const PHRED_OFFSET: u8 = 33;

/// Checks if a byte is an allowed (upper-case) barcode base.
pub fn is_barcode_base(base: u8) -> bool {
    BARCODE_ALPHABET.contains(&base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_barcode_base() {
        for &b in b"ACGTN" {
            assert!(is_barcode_base(b));
        }
        assert!(!is_barcode_base(b'a'));
        assert!(!is_barcode_base(b'X'));
        assert!(!is_barcode_base(b' '));
    }
}

//! Barcode comparison.

/// Counts positions at which `a` and `b` differ.
///
/// Both slices are expected to have the same length; lengths are validated
/// when the sample sheet is loaded and the barcode cycles are resolved. Only
/// the overlapping prefix is compared if they ever disagree.
#[inline]
pub fn hamming_distance(a: &[u8], b: &[u8]) -> usize {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).filter(|(x, y)| x != y).count()
}

/// Returns the number of `N` bases in a barcode.
pub fn count_ambiguous(barcode: &[u8]) -> usize {
    barcode.iter().filter(|&&b| b == b'N').count()
}

//! Sample sheet loading.
//!
//! The sample sheet is a headered CSV mapping sample identifiers to barcode
//! sequences:
//!
//! ```text
//! sampleId,barcode
//! S1,ACGTACGT
//! S2,TTGACCAA
//! ```
//!
//! Row order is significant: it is the tie-break priority used when a read
//! barcode is equally close to several samples.

use indexmap::IndexMap;
use log::{debug, info, warn};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::bio::{self, barcode::count_ambiguous};
use crate::config::file_name_problem;
use crate::error::{ConfigError, DemuxError, Result};

/// Accepted (case-insensitive) headers for the sample column.
const SAMPLE_COLUMNS: &[&str] = &["sampleid", "sample_id", "sample", "name"];
/// Accepted (case-insensitive) headers for the barcode column.
const BARCODE_COLUMNS: &[&str] = &["barcode", "index"];

/// One sample and its expected barcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleBarcode {
    pub sample_id: String,
    pub barcode: Vec<u8>,
}

impl SampleBarcode {
    pub fn barcode_str(&self) -> String {
        String::from_utf8_lossy(&self.barcode).into_owned()
    }
}

/// Validated, ordered list of samples. Read-only once loaded.
#[derive(Debug, Clone)]
pub struct SampleSheet {
    samples: Vec<SampleBarcode>,
    barcode_len: usize,
}

impl SampleSheet {
    /// Builds a sample sheet from `(sample_id, barcode)` pairs in priority order.
    ///
    /// Barcodes are upper-cased before validation. Fails if the list is empty,
    /// barcode lengths differ, a barcode or sample id repeats, a barcode holds
    /// anything other than `ACGTN`, or a sample id is unusable as a file name.
    ///
    /// # Arguments
    ///
    /// * `entries` - Sample ids and barcodes in sample-sheet order.
    /// * `reserved_name` - Name of the unassigned bucket; no sample may use it.
    /// * `source` - Where the entries came from, for error messages.
    pub fn from_entries<I, S, B>(
        entries: I,
        reserved_name: &str,
        source: &Path,
    ) -> std::result::Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (S, B)>,
        S: Into<String>,
        B: AsRef<str>,
    {
        let mut samples: Vec<SampleBarcode> = Vec::new();
        let mut by_barcode: IndexMap<Vec<u8>, usize> = IndexMap::new();
        let mut by_id: IndexMap<String, usize> = IndexMap::new();
        let mut barcode_len: Option<usize> = None;

        for (sample_id, barcode) in entries {
            let sample_id: String = sample_id.into();
            let barcode = barcode.as_ref().trim().to_ascii_uppercase().into_bytes();

            validate_sample_id(&sample_id, reserved_name)?;

            if barcode.is_empty() || !barcode.iter().all(|&b| bio::is_barcode_base(b)) {
                return Err(ConfigError::InvalidBarcode {
                    sample_id,
                    barcode: String::from_utf8_lossy(&barcode).into_owned(),
                });
            }

            match barcode_len {
                None => barcode_len = Some(barcode.len()),
                Some(expected) if expected != barcode.len() => {
                    return Err(ConfigError::InconsistentBarcodeLength {
                        sample_id,
                        expected,
                        found: barcode.len(),
                    });
                }
                Some(_) => {}
            }

            if by_id.contains_key(&sample_id) {
                return Err(ConfigError::DuplicateSampleId(sample_id));
            }

            if let Some(&first) = by_barcode.get(&barcode) {
                return Err(ConfigError::DuplicateBarcode {
                    barcode: String::from_utf8_lossy(&barcode).into_owned(),
                    first: samples[first].sample_id.clone(),
                    second: sample_id,
                });
            }

            if count_ambiguous(&barcode) > 0 {
                warn!(
                    "Sample '{}' barcode {} contains N; N only matches N in reads.",
                    sample_id,
                    String::from_utf8_lossy(&barcode)
                );
            }

            let index = samples.len();
            by_barcode.insert(barcode.clone(), index);
            by_id.insert(sample_id.clone(), index);
            samples.push(SampleBarcode { sample_id, barcode });
        }

        let barcode_len =
            barcode_len.ok_or_else(|| ConfigError::EmptySampleSheet(source.to_path_buf()))?;

        Ok(SampleSheet {
            samples,
            barcode_len,
        })
    }

    /// Samples in sample-sheet order.
    pub fn samples(&self) -> &[SampleBarcode] {
        &self.samples
    }

    /// The common barcode length L.
    pub fn barcode_len(&self) -> usize {
        self.barcode_len
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

fn validate_sample_id(sample_id: &str, reserved_name: &str) -> std::result::Result<(), ConfigError> {
    let reason = if sample_id == reserved_name {
        Some("sample id is reserved for unassigned reads")
    } else {
        file_name_problem(sample_id)
    };
    match reason {
        Some(reason) => Err(ConfigError::InvalidSampleId {
            sample_id: sample_id.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

fn find_column(headers: &csv::StringRecord, accepted: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| accepted.iter().any(|a| h.trim().eq_ignore_ascii_case(a)))
}

/// Loads and validates a sample sheet CSV.
///
/// # Arguments
///
/// * `path` - Path to the sample sheet.
/// * `reserved_name` - Name of the unassigned bucket.
///
/// # Returns
///
/// * `Result<SampleSheet>` - The validated sample sheet, or a configuration
///   error (I/O error if the file cannot be opened).
pub fn load_sample_sheet(path: impl AsRef<Path>, reserved_name: &str) -> Result<SampleSheet> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| DemuxError::io(path, e))?;
    let csv_err = |source: csv::Error| ConfigError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers = rdr.headers().map_err(csv_err)?.clone();
    let missing = |column: &str| ConfigError::MissingColumn {
        path: PathBuf::from(path),
        column: column.to_string(),
    };
    let (sample_col, barcode_col) = match (
        find_column(&headers, SAMPLE_COLUMNS),
        find_column(&headers, BARCODE_COLUMNS),
    ) {
        (Some(sample), Some(barcode)) => (sample, barcode),
        // Unrecognised names on a two-column sheet: take the columns by position.
        (None, None) if headers.len() == 2 => (0, 1),
        (None, _) => return Err(missing("sampleId").into()),
        (_, None) => return Err(missing("barcode").into()),
    };
    debug!(
        "Sample sheet {:?}: sample column {}, barcode column {}",
        path, sample_col, barcode_col
    );

    let mut entries = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(csv_err)?;
        let sample_id = record.get(sample_col).unwrap_or("").to_string();
        let barcode = record.get(barcode_col).unwrap_or("").to_string();
        if sample_id.is_empty() && barcode.is_empty() {
            continue;
        }
        entries.push((sample_id, barcode));
    }

    let sheet = SampleSheet::from_entries(entries, reserved_name, path)?;
    info!(
        "Loaded {} samples with {}-base barcodes from {:?}",
        sheet.len(),
        sheet.barcode_len(),
        path
    );
    Ok(sheet)
}

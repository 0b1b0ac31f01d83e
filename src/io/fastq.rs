//! FASTQ output.
//!
//! Each bucket is written to its own file, four lines per read. A failure
//! while writing one bucket is recorded and the remaining buckets are still
//! written. Written files can be re-parsed with `needletail` to verify them.

use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, error, info};
use needletail::errors::ParseErrorKind;
use needletail::parse_fastx_file;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::bio::Read;
use crate::error::{DemuxError, Result};
use crate::pipeline::router::SampleBucket;

/// A parsed FASTQ record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastqRecord {
    pub id: Vec<u8>,
    pub sequence: Vec<u8>,
    pub quality: Vec<u8>,
}

/// Result of writing one bucket.
#[derive(Debug)]
pub struct WriteOutcome {
    pub name: String,
    pub path: PathBuf,
    pub records: usize,
    pub error: Option<DemuxError>,
}

impl WriteOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Writes one read as a four-line FASTQ record.
pub fn write_record<W: Write>(writer: &mut W, read: &Read) -> io::Result<()> {
    writer.write_all(b"@")?;
    writer.write_all(read.header().as_bytes())?;
    writer.write_all(b"\n")?;
    writer.write_all(&read.sequence)?;
    writer.write_all(b"\n+\n")?;
    writer.write_all(&read.quality)?;
    writer.write_all(b"\n")
}

fn write_reads<W: Write>(mut writer: W, reads: &[Read]) -> io::Result<W> {
    for read in reads {
        write_record(&mut writer, read)?;
    }
    Ok(writer)
}

/// Writes all reads of a bucket to `path`, replacing any existing file.
///
/// An empty bucket produces an empty (uncompressed) or header-only (gzip)
/// file.
pub fn write_bucket(path: &Path, bucket: &SampleBucket, compress: bool) -> Result<()> {
    let file = File::create(path).map_err(|e| DemuxError::io(path, e))?;
    let writer = BufWriter::new(file);

    let written = if compress {
        write_reads(GzEncoder::new(writer, Compression::default()), &bucket.reads)
            .and_then(|encoder| encoder.finish())
            .and_then(|mut inner| inner.flush())
    } else {
        write_reads(writer, &bucket.reads).and_then(|mut inner| inner.flush())
    };
    written.map_err(|e| DemuxError::io(path, e))
}

/// Writes every bucket into `output_dir`.
///
/// The directory is created if needed; failing to create it is fatal. After
/// that, each bucket is written independently: a bucket that cannot be
/// written is reported in its [`WriteOutcome`] and does not stop the others.
///
/// # Arguments
///
/// * `output_dir` - Destination directory.
/// * `buckets` - Buckets to write, in order.
/// * `file_name` - Maps a bucket name to its file name.
/// * `compress` - Gzip the output.
pub fn write_buckets<'a, I, F>(
    output_dir: &Path,
    buckets: I,
    file_name: F,
    compress: bool,
) -> Result<Vec<WriteOutcome>>
where
    I: IntoIterator<Item = &'a SampleBucket>,
    F: Fn(&str) -> String,
{
    fs::create_dir_all(output_dir).map_err(|e| DemuxError::io(output_dir, e))?;

    let mut outcomes = Vec::new();
    for bucket in buckets {
        let path = output_dir.join(file_name(&bucket.name));
        let error = match write_bucket(&path, bucket, compress) {
            Ok(()) => {
                debug!("Wrote {} reads to {:?}", bucket.len(), path);
                None
            }
            Err(e) => {
                error!("Failed to write bucket '{}': {}", bucket.name, e);
                Some(e)
            }
        };
        outcomes.push(WriteOutcome {
            name: bucket.name.clone(),
            path,
            records: bucket.len(),
            error,
        });
    }

    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    info!(
        "Wrote {} of {} FASTQ files to {:?}",
        outcomes.len() - failed,
        outcomes.len(),
        output_dir
    );
    Ok(outcomes)
}

/// Reads all records of a FASTQ file (plain or compressed).
///
/// Empty files, including an empty gzip stream, yield no records.
pub fn read_fastq(path: &Path) -> Result<Vec<FastqRecord>> {
    let len = fs::metadata(path)
        .map_err(|e| DemuxError::io(path, e))?
        .len();
    if len == 0 {
        return Ok(Vec::new());
    }

    let invalid = |msg: String| DemuxError::io(path, io::Error::new(io::ErrorKind::InvalidData, msg));
    let mut reader = match parse_fastx_file(path) {
        Ok(reader) => reader,
        Err(e) if matches!(e.kind, ParseErrorKind::EmptyFile) => return Ok(Vec::new()),
        Err(e) => return Err(invalid(e.to_string())),
    };

    let mut records = Vec::new();
    while let Some(record) = reader.next() {
        let record = record.map_err(|e| invalid(e.to_string()))?;
        records.push(FastqRecord {
            id: record.id().to_vec(),
            sequence: record.seq().into_owned(),
            quality: record.qual().map(<[u8]>::to_vec).unwrap_or_default(),
        });
    }
    Ok(records)
}

/// Re-parses a written file and checks that it holds `expected` records.
pub fn verify_fastq(path: &Path, expected: usize) -> Result<()> {
    let found = read_fastq(path)?.len();
    if found != expected {
        return Err(DemuxError::io(
            path,
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("expected {} records, found {}", expected, found),
            ),
        ));
    }
    Ok(())
}

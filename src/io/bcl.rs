//! Base-call (BCL) reader.
//!
//! A run directory holds one binary file per cycle, optionally one per tile:
//!
//! * `C<cycle>.bcl` for single-tile runs (tile number 0),
//! * `C<cycle>_<tile>.bcl` for multi-tile runs,
//!
//! each optionally gzip-compressed (`.bcl.gz`). Cycles and tiles are ordered
//! numerically. Every file starts with a little-endian `u32` cluster count
//! followed by exactly one base-call byte per cluster.

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::MultiGzDecoder;
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{self, BufReader, Read as IoRead};
use std::path::{Path, PathBuf};

use crate::bio::read::decode_base_call;
use crate::bio::Read;
use crate::config::CycleRange;
use crate::error::{ConfigError, DemuxError, FormatError, Result};

/// Position of a cycle file within the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleFileId {
    pub cycle: usize,
    pub tile: u32,
}

/// Parses a cycle file name such as `C12.bcl`, `C12_1101.bcl` or `C3.bcl.gz`.
///
/// Returns `None` for anything that is not a cycle file.
pub fn parse_cycle_file_name(name: &str) -> Option<CycleFileId> {
    let stem = name.strip_suffix(".gz").unwrap_or(name);
    let stem = stem.strip_suffix(".bcl")?.strip_prefix('C')?;
    let (cycle, tile) = match stem.split_once('_') {
        Some((cycle, tile)) => (cycle, tile.parse::<u32>().ok()?),
        None => (stem, 0),
    };
    if cycle.is_empty() || !cycle.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let cycle: usize = cycle.parse().ok()?;
    if cycle == 0 {
        return None;
    }
    Some(CycleFileId { cycle, tile })
}

/// Canonical (uncompressed) file name for a cycle of a tile.
pub fn cycle_file_name(cycle: usize, tile: u32) -> String {
    if tile == 0 {
        format!("C{}.bcl", cycle)
    } else {
        format!("C{}_{}.bcl", cycle, tile)
    }
}

/// Reads one cycle file and returns its base-call bytes, one per cluster.
///
/// Fails with a [`FormatError`] if the header is missing or the number of
/// base-call bytes disagrees with the declared cluster count.
pub fn read_cycle_file(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path).map_err(|e| DemuxError::io(path, e))?;
    let gzipped = path.extension().map_or(false, |ext| ext == "gz");
    let mut reader: Box<dyn IoRead> = if gzipped {
        Box::new(MultiGzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    let count = match reader.read_u32::<LittleEndian>() {
        Ok(count) => count,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(FormatError::MissingHeader {
                path: path.to_path_buf(),
            }
            .into())
        }
        Err(e) => return Err(DemuxError::io(path, e)),
    };

    // The header is untrusted: read at most one byte past the declared
    // count and let the buffer grow with the data actually present.
    let expected = count as usize;
    let mut calls = Vec::new();
    reader
        .by_ref()
        .take(u64::from(count) + 1)
        .read_to_end(&mut calls)
        .map_err(|e| DemuxError::io(path, e))?;

    if calls.len() < expected {
        return Err(FormatError::Truncated {
            path: path.to_path_buf(),
            expected,
            found: calls.len(),
        }
        .into());
    }
    if calls.len() > expected {
        let rest = io::copy(&mut reader, &mut io::sink()).map_err(|e| DemuxError::io(path, e))?;
        return Err(FormatError::TrailingBytes {
            path: path.to_path_buf(),
            extra: calls.len() - expected + rest as usize,
        }
        .into());
    }
    debug!("Read {} clusters from {:?}", expected, path);
    Ok(calls)
}

/// The cycle files of one run, indexed by tile and cycle.
#[derive(Debug, Clone)]
pub struct BclRun {
    cycles: usize,
    tiles: Vec<u32>,
    files: BTreeMap<(u32, usize), PathBuf>,
}

impl BclRun {
    /// Scans a run directory for cycle files.
    ///
    /// Cycles must form a contiguous `1..=N` sequence and every tile must be
    /// present for every cycle; a gap is reported as an I/O error naming the
    /// missing file. An empty directory is a valid run with no cycles.
    pub fn scan(dir: impl AsRef<Path>) -> Result<Self> {
        let root = dir.as_ref().to_path_buf();
        let entries = fs::read_dir(&root).map_err(|e| DemuxError::io(&root, e))?;

        let mut files: BTreeMap<(u32, usize), PathBuf> = BTreeMap::new();
        for entry in entries {
            let entry = entry.map_err(|e| DemuxError::io(&root, e))?;
            let path = entry.path();
            let id = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_cycle_file_name);
            match id {
                Some(id) if path.is_file() => {
                    if let Some(first) = files.insert((id.tile, id.cycle), path.clone()) {
                        return Err(FormatError::DuplicateCycleFile {
                            first,
                            second: path,
                        }
                        .into());
                    }
                }
                _ => debug!("Ignoring {:?}: not a cycle file", path),
            }
        }

        let cycles = files.keys().map(|&(_, cycle)| cycle).max().unwrap_or(0);
        let tiles: Vec<u32> = files
            .keys()
            .map(|&(tile, _)| tile)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        for &tile in &tiles {
            for cycle in 1..=cycles {
                if !files.contains_key(&(tile, cycle)) {
                    let expected = root.join(cycle_file_name(cycle, tile));
                    return Err(DemuxError::io(
                        expected,
                        io::Error::new(io::ErrorKind::NotFound, "missing cycle file"),
                    ));
                }
            }
        }

        if cycles == 0 {
            warn!("No cycle files found in {:?}", root);
        } else {
            info!(
                "Found {} cycles across {} tile(s) in {:?}",
                cycles,
                tiles.len(),
                root
            );
        }

        Ok(BclRun {
            cycles,
            tiles,
            files,
        })
    }

    /// Number of cycles per read.
    pub fn cycles(&self) -> usize {
        self.cycles
    }

    /// Tile numbers in ascending order.
    pub fn tiles(&self) -> &[u32] {
        &self.tiles
    }

    pub fn is_empty(&self) -> bool {
        self.cycles == 0
    }

    /// Checks that the barcode cycles fit inside the run.
    pub fn check_barcode_range(&self, barcode: &CycleRange) -> std::result::Result<(), ConfigError> {
        if !self.is_empty() && barcode.end > self.cycles {
            return Err(ConfigError::BarcodeRangeOutOfBounds {
                range: barcode.to_string(),
                cycles: self.cycles,
            });
        }
        Ok(())
    }

    /// Decodes every cluster of every tile into reads.
    ///
    /// Tiles are processed in ascending order and clusters in ascending index
    /// order; read ids are assigned sequentially across the run. Cycles inside
    /// `barcode` form the barcode segment, all other cycles the payload.
    pub fn read_all(&self, barcode: &CycleRange) -> Result<Vec<Read>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        self.check_barcode_range(barcode)?;

        let mut reads = Vec::new();
        for &tile in &self.tiles {
            let before = reads.len();
            self.read_tile(tile, barcode, &mut reads)?;
            debug!("Tile {}: {} clusters", tile, reads.len() - before);
        }
        info!(
            "Decoded {} reads ({} barcode + {} payload cycles)",
            reads.len(),
            barcode.len(),
            self.cycles - barcode.len()
        );
        Ok(reads)
    }

    fn read_tile(&self, tile: u32, barcode: &CycleRange, reads: &mut Vec<Read>) -> Result<()> {
        let mut per_cycle: Vec<Vec<u8>> = Vec::with_capacity(self.cycles);
        let mut clusters: Option<usize> = None;

        for cycle in 1..=self.cycles {
            // scan() guarantees presence
            let path = &self.files[&(tile, cycle)];
            let calls = read_cycle_file(path)?;
            match clusters {
                None => clusters = Some(calls.len()),
                Some(expected) if expected != calls.len() => {
                    return Err(FormatError::ClusterCountMismatch {
                        path: path.clone(),
                        expected: expected as u32,
                        found: calls.len() as u32,
                    }
                    .into());
                }
                Some(_) => {}
            }
            per_cycle.push(calls);
        }

        let clusters = clusters.unwrap_or(0);
        if clusters == 0 {
            warn!("Tile {} has no clusters", tile);
        }

        let payload_len = self.cycles - barcode.len();
        let barcode_cycles = barcode.as_index_range();
        let mut next_id = reads.len() as u64;
        reads.reserve(clusters);

        for cluster in 0..clusters {
            let mut bc = Vec::with_capacity(barcode.len());
            let mut sequence = Vec::with_capacity(payload_len);
            let mut quality = Vec::with_capacity(payload_len);

            for (cycle_idx, calls) in per_cycle.iter().enumerate() {
                let (base, qual) = decode_base_call(calls[cluster]);
                if barcode_cycles.contains(&cycle_idx) {
                    bc.push(base);
                } else {
                    sequence.push(base);
                    quality.push(qual);
                }
            }

            reads.push(Read::new(
                next_id,
                tile,
                cluster as u32,
                bc,
                sequence,
                quality,
            ));
            next_id += 1;
        }
        Ok(())
    }
}

/// Fixture helpers for writing cycle files.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::bio::read::encode_base_call;
    use byteorder::WriteBytesExt;
    use std::io::Write;

    /// Writes a raw cycle file with the given declared count and bytes.
    pub fn write_raw_cycle_file(path: &Path, count: u32, calls: &[u8]) {
        let mut file = File::create(path).unwrap();
        file.write_u32::<LittleEndian>(count).unwrap();
        file.write_all(calls).unwrap();
    }

    /// Writes cycle files for a tile from per-cluster sequences of equal
    /// length, all at the given quality.
    pub fn write_tile(dir: &Path, tile: u32, sequences: &[&str], quality: u8) {
        let cycles = sequences.first().map_or(0, |s| s.len());
        for cycle in 0..cycles {
            let calls: Vec<u8> = sequences
                .iter()
                .map(|s| encode_base_call(s.as_bytes()[cycle], quality))
                .collect();
            let path = dir.join(cycle_file_name(cycle + 1, tile));
            write_raw_cycle_file(&path, calls.len() as u32, &calls);
        }
    }
}

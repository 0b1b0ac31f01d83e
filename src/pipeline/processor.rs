use log::{debug, error, info};
use std::path::PathBuf;
use std::time::Instant;

use crate::config::{CycleRange, DemuxConfig};
use crate::error::{ConfigError, DemuxError, Result};
use crate::io::bcl::BclRun;
use crate::io::fastq::{verify_fastq, write_buckets, WriteOutcome};
use crate::io::samplesheet::load_sample_sheet;
use crate::pipeline::matcher::BarcodeMatcher;
use crate::pipeline::report::{RunInfo, RunSummary};
use crate::pipeline::router::route;
use crate::utils::parallel::{ParallelConfig, ParallelExecutor};

/// Resolves which cycles hold the barcode.
///
/// Without an explicit range the barcode is the first `barcode_len` cycles.
/// An explicit range must cover exactly `barcode_len` cycles.
pub fn resolve_barcode_cycles(
    configured: Option<CycleRange>,
    barcode_len: usize,
) -> std::result::Result<CycleRange, ConfigError> {
    match configured {
        None => CycleRange::leading(barcode_len),
        Some(range) if range.len() != barcode_len => Err(ConfigError::BarcodeRangeLength {
            range: range.to_string(),
            expected: barcode_len,
            found: range.len(),
        }),
        Some(range) => Ok(range),
    }
}

/// Demultiplexing pipeline
///
/// Runs the stages in order: sample sheet, base calls, matching, routing,
/// writing. Each stage either completes or fails the run, except that a
/// single unwritable output file does not stop the others.
pub struct DemuxPipeline {
    config: DemuxConfig,
    executor: ParallelExecutor,
}

impl DemuxPipeline {
    /// Create a new pipeline; validates the configuration and builds the
    /// matcher thread pool.
    pub fn new(config: DemuxConfig) -> Result<Self> {
        config.validate()?;
        let executor = ParallelExecutor::new(Some(ParallelConfig {
            threads: config.threads,
            chunk_size: config.chunk_size,
        }))?;
        Ok(DemuxPipeline { config, executor })
    }

    /// Runs the whole pipeline and returns the run summary.
    ///
    /// Write failures of individual buckets are reported in the summary
    /// rather than as an error; see [`RunSummary::failed_buckets`].
    pub fn run(&self) -> Result<RunSummary> {
        let start = Instant::now();
        let config = &self.config;

        // Configuration problems surface before any base calls are read.
        info!("Loading sample sheet {:?}", config.sample_sheet);
        let sheet = load_sample_sheet(&config.sample_sheet, &config.unassigned_name)?;
        let barcode_cycles = resolve_barcode_cycles(config.barcode_cycles, sheet.barcode_len())?;
        debug!("Barcode cycles: {}", barcode_cycles);

        info!("Parsing base calls in {:?}", config.input_dir);
        let run = BclRun::scan(&config.input_dir)?;
        let reads = run.read_all(&barcode_cycles)?;

        info!("Demultiplexing {} reads", reads.len());
        let matcher = BarcodeMatcher::new(&sheet, config.max_mismatches);
        let assignments = matcher.assign_all(&reads, &self.executor);
        let buckets = route(reads, &assignments, &sheet, &config.unassigned_name)?;

        info!("Writing FASTQ files to {:?}", config.output_dir);
        let mut outcomes = write_buckets(
            &config.output_dir,
            buckets.iter(),
            |name| config.fastq_file_name(name),
            config.compress,
        )?;
        if config.verify {
            self.verify(&mut outcomes);
        }

        let run_info = RunInfo {
            cycles: run.cycles(),
            tiles: run.tiles().len(),
            barcode_cycles: Some(barcode_cycles.to_string()),
            barcode_len: sheet.barcode_len(),
            max_mismatches: config.max_mismatches,
        };
        let mut summary = RunSummary::new(run_info, &buckets, &outcomes);
        summary.processing_time_seconds = start.elapsed().as_secs_f64();

        let stats_path = config.output_dir.join(&config.stats_file);
        summary.write_json(&stats_path)?;
        info!("Run summary:\n{}", summary.render_table());
        info!("Wrote run summary to {:?}", stats_path);

        Ok(summary)
    }

    /// Re-parses every successfully written file and records any mismatch
    /// in its outcome.
    fn verify(&self, outcomes: &mut [WriteOutcome]) {
        let targets: Vec<(usize, PathBuf, usize)> = outcomes
            .iter()
            .enumerate()
            .filter(|(_, o)| o.is_ok())
            .map(|(i, o)| (i, o.path.clone(), o.records))
            .collect();

        let results: Vec<(usize, Result<()>)> = self
            .executor
            .map_ordered(&targets, |(i, path, records)| (*i, verify_fastq(path, *records)));

        let mut verified = 0;
        for (i, result) in results {
            match result {
                Ok(()) => verified += 1,
                Err(e) => {
                    error!("Verification failed for '{}': {}", outcomes[i].name, e);
                    outcomes[i].error = Some(e);
                }
            }
        }
        info!("Verified {} of {} output files", verified, targets.len());
    }
}

/// Converts bucket failures in a finished run into an error.
pub fn check_outputs(summary: &RunSummary) -> Result<()> {
    let failed = summary.failed_buckets().count();
    if failed > 0 {
        return Err(DemuxError::PartialWrite {
            failed,
            total: summary.buckets.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::bcl::testing::write_tile;
    use crate::io::fastq::read_fastq;
    use std::fs;
    use std::path::Path;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            fs::create_dir(dir.path().join("bcl")).unwrap();
            Fixture { dir }
        }

        fn input(&self) -> PathBuf {
            self.dir.path().join("bcl")
        }

        fn output(&self) -> PathBuf {
            self.dir.path().join("out")
        }

        fn sheet(&self, content: &str) -> PathBuf {
            let path = self.dir.path().join("samplesheet.csv");
            fs::write(&path, content).unwrap();
            path
        }

        fn config(&self, sheet: PathBuf) -> DemuxConfig {
            DemuxConfig {
                input_dir: self.input(),
                sample_sheet: sheet,
                output_dir: self.output(),
                threads: 2,
                chunk_size: 2,
                ..DemuxConfig::default()
            }
        }
    }

    fn sequences(path: &Path) -> Vec<String> {
        read_fastq(path)
            .unwrap()
            .into_iter()
            .map(|r| String::from_utf8(r.sequence).unwrap())
            .collect()
    }

    const SHEET: &str = "sampleId,barcode\nS1,ACGT\nS2,ACGG\n";

    #[test]
    fn test_end_to_end_two_tiles() {
        let fx = Fixture::new();
        // barcode (4) + payload (3)
        write_tile(&fx.input(), 1101, &["ACGTAAA", "ACGACCC", "TTTTGGG"], 30);
        write_tile(&fx.input(), 1102, &["ACGGTTT", "ACGCAAC", "ACGTCCA"], 30);

        let pipeline = DemuxPipeline::new(fx.config(fx.sheet(SHEET))).unwrap();
        let summary = pipeline.run().unwrap();
        check_outputs(&summary).unwrap();

        // ACGT exact, ACGA one off S1, ACGC ties S1/S2 -> S1
        assert_eq!(
            sequences(&fx.output().join("S1.fastq")),
            vec!["AAA", "CCC", "AAC", "CCA"]
        );
        assert_eq!(sequences(&fx.output().join("S2.fastq")), vec!["TTT"]);
        assert_eq!(sequences(&fx.output().join("unassigned.fastq")), vec!["GGG"]);

        assert_eq!(summary.total_reads, 6);
        assert_eq!(summary.assigned_reads, 5);
        assert_eq!(summary.unassigned_reads, 1);
        assert_eq!(summary.tiles, 2);
        assert_eq!(summary.cycles, 7);
        assert_eq!(summary.buckets[0].perfect, 2);
        assert_eq!(summary.buckets[0].mismatched, 2);
        let total: usize = summary.buckets.iter().map(|b| b.reads).sum();
        assert_eq!(total, summary.total_reads);
        assert!(fx.output().join("demux_stats.json").exists());
    }

    #[test]
    fn test_fastq_headers_and_qualities() {
        let fx = Fixture::new();
        write_tile(&fx.input(), 0, &["ACGTGA"], 40);
        let pipeline = DemuxPipeline::new(fx.config(fx.sheet(SHEET))).unwrap();
        pipeline.run().unwrap();

        let records = read_fastq(&fx.output().join("S1.fastq")).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, b"0:0:0 BC:ACGT");
        assert_eq!(records[0].sequence, b"GA");
        assert_eq!(records[0].quality, b"II");
    }

    #[test]
    fn test_explicit_barcode_cycles() {
        let fx = Fixture::new();
        // payload first, barcode in cycles 3-6
        write_tile(&fx.input(), 0, &["GGACGT", "CCACGG"], 30);
        let mut config = fx.config(fx.sheet(SHEET));
        config.barcode_cycles = Some("3-6".parse().unwrap());
        DemuxPipeline::new(config).unwrap().run().unwrap();

        assert_eq!(sequences(&fx.output().join("S1.fastq")), vec!["GG"]);
        assert_eq!(sequences(&fx.output().join("S2.fastq")), vec!["CC"]);
    }

    #[test]
    fn test_barcode_cycles_must_match_barcode_length() {
        let fx = Fixture::new();
        write_tile(&fx.input(), 0, &["ACGTAA"], 30);
        let mut config = fx.config(fx.sheet(SHEET));
        config.barcode_cycles = Some("1-3".parse().unwrap());
        let err = DemuxPipeline::new(config).unwrap().run().unwrap_err();
        assert!(matches!(
            err,
            DemuxError::Config(ConfigError::BarcodeRangeLength {
                expected: 4,
                found: 3,
                ..
            })
        ));
    }

    #[test]
    fn test_scenario_d_config_error_before_reads() {
        let fx = Fixture::new();
        let sheet = fx.sheet("sampleId,barcode\nS1,ACGT\nS2,ACG\n");
        let mut config = fx.config(sheet);
        // A missing input directory would be an I/O error if it were touched.
        config.input_dir = fx.dir.path().join("does-not-exist");
        let err = DemuxPipeline::new(config).unwrap().run().unwrap_err();
        assert!(matches!(
            err,
            DemuxError::Config(ConfigError::InconsistentBarcodeLength { .. })
        ));
        assert!(!fx.output().exists());
    }

    #[test]
    fn test_scenario_e_empty_input() {
        let fx = Fixture::new();
        let summary = DemuxPipeline::new(fx.config(fx.sheet(SHEET)))
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(summary.total_reads, 0);
        for name in ["S1.fastq", "S2.fastq", "unassigned.fastq"] {
            let path = fx.output().join(name);
            assert!(path.exists(), "{} missing", name);
            assert_eq!(fs::metadata(&path).unwrap().len(), 0);
        }
    }

    #[test]
    fn test_unwritable_bucket_is_isolated() {
        let fx = Fixture::new();
        write_tile(&fx.input(), 0, &["ACGTAA", "ACGGCC", "TTTTGG"], 30);
        fs::create_dir_all(fx.output().join("S1.fastq")).unwrap();

        let summary = DemuxPipeline::new(fx.config(fx.sheet(SHEET)))
            .unwrap()
            .run()
            .unwrap();

        let failed: Vec<&str> = summary.failed_buckets().map(|b| b.name.as_str()).collect();
        assert_eq!(failed, vec!["S1"]);
        assert_eq!(sequences(&fx.output().join("S2.fastq")), vec!["CC"]);
        assert_eq!(sequences(&fx.output().join("unassigned.fastq")), vec!["GG"]);
        assert!(matches!(
            check_outputs(&summary),
            Err(DemuxError::PartialWrite { failed: 1, total: 3 })
        ));
    }

    #[test]
    fn test_gzip_output_with_verification() {
        let fx = Fixture::new();
        write_tile(&fx.input(), 0, &["ACGTAA", "ACGGCC"], 30);
        let mut config = fx.config(fx.sheet(SHEET));
        config.compress = true;
        config.verify = true;
        config.unassigned_name = "undetermined".to_string();

        let summary = DemuxPipeline::new(config).unwrap().run().unwrap();
        check_outputs(&summary).unwrap();
        assert_eq!(sequences(&fx.output().join("S1.fastq.gz")), vec!["AA"]);
        assert_eq!(sequences(&fx.output().join("S2.fastq.gz")), vec!["CC"]);
        assert!(fx.output().join("undetermined.fastq.gz").exists());
    }

    #[test]
    fn test_zero_mismatches_sends_near_matches_to_unassigned() {
        let fx = Fixture::new();
        write_tile(&fx.input(), 0, &["ACGTAA", "ACGAAC"], 30);
        let mut config = fx.config(fx.sheet(SHEET));
        config.max_mismatches = 0;
        let summary = DemuxPipeline::new(config).unwrap().run().unwrap();
        assert_eq!(summary.unassigned_reads, 1);
        assert_eq!(sequences(&fx.output().join("unassigned.fastq")), vec!["AC"]);
    }

    #[test]
    fn test_resolve_barcode_cycles() {
        assert_eq!(
            resolve_barcode_cycles(None, 8).unwrap(),
            CycleRange { start: 1, end: 8 }
        );
        let explicit: CycleRange = "9-16".parse().unwrap();
        assert_eq!(resolve_barcode_cycles(Some(explicit), 8).unwrap(), explicit);
        assert!(resolve_barcode_cycles(Some(explicit), 6).is_err());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = DemuxConfig::default();
        assert!(matches!(
            DemuxPipeline::new(config),
            Err(DemuxError::Config(ConfigError::MissingSetting(_)))
        ));
    }

    #[test]
    fn test_unassigned_name_cannot_leave_output_dir() {
        let fx = Fixture::new();
        write_tile(&fx.input(), 0, &["ACGTAAA", "TTTTGGG"], 30);
        let mut config = fx.config(fx.sheet(SHEET));
        config.unassigned_name = "../escaped".to_string();

        let err = DemuxPipeline::new(config).err().unwrap();
        assert!(matches!(
            err,
            DemuxError::Config(ConfigError::InvalidFileName {
                setting: "unassigned_name",
                ..
            })
        ));
        assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG);
        assert!(!fx.dir.path().join("escaped.fastq").exists());
        assert!(!fx.output().exists());
    }

    #[test]
    fn test_zero_chunk_size_is_config_error() {
        let fx = Fixture::new();
        let mut config = fx.config(fx.sheet(SHEET));
        config.chunk_size = 0;
        let err = DemuxPipeline::new(config).err().unwrap();
        assert!(matches!(
            err,
            DemuxError::Config(ConfigError::InvalidChunkSize)
        ));
        assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG);
    }
}

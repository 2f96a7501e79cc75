//! Cadence-scheduled, node-partitioned image acquisition.
//!
//! The acquisition path is independent of the dataset path:
//!
//! 1. [`Cadence`] turns `[date_start, date_end)` into target timestamps.
//! 2. [`plan_jobs`] expands each timestamp into one [`DownloadJob`] per
//!    wavelength.
//! 3. [`partition`] picks this node's contiguous block of the global list.
//! 4. [`run_jobs`] retrieves and stores the block through a [`Fetcher`].
//!
//! [`AcquisitionConfig`] carries all parameters and drives the whole sequence
//! through [`run`].

mod cadence;
mod error;
mod fetch;
mod jobs;
mod partition;

use std::{path::PathBuf, time::Instant};

use chrono::{NaiveDate, NaiveDateTime};
use log::info;
use serde::{Deserialize, Serialize};

pub use cadence::{Cadence, CadencePlan, QUARTER_SLOTS};
pub use error::AcquisitionError;
pub use fetch::{FetchOptions, FetchSummary, Fetcher, HttpFetcher, fetch_one, run_jobs};
pub use jobs::{
    AIA_FILENAME_PATTERN, DownloadJob, FilenamePattern, HMI_FILENAME_PATTERN, JobTemplate,
    WAVELENGTH_PLACEHOLDER, plan_jobs, validate_wavelengths,
};
pub use partition::{NodeBlock, partition};

/// Default remote root (JSOC HMI image archive).
pub const DEFAULT_REMOTE_ROOT: &str = "http://jsoc.stanford.edu/data/hmi/images/";

/// Default cadence in minutes.
pub const DEFAULT_CADENCE: u32 = 15;

/// Wavelength used when none is given; the HMI magnetogram has a single one.
pub const DEFAULT_WAVELENGTH: &str = "M";

/// Parameters of one acquisition run on one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Inclusive start, normalized to the cadence.
    pub date_start: NaiveDateTime,
    /// Exclusive end.
    pub date_end: NaiveDateTime,
    /// Cadence in minutes: even, or exactly 15.
    pub cadence: u32,
    /// Remote root URL.
    pub remote_root: String,
    /// Local root directory.
    pub local_root: PathBuf,
    /// Wavelength identifiers; one job per wavelength per timestamp.
    pub wavelengths: Vec<String>,
    /// strftime file name pattern, optionally with `{wavelength}`.
    pub filename_pattern: String,
    /// Chunks fetched concurrently.
    pub max_workers: usize,
    /// Jobs per chunk.
    pub worker_chunk_size: usize,
    /// Nodes sharing the job list.
    pub total_nodes: usize,
    /// Zero-based index of this node.
    pub node_index: usize,
}

fn default_date(y: i32, m: u32, d: u32, hh: u32, mm: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|date| date.and_hms_opt(hh, mm, 0))
        .unwrap_or_default()
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            date_start: default_date(2022, 11, 1, 0, 2),
            date_end: default_date(2024, 5, 14, 19, 44),
            cadence: DEFAULT_CADENCE,
            remote_root: DEFAULT_REMOTE_ROOT.to_string(),
            local_root: PathBuf::from("."),
            wavelengths: vec![DEFAULT_WAVELENGTH.to_string()],
            filename_pattern: HMI_FILENAME_PATTERN.to_string(),
            max_workers: 1,
            worker_chunk_size: 1,
            total_nodes: 1,
            node_index: 0,
        }
    }
}

impl AcquisitionConfig {
    /// Check everything that can be checked without planning.
    ///
    /// `total_nodes` against the job count is checked by [`partition`].
    pub fn validate(&self) -> Result<(), AcquisitionError> {
        Cadence::new(self.cadence)?;
        let pattern = FilenamePattern::new(self.filename_pattern.as_str())?;
        validate_wavelengths(&self.wavelengths, &pattern)?;
        self.fetch_options().validate()
    }

    /// Worker pool sizing.
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            max_workers: self.max_workers,
            chunk_size: self.worker_chunk_size,
        }
    }

    /// The full job list across all nodes.
    pub fn plan(&self) -> Result<Vec<DownloadJob>, AcquisitionError> {
        let cadence = Cadence::new(self.cadence)?;
        let pattern = FilenamePattern::new(self.filename_pattern.as_str())?;
        let template = JobTemplate::new(self.remote_root.as_str(), &self.local_root, pattern);

        let normalized = cadence.normalize_start(self.date_start);
        if normalized != self.date_start {
            info!("adjusted start date: {} -> {normalized}", self.date_start);
        }
        plan_jobs(
            cadence,
            self.date_start,
            self.date_end,
            &self.wavelengths,
            &template,
        )
    }

    /// This node's block and the jobs in it.
    pub fn node_jobs(&self) -> Result<NodePlan, AcquisitionError> {
        let all = self.plan()?;
        let block = partition(all.len(), self.total_nodes, self.node_index)?;
        Ok(NodePlan {
            total_jobs: all.len(),
            jobs: block.slice(&all).to_vec(),
            block,
        })
    }
}

/// The outcome of planning and partitioning for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodePlan {
    /// Jobs across all nodes.
    pub total_jobs: usize,
    /// This node's block.
    pub block: NodeBlock,
    /// Jobs in this node's block, in global order.
    pub jobs: Vec<DownloadJob>,
}

/// What a finished run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcquisitionReport {
    /// Jobs across all nodes.
    pub total_jobs: usize,
    /// This node's block.
    pub block: NodeBlock,
    /// Per-node result counts.
    pub summary: FetchSummary,
    /// Wall time of the fetch phase.
    #[serde(with = "duration_ms")]
    pub elapsed: std::time::Duration,
}

mod duration_ms {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &std::time::Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u128(d.as_millis())
    }
}

/// Validate, plan, partition and fetch this node's block.
///
/// Configuration and planning errors abort before any I/O. Individual fetch
/// failures only show up in the summary.
pub async fn run<F>(
    config: &AcquisitionConfig,
    fetcher: &F,
) -> Result<AcquisitionReport, AcquisitionError>
where
    F: Fetcher + ?Sized,
{
    config.validate()?;
    let NodePlan {
        total_jobs,
        block,
        jobs,
    } = config.node_jobs()?;

    info!(
        "node {}/{}: {} of {} jobs ({} unassigned)",
        block.node_index,
        block.total_nodes,
        jobs.len(),
        total_jobs,
        block.dropped
    );

    let started = Instant::now();
    let results = run_jobs(&jobs, config.fetch_options(), fetcher).await?;
    let summary = FetchSummary::from_results(&results);
    let elapsed = started.elapsed();

    info!("node {} finished: {summary} in {elapsed:?}", block.node_index);

    Ok(AcquisitionReport {
        total_jobs,
        block,
        summary,
        elapsed,
    })
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bytes::Bytes;
    use tempfile::TempDir;

    use super::*;
    use crate::error::ErrorCategory;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    struct EchoFetcher;

    #[async_trait]
    impl Fetcher for EchoFetcher {
        async fn fetch(&self, url: &str) -> Result<Bytes, AcquisitionError> {
            Ok(Bytes::copy_from_slice(url.as_bytes()))
        }
    }

    fn config(local_root: PathBuf) -> AcquisitionConfig {
        AcquisitionConfig {
            date_start: default_date(2022, 11, 1, 0, 7),
            date_end: default_date(2022, 11, 1, 2, 30),
            local_root,
            ..AcquisitionConfig::default()
        }
    }

    #[test]
    fn defaults_follow_hmi_archive() {
        let cfg = AcquisitionConfig::default();
        assert_eq!(cfg.cadence, 15);
        assert_eq!(cfg.remote_root, DEFAULT_REMOTE_ROOT);
        assert_eq!(cfg.date_start.to_string(), "2022-11-01 00:02:00");
        assert_eq!(cfg.date_end.to_string(), "2024-05-14 19:44:00");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validation_rejects_bad_cadence_before_planning() {
        let cfg = AcquisitionConfig {
            cadence: 7,
            ..config(PathBuf::from("/unused"))
        };
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(cfg.node_jobs().is_err());
    }

    #[test]
    fn node_jobs_take_contiguous_block() -> TestResult {
        // 00:00 .. 02:14 on the quarter cycle: 10 timestamps.
        let base = config(PathBuf::from("/unused"));
        let all = base.plan()?;
        assert_eq!(all.len(), 10);
        assert_eq!(all[0].timestamp, default_date(2022, 11, 1, 0, 0));
        assert_eq!(all[9].timestamp, default_date(2022, 11, 1, 2, 14));

        let node = AcquisitionConfig {
            total_nodes: 3,
            node_index: 1,
            ..base.clone()
        }
        .node_jobs()?;
        assert_eq!(node.total_jobs, 10);
        assert_eq!(node.block.dropped, 1);
        assert_eq!(node.jobs, all[3..6].to_vec());

        let too_many = AcquisitionConfig {
            total_nodes: 11,
            ..base
        };
        assert_eq!(
            too_many.node_jobs().unwrap_err().category(),
            ErrorCategory::Config
        );
        Ok(())
    }

    #[tokio::test]
    async fn run_stores_this_nodes_block() -> TestResult {
        let tmp = TempDir::new()?;
        let cfg = AcquisitionConfig {
            total_nodes: 2,
            node_index: 1,
            max_workers: 2,
            ..config(tmp.path().to_path_buf())
        };
        let report = run(&cfg, &EchoFetcher).await?;

        assert_eq!(report.total_jobs, 10);
        assert_eq!(report.block.range, 5..10);
        assert_eq!(
            report.summary,
            FetchSummary {
                downloaded: 5,
                skipped: 0,
                total: 5
            }
        );
        let stored = tmp.path().join("2022/11/01/20221101_014400_M_1k.jpg");
        assert_eq!(
            std::fs::read_to_string(stored)?,
            "http://jsoc.stanford.edu/data/hmi/images/2022/11/01/H0100/20221101_014400_M_1k.jpg"
        );
        assert!(
            !tmp.path()
                .join("2022/11/01/20221101_000000_M_1k.jpg")
                .exists()
        );
        Ok(())
    }
}

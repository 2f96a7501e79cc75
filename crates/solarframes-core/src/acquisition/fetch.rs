//! Fetch executor.
//!
//! A job is retrieve-and-store: create the local day directory, fetch the
//! remote bytes, write them to the destination. Failures never leave a job;
//! they are logged and reported as `false` so one bad URL cannot stop the
//! rest of the node's block.
//!
//! Jobs are grouped into chunks of `chunk_size`. Each chunk runs its jobs
//! one after another, and at most `max_workers` chunks are in flight at
//! once. Results come back in input order regardless of completion order.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use super::{
    error::{
        AcquisitionError, FetchSnafu, HttpClientSnafu, InvalidWorkerPoolSnafu, StatusSnafu,
        StoreSnafu,
    },
    jobs::DownloadJob,
};
use crate::storage;

/// Transport used to retrieve remote resources.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Retrieve the full body at `url`. Non-success responses are errors.
    async fn fetch(&self, url: &str) -> Result<Bytes, AcquisitionError>;
}

/// HTTP(S) transport backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with a default client.
    pub fn new() -> Result<Self, AcquisitionError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("solarframes/", env!("CARGO_PKG_VERSION")))
            .build()
            .context(HttpClientSnafu)?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, AcquisitionError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context(FetchSnafu { url })?;
        let status = response.status();
        ensure!(
            status.is_success(),
            StatusSnafu {
                url,
                status: status.as_u16(),
            }
        );
        response.bytes().await.context(FetchSnafu { url })
    }
}

/// Worker pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOptions {
    /// Chunks in flight at once.
    pub max_workers: usize,
    /// Jobs per chunk.
    pub chunk_size: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_workers: 1,
            chunk_size: 1,
        }
    }
}

impl FetchOptions {
    /// Reject zero-sized pools.
    pub fn validate(&self) -> Result<(), AcquisitionError> {
        ensure!(
            self.max_workers > 0,
            InvalidWorkerPoolSnafu {
                reason: "max_workers must be at least 1",
            }
        );
        ensure!(
            self.chunk_size > 0,
            InvalidWorkerPoolSnafu {
                reason: "worker_chunk_size must be at least 1",
            }
        );
        Ok(())
    }
}

/// Counts over a batch of job results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FetchSummary {
    /// Jobs that stored a file.
    pub downloaded: usize,
    /// Jobs that failed.
    pub skipped: usize,
    /// All jobs.
    pub total: usize,
}

impl FetchSummary {
    /// Tally index-aligned job results.
    pub fn from_results(results: &[bool]) -> Self {
        let downloaded = results.iter().filter(|ok| **ok).count();
        Self {
            downloaded,
            skipped: results.len() - downloaded,
            total: results.len(),
        }
    }
}

impl fmt::Display for FetchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "downloaded {}, skipped {}, total {}",
            self.downloaded, self.skipped, self.total
        )
    }
}

async fn try_fetch<F>(job: &DownloadJob, fetcher: &F) -> Result<(), AcquisitionError>
where
    F: Fetcher + ?Sized,
{
    let local = job.local.display().to_string();
    if let Some(parent) = job.local.parent() {
        storage::ensure_dir_all(parent)
            .await
            .context(StoreSnafu { path: local.as_str() })?;
    }
    let body = fetcher.fetch(&job.remote).await?;
    storage::write_file(&job.local, &body)
        .await
        .context(StoreSnafu { path: local.as_str() })
}

/// Run one job. Returns `true` when the file was stored.
pub async fn fetch_one<F>(job: &DownloadJob, fetcher: &F) -> bool
where
    F: Fetcher + ?Sized,
{
    debug!("fetching {}", job.remote);
    match try_fetch(job, fetcher).await {
        Ok(()) => {
            debug!("stored {}", job.local.display());
            true
        }
        Err(e) => {
            warn!("skipping {}: {e}", job.remote);
            false
        }
    }
}

/// Run `jobs` through the worker pool.
///
/// The returned vector is aligned with `jobs`: entry `i` is the outcome of
/// `jobs[i]`.
pub async fn run_jobs<F>(
    jobs: &[DownloadJob],
    options: FetchOptions,
    fetcher: &F,
) -> Result<Vec<bool>, AcquisitionError>
where
    F: Fetcher + ?Sized,
{
    options.validate()?;

    let chunks: Vec<Vec<bool>> = futures::stream::iter(jobs.chunks(options.chunk_size))
        .map(|chunk| async move {
            let mut results = Vec::with_capacity(chunk.len());
            for job in chunk {
                results.push(fetch_one(job, fetcher).await);
            }
            results
        })
        .buffered(options.max_workers)
        .collect()
        .await;

    Ok(chunks.into_iter().flatten().collect())
}

//! Error types for job planning, partitioning and fetching.

use chrono::NaiveDateTime;
use snafu::prelude::*;

use crate::{error::ErrorCategory, storage::StorageError};

/// Errors raised by the acquisition path.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AcquisitionError {
    /// Cadence is neither a non-zero even number nor 15.
    #[snafu(display(
        "Cadence must be a non-zero even number of minutes or exactly 15, got {cadence}"
    ))]
    InvalidCadence {
        /// The rejected cadence in minutes.
        cadence: u32,
    },

    /// No wavelength was requested.
    #[snafu(display("At least one wavelength is required"))]
    NoWavelengths,

    /// A wavelength identifier cannot be used in a file name.
    #[snafu(display("Invalid wavelength '{wavelength}': must be non-empty without '/'"))]
    InvalidWavelength {
        /// The rejected identifier.
        wavelength: String,
    },

    /// The filename pattern is not a usable strftime pattern.
    #[snafu(display("Invalid filename pattern '{pattern}': {reason}"))]
    InvalidFilenamePattern {
        /// The rejected pattern.
        pattern: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Several wavelengths would be written to the same local file.
    #[snafu(display(
        "Filename pattern '{pattern}' has no {{wavelength}} placeholder but {count} wavelengths were requested"
    ))]
    MissingWavelengthPlaceholder {
        /// The pattern lacking the placeholder.
        pattern: String,
        /// Number of requested wavelengths.
        count: usize,
    },

    /// The cadence plan produced nothing to fetch.
    #[snafu(display("No files to download between {start} and {end}"))]
    NoJobs {
        /// Normalized start of the plan.
        start: NaiveDateTime,
        /// Exclusive end of the plan.
        end: NaiveDateTime,
    },

    /// The job list to partition is empty.
    #[snafu(display("Cannot partition an empty job list"))]
    EmptyJobList,

    /// `total_nodes` is zero or larger than the number of jobs.
    #[snafu(display("Cannot split {jobs} jobs across {total_nodes} nodes"))]
    InvalidNodeCount {
        /// Requested node count.
        total_nodes: usize,
        /// Number of jobs available.
        jobs: usize,
    },

    /// `node_index` is not below `total_nodes`.
    #[snafu(display("Node index {node_index} is out of range for {total_nodes} nodes"))]
    NodeIndexOutOfRange {
        /// Requested zero-based node index.
        node_index: usize,
        /// Requested node count.
        total_nodes: usize,
    },

    /// Worker pool sizing is unusable.
    #[snafu(display("Invalid worker pool: {reason}"))]
    InvalidWorkerPool {
        /// What is wrong with the sizing.
        reason: String,
    },

    /// The HTTP client could not be constructed.
    #[snafu(display("Cannot build HTTP client: {source}"))]
    HttpClient {
        /// Underlying reqwest error.
        source: reqwest::Error,
    },

    /// Retrieving a remote resource failed.
    #[snafu(display("Fetching {url} failed: {source}"))]
    Fetch {
        /// Remote location.
        url: String,
        /// Underlying reqwest error.
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[snafu(display("Fetching {url} returned HTTP {status}"))]
    Status {
        /// Remote location.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Writing the retrieved payload locally failed.
    #[snafu(display("Cannot store {path}: {source}"))]
    Store {
        /// Local destination.
        path: String,
        /// Underlying storage error.
        #[snafu(backtrace)]
        source: StorageError,
    },
}

impl AcquisitionError {
    /// Coarse classification of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            AcquisitionError::InvalidCadence { .. }
            | AcquisitionError::NoWavelengths
            | AcquisitionError::InvalidWavelength { .. }
            | AcquisitionError::InvalidFilenamePattern { .. }
            | AcquisitionError::MissingWavelengthPlaceholder { .. }
            | AcquisitionError::EmptyJobList
            | AcquisitionError::InvalidNodeCount { .. }
            | AcquisitionError::NodeIndexOutOfRange { .. }
            | AcquisitionError::InvalidWorkerPool { .. }
            | AcquisitionError::HttpClient { .. } => ErrorCategory::Config,
            AcquisitionError::NoJobs { .. } => ErrorCategory::Data,
            AcquisitionError::Fetch { .. } | AcquisitionError::Status { .. } => {
                ErrorCategory::TransientFetch
            }
            AcquisitionError::Store { .. } => ErrorCategory::Io,
        }
    }
}

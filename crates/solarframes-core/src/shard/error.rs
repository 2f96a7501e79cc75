use snafu::{Backtrace, prelude::*};

use crate::{error::ErrorCategory, storage::StorageError};

/// Errors raised by shard store implementations and manifest discovery.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ShardError {
    /// No `*.json` manifest was found in the data directory.
    #[snafu(display("No index file (.json) found in {dir}"))]
    NoManifest {
        /// Directory that was searched.
        dir: String,
    },

    /// More than one `*.json` file was found, so the manifest is ambiguous.
    #[snafu(display("Multiple index files (.json) found in {dir}: {}", candidates.join(", ")))]
    AmbiguousManifest {
        /// Directory that was searched.
        dir: String,
        /// All candidate file names, sorted.
        candidates: Vec<String>,
    },

    /// Listing the data directory failed.
    #[snafu(display("Cannot list data directory {dir}: {source}"))]
    ReadDir {
        /// Directory that could not be listed.
        dir: String,
        /// Underlying I/O error.
        source: std::io::Error,
        /// Backtrace captured at the failure.
        backtrace: Backtrace,
    },

    /// Reading the manifest file failed.
    #[snafu(display("Cannot read shard manifest: {source}"))]
    ManifestRead {
        /// Underlying storage error.
        #[snafu(backtrace)]
        source: StorageError,
    },

    /// The manifest is not valid JSON or lacks required fields.
    #[snafu(display("Invalid shard manifest {path}: {source}"))]
    ManifestJson {
        /// Manifest path.
        path: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// A shard URL points somewhere this store cannot read from.
    #[snafu(display("Unsupported shard url '{url}' (only local tar files are supported)"))]
    UnsupportedShardUrl {
        /// The offending URL.
        url: String,
    },

    /// Reading a tar shard failed.
    #[snafu(display("I/O error reading shard {path}: {source}"))]
    ShardIo {
        /// Shard path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
        /// Backtrace captured at the failure.
        backtrace: Backtrace,
    },

    /// A tar member path is not valid UTF-8.
    #[snafu(display("Shard {path} contains a member with a non UTF-8 path"))]
    MemberPath {
        /// Shard path.
        path: String,
    },

    /// The number of records found in a shard disagrees with the manifest.
    #[snafu(display("Shard {path} holds {actual} samples but the manifest declares {expected}"))]
    SampleCountMismatch {
        /// Shard path.
        path: String,
        /// `nsamples` from the manifest.
        expected: usize,
        /// Samples found while cataloguing.
        actual: usize,
    },

    /// A record index outside `0..len` was requested.
    #[snafu(display("Record index {index} out of range for store of length {len}"))]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Store length.
        len: usize,
    },
}

impl ShardError {
    /// Coarse classification of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ShardError::NoManifest { .. }
            | ShardError::AmbiguousManifest { .. }
            | ShardError::UnsupportedShardUrl { .. } => ErrorCategory::Config,
            ShardError::ReadDir { .. }
            | ShardError::ManifestRead { .. }
            | ShardError::ShardIo { .. } => ErrorCategory::Io,
            ShardError::ManifestJson { .. }
            | ShardError::MemberPath { .. }
            | ShardError::SampleCountMismatch { .. }
            | ShardError::IndexOutOfRange { .. } => ErrorCategory::Data,
        }
    }
}

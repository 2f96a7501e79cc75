//! Error types and SNAFU context selectors for the dataset layer.
//!
//! Context selectors are `pub(crate)` so the index builder, cache and frame
//! accessor can attach context without re-exporting them at the crate root.

use chrono::NaiveDateTime;
use snafu::prelude::*;

use crate::{error::ErrorCategory, npy::NpyError, shard::ShardError, storage::StorageError};

/// Errors from building, caching and querying a temporal index.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DatasetError {
    /// The requested channel set is empty or contains an unusable name.
    #[snafu(display("Invalid channel set: {reason}"))]
    InvalidChannelSet {
        /// Why the channel set was rejected.
        reason: String,
    },

    /// The underlying shard store failed.
    #[snafu(display("Shard store error: {source}"))]
    Shard {
        /// Underlying shard store error.
        #[snafu(source, backtrace)]
        source: ShardError,
    },

    /// A complete record's key is not a `YYYY/MM/DD/HHMM` timestamp.
    ///
    /// Index construction is all-or-nothing, so this aborts the build.
    #[snafu(display("Record {position} has key '{key}' which is not YYYY/MM/DD/HHMM: {source}"))]
    InvalidRecordKey {
        /// The offending key.
        key: String,
        /// Store position of the record.
        position: usize,
        /// Underlying chrono parse error.
        source: chrono::ParseError,
    },

    /// No record contains every requested channel.
    #[snafu(display("No frames found with channels [{channels}] among {total} records"))]
    NoCompleteFrames {
        /// Channel names joined by `, `.
        channels: String,
        /// Number of records scanned.
        total: usize,
    },

    /// A query string is not an ISO-8601 timestamp.
    #[snafu(display(
        "Cannot parse '{input}' as an ISO-8601 timestamp (expected e.g. 2022-11-01T00:01:00)"
    ))]
    InvalidIsoTimestamp {
        /// The raw query string.
        input: String,
    },

    /// The resolved date has no entry in the index.
    #[snafu(display("Date {date} is not present in the index"))]
    DateNotIndexed {
        /// The date that was looked up.
        date: NaiveDateTime,
    },

    /// A positional query is past the end of the index.
    #[snafu(display("Position {position} is out of range for an index of {len} dates"))]
    PositionOutOfRange {
        /// Requested position.
        position: usize,
        /// Number of indexed dates.
        len: usize,
    },

    /// An indexed record no longer carries one of the channel fields.
    #[snafu(display("Record '{key}' is missing field {suffix}; the index cache may be stale"))]
    MissingChannelField {
        /// Record key.
        key: String,
        /// Missing field suffix.
        suffix: String,
    },

    /// A channel payload is not a decodable `.npy` array.
    #[snafu(display("Cannot decode channel field {suffix}: {source}"))]
    ChannelArray {
        /// Field suffix being decoded.
        suffix: String,
        /// Underlying codec error.
        source: NpyError,
    },

    /// Channel arrays cannot be stacked without resizing or casting.
    #[snafu(display("Cannot stack channel arrays: {reason}"))]
    FrameMismatch {
        /// Description of the mismatch.
        reason: String,
    },

    /// Reading the index cache failed.
    #[snafu(display("Cannot read index cache: {source}"))]
    CacheRead {
        /// Underlying storage error.
        #[snafu(backtrace)]
        source: StorageError,
    },

    /// Writing the index cache failed.
    #[snafu(display("Cannot write index cache: {source}"))]
    CacheWrite {
        /// Underlying storage error.
        #[snafu(backtrace)]
        source: StorageError,
    },

    /// Encoding the index cache failed.
    #[snafu(display("Cannot encode index cache: {source}"))]
    CacheEncode {
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

impl DatasetError {
    /// Coarse classification of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            DatasetError::InvalidChannelSet { .. } => ErrorCategory::Config,
            DatasetError::Shard { source } => source.category(),
            DatasetError::InvalidRecordKey { .. } | DatasetError::InvalidIsoTimestamp { .. } => {
                ErrorCategory::Parse
            }
            DatasetError::DateNotIndexed { .. } | DatasetError::PositionOutOfRange { .. } => {
                ErrorCategory::Lookup
            }
            DatasetError::NoCompleteFrames { .. }
            | DatasetError::MissingChannelField { .. }
            | DatasetError::ChannelArray { .. }
            | DatasetError::FrameMismatch { .. }
            | DatasetError::CacheEncode { .. } => ErrorCategory::Data,
            DatasetError::CacheRead { .. } | DatasetError::CacheWrite { .. } => ErrorCategory::Io,
        }
    }
}

//! Core library for time-aligned, multi-channel solar imagery.
//!
//! Two independent paths live here:
//!
//! - The query path: a shard store of per-timestamp records (`shard`)
//!   is scanned into a cached temporal index and served as stacked
//!   multi-channel frames (`dataset`). Channel payloads are `.npy` arrays
//!   decoded by the `npy` module.
//! - The acquisition path: a cadence plan over a date range is expanded into
//!   download jobs, partitioned across worker nodes, and fetched by a bounded
//!   async worker pool (`acquisition`).
//!
//! Every public error type exposes an [`ErrorCategory`] so callers can react
//! to configuration, data, lookup, parse, I/O and transient fetch failures
//! without matching on concrete variants.
#![deny(missing_docs)]
pub mod acquisition;
pub mod dataset;
pub mod error;
pub mod npy;
pub mod shard;
pub mod storage;

pub use acquisition::{AcquisitionConfig, AcquisitionError, DownloadJob, FetchSummary};
pub use dataset::{ChannelSet, Dataset, DatasetError, DatasetOptions, Frame, FrameQuery};
pub use error::ErrorCategory;
pub use shard::{ShardError, ShardRecord, ShardStore};

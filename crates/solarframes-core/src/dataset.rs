//! Time-aligned, multi-channel dataset access.
//!
//! A [`Dataset`] pairs a [`ShardStore`] with a [`TemporalIndex`] built for a
//! fixed [`ChannelSet`]. Opening a dataset either loads the index from its
//! cache artifact or scans the store and persists the result; afterwards the
//! index is immutable and every [`Dataset::get`] reads one record and stacks
//! its channel arrays into a [`Frame`].
//!
//! ```no_run
//! # async fn demo() -> Result<(), solarframes_core::dataset::DatasetError> {
//! use solarframes_core::dataset::{Dataset, DatasetOptions};
//!
//! let ds = Dataset::open("/data/sdoml-lite".as_ref(), DatasetOptions::default()).await?;
//! let (frame, date) = ds.get("2022-11-01T00:01:00")?;
//! println!("{date}: {:?}", frame.shape());
//! # Ok(())
//! # }
//! ```

mod cache;
mod channels;
mod error;
mod frame;
mod index;
mod query;

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use log::info;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

pub use cache::{CACHE_FORMAT_VERSION, cache_path};
pub use channels::{ChannelSet, DEFAULT_CHANNELS};
pub use error::DatasetError;
pub use frame::Frame;
pub use index::{RECORD_KEY_FORMAT, TemporalIndex, parse_record_key};
pub use query::{FrameQuery, ISO_FORMAT, format_iso, parse_iso_timestamp};

use error::{ChannelArraySnafu, MissingChannelFieldSnafu, ShardSnafu};

use crate::{
    npy::NpyArray,
    shard::{ShardStore, TarShardStore, discover_manifest},
};

/// How the index cache artifact is used when opening a dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Load the cache when present, otherwise build and persist it.
    #[default]
    ReadWrite,
    /// Ignore any existing cache, build, and overwrite it.
    Rebuild,
    /// Neither read nor write a cache.
    Disabled,
}

/// Options for [`Dataset::open`] and [`Dataset::from_store`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetOptions {
    /// Channels required per frame, in stack order.
    pub channels: ChannelSet,
    /// Cache behavior.
    #[serde(default)]
    pub cache: CacheMode,
}

impl DatasetOptions {
    /// Options for the given channel list with the default cache mode.
    pub fn with_channels(channels: ChannelSet) -> Self {
        Self {
            channels,
            cache: CacheMode::default(),
        }
    }
}

/// Summary of how much of the store is usable for the channel set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    /// Records in the store.
    pub frames_total: usize,
    /// Indexed dates.
    pub frames_available: usize,
    /// Records that are not indexed (incomplete or duplicate dates).
    pub frames_dropped: usize,
    /// Whether the index came from the cache artifact.
    pub from_cache: bool,
}

/// Queryable view of a shard store for one channel set.
#[derive(Debug)]
pub struct Dataset<S: ShardStore = TarShardStore> {
    store: S,
    channels: ChannelSet,
    suffixes: Vec<String>,
    index: TemporalIndex,
    cache_path: Option<PathBuf>,
    stats: IndexStats,
}

impl Dataset<TarShardStore> {
    /// Open the dataset whose manifest is the single `*.json` file in
    /// `data_dir`.
    pub async fn open(data_dir: &Path, options: DatasetOptions) -> Result<Self, DatasetError> {
        let manifest = discover_manifest(data_dir).await.context(ShardSnafu)?;
        let store = TarShardStore::open(&manifest).await.context(ShardSnafu)?;
        Self::from_store(store, options).await
    }
}

impl<S: ShardStore> Dataset<S> {
    /// Build or load the index for `store`.
    ///
    /// # Errors
    ///
    /// Any index build error, plus [`DatasetError::CacheRead`] /
    /// [`DatasetError::CacheWrite`] for cache I/O failures. A corrupt or
    /// mismatched cache is not an error; it is rebuilt.
    pub async fn from_store(store: S, options: DatasetOptions) -> Result<Self, DatasetError> {
        let DatasetOptions { channels, cache } = options;

        let artifact = match cache {
            CacheMode::Disabled => None,
            CacheMode::ReadWrite | CacheMode::Rebuild => {
                Some(cache_path(store.root(), &channels, store.fingerprint()))
            }
        };

        let cached = match (&artifact, cache) {
            (Some(path), CacheMode::ReadWrite) => cache::load(path, &channels).await?,
            _ => None,
        };
        let from_cache = cached.is_some();

        let index = match cached {
            Some(index) => index,
            None => {
                let index = TemporalIndex::build(&store, &channels)?;
                if let Some(path) = &artifact {
                    cache::persist(path, &channels, &index).await?;
                }
                index
            }
        };

        let stats = IndexStats {
            frames_total: store.len(),
            frames_available: index.len(),
            frames_dropped: store.len().saturating_sub(index.len()),
            from_cache,
        };

        match index.range() {
            Some((first, last)) => info!(
                "indexed {} of {} records for [{channels}] from {} to {}{}",
                stats.frames_available,
                stats.frames_total,
                format_iso(&first),
                format_iso(&last),
                if from_cache { " (cached)" } else { "" }
            ),
            None => info!("index for [{channels}] is empty"),
        }

        Ok(Self {
            suffixes: channels.suffixes(),
            store,
            channels,
            index,
            cache_path: artifact,
            stats,
        })
    }

    /// Number of indexed dates.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns `true` when no date is indexed.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Indexed dates in order.
    pub fn dates(&self) -> &[NaiveDateTime] {
        self.index.dates()
    }

    /// Channel set frames are stacked in.
    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    /// First and last indexed dates.
    pub fn date_range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        self.index.range()
    }

    /// Index statistics gathered at open time.
    pub fn stats(&self) -> IndexStats {
        self.stats
    }

    /// The underlying index.
    pub fn index(&self) -> &TemporalIndex {
        &self.index
    }

    /// The underlying shard store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Cache artifact location, unless caching is disabled.
    pub fn cache_path(&self) -> Option<&Path> {
        self.cache_path.as_deref()
    }

    /// Resolve `query` and assemble its frame.
    ///
    /// Returns the stacked frame and the resolved date as
    /// `YYYY-MM-DDTHH:MM:SS`.
    pub fn get(&self, query: impl Into<FrameQuery>) -> Result<(Frame, String), DatasetError> {
        let (date, position) = query.into().resolve(&self.index)?;
        let frame = self.read_frame(position)?;
        Ok((frame, format_iso(&date)))
    }

    /// Frame for an exact indexed date.
    pub fn frame_at(&self, date: NaiveDateTime) -> Result<Frame, DatasetError> {
        self.get(date).map(|(frame, _)| frame)
    }

    fn read_frame(&self, position: usize) -> Result<Frame, DatasetError> {
        let record = self.store.record(position).context(ShardSnafu)?;
        let layers = self
            .suffixes
            .iter()
            .map(|suffix| {
                let payload = record.field(suffix).context(MissingChannelFieldSnafu {
                    key: record.key(),
                    suffix: suffix.as_str(),
                })?;
                NpyArray::parse(payload.clone()).context(ChannelArraySnafu {
                    suffix: suffix.as_str(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Frame::stack(&layers)
    }
}

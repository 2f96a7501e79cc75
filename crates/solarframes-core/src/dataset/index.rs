//! Temporal index construction.
//!
//! The index maps each date that has a complete channel set to the position
//! of its record in the shard store. Building it is a single sequential pass:
//!
//! 1. Read the field names of record `i`; skip it unless every channel
//!    suffix is present.
//! 2. Parse the record key strictly as `YYYY/MM/DD/HHMM`. A malformed key on a
//!    complete record aborts the whole build.
//! 3. Append `(date, i)`.
//!
//! Stores are expected to be chronological. The builder verifies this and
//! falls back to a stable sort by date when it does not hold. When two
//! records share a date, the later position wins and the date is listed once.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use log::{debug, warn};
use snafu::prelude::*;

use super::{
    channels::ChannelSet,
    error::{DatasetError, InvalidRecordKeySnafu, NoCompleteFramesSnafu, ShardSnafu},
};
use crate::shard::ShardStore;

/// Format of shard record keys.
pub const RECORD_KEY_FORMAT: &str = "%Y/%m/%d/%H%M";

/// Parse a record key such as `2022/11/01/0001`.
pub fn parse_record_key(key: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(key, RECORD_KEY_FORMAT)
}

/// Sorted date list plus date to store-position mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporalIndex {
    dates: Vec<NaiveDateTime>,
    positions: BTreeMap<NaiveDateTime, usize>,
}

impl TemporalIndex {
    /// Scan `store` and index every record that carries all of `channels`.
    ///
    /// # Errors
    ///
    /// - [`DatasetError::Shard`] if the store cannot be read.
    /// - [`DatasetError::InvalidRecordKey`] if a complete record's key is not a
    ///   `YYYY/MM/DD/HHMM` timestamp.
    /// - [`DatasetError::NoCompleteFrames`] if no record is complete.
    pub fn build<S>(store: &S, channels: &ChannelSet) -> Result<Self, DatasetError>
    where
        S: ShardStore + ?Sized,
    {
        let suffixes = channels.suffixes();
        let mut entries: Vec<(NaiveDateTime, usize)> = Vec::new();

        for position in 0..store.len() {
            let names = store.field_names(position).context(ShardSnafu)?;
            if !suffixes.iter().all(|s| names.contains(s)) {
                continue;
            }
            let key = store.key(position).context(ShardSnafu)?;
            let date = parse_record_key(&key).context(InvalidRecordKeySnafu {
                key: key.as_str(),
                position,
            })?;
            entries.push((date, position));
        }

        ensure!(
            !entries.is_empty(),
            NoCompleteFramesSnafu {
                channels: channels.joined(", "),
                total: store.len(),
            }
        );

        if !entries.windows(2).all(|w| w[0].0 <= w[1].0) {
            warn!("shard store is not in chronological order; sorting index by date");
            entries.sort_by_key(|(date, _)| *date);
        }

        let mut dates = Vec::with_capacity(entries.len());
        let mut positions = BTreeMap::new();
        for (date, position) in entries {
            match positions.insert(date, position) {
                None => dates.push(date),
                Some(previous) => {
                    debug!("duplicate record for {date}: position {position} replaces {previous}")
                }
            }
        }

        Ok(Self { dates, positions })
    }

    /// Rebuild an index from its persisted parts.
    ///
    /// Returns `None` when the parts disagree (a date list entry missing from
    /// the mapping, or differing lengths).
    pub(crate) fn from_parts(
        dates: Vec<NaiveDateTime>,
        positions: BTreeMap<NaiveDateTime, usize>,
    ) -> Option<Self> {
        let consistent =
            dates.len() == positions.len() && dates.iter().all(|d| positions.contains_key(d));
        consistent.then_some(Self { dates, positions })
    }

    pub(crate) fn positions(&self) -> &BTreeMap<NaiveDateTime, usize> {
        &self.positions
    }

    /// Indexed dates in order.
    pub fn dates(&self) -> &[NaiveDateTime] {
        &self.dates
    }

    /// Number of indexed dates.
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    /// Returns `true` when nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Store position of the record for `date`.
    pub fn position_of(&self, date: &NaiveDateTime) -> Option<usize> {
        self.positions.get(date).copied()
    }

    /// Date at index position `i`.
    pub fn date_at(&self, i: usize) -> Option<NaiveDateTime> {
        self.dates.get(i).copied()
    }

    /// First and last indexed dates.
    pub fn range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        Some((*self.dates.first()?, *self.dates.last()?))
    }
}

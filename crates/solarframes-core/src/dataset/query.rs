//! Frame queries and ISO timestamp handling.

use chrono::{NaiveDate, NaiveDateTime};
use snafu::prelude::*;

use super::{
    error::{DatasetError, DateNotIndexedSnafu, InvalidIsoTimestampSnafu, PositionOutOfRangeSnafu},
    index::TemporalIndex,
};

/// Output format for resolved dates. Fractional seconds appear only when
/// non-zero.
pub const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

const ISO_INPUT_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Ways of addressing a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameQuery {
    /// Zero-based position in the date list.
    Position(usize),
    /// An exact timestamp.
    Timestamp(NaiveDateTime),
    /// An ISO-8601 timestamp string.
    Iso(String),
}

impl FrameQuery {
    /// Resolve to an indexed date and its store position.
    ///
    /// # Errors
    ///
    /// - [`DatasetError::PositionOutOfRange`] for a position past the end.
    /// - [`DatasetError::InvalidIsoTimestamp`] if the string does not parse.
    /// - [`DatasetError::DateNotIndexed`] if the date has no indexed record.
    pub fn resolve(&self, index: &TemporalIndex) -> Result<(NaiveDateTime, usize), DatasetError> {
        let date = match self {
            FrameQuery::Position(position) => {
                index.date_at(*position).context(PositionOutOfRangeSnafu {
                    position: *position,
                    len: index.len(),
                })?
            }
            FrameQuery::Timestamp(date) => *date,
            FrameQuery::Iso(input) => parse_iso_timestamp(input)?,
        };
        let position = index
            .position_of(&date)
            .context(DateNotIndexedSnafu { date })?;
        Ok((date, position))
    }
}

impl From<usize> for FrameQuery {
    fn from(value: usize) -> Self {
        FrameQuery::Position(value)
    }
}

impl From<NaiveDateTime> for FrameQuery {
    fn from(value: NaiveDateTime) -> Self {
        FrameQuery::Timestamp(value)
    }
}

impl From<&str> for FrameQuery {
    fn from(value: &str) -> Self {
        FrameQuery::Iso(value.to_string())
    }
}

impl From<String> for FrameQuery {
    fn from(value: String) -> Self {
        FrameQuery::Iso(value)
    }
}

/// Parse an ISO-8601 timestamp without offset.
///
/// Accepts `2022-11-01T00:01:00`, optional fractional seconds, a space in place
/// of `T`, minute precision (`2022-11-01T00:01`) and a bare date (midnight).
pub fn parse_iso_timestamp(input: &str) -> Result<NaiveDateTime, DatasetError> {
    let trimmed = input.trim();
    ISO_INPUT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .context(InvalidIsoTimestampSnafu { input })
}

/// Render a date as `YYYY-MM-DDTHH:MM:SS`.
pub fn format_iso(date: &NaiveDateTime) -> String {
    date.format(ISO_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn dt(hh: u32, mm: u32, ss: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 11, 1)
            .and_then(|d| d.and_hms_opt(hh, mm, ss))
            .expect("valid date")
    }

    fn index() -> TemporalIndex {
        let dates = vec![dt(0, 1, 0), dt(0, 16, 0)];
        let positions: BTreeMap<_, _> = [(dt(0, 1, 0), 0), (dt(0, 16, 0), 3)].into();
        TemporalIndex::from_parts(dates, positions).expect("consistent")
    }

    #[test]
    fn all_query_forms_resolve_to_the_same_date() {
        let idx = index();
        let expected = (dt(0, 16, 0), 3);
        assert_eq!(FrameQuery::from(1usize).resolve(&idx).unwrap(), expected);
        assert_eq!(FrameQuery::from(dt(0, 16, 0)).resolve(&idx).unwrap(), expected);
        assert_eq!(
            FrameQuery::from("2022-11-01T00:16:00").resolve(&idx).unwrap(),
            expected
        );
    }

    #[test]
    fn lookup_failures_are_classified() {
        let idx = index();
        assert!(matches!(
            FrameQuery::Position(2).resolve(&idx),
            Err(DatasetError::PositionOutOfRange { position: 2, len: 2 })
        ));
        assert!(matches!(
            FrameQuery::from("2022-11-01T00:02:00").resolve(&idx),
            Err(DatasetError::DateNotIndexed { .. })
        ));
        assert!(matches!(
            FrameQuery::from("yesterday").resolve(&idx),
            Err(DatasetError::InvalidIsoTimestamp { .. })
        ));
    }

    #[test]
    fn iso_parsing_accepts_common_forms() {
        assert_eq!(parse_iso_timestamp("2022-11-01T00:01:00").unwrap(), dt(0, 1, 0));
        assert_eq!(parse_iso_timestamp("2022-11-01 00:01:00").unwrap(), dt(0, 1, 0));
        assert_eq!(parse_iso_timestamp("2022-11-01T00:01").unwrap(), dt(0, 1, 0));
        assert_eq!(parse_iso_timestamp("2022-11-01").unwrap(), dt(0, 0, 0));
        assert_eq!(
            parse_iso_timestamp("2022-11-01T00:01:00.000").unwrap(),
            dt(0, 1, 0)
        );
        assert!(parse_iso_timestamp("2022/11/01/0001").is_err());
        assert!(parse_iso_timestamp("2022-11-01T00:01:00+00:00").is_err());
    }

    #[test]
    fn iso_output_drops_zero_fraction() {
        assert_eq!(format_iso(&dt(0, 1, 0)), "2022-11-01T00:01:00");
        let frac = dt(0, 1, 0) + chrono::Duration::milliseconds(500);
        assert_eq!(format_iso(&frac), "2022-11-01T00:01:00.500");
    }
}

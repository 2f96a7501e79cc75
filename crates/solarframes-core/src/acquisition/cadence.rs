//! Cadence rules: start normalization and stepping.
//!
//! Two rules exist. The 15-minute cadence follows the instrument's synoptic
//! slots at minutes `:00`, `:14`, `:30` and `:44`, so consecutive steps
//! alternate between 14 and 16 minutes. Any other cadence must be an even
//! number of minutes and starts on an even minute.

use chrono::{Duration, NaiveDateTime, Timelike};
use snafu::prelude::*;

use super::error::{AcquisitionError, InvalidCadenceSnafu};

/// Minutes of each hour sampled by the 15-minute cadence.
pub const QUARTER_SLOTS: [u32; 4] = [0, 14, 30, 44];

/// A validated cadence rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// The `:00/:14/:30/:44` synoptic cycle.
    Quarter,
    /// A fixed step of an even, non-zero number of minutes.
    Even(u32),
}

impl Cadence {
    /// Validate a cadence given in minutes.
    pub fn new(minutes: u32) -> Result<Self, AcquisitionError> {
        match minutes {
            15 => Ok(Cadence::Quarter),
            m if m != 0 && m % 2 == 0 => Ok(Cadence::Even(m)),
            cadence => InvalidCadenceSnafu { cadence }.fail(),
        }
    }

    /// Nominal cadence in minutes.
    pub fn minutes(&self) -> u32 {
        match self {
            Cadence::Quarter => 15,
            Cadence::Even(m) => *m,
        }
    }

    /// Align `start` to the first timestamp this cadence can produce.
    ///
    /// The quarter cycle snaps the minute down into its bin
    /// (`[0,15) -> 0`, `[15,30) -> 14`, `[30,45) -> 30`, `[45,60) -> 44`).
    /// An even cadence moves an odd minute forward by one, rolling `:59` into
    /// the next hour. Seconds are left untouched.
    pub fn normalize_start(&self, start: NaiveDateTime) -> NaiveDateTime {
        let minute = start.minute();
        match self {
            Cadence::Quarter => {
                let slot = match minute {
                    0..=14 => 0,
                    15..=29 => 14,
                    30..=44 => 30,
                    _ => 44,
                };
                start - Duration::minutes(i64::from(minute - slot))
            }
            Cadence::Even(_) if minute % 2 == 1 => start + Duration::minutes(1),
            Cadence::Even(_) => start,
        }
    }

    /// The timestamp following `current`.
    pub fn step(&self, current: NaiveDateTime) -> NaiveDateTime {
        match self {
            Cadence::Quarter => {
                let minute = current.minute();
                let advance = QUARTER_SLOTS
                    .iter()
                    .find(|&&slot| slot > minute)
                    .map_or(60 - minute, |slot| slot - minute);
                current + Duration::minutes(i64::from(advance))
            }
            Cadence::Even(m) => current + Duration::minutes(i64::from(*m)),
        }
    }

    /// Timestamps in `[normalize_start(start), end)`.
    pub fn plan(&self, start: NaiveDateTime, end: NaiveDateTime) -> CadencePlan {
        CadencePlan {
            cadence: *self,
            current: self.normalize_start(start),
            end,
        }
    }
}

/// Strictly increasing timestamps produced by a [`Cadence`].
#[derive(Debug, Clone)]
pub struct CadencePlan {
    cadence: Cadence,
    current: NaiveDateTime,
    end: NaiveDateTime,
}

impl CadencePlan {
    /// The next timestamp to be yielded (the normalized start before
    /// iteration begins).
    pub fn current(&self) -> NaiveDateTime {
        self.current
    }
}

impl Iterator for CadencePlan {
    type Item = NaiveDateTime;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current >= self.end {
            return None;
        }
        let out = self.current;
        self.current = self.cadence.step(out);
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at(hh: u32, mm: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 11, 1)
            .and_then(|d| d.and_hms_opt(hh, mm, 0))
            .expect("valid time")
    }

    #[test]
    fn validates_cadence() {
        assert_eq!(Cadence::new(15).unwrap(), Cadence::Quarter);
        assert_eq!(Cadence::new(12).unwrap(), Cadence::Even(12));
        for bad in [0, 7, 13, 17] {
            assert!(matches!(
                Cadence::new(bad),
                Err(AcquisitionError::InvalidCadence { cadence }) if cadence == bad
            ));
        }
    }

    #[test]
    fn quarter_start_snaps_down_into_bins() {
        let q = Cadence::Quarter;
        assert_eq!(q.normalize_start(at(3, 7)), at(3, 0));
        assert_eq!(q.normalize_start(at(3, 20)), at(3, 14));
        assert_eq!(q.normalize_start(at(3, 38)), at(3, 30));
        assert_eq!(q.normalize_start(at(3, 50)), at(3, 44));
        assert_eq!(q.normalize_start(at(3, 15)), at(3, 14));
        assert_eq!(q.normalize_start(at(3, 44)), at(3, 30));
    }

    #[test]
    fn quarter_steps_cycle_through_slots() {
        let q = Cadence::Quarter;
        assert_eq!(q.step(at(5, 0)), at(5, 14));
        assert_eq!(q.step(at(5, 14)), at(5, 30));
        assert_eq!(q.step(at(5, 30)), at(5, 44));
        assert_eq!(q.step(at(5, 44)), at(6, 0));
        assert_eq!(q.step(at(23, 44)), at(0, 0) + Duration::days(1));
    }

    #[test]
    fn even_start_rounds_odd_minutes_up() {
        let c = Cadence::Even(12);
        assert_eq!(c.normalize_start(at(1, 7)), at(1, 8));
        assert_eq!(c.normalize_start(at(1, 8)), at(1, 8));
        assert_eq!(c.normalize_start(at(1, 59)), at(2, 0));
    }

    #[test]
    fn plan_is_strictly_increasing_and_end_exclusive() {
        let plan: Vec<_> = Cadence::Quarter.plan(at(0, 2), at(1, 14)).collect();
        assert_eq!(plan, vec![at(0, 0), at(0, 14), at(0, 30), at(0, 44), at(1, 0)]);

        let plan: Vec<_> = Cadence::Even(20).plan(at(0, 1), at(1, 2)).collect();
        assert_eq!(plan, vec![at(0, 2), at(0, 22), at(0, 42)]);
        assert!(plan.windows(2).all(|w| w[0] < w[1]));

        assert_eq!(Cadence::Even(2).plan(at(1, 0), at(1, 0)).count(), 0);
    }
}

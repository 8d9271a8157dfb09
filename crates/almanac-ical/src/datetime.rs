use almanac_core::error::{CoreError, CoreResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// A calendar date-time as stored on a component: a local (naive) value
/// plus an optional timezone identifier and a date-only flag.
///
/// Date-valued times carry midnight in `value`. Floating values (no
/// `tzid`) and date values are interpreted in the session default zone
/// at resolution time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalDateTime {
    pub value: NaiveDateTime,
    pub tzid: Option<String>,
    pub is_date: bool,
}

impl CalDateTime {
    /// ## Summary
    /// Builds a UTC date-time value.
    ///
    /// ## Panics
    /// Panics if the calendar date or time of day is out of range.
    #[must_use]
    pub fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Self {
        let date = NaiveDate::from_ymd_opt(year, month, day).expect("valid calendar date");
        let time = NaiveTime::from_hms_opt(hour, minute, second).expect("valid time of day");
        Self {
            value: NaiveDateTime::new(date, time),
            tzid: Some("UTC".to_string()),
            is_date: false,
        }
    }

    /// ## Summary
    /// Builds a zoned local date-time value.
    #[must_use]
    pub fn zoned(value: NaiveDateTime, tzid: impl Into<String>) -> Self {
        Self {
            value,
            tzid: Some(tzid.into()),
            is_date: false,
        }
    }

    /// ## Summary
    /// Builds a floating local date-time value (no timezone identifier).
    #[must_use]
    pub const fn floating(value: NaiveDateTime) -> Self {
        Self {
            value,
            tzid: None,
            is_date: false,
        }
    }

    /// ## Summary
    /// Builds a date-only value at midnight.
    ///
    /// ## Panics
    /// Panics if the calendar date is out of range.
    #[must_use]
    pub fn date(year: i32, month: u32, day: u32) -> Self {
        let date = NaiveDate::from_ymd_opt(year, month, day).expect("valid calendar date");
        Self {
            value: date.and_time(NaiveTime::MIN),
            tzid: None,
            is_date: true,
        }
    }
}

/// Query bounds for occurrence materialization.
///
/// Both bounds are inclusive: a candidate interval overlaps the window
/// iff `candidate.start <= window.end && candidate.end >= window.start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// ## Summary
    /// Builds a window from its bounds.
    ///
    /// ## Errors
    /// Returns `CoreError::InvalidInput` if `start` is after `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> CoreResult<Self> {
        if start > end {
            return Err(CoreError::InvalidInput(format!(
                "window start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// ## Summary
    /// Tests whether a candidate interval overlaps this window.
    #[must_use]
    pub fn contains(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start <= self.end && end >= self.start
    }
}

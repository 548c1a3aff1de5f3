//! Granularity units used by chunking and rotation policies

use crate::point::TimeRange;
use chrono::{DateTime, Datelike, Months, Utc};
use serde::{Deserialize, Serialize};

pub const MS_IN_SECOND: i64 = 1_000;
pub const MS_IN_MINUTE: i64 = 60 * MS_IN_SECOND;
pub const MS_IN_HOUR: i64 = 60 * MS_IN_MINUTE;
pub const MS_IN_DAY: i64 = 24 * MS_IN_HOUR;

/// Magnitude of a policy amount.
///
/// Time units measure the elapsed span of a `TimeRange`. `Points` has no
/// time meaning; policies using it count events instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Unit {
    Milliseconds,
    Seconds,
    Hours,
    Days,
    Months,
    Years,
    Points,
}

impl Unit {
    /// Measure `range` in this unit, truncating toward zero.
    ///
    /// Returns `None` for `Points`.
    pub fn apply(&self, range: &TimeRange) -> Option<i64> {
        match self {
            Self::Milliseconds => Some(range.duration_ms()),
            Self::Seconds => Some(range.duration_ms() / MS_IN_SECOND),
            Self::Hours => Some(range.duration_ms() / MS_IN_HOUR),
            Self::Days => Some(range.duration_ms() / MS_IN_DAY),
            Self::Months => Some(calendar_months_between(range)),
            Self::Years => Some(calendar_months_between(range) / 12),
            Self::Points => None,
        }
    }

    pub fn is_time_based(&self) -> bool {
        !matches!(self, Self::Points)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Milliseconds => "MILLISECONDS",
            Self::Seconds => "SECONDS",
            Self::Hours => "HOURS",
            Self::Days => "DAYS",
            Self::Months => "MONTHS",
            Self::Years => "YEARS",
            Self::Points => "POINTS",
        }
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whole calendar months from `begin` to `end` in UTC.
///
/// Month arithmetic clamps to the end of shorter months, so Jan 31 to
/// Feb 28 counts as one month.
fn calendar_months_between(range: &TimeRange) -> i64 {
    let (Some(begin), Some(end)) = (
        DateTime::<Utc>::from_timestamp_millis(range.begin()),
        DateTime::<Utc>::from_timestamp_millis(range.end()),
    ) else {
        return 0;
    };

    // Upper bound: begin shifted past end's month is always after end.
    let mut months = (end.year() as i64 - begin.year() as i64) * 12 + end.month() as i64
        - begin.month() as i64;

    while months > 0 {
        match begin.checked_add_months(Months::new(months as u32)) {
            Some(shifted) if shifted <= end => break,
            _ => months -= 1,
        }
    }

    months.max(0)
}

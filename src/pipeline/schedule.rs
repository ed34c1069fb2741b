//! Weekly cadence: Sunday 00:00 UTC, no catch-up of missed intervals.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};

/// First date the pipeline may run on.
pub const DEFAULT_START: (i32, u32, u32) = (2026, 1, 7);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Weekly { start: NaiveDate },
}

impl Schedule {
    pub fn weekly(start: NaiveDate) -> Self {
        Schedule::Weekly { start }
    }

    pub fn weekly_from_default_start() -> Self {
        let (y, m, d) = DEFAULT_START;
        // constant date, always valid
        Self::weekly(NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN))
    }

    /// Next firing strictly after `now`, never before the start date.
    pub fn next_run(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Schedule::Weekly { start } => {
                let start = Utc.from_utc_datetime(&start.and_time(chrono::NaiveTime::MIN));
                // a firing exactly at `start` counts, so step back one instant
                let reference = now.max(start - Duration::nanoseconds(1));
                next_sunday_midnight(reference)
            }
        }
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Schedule::Weekly { start } => write!(f, "@weekly (Sunday 00:00 UTC, from {start})"),
        }
    }
}

fn next_sunday_midnight(after: DateTime<Utc>) -> DateTime<Utc> {
    let date = after.date_naive();
    let days_until = (7 - date.weekday().num_days_from_sunday()) % 7;
    let candidate = Utc.from_utc_datetime(&(date + Duration::days(days_until as i64)).and_time(chrono::NaiveTime::MIN));
    if candidate > after {
        candidate
    } else {
        candidate + Duration::days(7)
    }
}

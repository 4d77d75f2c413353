//! ISO-8601 week arithmetic shared by the frequency and streak engines.

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

/// Identifies one ISO week: the (year, week) pair that keys frequency
/// rows plus the Monday that starts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WeekKey {
    pub year: i64,
    pub week: i64,
    pub week_start: NaiveDate,
}

/// Resolve the ISO week a date belongs to.
///
/// Late-December dates can fall into week 1 of the next ISO year and
/// early-January dates into week 52/53 of the previous one; `year` is
/// the ISO week-year, not the calendar year.
pub fn iso_week_of(date: NaiveDate) -> WeekKey {
    let iso = date.iso_week();
    let week_start = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));

    WeekKey {
        year: i64::from(iso.year()),
        week: i64::from(iso.week()),
        week_start,
    }
}

/// Bit for a date's weekday in a frequency `days_mask`, Monday = bit 0.
pub fn day_bit(date: NaiveDate) -> i64 {
    1 << date.weekday().num_days_from_monday()
}

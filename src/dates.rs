//! Calendar-date helpers shared by the tracker API and the offline client.
//!
//! The tracker works in calendar days. Clients send either a bare
//! `YYYY-MM-DD` string or a full timestamp, and a timestamp must be read in
//! the client's own offset, never converted to UTC first, or late-evening
//! completions land on the next day.

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone};
use std::fmt::Display;
use thiserror::Error;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error, PartialEq)]
pub enum DateError {
    #[error("invalid date '{0}', expected YYYY-MM-DD or an RFC 3339 timestamp")]
    Invalid(String),
    #[error("local midnight does not exist for {0}")]
    NoLocalMidnight(NaiveDate),
}

/// Formats the calendar day of `dt` in its own time zone.
pub fn get_local_date_string<Tz>(dt: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    dt.format(DATE_FORMAT).to_string()
}

/// Parses `YYYY-MM-DD` as the start of that day in the local time zone.
///
/// Days whose midnight falls in a DST gap resolve to the first valid
/// instant of the day.
pub fn parse_local_date(value: &str) -> Result<DateTime<Local>, DateError> {
    let day = NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| DateError::Invalid(value.to_string()))?;
    start_of_day(&Local, day)
}

pub fn start_of_day<Tz: TimeZone>(tz: &Tz, day: NaiveDate) -> Result<DateTime<Tz>, DateError> {
    let midnight = day.and_time(NaiveTime::MIN);
    (0..=2)
        .find_map(|hours| {
            tz.from_local_datetime(&(midnight + Duration::hours(hours)))
                .earliest()
        })
        .ok_or(DateError::NoLocalMidnight(day))
}

/// Reads the calendar day a client meant, from a date or a timestamp.
pub fn to_utc_date(value: &str) -> Result<NaiveDate, DateError> {
    let trimmed = value.trim();
    if let Ok(day) = NaiveDate::parse_from_str(trimmed, DATE_FORMAT) {
        return Ok(day);
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.date_naive())
        .map_err(|_| DateError::Invalid(value.to_string()))
}

/// Every day from `start` to `end`, both included. Empty when `start > end`.
pub fn date_range(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start
        .iter_days()
        .take_while(move |day| *day <= end)
}

pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

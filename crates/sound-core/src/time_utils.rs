use chrono::{Local, NaiveDate};

use crate::error::{Result, SoundLogError};
use crate::models::{DATE_FORMAT, TIMESTAMP_FORMAT};

/// Date layouts accepted from users, tried in order.
const INPUT_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m-%d-%Y"];

// ── Date parsing ──────────────────────────────────────────────────────────────

/// Parse a user-supplied date in `YYYY-MM-DD` or `MM-DD-YYYY` form.
///
/// Surrounding whitespace is ignored. Anything else (including impossible
/// calendar dates such as `2024-02-30`) yields
/// [`SoundLogError::UnrecognizedDateFormat`].
pub fn parse_date_input(input: &str) -> Result<NaiveDate> {
    let trimmed = input.trim();
    INPUT_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| SoundLogError::UnrecognizedDateFormat(input.to_string()))
}

/// Normalise a user-supplied date to the canonical `YYYY-MM-DD` string.
pub fn normalize_date(input: &str) -> Result<String> {
    parse_date_input(input).map(format_date)
}

/// Canonical `YYYY-MM-DD` form of a date.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

// ── Wall clock ────────────────────────────────────────────────────────────────

/// Current local time formatted as a reading timestamp.
pub fn now_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Today's local calendar date.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

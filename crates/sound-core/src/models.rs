use chrono::NaiveDate;

/// Header row written at the top of every session CSV.
pub const CSV_HEADER: [&str; 2] = ["Timestamp", "Sound Value(D)"];

/// `strftime` pattern for reading timestamps (`2024-12-04 23:26:23`).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Canonical date pattern used in filenames and reports.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A single sound-level sample with the wall-clock time it was taken.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Local timestamp in `YYYY-MM-DD HH:MM:SS` form.
    pub timestamp: String,
    /// Sound level reported by the device.
    pub value: f64,
}

impl Reading {
    pub fn new(timestamp: impl Into<String>, value: f64) -> Self {
        Self {
            timestamp: timestamp.into(),
            value,
        }
    }

    /// The `HH:MM:SS` part of the timestamp, or the whole string when it has
    /// no date part.
    pub fn time_of_day(&self) -> &str {
        match self.timestamp.split_once(' ') {
            Some((_, time)) => time,
            None => &self.timestamp,
        }
    }
}

/// A raw line received from the device, not yet converted to a number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReading {
    pub timestamp: String,
    pub line: String,
}

impl RawReading {
    /// Convert the line to a [`Reading`], returning `None` if it is not a
    /// finite number.
    pub fn parse(&self) -> Option<Reading> {
        parse_value(&self.line).map(|value| Reading::new(self.timestamp.clone(), value))
    }
}

/// Parse a sound value, rejecting blanks, NaN and infinities.
pub fn parse_value(raw: &str) -> Option<f64> {
    let value: f64 = raw.trim().parse().ok()?;
    value.is_finite().then_some(value)
}

/// Loudest and quietest reading within some set of readings.
#[derive(Debug, Clone, PartialEq)]
pub struct Extremes {
    pub loudest: Reading,
    pub quietest: Reading,
}

impl Extremes {
    /// Linear scan for the maximum and minimum values.
    ///
    /// On ties the earliest reading wins. Returns `None` for an empty slice.
    pub fn from_readings(readings: &[Reading]) -> Option<Self> {
        let first = readings.first()?;
        let mut loudest = first;
        let mut quietest = first;
        for reading in &readings[1..] {
            if reading.value > loudest.value {
                loudest = reading;
            }
            if reading.value < quietest.value {
                quietest = reading;
            }
        }
        Some(Self {
            loudest: loudest.clone(),
            quietest: quietest.clone(),
        })
    }
}

// ── File naming ───────────────────────────────────────────────────────────────

/// `data_<YYYY-MM-DD>_<NN>.csv`
pub fn session_file_name(date: NaiveDate, sequence: u32) -> String {
    format!("data_{}_{:02}.csv", date.format(DATE_FORMAT), sequence)
}

/// `sound_values_plot_<YYYY-MM-DD>_<NN>.png`
pub fn plot_file_name(date: NaiveDate, sequence: u32) -> String {
    format!(
        "sound_values_plot_{}_{:02}.png",
        date.format(DATE_FORMAT),
        sequence
    )
}

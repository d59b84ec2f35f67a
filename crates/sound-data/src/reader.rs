//! Session CSV reading and writing.
//!
//! A session file holds a `Timestamp,Sound Value(D)` header followed by one
//! row per reading. Rows whose value is not a number are skipped with a
//! warning rather than failing the whole file.

use std::path::{Path, PathBuf};

use sound_core::error::{Result, SoundLogError};
use sound_core::models::{parse_value, Extremes, RawReading, Reading, CSV_HEADER};
use tracing::{debug, warn};

/// Readings loaded from one session file.
#[derive(Debug, Clone)]
pub struct SessionTable {
    pub path: PathBuf,
    pub rows: Vec<Reading>,
    /// Rows dropped because their value did not parse.
    pub skipped: usize,
}

impl SessionTable {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn values(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.value).collect()
    }

    pub fn extremes(&self) -> Option<Extremes> {
        Extremes::from_readings(&self.rows)
    }
}

/// Load a session CSV.
///
/// Columns are located by header name; files whose header is missing or
/// renamed fall back to the first two columns.
pub fn read_session(path: &Path) -> Result<SessionTable> {
    let file = std::fs::File::open(path).map_err(|source| SoundLogError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader.headers()?.clone();
    let ts_col = headers.iter().position(|h| h == CSV_HEADER[0]).unwrap_or(0);
    let value_col = headers.iter().position(|h| h == CSV_HEADER[1]).unwrap_or(1);

    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for (index, record) in reader.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                warn!("Skipping unreadable row {} in {}: {}", index + 1, path.display(), e);
                skipped += 1;
                continue;
            }
        };

        let timestamp = record.get(ts_col).unwrap_or_default();
        let raw_value = record.get(value_col).unwrap_or_default();
        match parse_value(raw_value) {
            Some(value) => rows.push(Reading::new(timestamp, value)),
            None => {
                warn!(
                    "Skipping malformed reading {:?} at {} in {}",
                    raw_value,
                    timestamp,
                    path.display()
                );
                skipped += 1;
            }
        }
    }

    debug!(
        "File {}: {} rows loaded, {} skipped",
        path.display(),
        rows.len(),
        skipped
    );

    Ok(SessionTable {
        path: path.to_path_buf(),
        rows,
        skipped,
    })
}

/// Write raw device lines as a session CSV, header first.
///
/// Values are written exactly as received so the file mirrors what the
/// device sent.
pub fn write_session(path: &Path, rows: &[RawReading]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(CSV_HEADER)?;
    for row in rows {
        writer.write_record([row.timestamp.as_str(), row.line.as_str()])?;
    }
    writer.flush()?;
    debug!("Wrote {} row(s) to {}", rows.len(), path.display());
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Per-day loudest/quietest aggregation across session files.

use chrono::NaiveDate;
use sound_core::models::Reading;
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::reader::read_session;

// ── Types ─────────────────────────────────────────────────────────────────────

/// A reading together with the session file it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedReading {
    pub reading: Reading,
    pub file_name: String,
}

/// Loudest and quietest readings across every session file of one day.
#[derive(Debug, Clone, PartialEq)]
pub struct DayExtremes {
    pub date: NaiveDate,
    pub loudest: SourcedReading,
    pub quietest: SourcedReading,
    /// Number of files that contributed at least one reading.
    pub files_used: usize,
}

/// Outcome of aggregating one day. Missing data is a normal result.
#[derive(Debug, Clone, PartialEq)]
pub enum DayReport {
    Found(DayExtremes),
    /// No session file carries this date.
    NoFilesForDate { date: NaiveDate },
    /// Files exist but none held a usable reading.
    NoReadings { date: NaiveDate, files: usize },
}

// ── Aggregation ───────────────────────────────────────────────────────────────

/// Find the loudest and quietest readings recorded on `date`.
///
/// Files are visited in sequence order. Within a file the first occurrence
/// of an extreme wins, and across files a later file only replaces the
/// running extreme when it is strictly louder (or quieter), so ties go to the
/// earliest file. Unreadable files are skipped with a warning.
pub fn aggregate_day(catalog: &Catalog, date: NaiveDate) -> DayReport {
    let files = catalog.for_date(date);
    if files.is_empty() {
        debug!("No session files for {}", date);
        return DayReport::NoFilesForDate { date };
    }

    let mut loudest: Option<SourcedReading> = None;
    let mut quietest: Option<SourcedReading> = None;
    let mut files_used = 0usize;

    for entry in &files {
        let table = match read_session(&entry.path) {
            Ok(t) => t,
            Err(e) => {
                warn!("Skipping {}: {}", entry.path.display(), e);
                continue;
            }
        };
        let Some(extremes) = table.extremes() else {
            warn!("No usable readings in {}", entry.path.display());
            continue;
        };
        files_used += 1;
        let file_name = entry.file_name();

        if loudest
            .as_ref()
            .map_or(true, |cur| extremes.loudest.value > cur.reading.value)
        {
            loudest = Some(SourcedReading {
                reading: extremes.loudest,
                file_name: file_name.clone(),
            });
        }
        if quietest
            .as_ref()
            .map_or(true, |cur| extremes.quietest.value < cur.reading.value)
        {
            quietest = Some(SourcedReading {
                reading: extremes.quietest,
                file_name,
            });
        }
    }

    match (loudest, quietest) {
        (Some(loudest), Some(quietest)) => DayReport::Found(DayExtremes {
            date,
            loudest,
            quietest,
            files_used,
        }),
        _ => DayReport::NoReadings {
            date,
            files: files.len(),
        },
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Interactive `analyze` flow: ask for a date, then print day extremes,
//! per-file anomalies and a summary of the most recent session file.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use chrono::NaiveDate;
use sound_core::error::SoundLogError;
use sound_core::time_utils::{format_date, parse_date_input};
use sound_data::aggregator::{aggregate_day, DayReport};
use sound_data::anomaly::{flag_files, AnomalyReport};
use sound_data::catalog::{find_latest_session, Catalog};
use sound_data::reader::read_session;

const PROMPT: &str =
    "Enter a date (YYYY-MM-DD or MM-DD-YYYY) to find loudest and quietest sounds for that day: ";

pub struct AnalyzeOptions {
    pub data_dir: PathBuf,
    pub contamination: f64,
    pub seed: Option<u64>,
}

/// Prompt until a recognised date is entered. Returns `None` on end of input.
pub fn prompt_for_date<R: BufRead, W: Write>(input: &mut R, out: &mut W) -> io::Result<Option<NaiveDate>> {
    loop {
        write!(out, "{PROMPT}")?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(out)?;
            return Ok(None);
        }

        match parse_date_input(&line) {
            Ok(date) => return Ok(Some(date)),
            Err(e) => {
                tracing::debug!("{}", e);
                writeln!(out, "Invalid date format. Please use YYYY-MM-DD or MM-DD-YYYY.")?;
            }
        }
    }
}

/// Print every report for `date`.
pub fn run_analysis<W: Write>(out: &mut W, opts: &AnalyzeOptions, date: NaiveDate) -> io::Result<()> {
    let day = format_date(date);
    writeln!(out, "Searching for files for date: {day}")?;

    let catalog = Catalog::scan(&opts.data_dir);

    match aggregate_day(&catalog, date) {
        DayReport::Found(ext) => {
            writeln!(
                out,
                "\nOn {day}, the loudest sound was {} at {} in file: {}",
                ext.loudest.reading.value,
                ext.loudest.reading.time_of_day(),
                ext.loudest.file_name
            )?;
            writeln!(
                out,
                "On {day}, the quietest sound was {} at {} in file: {}",
                ext.quietest.reading.value,
                ext.quietest.reading.time_of_day(),
                ext.quietest.file_name
            )?;
        }
        DayReport::NoFilesForDate { .. } => {
            writeln!(out, "No files found for the date: {day}")?;
        }
        DayReport::NoReadings { files, .. } => {
            writeln!(out, "No readable values in the {files} file(s) for the date: {day}")?;
        }
    }

    let results = flag_files(&catalog, date, opts.contamination, opts.seed);
    let mut any = false;
    let mut unchecked = 0;
    for file in &results {
        match &file.report {
            AnomalyReport::Anomalies(rows) => {
                any = true;
                writeln!(out, "\nAnomalies in {}:", file.file_name)?;
                writeln!(out, "  {:<19}  Sound Value(D)", "Timestamp")?;
                for row in rows {
                    writeln!(out, "  {:<19}  {}", row.timestamp, row.value)?;
                }
            }
            AnomalyReport::Unchecked(reason) => {
                unchecked += 1;
                writeln!(out, "\nCould not check {} for anomalies: {reason}", file.file_name)?;
            }
            AnomalyReport::NoAnomalies => {}
        }
    }
    if !any && unchecked == 0 {
        writeln!(out, "\nNo anomalies detected for this date.")?;
    } else if !any {
        writeln!(out, "\nNo anomalies detected in the files that could be checked.")?;
    }

    write_latest_summary(out, opts)
}

fn write_latest_summary<W: Write>(out: &mut W, opts: &AnalyzeOptions) -> io::Result<()> {
    let latest = match find_latest_session(&opts.data_dir) {
        Ok(entry) => entry,
        Err(SoundLogError::NotFound(dir)) => {
            return writeln!(out, "\nNo session files found in {}.", dir.display());
        }
        Err(e) => return writeln!(out, "\nCould not locate the most recent file: {e}"),
    };
    let name = latest.file_name();

    let table = match read_session(&latest.path) {
        Ok(t) => t,
        Err(e) => return writeln!(out, "\nCould not read the most recent file ({name}): {e}"),
    };

    match table.extremes() {
        Some(ext) => {
            writeln!(
                out,
                "\nIn the most recent file ({name}), the loudest sound was {} at {}",
                ext.loudest.value,
                ext.loudest.time_of_day()
            )?;
            writeln!(
                out,
                "In the most recent file, the quietest sound was {} at {}",
                ext.quietest.value,
                ext.quietest.time_of_day()
            )
        }
        None => writeln!(out, "\nThe most recent file ({name}) has no readable values."),
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

//! Polling collector: reads device lines on a fixed cadence until cancelled,
//! then writes the session CSV and plot.
//!
//! The polling loop owns the reading buffer; the only state shared with the
//! stop listener is the [`CancellationToken`].

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use sound_core::error::Result;
use sound_core::models::RawReading;
use sound_core::time_utils::{now_timestamp, today};
use sound_data::catalog::Catalog;
use sound_data::reader::write_session;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::plot::{plot_values, render_plot};
use crate::source::LineSource;

/// Default gap between polls of the device.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Where session CSVs and plots are written.
    pub data_dir: PathBuf,
    pub poll_interval: Duration,
    pub render_plot: bool,
}

impl CollectorConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            render_plot: true,
        }
    }
}

/// What a finished collection produced.
#[derive(Debug, Clone)]
pub struct CollectionSummary {
    pub csv_path: PathBuf,
    /// Set only when the plot was written.
    pub plot_path: Option<PathBuf>,
    pub readings: usize,
    /// Why the plot step failed or was skipped, if it did not run cleanly.
    pub plot_error: Option<String>,
}

pub struct Collector {
    config: CollectorConfig,
}

impl Collector {
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    /// Collect until `token` is cancelled, release the source, then persist.
    pub fn run<S: LineSource>(&self, mut source: S, token: &CancellationToken) -> Result<CollectionSummary> {
        let readings = self.collect(&mut source, token);
        drop(source);
        info!("Collection ended with {} reading(s)", readings.len());
        self.persist(&readings, today())
    }

    /// Poll `source` once per interval, stamping each non-empty line with the
    /// current time. A device error ends collection early; readings gathered
    /// so far are kept.
    pub fn collect<S: LineSource>(&self, source: &mut S, token: &CancellationToken) -> Vec<RawReading> {
        let mut readings = Vec::new();

        while !token.is_cancelled() {
            match source.bytes_available() {
                Ok(0) => {}
                Ok(_) => match source.read_line() {
                    Ok(Some(line)) if !line.is_empty() => {
                        debug!("Reading: {}", line);
                        readings.push(RawReading {
                            timestamp: now_timestamp(),
                            line,
                        });
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Serial read failed, ending collection: {}", e);
                        break;
                    }
                },
                Err(e) => {
                    warn!("Serial device check failed, ending collection: {}", e);
                    break;
                }
            }

            if !self.config.poll_interval.is_zero() {
                thread::sleep(self.config.poll_interval);
            }
        }

        readings
    }

    /// Write `readings` to the next free session file for `date` and,
    /// when enabled, render the plot next to it.
    ///
    /// Plot failures are reported in the summary; the CSV is kept either way.
    pub fn persist(&self, readings: &[RawReading], date: NaiveDate) -> Result<CollectionSummary> {
        std::fs::create_dir_all(&self.config.data_dir)?;
        let paths = Catalog::scan(&self.config.data_dir).allocate(date);

        write_session(&paths.csv, readings)?;
        info!("Saved {} reading(s) to {}", readings.len(), paths.csv.display());

        let mut summary = CollectionSummary {
            csv_path: paths.csv,
            plot_path: None,
            readings: readings.len(),
            plot_error: None,
        };

        if !self.config.render_plot {
            return Ok(summary);
        }
        if readings.is_empty() {
            warn!("No readings collected; skipping plot");
            summary.plot_error = Some("no readings collected".to_string());
            return Ok(summary);
        }

        match plot_values(readings).and_then(|values| render_plot(&values, &paths.plot)) {
            Ok(()) => {
                info!("Saved plot to {}", paths.plot.display());
                summary.plot_path = Some(paths.plot);
            }
            Err(e) => {
                warn!("Plot step failed: {}", e);
                summary.plot_error = Some(e.to_string());
            }
        }

        Ok(summary)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;
    use tempfile::TempDir;

    /// Serves scripted lines and cancels the token once they run out.
    struct ScriptedSource {
        lines: VecDeque<io::Result<Option<String>>>,
        token: CancellationToken,
    }

    impl ScriptedSource {
        fn new(lines: &[&str], token: &CancellationToken) -> Self {
            Self {
                lines: lines.iter().map(|l| Ok(Some(l.to_string()))).collect(),
                token: token.clone(),
            }
        }
    }

    impl LineSource for ScriptedSource {
        fn bytes_available(&mut self) -> io::Result<usize> {
            if self.lines.is_empty() {
                self.token.cancel();
                Ok(0)
            } else {
                Ok(1)
            }
        }

        fn read_line(&mut self) -> io::Result<Option<String>> {
            self.lines.pop_front().unwrap_or(Ok(None))
        }
    }

    fn config(dir: &TempDir) -> CollectorConfig {
        CollectorConfig {
            data_dir: dir.path().to_path_buf(),
            poll_interval: Duration::ZERO,
            render_plot: true,
        }
    }

    fn dec4() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 12, 4).unwrap()
    }

    fn raw(line: &str) -> RawReading {
        RawReading {
            timestamp: "2024-12-04 10:00:00".to_string(),
            line: line.to_string(),
        }
    }

    #[test]
    fn test_config_defaults() {
        let cfg = CollectorConfig::new("/tmp/sound");
        assert_eq!(cfg.data_dir, PathBuf::from("/tmp/sound"));
        assert_eq!(cfg.poll_interval, DEFAULT_POLL_INTERVAL);
        assert!(cfg.render_plot);
    }

    // ── collect ───────────────────────────────────────────────────────────────

    #[test]
    fn test_collect_until_cancelled() {
        let dir = TempDir::new().unwrap();
        let token = CancellationToken::new();
        let mut source = ScriptedSource::new(&["235", "", "234"], &token);

        let readings = Collector::new(config(&dir)).collect(&mut source, &token);
        let lines: Vec<&str> = readings.iter().map(|r| r.line.as_str()).collect();
        assert_eq!(lines, vec!["235", "234"]);
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_collect_precancelled_reads_nothing() {
        let dir = TempDir::new().unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let mut source = ScriptedSource::new(&["235"], &token);

        assert!(Collector::new(config(&dir)).collect(&mut source, &token).is_empty());
    }

    #[test]
    fn test_collect_stops_on_read_error() {
        let dir = TempDir::new().unwrap();
        let token = CancellationToken::new();
        let mut source = ScriptedSource::new(&["1"], &token);
        source
            .lines
            .push_back(Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")));
        source.lines.push_back(Ok(Some("2".to_string())));

        let readings = Collector::new(config(&dir)).collect(&mut source, &token);
        assert_eq!(readings.len(), 1);
        assert!(!token.is_cancelled());
    }

    // ── persist ───────────────────────────────────────────────────────────────

    #[test]
    fn test_persist_writes_csv_and_plot() {
        let dir = TempDir::new().unwrap();
        let summary = Collector::new(config(&dir))
            .persist(&[raw("235"), raw("240")], dec4())
            .unwrap();

        assert_eq!(summary.csv_path, dir.path().join("data_2024-12-04_01.csv"));
        assert_eq!(
            summary.plot_path,
            Some(dir.path().join("sound_values_plot_2024-12-04_01.png"))
        );
        assert_eq!(summary.readings, 2);
        assert!(summary.plot_error.is_none());
        assert!(summary.plot_path.unwrap().exists());
    }

    #[test]
    fn test_persist_uses_next_free_sequence() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("data_2024-12-04_01.csv"), "").unwrap();
        std::fs::write(dir.path().join("data_2024-12-04_02.csv"), "").unwrap();

        let mut cfg = config(&dir);
        cfg.render_plot = false;
        let summary = Collector::new(cfg).persist(&[raw("1")], dec4()).unwrap();
        assert_eq!(summary.csv_path, dir.path().join("data_2024-12-04_03.csv"));
        assert!(summary.plot_path.is_none());
        assert!(summary.plot_error.is_none());
    }

    #[test]
    fn test_persist_malformed_reading_keeps_csv() {
        let dir = TempDir::new().unwrap();
        let summary = Collector::new(config(&dir))
            .persist(&[raw("235"), raw("oops")], dec4())
            .unwrap();

        assert!(summary.csv_path.exists());
        assert!(summary.plot_path.is_none());
        let err = summary.plot_error.unwrap();
        assert!(err.contains("Malformed reading"), "{err}");
        assert!(!dir.path().join("sound_values_plot_2024-12-04_01.png").exists());
    }

    #[test]
    fn test_persist_empty_session() {
        let dir = TempDir::new().unwrap();
        let summary = Collector::new(config(&dir)).persist(&[], dec4()).unwrap();
        assert_eq!(
            std::fs::read_to_string(&summary.csv_path).unwrap(),
            "Timestamp,Sound Value(D)\n"
        );
        assert!(summary.plot_path.is_none());
        assert!(summary.plot_error.is_some());
    }

    #[test]
    fn test_persist_creates_data_dir() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir);
        cfg.data_dir = dir.path().join("nested").join("data");
        let summary = Collector::new(cfg).persist(&[raw("1")], dec4()).unwrap();
        assert!(summary.csv_path.exists());
    }

    // ── run ───────────────────────────────────────────────────────────────────

    #[test]
    fn test_run_end_to_end() {
        let dir = TempDir::new().unwrap();
        let token = CancellationToken::new();
        let source = ScriptedSource::new(&["100", "110", "105"], &token);

        let summary = Collector::new(config(&dir)).run(source, &token).unwrap();
        assert_eq!(summary.readings, 3);

        let table = sound_data::reader::read_session(&summary.csv_path).unwrap();
        assert_eq!(table.values(), vec![100.0, 110.0, 105.0]);
    }
}

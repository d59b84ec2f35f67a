//! Session-file catalog.
//!
//! Lists a data directory once and turns every file named
//! `data_<YYYY-MM-DD>_<NN>.csv` into a [`CatalogEntry`]. Callers locate data
//! through the catalog instead of globbing filenames themselves.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use sound_core::error::{Result, SoundLogError};
use sound_core::models::{plot_file_name, session_file_name, DATE_FORMAT};
use tracing::{debug, warn};

fn session_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^data_(\d{4}-\d{2}-\d{2})_(\d{2,})\.csv$").expect("regex is valid")
    })
}

/// Parse a session filename into its `(date, sequence)` pair.
///
/// Returns `None` for names that do not follow the convention or that embed
/// an impossible calendar date.
pub fn parse_session_file_name(name: &str) -> Option<(NaiveDate, u32)> {
    let caps = session_name_regex().captures(name)?;
    let date = NaiveDate::parse_from_str(&caps[1], DATE_FORMAT).ok()?;
    let sequence = caps[2].parse().ok()?;
    Some((date, sequence))
}

// ── CatalogEntry ──────────────────────────────────────────────────────────────

/// One session file discovered on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub date: NaiveDate,
    /// Two-digit (or wider) suffix: the per-day sequence number.
    pub sequence: u32,
    pub path: PathBuf,
}

impl CatalogEntry {
    /// Base name of the file, e.g. `data_2024-12-04_01.csv`.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

// ── Catalog ───────────────────────────────────────────────────────────────────

/// Every session file in one directory, ordered by `(date, sequence)`.
#[derive(Debug, Clone)]
pub struct Catalog {
    dir: PathBuf,
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Scan `dir` (non-recursively). A missing directory yields an empty
    /// catalog.
    pub fn scan(dir: &Path) -> Self {
        if !dir.exists() {
            warn!("Data directory does not exist: {}", dir.display());
            return Self::from_entries(dir, Vec::new());
        }

        let entries = walkdir::WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                match parse_session_file_name(&name) {
                    Some((date, sequence)) => Some(CatalogEntry {
                        date,
                        sequence,
                        path: entry.into_path(),
                    }),
                    None => {
                        debug!("Skipping non-session file {}", name);
                        None
                    }
                }
            })
            .collect();

        let catalog = Self::from_entries(dir, entries);
        debug!(
            "Catalogued {} session file(s) in {}",
            catalog.entries.len(),
            dir.display()
        );
        catalog
    }

    fn from_entries(dir: &Path, mut entries: Vec<CatalogEntry>) -> Self {
        entries.sort_by(|a, b| {
            (a.date, a.sequence, &a.path).cmp(&(b.date, b.sequence, &b.path))
        });
        Self {
            dir: dir.to_path_buf(),
            entries,
        }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Session files recorded on `date`, in sequence order.
    pub fn for_date(&self, date: NaiveDate) -> Vec<&CatalogEntry> {
        self.entries.iter().filter(|e| e.date == date).collect()
    }

    /// The file with the greatest `(date, sequence)`.
    pub fn latest(&self) -> Option<&CatalogEntry> {
        self.entries.last()
    }

    /// Smallest sequence number (starting at 1) with no file on `date`.
    pub fn next_sequence(&self, date: NaiveDate) -> u32 {
        let taken: Vec<u32> = self.for_date(date).iter().map(|e| e.sequence).collect();
        (1..).find(|n| !taken.contains(n)).unwrap_or(1)
    }

    /// Next free sequence number for `date` with the CSV and plot paths it
    /// maps to.
    pub fn allocate(&self, date: NaiveDate) -> SessionPaths {
        let sequence = self.next_sequence(date);
        SessionPaths {
            sequence,
            csv: self.dir.join(session_file_name(date, sequence)),
            plot: self.dir.join(plot_file_name(date, sequence)),
        }
    }
}

/// Output locations reserved for a new collection session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    pub sequence: u32,
    pub csv: PathBuf,
    pub plot: PathBuf,
}

/// Locate the most recent session file in `dir`.
pub fn find_latest_session(dir: &Path) -> Result<CatalogEntry> {
    Catalog::scan(dir)
        .latest()
        .cloned()
        .ok_or_else(|| SoundLogError::NotFound(dir.to_path_buf()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

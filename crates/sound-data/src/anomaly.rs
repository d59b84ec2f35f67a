//! Unsupervised outlier flagging for session readings.
//!
//! A fresh [`OutlierModel`] is fitted on every file's value column; nothing
//! learned from one file is reused for another. The default model is an
//! isolation forest whose decision threshold is set by a contamination
//! ratio: the expected share of anomalous readings.

use std::thread;

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sound_core::models::Reading;
use sound_core::stats::percentile;
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::reader::{read_session, SessionTable};

/// Expected proportion of anomalous readings.
pub const DEFAULT_CONTAMINATION: f64 = 0.05;

/// Trees grown per fit.
pub const DEFAULT_TREES: usize = 100;

/// Upper bound on the subsample each tree is grown from.
pub const DEFAULT_MAX_SAMPLES: usize = 256;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

// ── Model seam ────────────────────────────────────────────────────────────────

/// A model that can be fitted on one numeric column and label each value.
pub trait OutlierModel {
    /// Fit on `values` and return one label per value; `true` marks an
    /// anomaly.
    fn fit_predict(&mut self, values: &[f64]) -> Vec<bool>;
}

// ── Isolation forest ──────────────────────────────────────────────────────────

enum Node {
    Leaf {
        size: usize,
    },
    Split {
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn grow(sample: &[f64], depth: usize, limit: usize, rng: &mut StdRng) -> Node {
        if depth >= limit || sample.len() <= 1 {
            return Node::Leaf { size: sample.len() };
        }
        let (min, max) = sample
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        if min >= max {
            return Node::Leaf { size: sample.len() };
        }

        // Interpolating keeps huge ranges such as -1e308..1e308 from
        // overflowing; a non-finite bound gives up on splitting.
        let t: f64 = rng.gen();
        let threshold = min * (1.0 - t) + max * t;
        if !threshold.is_finite() {
            return Node::Leaf { size: sample.len() };
        }
        let (left, right): (Vec<f64>, Vec<f64>) =
            sample.iter().copied().partition(|&v| v < threshold);
        Node::Split {
            threshold,
            left: Box::new(Node::grow(&left, depth + 1, limit, rng)),
            right: Box::new(Node::grow(&right, depth + 1, limit, rng)),
        }
    }

    fn path_length(&self, value: f64) -> f64 {
        let mut node = self;
        let mut depth = 0.0;
        loop {
            match node {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split {
                    threshold,
                    left,
                    right,
                } => {
                    node = if value < *threshold { left } else { right };
                    depth += 1.0;
                }
            }
        }
    }
}

/// Average path length of an unsuccessful search in a binary search tree of
/// `n` nodes.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Isolation forest over a single column.
///
/// Without a seed the RNG is drawn from entropy, so labels can differ between
/// runs on the same data.
pub struct IsolationForest {
    contamination: f64,
    n_trees: usize,
    max_samples: usize,
    rng: StdRng,
}

impl IsolationForest {
    pub fn new(contamination: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self {
            contamination,
            n_trees: DEFAULT_TREES,
            max_samples: DEFAULT_MAX_SAMPLES,
            rng,
        }
    }

    /// Fit the forest and return the anomaly score of every value. Scores lie
    /// in `(0, 1]`; higher means easier to isolate.
    pub fn score(&mut self, values: &[f64]) -> Vec<f64> {
        let n = values.len();
        let sample_size = self.max_samples.min(n);
        if sample_size < 2 {
            return vec![0.5; n];
        }
        let height_limit = (sample_size as f64).log2().ceil() as usize;

        let trees: Vec<Node> = (0..self.n_trees)
            .map(|_| {
                let sample: Vec<f64> = rand::seq::index::sample(&mut self.rng, n, sample_size)
                    .iter()
                    .map(|i| values[i])
                    .collect();
                Node::grow(&sample, 0, height_limit, &mut self.rng)
            })
            .collect();

        let norm = average_path_length(sample_size);
        values
            .iter()
            .map(|&v| {
                let mean_path =
                    trees.iter().map(|t| t.path_length(v)).sum::<f64>() / trees.len() as f64;
                2f64.powf(-mean_path / norm)
            })
            .collect()
    }
}

impl OutlierModel for IsolationForest {
    /// Values whose negated score falls strictly below the
    /// `contamination`-th percentile of all negated scores are anomalies.
    fn fit_predict(&mut self, values: &[f64]) -> Vec<bool> {
        if values.len() < 2 {
            return vec![false; values.len()];
        }
        let negated: Vec<f64> = self.score(values).into_iter().map(|s| -s).collect();
        let mut sorted = negated.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let offset = percentile(&sorted, self.contamination * 100.0);
        negated.iter().map(|&s| s < offset).collect()
    }
}

// ── Flagging ──────────────────────────────────────────────────────────────────

/// Result of checking one file. An empty result is an expected outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum AnomalyReport {
    NoAnomalies,
    Anomalies(Vec<Reading>),
    /// The file could not be checked; carries the reason.
    Unchecked(String),
}

impl AnomalyReport {
    pub fn is_empty(&self) -> bool {
        matches!(self, AnomalyReport::NoAnomalies)
    }
}

/// Anomalies found in one session file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileAnomalies {
    pub file_name: String,
    pub report: AnomalyReport,
}

/// Fit `model` on the table's values and return the anomalous rows.
pub fn flag_anomalies<M: OutlierModel>(table: &SessionTable, model: &mut M) -> AnomalyReport {
    let labels = model.fit_predict(&table.values());
    let anomalies: Vec<Reading> = table
        .rows
        .iter()
        .zip(labels)
        .filter(|(_, is_anomaly)| *is_anomaly)
        .map(|(row, _)| row.clone())
        .collect();

    debug!(
        "{}: {} anomalous of {} readings",
        table.file_name(),
        anomalies.len(),
        table.rows.len()
    );

    if anomalies.is_empty() {
        AnomalyReport::NoAnomalies
    } else {
        AnomalyReport::Anomalies(anomalies)
    }
}

/// Flag anomalies in every session file recorded on `date`.
///
/// Each file gets its own freshly fitted forest; files are processed on
/// separate threads and results come back in catalog order. With a seed,
/// file `i` uses `seed + i` so runs are reproducible.
pub fn flag_files(
    catalog: &Catalog,
    date: NaiveDate,
    contamination: f64,
    seed: Option<u64>,
) -> Vec<FileAnomalies> {
    let loaded: Vec<(String, Option<SessionTable>)> = catalog
        .for_date(date)
        .into_iter()
        .map(|entry| match read_session(&entry.path) {
            Ok(t) => (entry.file_name(), Some(t)),
            Err(e) => {
                warn!("Skipping {}: {}", entry.path.display(), e);
                (entry.file_name(), None)
            }
        })
        .collect();

    thread::scope(|scope| {
        let handles: Vec<_> = loaded
            .iter()
            .enumerate()
            .map(|(index, (_, table))| {
                let file_seed = seed.map(|s| s.wrapping_add(index as u64));
                table.as_ref().map(|table| {
                    scope.spawn(move || {
                        let mut model = IsolationForest::new(contamination, file_seed);
                        flag_anomalies(table, &mut model)
                    })
                })
            })
            .collect();

        handles
            .into_iter()
            .zip(&loaded)
            .map(|(handle, (file_name, _))| {
                let report = match handle.map(|h| h.join()) {
                    Some(Ok(report)) => report,
                    Some(Err(_)) => {
                        warn!("Anomaly detection panicked for {}", file_name);
                        AnomalyReport::Unchecked("anomaly detection failed".to_string())
                    }
                    None => AnomalyReport::Unchecked("file could not be read".to_string()),
                };
                FileAnomalies {
                    file_name: file_name.clone(),
                    report,
                }
            })
            .collect()
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn clustered_with_outlier() -> SessionTable {
        let mut rows: Vec<Reading> = (0..20)
            .map(|i| {
                Reading::new(
                    format!("2024-12-04 10:00:{:02}", i),
                    100.0 + (i % 5) as f64 * 0.5,
                )
            })
            .collect();
        rows.insert(10, Reading::new("2024-12-04 10:05:00", 1000.0));
        SessionTable {
            path: PathBuf::from("data_2024-12-04_01.csv"),
            rows,
            skipped: 0,
        }
    }

    fn table(values: &[f64]) -> SessionTable {
        SessionTable {
            path: PathBuf::from("data_2024-12-04_01.csv"),
            rows: values
                .iter()
                .enumerate()
                .map(|(i, v)| Reading::new(format!("2024-12-04 10:00:{:02}", i), *v))
                .collect(),
            skipped: 0,
        }
    }

    fn write_csv(dir: &Path, name: &str, values: &[f64]) {
        let mut content = String::from("Timestamp,Sound Value(D)\n");
        for (i, v) in values.iter().enumerate() {
            content.push_str(&format!("2024-12-04 10:{:02}:00,{v}\n", i % 60));
        }
        std::fs::write(dir.join(name), content).unwrap();
    }

    // ── average_path_length ───────────────────────────────────────────────────

    #[test]
    fn test_average_path_length_small() {
        assert_eq!(average_path_length(0), 0.0);
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        assert!(average_path_length(256) > average_path_length(16));
    }

    // ── IsolationForest ───────────────────────────────────────────────────────

    #[test]
    fn test_outlier_scores_highest() {
        let values = clustered_with_outlier().values();
        let scores = IsolationForest::new(DEFAULT_CONTAMINATION, Some(7)).score(&values);
        let max_idx = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(values[max_idx], 1000.0);
    }

    #[test]
    fn test_constant_column_has_no_anomalies() {
        let labels = IsolationForest::new(DEFAULT_CONTAMINATION, Some(1)).fit_predict(&[42.0; 30]);
        assert!(labels.iter().all(|l| !l));
    }

    #[test]
    fn test_tiny_inputs() {
        let mut model = IsolationForest::new(DEFAULT_CONTAMINATION, Some(1));
        assert!(model.fit_predict(&[]).is_empty());
        assert_eq!(model.fit_predict(&[5.0]), vec![false]);
    }

    #[test]
    fn test_extreme_range_does_not_overflow() {
        let values = [-1e308, 0.0, 1e308, 1.0, 2.0];
        let mut model = IsolationForest::new(0.2, Some(3));
        assert_eq!(model.fit_predict(&values).len(), values.len());
        assert!(model.score(&values).iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_non_finite_values_do_not_panic() {
        let mut values: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        values.push(f64::INFINITY);
        values.push(f64::NEG_INFINITY);
        let labels = IsolationForest::new(DEFAULT_CONTAMINATION, Some(4)).fit_predict(&values);
        assert_eq!(labels.len(), values.len());
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let values: Vec<f64> = (0..60).map(|i| ((i * 37) % 23) as f64).collect();
        let a = IsolationForest::new(0.1, Some(99)).fit_predict(&values);
        let b = IsolationForest::new(0.1, Some(99)).fit_predict(&values);
        assert_eq!(a, b);
    }

    // ── flag_anomalies ────────────────────────────────────────────────────────

    #[test]
    fn test_flag_anomalies_finds_outlier() {
        let table = clustered_with_outlier();
        let mut model = IsolationForest::new(DEFAULT_CONTAMINATION, Some(42));
        match flag_anomalies(&table, &mut model) {
            AnomalyReport::Anomalies(rows) => {
                assert!(rows.iter().any(|r| r.timestamp == "2024-12-04 10:05:00"));
                assert!(rows.iter().any(|r| r.value == 1000.0));
            }
            AnomalyReport::NoAnomalies => panic!("outlier not flagged"),
            AnomalyReport::Unchecked(reason) => panic!("outlier not flagged: unchecked ({reason})"),
        }
    }

    #[test]
    fn test_flag_anomalies_none() {
        let mut model = IsolationForest::new(DEFAULT_CONTAMINATION, Some(3));
        let report = flag_anomalies(&table(&[10.0; 12]), &mut model);
        assert!(report.is_empty());
    }

    struct FlagEverySecond;

    impl OutlierModel for FlagEverySecond {
        fn fit_predict(&mut self, values: &[f64]) -> Vec<bool> {
            (0..values.len()).map(|i| i % 2 == 1).collect()
        }
    }

    #[test]
    fn test_flag_anomalies_uses_model_labels() {
        let report = flag_anomalies(&table(&[1.0, 2.0, 3.0, 4.0]), &mut FlagEverySecond);
        let AnomalyReport::Anomalies(rows) = report else {
            panic!("expected anomalies");
        };
        let values: Vec<f64> = rows.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![2.0, 4.0]);
    }

    // ── flag_files ────────────────────────────────────────────────────────────

    #[test]
    fn test_flag_files_per_file_in_order() {
        let dir = TempDir::new().unwrap();
        let mut spiky: Vec<f64> = (0..25).map(|i| 50.0 + (i % 3) as f64).collect();
        spiky[12] = 900.0;
        write_csv(dir.path(), "data_2024-12-04_02.csv", &spiky);
        write_csv(dir.path(), "data_2024-12-04_01.csv", &[20.0; 25]);
        write_csv(dir.path(), "data_2024-12-05_01.csv", &spiky);

        let date = NaiveDate::from_ymd_opt(2024, 12, 4).unwrap();
        let results = flag_files(&Catalog::scan(dir.path()), date, DEFAULT_CONTAMINATION, Some(5));

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].file_name, "data_2024-12-04_01.csv");
        assert!(results[0].report.is_empty());
        assert_eq!(results[1].file_name, "data_2024-12-04_02.csv");
        match &results[1].report {
            AnomalyReport::Anomalies(rows) => assert!(rows.iter().any(|r| r.value == 900.0)),
            other => panic!("spike not flagged: {other:?}"),
        }
    }

    #[test]
    fn test_flag_files_reports_unreadable_file() {
        let dir = TempDir::new().unwrap();
        write_csv(dir.path(), "data_2024-12-04_01.csv", &[20.0; 25]);
        // A header that is not UTF-8 cannot be parsed.
        std::fs::write(dir.path().join("data_2024-12-04_02.csv"), b"\xff\xfe,\xff\n1,2\n").unwrap();

        let date = NaiveDate::from_ymd_opt(2024, 12, 4).unwrap();
        let results = flag_files(&Catalog::scan(dir.path()), date, DEFAULT_CONTAMINATION, Some(5));

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].report, AnomalyReport::NoAnomalies);
        assert_eq!(results[1].file_name, "data_2024-12-04_02.csv");
        assert!(matches!(results[1].report, AnomalyReport::Unchecked(_)));
    }

    #[test]
    fn test_flag_files_no_files() {
        let dir = TempDir::new().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 12, 4).unwrap();
        assert!(flag_files(&Catalog::scan(dir.path()), date, DEFAULT_CONTAMINATION, None).is_empty());
    }
}

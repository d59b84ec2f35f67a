//! Data layer for the sound logger.
//!
//! Catalogs session CSV files on disk, reads and writes them, aggregates
//! per-day extremes and flags anomalous readings.

pub mod aggregator;
pub mod anomaly;
pub mod catalog;
pub mod reader;

pub use sound_core as core;

//! Collection runtime for the sound logger.
//!
//! Reads the serial device on a fixed cadence, listens for the stop command
//! and writes each session's CSV and plot.

pub mod collector;
pub mod listener;
pub mod plot;
pub mod source;

pub use sound_core as core;
pub use sound_data as data;

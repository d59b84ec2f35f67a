//! Shared foundation for the sound logger: error taxonomy, the reading model
//! and file naming, date parsing, small statistics helpers and CLI settings.

pub mod error;
pub mod models;
pub mod settings;
pub mod stats;
pub mod time_utils;

pub use error::{Result, SoundLogError};

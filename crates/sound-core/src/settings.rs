use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::SoundLogError;

/// Serial port opened when none is configured.
pub const DEFAULT_PORT: &str = "/dev/ttyACM0";

/// Baud rate the sound sensor sketch writes at.
pub const DEFAULT_BAUD: u32 = 9600;

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Log sound-level readings from a serial device and analyse them
#[derive(Parser, Debug, Clone)]
#[command(
    name = "sound-logger",
    about = "Log sound-level readings from a serial device and analyse them",
    version
)]
pub struct Settings {
    /// Directory holding session CSV files and plots
    #[arg(long, env = "SOUND_LOGGER_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"], global = true)]
    pub log_level: String,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Clear saved configuration
    #[arg(long, global = true)]
    pub clear: bool,

    #[command(subcommand)]
    pub command: Command,

    /// Why the last-used parameters could not be saved, reported once
    /// logging is up.
    #[arg(skip)]
    pub persist_error: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Record readings until `stop` is typed, then save a CSV and a plot
    Collect(CollectArgs),
    /// Report loudest/quietest readings and anomalies for a date
    Analyze(AnalyzeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CollectArgs {
    /// Serial port the device is attached to
    #[arg(long, env = "SOUND_LOGGER_PORT")]
    pub port: Option<String>,

    /// Serial baud rate
    #[arg(long)]
    pub baud: Option<u32>,

    /// Poll interval in milliseconds [default: 1000]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=60_000))]
    pub interval_ms: Option<u64>,

    /// Wait after opening the port before reading, in milliseconds
    #[arg(long, default_value = "2000")]
    pub settle_ms: u64,

    /// Do not render the plot image
    #[arg(long)]
    pub no_plot: bool,
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Date to analyse (YYYY-MM-DD or MM-DD-YYYY); prompts when omitted
    #[arg(long)]
    pub date: Option<String>,

    /// Expected proportion of anomalous readings
    #[arg(long, default_value = "0.05", value_parser = parse_contamination)]
    pub contamination: f64,

    /// Seed for reproducible anomaly detection
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Accept a contamination ratio in `(0, 0.5]`.
fn parse_contamination(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|_| format!("{s:?} is not a number"))?;
    if value > 0.0 && value <= 0.5 {
        Ok(value)
    } else {
        Err(format!("contamination must be in (0, 0.5], got {value}"))
    }
}

// ── LastUsedParams ─────────────────────────────────────────────────────────────

/// Persisted last-used parameters saved to `~/.sound-logger/last_used.json`.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct LastUsedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baud: Option<u32>,
}

impl LastUsedParams {
    /// Return the default path to the persisted config file.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Return the config path rooted at `base_dir` (used for testing).
    pub fn config_path_in(base_dir: &Path) -> PathBuf {
        base_dir.join(".sound-logger").join("last_used.json")
    }

    /// Load persisted params from an explicit path.
    /// Returns `Default` when the file is absent or cannot be parsed.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_default()
    }

    /// Atomically write params to an explicit path, creating parent
    /// directories if needed.
    pub fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Delete the config file at an explicit path if it exists.
    pub fn clear_at(path: &Path) -> Result<(), std::io::Error> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse CLI arguments, fill unset values from the last run (then from
    /// built-in defaults), and persist the result.
    ///
    /// Fails only when `--clear` was given and the saved file could not be
    /// removed.
    pub fn load_with_last_used() -> crate::Result<Self> {
        Self::load_with_last_used_impl(
            std::env::args_os().collect(),
            &LastUsedParams::config_path(),
        )
    }

    /// Same as [`Settings::load_with_last_used`] with explicit arguments and
    /// config path so tests can redirect to a temporary directory.
    pub fn load_with_last_used_impl(
        args: Vec<std::ffi::OsString>,
        config_path: &Path,
    ) -> crate::Result<Self> {
        let mut settings = Settings::parse_from(args);

        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }

        let last = if settings.clear {
            LastUsedParams::clear_at(config_path).map_err(|e| {
                SoundLogError::Config(format!("could not clear {}: {}", config_path.display(), e))
            })?;
            LastUsedParams::default()
        } else {
            LastUsedParams::load_from(config_path)
        };

        if settings.data_dir.is_none() {
            settings.data_dir = Some(last.data_dir.clone().unwrap_or_else(default_data_dir));
        }
        if let Command::Collect(ref mut collect) = settings.command {
            if collect.port.is_none() {
                collect.port = Some(last.port.clone().unwrap_or_else(|| DEFAULT_PORT.to_string()));
            }
            if collect.baud.is_none() {
                collect.baud = Some(last.baud.unwrap_or(DEFAULT_BAUD));
            }
        }

        if !settings.clear {
            let params = settings.to_last_used(last);
            if let Err(e) = params.save_to(config_path) {
                settings.persist_error = Some(format!("{}: {}", config_path.display(), e));
            }
        }

        Ok(settings)
    }

    /// Resolved data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    /// Merge this run's values over the previously persisted ones. Port and
    /// baud only change when collecting.
    fn to_last_used(&self, previous: LastUsedParams) -> LastUsedParams {
        let mut params = LastUsedParams {
            data_dir: Some(self.data_dir()),
            ..previous
        };
        if let Command::Collect(ref collect) = self.command {
            params.port = collect.port.clone();
            params.baud = collect.baud;
        }
        params
    }
}

impl CollectArgs {
    pub fn port(&self) -> &str {
        self.port.as_deref().unwrap_or(DEFAULT_PORT)
    }

    pub fn baud(&self) -> u32 {
        self.baud.unwrap_or(DEFAULT_BAUD)
    }
}

/// `~/sound-logger/data`
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sound-logger")
        .join("data")
}

// ── Tests ──────────────────────────────────────────────────────────────────────

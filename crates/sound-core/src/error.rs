use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the sound logger.
#[derive(Error, Debug)]
pub enum SoundLogError {
    /// A user-supplied date matched neither `YYYY-MM-DD` nor `MM-DD-YYYY`.
    #[error("Date format not recognized: {0:?} (expected YYYY-MM-DD or MM-DD-YYYY)")]
    UnrecognizedDateFormat(String),

    /// The serial device could not be opened, even after retrying.
    #[error("Serial device {port} unavailable after {attempts} attempt(s): {source}")]
    DeviceUnavailable {
        port: String,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    /// A reading's value could not be converted to a number.
    #[error("Malformed reading: {value:?} is not a number")]
    MalformedReading { value: String },

    /// No session file exists where one was required.
    #[error("No session files found in {0}")]
    NotFound(PathBuf),

    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A CSV document could not be read or written.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The plot image could not be rendered or saved.
    #[error("Plot error: {0}")]
    Plot(String),

    /// Saved configuration could not be read, written or cleared.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the sound logger crates.
pub type Result<T> = std::result::Result<T, SoundLogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_unrecognized_date() {
        let err = SoundLogError::UnrecognizedDateFormat("2024/12/04".to_string());
        assert_eq!(
            err.to_string(),
            "Date format not recognized: \"2024/12/04\" (expected YYYY-MM-DD or MM-DD-YYYY)"
        );
    }

    #[test]
    fn test_error_display_device_unavailable() {
        let err = SoundLogError::DeviceUnavailable {
            port: "/dev/ttyACM0".to_string(),
            attempts: 3,
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such device"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/dev/ttyACM0"));
        assert!(msg.contains("3 attempt(s)"));
        assert!(msg.contains("no such device"));
    }

    #[test]
    fn test_error_display_malformed_reading() {
        let err = SoundLogError::MalformedReading {
            value: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "Malformed reading: \"abc\" is not a number");
    }

    #[test]
    fn test_error_display_not_found() {
        let err = SoundLogError::NotFound(PathBuf::from("/empty/dir"));
        assert_eq!(err.to_string(), "No session files found in /empty/dir");
    }

    #[test]
    fn test_error_display_file_read() {
        let err = SoundLogError::FileRead {
            path: PathBuf::from("/data/data_2024-12-04_01.csv"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to read file"));
        assert!(msg.contains("data_2024-12-04_01.csv"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: SoundLogError = io_err.into();
        assert!(err.to_string().contains("denied"));
    }
}

//! Line-oriented input from the sound sensor.
//!
//! [`LineSource`] is the seam between the collector and the hardware;
//! [`SerialLineSource`] is the real serial-port implementation.

use std::io::{self, BufRead, BufReader};
use std::thread;
use std::time::Duration;

use serialport::SerialPort;
use sound_core::error::{Result, SoundLogError};

/// Read timeout applied to the serial port.
pub const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Something that yields newline-terminated text lines.
pub trait LineSource {
    /// Bytes ready to read without blocking.
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Read one complete line with trailing whitespace removed.
    ///
    /// Returns `Ok(None)` when no complete line arrived before the read
    /// timed out or the stream ended; partial input is kept for the next
    /// call.
    fn read_line(&mut self) -> io::Result<Option<String>>;
}

// ── Serial port ───────────────────────────────────────────────────────────────

pub struct SerialLineSource {
    reader: BufReader<Box<dyn SerialPort>>,
    pending: Vec<u8>,
}

impl SerialLineSource {
    /// Open `port` at `baud` with [`READ_TIMEOUT`].
    pub fn open(port: &str, baud: u32) -> io::Result<Self> {
        let serial = serialport::new(port, baud).timeout(READ_TIMEOUT).open()?;
        Ok(Self {
            reader: BufReader::new(serial),
            pending: Vec::new(),
        })
    }
}

impl LineSource for SerialLineSource {
    fn bytes_available(&mut self) -> io::Result<usize> {
        let waiting = self.reader.get_ref().bytes_to_read()?;
        Ok(self.reader.buffer().len() + waiting as usize)
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        take_line(&mut self.reader, &mut self.pending)
    }
}

/// Shared line assembly: append to `pending` until a newline arrives.
fn take_line<R: BufRead>(reader: &mut R, pending: &mut Vec<u8>) -> io::Result<Option<String>> {
    match reader.read_until(b'\n', pending) {
        Ok(0) if pending.is_empty() => Ok(None),
        Ok(_) => {
            let line = String::from_utf8_lossy(pending).trim_end().to_string();
            pending.clear();
            Ok(Some(line))
        }
        Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
        Err(e) => Err(e),
    }
}

// ── Retry ─────────────────────────────────────────────────────────────────────

/// How often and how patiently to retry opening the device.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Delay before retry `n` is `n * backoff`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(250),
        }
    }
}

/// Call `open` until it succeeds or the policy is exhausted.
///
/// Back-off is linear: 0, `backoff`, `2 * backoff`, ... The last error is
/// returned as [`SoundLogError::DeviceUnavailable`].
pub fn open_with_retry<S, F>(port: &str, policy: RetryPolicy, mut open: F) -> Result<S>
where
    F: FnMut() -> io::Result<S>,
{
    let attempts = policy.attempts.max(1);
    let mut last_err = None;

    for attempt in 0..attempts {
        if attempt > 0 {
            let delay = policy.backoff * attempt;
            tracing::debug!(attempt, ?delay, "retrying serial open after back-off");
            thread::sleep(delay);
        }

        match open() {
            Ok(source) => {
                tracing::info!("Opened serial device {}", port);
                return Ok(source);
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "failed to open serial device {}", port);
                last_err = Some(e);
            }
        }
    }

    Err(SoundLogError::DeviceUnavailable {
        port: port.to_string(),
        attempts,
        source: last_err.unwrap_or_else(|| io::Error::other("no attempt made")),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

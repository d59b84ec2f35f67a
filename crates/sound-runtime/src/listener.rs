//! Background listener that ends a collection when the user types `stop`.

use std::io::BufRead;
use std::thread;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// `true` for `stop` in any letter case, ignoring surrounding whitespace.
pub fn is_stop_command(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case("stop")
}

/// Block on `reader` until a stop command arrives, the input ends, or the
/// token is cancelled elsewhere. Cancels `token` in the first two cases.
pub fn watch_for_stop<R: BufRead>(reader: R, token: &CancellationToken) {
    for line in reader.lines() {
        if token.is_cancelled() {
            return;
        }
        match line {
            Ok(l) if is_stop_command(&l) => {
                info!("Stop requested; ending collection");
                token.cancel();
                return;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Failed to read input: {}", e);
                token.cancel();
                return;
            }
        }
    }
    info!("Input closed; ending collection");
    token.cancel();
}

/// Run [`watch_for_stop`] on its own thread.
///
/// The thread is not meant to be joined: when collection ends for another
/// reason it stays parked on input until the process exits.
pub fn spawn_stop_listener<R>(reader: R, token: CancellationToken) -> thread::JoinHandle<()>
where
    R: BufRead + Send + 'static,
{
    thread::spawn(move || watch_for_stop(reader, &token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_is_stop_command() {
        assert!(is_stop_command("stop"));
        assert!(is_stop_command("STOP"));
        assert!(is_stop_command("  Stop \r"));
        assert!(!is_stop_command("stopp"));
        assert!(!is_stop_command("don't stop"));
        assert!(!is_stop_command(""));
    }

    #[test]
    fn test_stop_line_cancels() {
        let token = CancellationToken::new();
        watch_for_stop(Cursor::new("hello\nStop\nmore\n"), &token);
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_end_of_input_cancels() {
        let token = CancellationToken::new();
        watch_for_stop(Cursor::new("hello\nworld\n"), &token);
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_spawned_listener() {
        let token = CancellationToken::new();
        let handle = spawn_stop_listener(Cursor::new(b"stop\n".to_vec()), token.clone());
        handle.join().unwrap();
        assert!(token.is_cancelled());
    }
}

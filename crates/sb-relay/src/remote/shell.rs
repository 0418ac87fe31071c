//! Shell pump task
//!
//! Opens the PTY shell, announces its input sender and then moves bytes in
//! both directions until the remote closes the channel.

use std::sync::Arc;

use tokio::sync::mpsc;

use sb_core::config::TerminalConfig;

use super::stream::StreamHandle;
use super::{EventSender, RemoteConnection, RemoteEvent};

/// Input for an open shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellInput {
    /// Keystrokes, forwarded verbatim
    Data(String),
    /// Terminal window size change
    Resize { cols: u32, rows: u32 },
}

/// Handle to the shell pump
pub type ShellHandle = StreamHandle<ShellInput>;

/// Spawn the shell pump for `conn`
pub fn spawn(
    conn: Arc<dyn RemoteConnection>,
    terminal: TerminalConfig,
    events: EventSender,
) -> ShellHandle {
    StreamHandle::new(tokio::spawn(run_shell(conn, terminal, events)))
}

async fn run_shell(conn: Arc<dyn RemoteConnection>, terminal: TerminalConfig, events: EventSender) {
    let mut io = match conn.open_shell(&terminal).await {
        Ok(io) => io,
        Err(e) => {
            tracing::warn!("Failed to open shell: {}", e);
            events.send(RemoteEvent::ShellOpenFailed(e)).await;
            return;
        }
    };

    let (input_tx, mut input_rx) = mpsc::unbounded_channel();
    if !events.send(RemoteEvent::ShellOpened(input_tx)).await {
        return;
    }

    let mut decoder = Utf8Decoder::default();
    loop {
        tokio::select! {
            output = io.next_output() => {
                let Some(chunk) = output else {
                    break;
                };
                let text = decoder.decode(&chunk);
                if !text.is_empty() && !events.send(RemoteEvent::ShellData(text)).await {
                    return;
                }
            }

            input = input_rx.recv() => match input {
                Some(ShellInput::Data(data)) => {
                    if let Err(e) = io.write(data.as_bytes()).await {
                        tracing::warn!("Shell write failed: {}", e);
                        if !events.send(RemoteEvent::ShellWriteFailed(e)).await {
                            return;
                        }
                    }
                }
                Some(ShellInput::Resize { cols, rows }) => {
                    if let Err(e) = io.resize(cols, rows).await {
                        tracing::debug!("Resize to {}x{} failed: {}", cols, rows, e);
                    }
                }
                None => return,
            }
        }
    }

    let rest = decoder.finish();
    if !rest.is_empty() {
        events.send(RemoteEvent::ShellData(rest)).await;
    }
    tracing::debug!("Shell channel closed by remote");
    events.send(RemoteEvent::ShellClosed).await;
}

/// Incremental UTF-8 decoder.
///
/// A multi-byte character cut at a chunk boundary is held back until the
/// next chunk completes it. Invalid bytes become U+FFFD.
#[derive(Debug, Default)]
pub(crate) struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub(crate) fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let split = self.pending.len() - incomplete_tail(&self.pending);
        let text = String::from_utf8_lossy(&self.pending[..split]).into_owned();
        self.pending.drain(..split);
        text
    }

    pub(crate) fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

/// Length of a trailing, possibly incomplete, multi-byte sequence
fn incomplete_tail(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        let byte = bytes[bytes.len() - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let needed = match byte {
            0xF0..=0xFF => 4,
            0xE0..=0xEF => 3,
            0xC0..=0xDF => 2,
            _ => 1,
        };
        return if needed > back { back } else { 0 };
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_passes_through() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"ls -la\r\n"), "ls -la\r\n");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_split_multibyte_is_carried() {
        let bytes = "é✓".as_bytes();
        let mut decoder = Utf8Decoder::default();

        assert_eq!(decoder.decode(&bytes[..1]), "");
        assert_eq!(decoder.decode(&bytes[1..3]), "é");
        assert_eq!(decoder.decode(&bytes[3..4]), "");
        assert_eq!(decoder.decode(&bytes[4..]), "✓");
    }

    #[test]
    fn test_invalid_bytes_are_replaced() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"a\xFFb"), "a\u{FFFD}b");
    }

    #[test]
    fn test_finish_flushes_truncated_sequence() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"ok\xE2\x9C"), "ok");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }
}

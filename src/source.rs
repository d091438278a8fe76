//! Line sources feeding the forwarder
//!
//! The serial port is the normal source. Any `BufRead` (stdin, a file, a
//! pipe from another tool) can stand in for it.

use anyhow::{Context, Result};
use std::io::{self, BufRead};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread;
use std::time::Duration;

/// Result of a single line read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    /// A complete line with the terminator removed
    Line(String),
    /// The read timed out with no complete line available
    Idle,
    /// End of stream, no more lines will arrive
    Closed,
}

/// Something that yields newline-terminated text lines
pub trait LineSource {
    /// Block for at most the source's timeout waiting for one line
    fn read_line(&mut self) -> Result<LineRead>;

    /// Human readable description for status output
    fn describe(&self) -> String;
}

/// Longest partial line kept while waiting for a terminator
pub const MAX_PENDING_BYTES: usize = 4096;

/// Accumulates raw bytes and splits them into lines
///
/// Bytes survive read timeouts, so a line that arrives in two chunks is
/// reassembled instead of being cut in half.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly read bytes
    pub fn push(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);

        // A runaway line without a terminator is noise, drop it
        if self.pending.len() > MAX_PENDING_BYTES && !self.pending.contains(&b'\n') {
            log::warn!(
                "Discarding {} bytes received without a line terminator",
                self.pending.len()
            );
            self.pending.clear();
        }
    }

    /// Take the next complete line, if any
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.pending.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
        line.pop();

        // Handle carriage returns
        if line.last() == Some(&b'\r') {
            line.pop();
        }

        Some(String::from_utf8_lossy(&line).to_string())
    }

    #[cfg(feature = "serial")]
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Lines buffered between the reader thread and the forwarder
const READER_QUEUE: usize = 64;

/// Default wait for a line before reporting an idle read
const DEFAULT_POLL: Duration = Duration::from_millis(1000);

/// Line source over any buffered reader
///
/// Plain readers have no read timeout, so the reader is drained on its own
/// thread and lines are handed over through a channel. Waiting on the
/// channel is bounded, which lets the loop notice Ctrl+C and keep the
/// broker serviced while the reader is blocked.
pub struct ReaderSource {
    lines: Receiver<io::Result<Vec<u8>>>,
    poll: Duration,
    name: String,
}

impl ReaderSource {
    pub fn new<R>(reader: R, name: &str) -> Self
    where
        R: BufRead + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(READER_QUEUE);

        let thread_name = format!("{}-reader", name);
        let spawned = thread::Builder::new()
            .name(thread_name)
            .spawn(move || pump_lines(reader, tx));
        if let Err(e) = spawned {
            // Receiver sees a closed channel and the source reports Closed
            log::error!("Failed to start reader thread for {}: {}", name, e);
        }

        Self {
            lines: rx,
            poll: DEFAULT_POLL,
            name: name.to_string(),
        }
    }

    /// Set how long a read waits before reporting `Idle`
    pub fn with_poll_timeout(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }
}

/// Read lines until EOF, an error, or the source is dropped
fn pump_lines<R: BufRead>(mut reader: R, tx: SyncSender<io::Result<Vec<u8>>>) {
    loop {
        let mut buffer = Vec::new();
        match reader.read_until(b'\n', &mut buffer) {
            Ok(0) => break,
            Ok(_) => {
                if tx.send(Ok(buffer)).is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e));
                break;
            }
        }
    }
}

impl LineSource for ReaderSource {
    fn read_line(&mut self) -> Result<LineRead> {
        let mut buffer = match self.lines.recv_timeout(self.poll) {
            Ok(data) => data.with_context(|| format!("Failed to read from {}", self.name))?,
            Err(RecvTimeoutError::Timeout) => return Ok(LineRead::Idle),
            Err(RecvTimeoutError::Disconnected) => return Ok(LineRead::Closed),
        };

        if buffer.last() == Some(&b'\n') {
            buffer.pop();
        }
        if buffer.last() == Some(&b'\r') {
            buffer.pop();
        }

        Ok(LineRead::Line(String::from_utf8_lossy(&buffer).to_string()))
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

//! Line-oriented framing for `data:` event streams.
//!
//! Chunks arrive as raw bytes. Lines are cut on `\n` before decoding, so a
//! multi-byte character split across two chunks is reassembled first: the
//! newline byte never appears inside a UTF-8 sequence.

use serde_json::Value;
use tracing::{debug, warn};

/// Prefix that marks a candidate event line.
pub const DATA_PREFIX: &str = "data:";

/// Payload that ends the stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Carry-over buffer that turns byte chunks into complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Append a chunk and return every line it completed, without the terminator.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            lines.push(String::from_utf8_lossy(&self.buffer[start..end]).into_owned());
            start = end + 1;
        }
        self.buffer.drain(..start);
        lines
    }

    /// Take the unterminated remainder, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        Some(rest)
    }

    /// Number of bytes waiting for a terminator.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

/// A decoded `data:` line.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// JSON payload to hand to the interpreter.
    Payload(Value),
    /// The `[DONE]` sentinel.
    Done,
}

/// Decode one complete line.
///
/// Returns `None` for lines without the `data:` prefix, empty payloads, and
/// payloads that are not valid JSON. The latter are logged and skipped.
#[must_use]
pub fn parse_line(line: &str) -> Option<Frame> {
    let payload = line.strip_prefix(DATA_PREFIX)?.trim();

    if payload == DONE_SENTINEL {
        return Some(Frame::Done);
    }
    if payload.is_empty() {
        return None;
    }

    match serde_json::from_str(payload) {
        Ok(value) => Some(Frame::Payload(value)),
        Err(e) => {
            warn!("Skipping malformed frame ({e}): {payload}");
            None
        }
    }
}

/// Incremental parser from byte chunks to frames.
///
/// Once `[DONE]` is seen the parser is finished and ignores further input,
/// including the remaining lines of the chunk that carried the sentinel.
#[derive(Debug, Default)]
pub struct FrameParser {
    lines: LineBuffer,
    finished: bool,
}

impl FrameParser {
    /// Create a parser.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            lines: LineBuffer::new(),
            finished: false,
        }
    }

    /// Feed one chunk and collect the frames it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        if self.finished {
            return Vec::new();
        }

        let mut frames = Vec::new();
        for line in self.lines.push(chunk) {
            match parse_line(&line) {
                Some(Frame::Done) => {
                    debug!("Received [DONE]");
                    self.finished = true;
                    frames.push(Frame::Done);
                    break;
                }
                Some(frame) => frames.push(frame),
                None => {}
            }
        }
        frames
    }

    /// Whether `[DONE]` has been seen.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }
}

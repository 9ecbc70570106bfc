//! Newline-delimited JSON decoding for the Ollama chat stream.
//!
//! Network chunks do not line up with JSON lines (or even with UTF-8
//! boundaries), so raw bytes are buffered until a full line is available.

use serde::Deserialize;

use super::error::BackendError;

/// Accumulates raw bytes and hands out complete lines.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub(crate) fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pop the next complete line, without its trailing `\n`.
    pub(crate) fn next_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop();
        Some(line)
    }

    /// Terminate a trailing partial line so [`next_line`](Self::next_line)
    /// can return it.  Called once the byte stream has ended.
    pub(crate) fn finish(&mut self) {
        if !self.buf.is_empty() {
            self.buf.push(b'\n');
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

/// What a single stream line means for the consumer.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ChunkEvent {
    /// A fragment, optionally followed by end-of-stream.
    Fragment { text: String, done: bool },
    /// End-of-stream with no text attached.
    Done,
    /// Keep-alive or empty line.
    Skip,
}

pub(crate) fn decode_line(line: &[u8]) -> Result<ChunkEvent, BackendError> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return Ok(ChunkEvent::Skip);
    }

    let chunk: ChatChunk = serde_json::from_slice(line)?;
    if let Some(error) = chunk.error {
        return Err(BackendError::Api(error));
    }

    let text = chunk.message.map(|m| m.content).unwrap_or_default();
    match (text.is_empty(), chunk.done) {
        (false, done) => Ok(ChunkEvent::Fragment { text, done }),
        (true, true) => Ok(ChunkEvent::Done),
        (true, false) => Ok(ChunkEvent::Skip),
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

//! Newline-delimited JSON framing for server streams.
//!
//! The transport hands over arbitrary byte chunks; [`FrameDecoder`] buffers
//! them and yields complete lines. [`decode_line`] then turns one line into an
//! [`Envelope`]: either a `{"result": ...}` message or a terminal
//! `{"error": ...}` frame.
//!
//! # Limits
//!
//! A line may not exceed [`MAX_LINE_SIZE`] bytes. A peer that streams more
//! than that without a newline gets [`ProtocolError::FrameTooLarge`] instead of
//! unbounded buffering.

use serde::{Deserialize, de::DeserializeOwned};

use crate::errors::{ProtocolError, Result};

/// Maximum size of a single NDJSON line (16 MiB).
pub const MAX_LINE_SIZE: usize = 16 * 1024 * 1024;

/// One decoded stream frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope<T> {
    /// A stream message.
    Message(T),
    /// The server ended the stream with an error.
    End {
        /// Connect error code.
        code: String,
        /// Human readable message.
        message: String,
    },
}

impl<T> Envelope<T> {
    /// Convert into the message, mapping an end frame to an error.
    pub fn into_result(self) -> Result<T> {
        match self {
            Self::Message(message) => Ok(message),
            Self::End { code, message } => Err(ProtocolError::EndOfStream { code, message }),
        }
    }
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<RawError>,
}

#[derive(Deserialize)]
struct RawError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Decode one line.
///
/// Blank lines and frames carrying neither `result` nor `error` (trailers)
/// decode to `Ok(None)`.
pub fn decode_line<T: DeserializeOwned>(line: &[u8]) -> Result<Option<Envelope<T>>> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let raw: RawEnvelope = serde_json::from_slice(line)?;
    if let Some(result) = raw.result {
        return Ok(Some(Envelope::Message(serde_json::from_value(result)?)));
    }
    Ok(raw.error.map(|e| Envelope::End { code: e.code, message: e.message }))
}

/// Incremental line splitter.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    max_line: usize,
}

impl FrameDecoder {
    /// Decoder with the default line limit.
    pub fn new() -> Self {
        Self::with_limit(MAX_LINE_SIZE)
    }

    /// Decoder with a custom line limit.
    pub fn with_limit(max_line: usize) -> Self {
        Self { buffer: Vec::new(), max_line }
    }

    /// Append a chunk and return every line it completed, without the
    /// trailing newline.
    ///
    /// Only the new chunk is scanned; buffered bytes never hold a newline.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Vec<u8>>> {
        let base = self.buffer.len();
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        for (offset, _) in chunk.iter().enumerate().filter(|(_, b)| **b == b'\n') {
            let end = base + offset;
            let size = end - start;
            if size > self.max_line {
                return Err(self.overflow(size));
            }
            let mut line = &self.buffer[start..end];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            lines.push(line.to_vec());
            start = end + 1;
        }
        if start > 0 {
            self.buffer.drain(..start);
        }

        if self.buffer.len() > self.max_line {
            return Err(self.overflow(self.buffer.len()));
        }
        Ok(lines)
    }

    fn overflow(&mut self, size: usize) -> ProtocolError {
        self.buffer.clear();
        ProtocolError::FrameTooLarge { size, max: self.max_line }
    }

    /// Flush whatever is left once the byte stream ends.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if self.buffer.is_empty() { None } else { Some(std::mem::take(&mut self.buffer)) }
    }

    /// Bytes buffered without a newline.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

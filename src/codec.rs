//! Line framing and record classification for the device byte stream.
//!
//! The device speaks newline-terminated UTF-8 text. Each complete line is
//! either a structured telemetry object or free-form log output; the codec
//! keeps the trailing partial line across feeds so records are never split at
//! chunk boundaries.

use memchr::memchr;
use thiserror::Error;

use crate::telemetry::TelemetrySample;

/// Raised for a line that looks like a telemetry object but fails the
/// structural decode. Never fatal: the line is still delivered as log text
/// and the stream continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed telemetry line {line:?}: {reason}")]
pub struct ParseError {
    pub line: String,
    pub reason: String,
}

/// One decoded line from the device.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedRecord {
    Telemetry(TelemetrySample),
    LogText(String),
}

/// A classified line together with the decode fault it surfaced, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedLine {
    pub record: DecodedRecord,
    pub fault: Option<ParseError>,
}

/// Splits a raw byte stream into newline-delimited records.
///
/// Input that is not valid UTF-8 is replaced lossily, and a `\r` preceding
/// the newline is stripped.
#[derive(Debug, Default)]
pub struct LineCodec {
    buf: Vec<u8>,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk of raw bytes, yielding one record per complete line.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<DecodedLine> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = memchr(b'\n', &self.buf) {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            out.push(classify(String::from_utf8_lossy(&line).into_owned()));
        }
        out
    }

    /// Length of the retained partial line.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// Classify one complete line.
///
/// A trimmed line is telemetry iff it is `{`-delimited and decodes as a
/// [`TelemetrySample`]. A `{...}`-shaped line that fails the decode is log
/// text, with the fault attached so integrators can log it. Anything else is
/// plain log text and not an error.
pub fn classify(line: String) -> DecodedLine {
    let trimmed = line.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        match serde_json::from_str::<TelemetrySample>(trimmed) {
            Ok(sample) => {
                return DecodedLine {
                    record: DecodedRecord::Telemetry(sample),
                    fault: None,
                }
            }
            Err(err) => {
                let fault = ParseError {
                    line: trimmed.to_owned(),
                    reason: err.to_string(),
                };
                return DecodedLine {
                    record: DecodedRecord::LogText(line),
                    fault: Some(fault),
                };
            }
        }
    }
    DecodedLine {
        record: DecodedRecord::LogText(line),
        fault: None,
    }
}

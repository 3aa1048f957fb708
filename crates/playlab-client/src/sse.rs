//! Line-oriented SSE frame parsing.
//!
//! The message endpoints answer with newline-delimited frames of the form
//! `data: {"delta": "<token>"}`. Only `data:` lines whose payload decodes to
//! an object with a non-empty string `delta` become [`StreamEvent`]s. Blank
//! lines, other SSE fields (`event:`, `id:`, comments) and undecodable
//! payloads are wire noise and are dropped without error.

use std::io::{self, BufRead};

use tracing::trace;

const DATA_PREFIX: &str = "data:";

/// One decoded delta from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    /// The line the event was decoded from.
    pub raw_line: String,
    /// Incremental assistant text; never empty.
    pub delta: String,
}

/// Decodes a single line, returning an event only when it carries a delta.
///
/// The payload must be a JSON object; when `delta` repeats, the last value wins.
pub fn parse_line(line: &str) -> Option<StreamEvent> {
    if line.is_empty() {
        return None;
    }
    let payload = line.strip_prefix(DATA_PREFIX)?;
    let decoded: serde_json::Value = match serde_json::from_str(payload) {
        Ok(decoded) => decoded,
        Err(e) => {
            trace!(event = "sse.line_discarded", reason = "malformed", error = %e);
            return None;
        }
    };
    let delta = decoded
        .as_object()
        .and_then(|object| object.get("delta"))
        .and_then(serde_json::Value::as_str)
        .filter(|delta| !delta.is_empty());
    match delta {
        Some(delta) => Some(StreamEvent {
            raw_line: line.to_string(),
            delta: delta.to_string(),
        }),
        None => {
            trace!(event = "sse.line_discarded", reason = "no_delta");
            None
        }
    }
}

/// Reads lines from a byte stream as they arrive.
///
/// Bytes are decoded lossily so a stray invalid sequence cannot abort the
/// stream, `\n` and `\r\n` terminators are stripped, and a final line without
/// a terminator is still yielded.
pub struct SseLines<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead> SseLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }
}

impl<R: BufRead> Iterator for SseLines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                if self.buf.last() == Some(&b'\n') {
                    self.buf.pop();
                }
                if self.buf.last() == Some(&b'\r') {
                    self.buf.pop();
                }
                Some(Ok(String::from_utf8_lossy(&self.buf).into_owned()))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// Lazily maps a fallible line sequence to stream events.
///
/// Read errors are passed through unchanged so the caller can abort the call.
pub struct FrameEvents<I> {
    lines: I,
}

impl<I> FrameEvents<I>
where
    I: Iterator<Item = io::Result<String>>,
{
    pub fn new(lines: I) -> Self {
        Self { lines }
    }
}

impl<I> Iterator for FrameEvents<I>
where
    I: Iterator<Item = io::Result<String>>,
{
    type Item = io::Result<StreamEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.lines.next()? {
                Ok(line) => {
                    if let Some(event) = parse_line(&line) {
                        return Some(Ok(event));
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Parses a complete, already-drained body and concatenates its deltas.
pub fn collect_deltas(body: &str) -> String {
    body.lines()
        .filter_map(|line| parse_line(line.trim_end_matches('\r')))
        .map(|event| event.delta)
        .collect()
}

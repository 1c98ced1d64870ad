//! SSE Envelope Framing
//!
//! Turns the raw response body into a stream of envelopes. Bytes are
//! buffered until a full line is available, so multi-byte characters split
//! across chunks decode correctly. Each `data:` line holds one JSON envelope:
//!
//! ```text
//! data: {"run_id":"run-1","seq":0,"ts":"2026-01-01T00:00:00Z","type":"run.started","stage":null,"payload":{}}
//!
//! data: {"run_id":"run-1","seq":1,"ts":"2026-01-01T00:00:01Z","type":"heartbeat","stage":null,"payload":null}
//! ```
//!
//! A line that fails to decode is dropped and the stream continues. So is a
//! line longer than [`MAX_LINE_BYTES`]; its bytes are discarded as they arrive
//! rather than buffered.

use std::collections::VecDeque;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use plan_pipeline_core::{CoreResult, Envelope};
use tracing::{debug, warn};

use crate::error::TransportError;

/// Longest line the parser will buffer
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Parse a raw byte stream into envelopes.
///
/// Read errors are yielded once and end the stream.
pub fn parse_envelope_stream<S, E>(
    byte_stream: S,
) -> impl Stream<Item = Result<Envelope, TransportError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<TransportError> + 'static,
{
    parse_with_line_limit(byte_stream, MAX_LINE_BYTES)
}

fn parse_with_line_limit<S, E>(
    byte_stream: S,
    max_line_bytes: usize,
) -> impl Stream<Item = Result<Envelope, TransportError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<TransportError> + 'static,
{
    let state = SseParserState {
        inner: Box::pin(byte_stream.map(|chunk| chunk.map_err(Into::into))),
        buffer: Vec::new(),
        pending: VecDeque::new(),
        max_line_bytes,
        discarding: false,
        finished: false,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(envelope) = state.pending.pop_front() {
                return Some((Ok(envelope), state));
            }
            if state.finished {
                return None;
            }

            match state.inner.next().await {
                Some(Ok(chunk)) => {
                    state.feed(&chunk);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(e), state));
                }
                None => {
                    // Stream ended. Process any remaining buffer content.
                    state.finished = true;
                    let remaining = std::mem::take(&mut state.buffer);
                    if !state.discarding {
                        state.push_line(&String::from_utf8_lossy(&remaining));
                    }
                }
            }
        }
    })
}

struct SseParserState {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>,
    buffer: Vec<u8>,
    pending: VecDeque<Envelope>,
    max_line_bytes: usize,
    /// Inside an oversized line; bytes are dropped up to the next newline.
    discarding: bool,
    finished: bool,
}

impl SseParserState {
    fn feed(&mut self, mut chunk: &[u8]) {
        if self.discarding {
            match chunk.iter().position(|b| *b == b'\n') {
                Some(pos) => {
                    self.discarding = false;
                    chunk = &chunk[pos + 1..];
                }
                None => return,
            }
        }

        self.buffer.extend_from_slice(chunk);
        self.drain_lines();

        if self.buffer.len() > self.max_line_bytes {
            warn!(
                buffered = self.buffer.len(),
                limit = self.max_line_bytes,
                "dropping oversized line"
            );
            self.buffer.clear();
            self.discarding = true;
        }
    }

    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if line.len() > self.max_line_bytes {
                warn!(length = line.len(), limit = self.max_line_bytes, "dropping oversized line");
                continue;
            }
            self.push_line(&String::from_utf8_lossy(&line));
        }
    }

    fn push_line(&mut self, line: &str) {
        match parse_sse_line(line) {
            Some(Ok(envelope)) => self.pending.push_back(envelope),
            Some(Err(e)) => debug!(error = %e, "dropping malformed envelope"),
            None => {}
        }
    }
}

/// Parse a single SSE line.
///
/// Returns `None` for blank lines, comments, `[DONE]` and non-data fields
/// (`event:`, `id:`, `retry:`).
pub fn parse_sse_line(line: &str) -> Option<CoreResult<Envelope>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }

    let data = trimmed.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    Some(Envelope::from_json(data))
}

//! Backend stream → `OpenAI` SSE normalization.
//!
//! Single pass and forward only: each backend read is fully turned into
//! output frames before the next read is requested, and at most one partial
//! event is held between reads. Events end at a blank line, or at a single
//! newline when the line is a complete JSON record (NDJSON).
use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use serde_json::Value;

use crate::backend::BackendStreamFrame;
use crate::error::GatewayError;
use crate::extract::{extract_deltas, text_candidate};

use super::sse::{done_frame, find_sse_frame_terminator_from, ChunkFramer};

const SSE_DATA_PREFIX: &str = "data:";
const BACKEND_DONE_MARKER: &str = "[DONE]";

/// Normalize a backend stream into framed SSE output for response `id`.
///
/// The output ends with exactly one stop chunk and the `[DONE]` sentinel. A
/// failed backend read is yielded as the final `Err` item; nothing follows
/// it.
pub fn normalize<S>(
    source: S,
    id: String,
    model: String,
) -> impl Stream<Item = Result<Bytes, GatewayError>> + Send
where
    S: Stream<Item = Result<BackendStreamFrame, GatewayError>> + Send + 'static,
{
    normalize_with_framer(source, ChunkFramer::new(id, model))
}

/// Same as [`normalize`] with a caller-supplied framer.
pub fn normalize_with_framer<S>(
    source: S,
    framer: ChunkFramer,
) -> impl Stream<Item = Result<Bytes, GatewayError>> + Send
where
    S: Stream<Item = Result<BackendStreamFrame, GatewayError>> + Send + 'static,
{
    futures_util::stream::unfold(
        NormalizerState {
            source: Box::pin(source),
            framer,
            splitter: EventSplitter::default(),
            pending: VecDeque::with_capacity(8),
            phase: Phase::Reading,
            emitted: 0,
        },
        |mut state| async move {
            loop {
                if let Some(frame) = state.pending.pop_front() {
                    return Some((Ok(frame), state));
                }
                if state.phase != Phase::Reading {
                    return None;
                }

                match state.source.next().await {
                    Some(Ok(frame)) => state.absorb(frame),
                    Some(Err(err)) => {
                        tracing::warn!(
                            response_id = state.framer.id(),
                            frames_emitted = state.emitted,
                            error = %err,
                            "backend stream failed, aborting response"
                        );
                        state.phase = Phase::Failed;
                        return Some((Err(err), state));
                    }
                    None => state.finish(),
                }
            }
        },
    )
}

/// Drain a backend stream into one accumulated text, using the same event
/// decoding as [`normalize`].
///
/// # Errors
///
/// Returns the first failed backend read.
pub async fn collect_text<S>(source: S) -> Result<String, GatewayError>
where
    S: Stream<Item = Result<BackendStreamFrame, GatewayError>> + Send,
{
    let mut source = std::pin::pin!(source);
    let mut splitter = EventSplitter::default();
    let mut fragments = Vec::new();
    while let Some(frame) = source.next().await {
        match frame? {
            BackendStreamFrame::Text(text) => fragments.push(text),
            BackendStreamFrame::Json(value) => fragments.extend(extract_deltas(&value)),
            BackendStreamFrame::Bytes(bytes) => {
                splitter.push(&bytes);
                while let Some(event) = splitter.next_event() {
                    event_fragments(&String::from_utf8_lossy(&event), &mut fragments);
                }
            }
        }
    }
    if let Some(rest) = splitter.take_remainder() {
        event_fragments(&String::from_utf8_lossy(&rest), &mut fragments);
    }
    Ok(fragments.concat())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Reading,
    Finished,
    Failed,
}

struct NormalizerState<S> {
    source: std::pin::Pin<Box<S>>,
    framer: ChunkFramer,
    splitter: EventSplitter,
    pending: VecDeque<Bytes>,
    phase: Phase,
    emitted: usize,
}

impl<S> NormalizerState<S> {
    fn absorb(&mut self, frame: BackendStreamFrame) {
        match frame {
            BackendStreamFrame::Text(text) => self.emit_content(&text),
            BackendStreamFrame::Json(value) => {
                for fragment in extract_deltas(&value) {
                    self.emit_content(&fragment);
                }
            }
            BackendStreamFrame::Bytes(bytes) => {
                self.splitter.push(&bytes);
                let mut fragments = Vec::new();
                while let Some(event) = self.splitter.next_event() {
                    event_fragments(&String::from_utf8_lossy(&event), &mut fragments);
                }
                for fragment in fragments {
                    self.emit_content(&fragment);
                }
            }
        }
    }

    fn finish(&mut self) {
        if let Some(rest) = self.splitter.take_remainder() {
            let mut fragments = Vec::new();
            event_fragments(&String::from_utf8_lossy(&rest), &mut fragments);
            for fragment in fragments {
                self.emit_content(&fragment);
            }
        }
        self.pending.push_back(self.framer.stop_frame());
        self.pending.push_back(done_frame());
        self.phase = Phase::Finished;
        tracing::debug!(
            response_id = self.framer.id(),
            content_frames = self.emitted,
            "backend stream finished"
        );
    }

    fn emit_content(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.pending.push_back(self.framer.content_frame(text));
        self.emitted += 1;
    }
}

/// Pending-bytes buffer split on blank-line boundaries and NDJSON records.
#[derive(Debug, Default)]
pub(crate) struct EventSplitter {
    buffer: BytesMut,
    scan_from: usize,
}

impl EventSplitter {
    pub(crate) fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Pop the next complete event, without its terminator.
    pub(crate) fn next_event(&mut self) -> Option<Bytes> {
        if let Some(record) = self.next_json_record() {
            return Some(record);
        }
        if let Some((start, len)) = find_sse_frame_terminator_from(&self.buffer, self.scan_from) {
            let mut event = self.buffer.split_to(start + len);
            event.truncate(start);
            self.scan_from = 0;
            return Some(event.freeze());
        }
        // Keep a small overlap so a terminator spanning two reads is found.
        self.scan_from = self.buffer.len().saturating_sub(3);
        None
    }

    /// Release a leading newline-terminated line that is a whole JSON value.
    ///
    /// SSE fields never start with `{` or `[`, so this only fires for
    /// line-delimited JSON bodies.
    fn next_json_record(&mut self) -> Option<Bytes> {
        let start = self
            .buffer
            .iter()
            .position(|byte| !byte.is_ascii_whitespace())?;
        if !matches!(self.buffer[start], b'{' | b'[') {
            return None;
        }
        let end = start + memchr::memchr(b'\n', &self.buffer[start..])?;
        serde_json::from_slice::<serde::de::IgnoredAny>(&self.buffer[start..end]).ok()?;

        let mut record = self.buffer.split_to(end + 1);
        record.truncate(end);
        let _ = record.split_to(start);
        self.scan_from = 0;
        Some(record.freeze())
    }

    /// Drain whatever is left once the source is exhausted.
    pub(crate) fn take_remainder(&mut self) -> Option<Bytes> {
        self.scan_from = 0;
        if self.buffer.iter().all(u8::is_ascii_whitespace) {
            self.buffer.clear();
            return None;
        }
        Some(self.buffer.split().freeze())
    }
}

/// Extract the text fragments carried by one complete event.
///
/// `data:` lines are decoded one by one; an event without any `data:` line
/// goes through the generic candidate search instead.
pub(crate) fn event_fragments(event: &str, out: &mut Vec<String>) {
    let mut saw_data_line = false;
    for line in event.lines() {
        let Some(payload) = line.trim_start().strip_prefix(SSE_DATA_PREFIX) else {
            continue;
        };
        saw_data_line = true;
        let payload = payload.trim();
        if payload.is_empty() || payload == BACKEND_DONE_MARKER {
            continue;
        }
        match serde_json::from_str::<Value>(payload) {
            Ok(value) => out.extend(extract_deltas(&value)),
            Err(_) => out.push(payload.to_owned()),
        }
    }

    if !saw_data_line {
        fallback_fragments(event, out);
    }
}

/// Generic search for events that are not SSE-framed (bare JSON, NDJSON,
/// or plain text).
fn fallback_fragments(event: &str, out: &mut Vec<String>) {
    let body = strip_sse_control_lines(event);
    if body.is_empty() || body == BACKEND_DONE_MARKER {
        return;
    }

    if let Ok(value) = serde_json::from_str::<Value>(&body) {
        push_value_candidates(&value, &body, out);
        return;
    }

    let lines: Vec<&str> = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if lines.len() > 1 {
        let parsed: Option<Vec<Value>> = lines
            .iter()
            .map(|line| serde_json::from_str::<Value>(line).ok())
            .collect();
        if let Some(values) = parsed {
            for (value, line) in values.iter().zip(&lines) {
                push_value_candidates(value, line, out);
            }
            return;
        }
    }

    out.push(body);
}

/// Containers that match no candidate carry metadata only; bare scalars are
/// passed through as their source text.
fn push_value_candidates(value: &Value, raw: &str, out: &mut Vec<String>) {
    if let Some(text) = text_candidate(value).filter(|text| !text.is_empty()) {
        out.push(text);
        return;
    }
    match value {
        Value::Object(_) | Value::Array(_) => out.extend(extract_deltas(value)),
        Value::String(_) => {}
        Value::Null | Value::Bool(_) | Value::Number(_) => out.push(raw.to_owned()),
    }
}

/// Drop SSE comment and non-data field lines (`event:`, `id:`, `retry:`).
fn strip_sse_control_lines(event: &str) -> String {
    let mut kept = String::with_capacity(event.len());
    for line in event.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with(':')
            || trimmed.starts_with("event:")
            || trimmed.starts_with("id:")
            || trimmed.starts_with("retry:")
        {
            continue;
        }
        if !kept.is_empty() {
            kept.push('\n');
        }
        kept.push_str(line);
    }
    kept.trim().to_owned()
}

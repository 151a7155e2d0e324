//! Chunk framing and SSE wire encoding for the `OpenAI` streaming surface.
use std::sync::LazyLock;

use bytes::Bytes;
use memchr::memmem;

use crate::protocol::openai_chat::{
    ChunkChoice, ChunkDelta, StreamingChunk, CHAT_COMPLETION_CHUNK_OBJECT, FINISH_REASON_STOP,
};
use crate::util::{push_json_string_escaped, push_u64_decimal, unix_now_secs};

const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Build one streaming chunk.
///
/// `content == None` produces an empty delta object. Any `Some` string,
/// including the empty one, becomes a `{content}` delta; filtering empty
/// text is the caller's job.
#[must_use]
pub fn frame_chunk(
    id: &str,
    model: &str,
    created: u64,
    content: Option<&str>,
    finish_reason: Option<&str>,
) -> StreamingChunk {
    StreamingChunk {
        id: id.to_owned(),
        object: CHAT_COMPLETION_CHUNK_OBJECT.to_owned(),
        created,
        model: model.to_owned(),
        choices: vec![ChunkChoice {
            index: 0,
            delta: ChunkDelta {
                content: content.map(str::to_owned),
            },
            finish_reason: finish_reason.map(str::to_owned),
        }],
    }
}

/// Encode a chunk as a single SSE `data:` event terminated by a blank line.
#[must_use]
pub fn encode_chunk(chunk: &StreamingChunk) -> Bytes {
    let mut out = String::with_capacity(160 + chunk.id.len() + chunk.model.len());
    out.push_str("data: {\"id\":");
    push_json_string_escaped(&mut out, &chunk.id);
    out.push_str(",\"object\":");
    push_json_string_escaped(&mut out, &chunk.object);
    out.push_str(",\"created\":");
    push_u64_decimal(&mut out, chunk.created);
    out.push_str(",\"model\":");
    push_json_string_escaped(&mut out, &chunk.model);
    out.push_str(",\"choices\":[");
    for (pos, choice) in chunk.choices.iter().enumerate() {
        if pos > 0 {
            out.push(',');
        }
        out.push_str("{\"index\":");
        push_u64_decimal(&mut out, u64::from(choice.index));
        out.push_str(",\"delta\":{");
        if let Some(content) = choice.delta.content.as_deref() {
            out.push_str("\"content\":");
            push_json_string_escaped(&mut out, content);
        }
        out.push_str("},\"finish_reason\":");
        match choice.finish_reason.as_deref() {
            Some(reason) => push_json_string_escaped(&mut out, reason),
            None => out.push_str("null"),
        }
        out.push('}');
    }
    out.push_str("]}\n\n");
    Bytes::from(out)
}

/// The literal end-of-stream sentinel.
#[must_use]
pub fn done_frame() -> Bytes {
    Bytes::from_static(DONE_FRAME.as_bytes())
}

/// Stamps every chunk of one response with the same id, model and creation
/// time.
#[derive(Debug, Clone)]
pub struct ChunkFramer {
    id: String,
    model: String,
    created: u64,
}

impl ChunkFramer {
    #[must_use]
    pub fn new(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_created(id, model, unix_now_secs())
    }

    #[must_use]
    pub fn with_created(id: impl Into<String>, model: impl Into<String>, created: u64) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            created,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn chunk(&self, content: Option<&str>, finish_reason: Option<&str>) -> StreamingChunk {
        frame_chunk(&self.id, &self.model, self.created, content, finish_reason)
    }

    #[must_use]
    pub fn content_frame(&self, content: &str) -> Bytes {
        encode_chunk(&self.chunk(Some(content), None))
    }

    #[must_use]
    pub fn stop_frame(&self) -> Bytes {
        encode_chunk(&self.chunk(None, Some(FINISH_REASON_STOP)))
    }
}

/// Locate the earliest blank-line event terminator at or after `scan_from`.
///
/// Returns `(position, terminator_len)` for `\n\n` (2) or `\r\n\r\n` (4).
#[inline]
pub(crate) fn find_sse_frame_terminator_from(
    buffer: &[u8],
    scan_from: usize,
) -> Option<(usize, usize)> {
    static LF_LF_FINDER: LazyLock<memmem::Finder<'static>> =
        LazyLock::new(|| memmem::Finder::new(b"\n\n"));
    static CRLF_CRLF_FINDER: LazyLock<memmem::Finder<'static>> =
        LazyLock::new(|| memmem::Finder::new(b"\r\n\r\n"));

    let scan_from = scan_from.min(buffer.len());
    let haystack = &buffer[scan_from..];
    let lf_lf_pos = LF_LF_FINDER.find(haystack).map(|rel| scan_from + rel);
    let crlf_crlf_pos = CRLF_CRLF_FINDER.find(haystack).map(|rel| scan_from + rel);

    match (lf_lf_pos, crlf_crlf_pos) {
        (Some(lf_pos), Some(crlf_pos)) => {
            if lf_pos <= crlf_pos {
                Some((lf_pos, 2))
            } else {
                Some((crlf_pos, 4))
            }
        }
        (Some(lf_pos), None) => Some((lf_pos, 2)),
        (None, Some(crlf_pos)) => Some((crlf_pos, 4)),
        (None, None) => None,
    }
}

//! Streaming output: chunk framing and backend stream normalization.
pub mod normalizer;
pub mod sse;

pub use normalizer::{collect_text, normalize, normalize_with_framer};
pub use sse::{done_frame, encode_chunk, frame_chunk, ChunkFramer};

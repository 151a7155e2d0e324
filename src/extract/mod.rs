//! Shape-agnostic searches over untrusted backend payloads.
//!
//! Every search is a fixed, ordered list of accessor attempts that
//! short-circuits on the first match, so the most specific backend shape
//! always wins. None of them can fail.

pub mod delta;
pub mod text;
pub mod usage;

pub use delta::{extract_deltas, DeltaFragments};
pub use text::{extract_text, text_candidate};
pub use usage::extract_usage;

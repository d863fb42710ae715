//! Deduplication and quality gate
//!
//! Every fetched page passes, in order:
//! 1. a raw size ceiling
//! 2. truncation of the extracted text to a token budget
//! 3. a minimum word count
//! 4. a content fingerprint over the final text (the URL is not part of it)
//! 5. an insert-if-absent into the global content-hash set

mod gate;
mod hasher;
mod text;

pub use gate::{GateDecision, QualityGate, RejectReason};
pub use hasher::{canonicalize, content_hash};
pub use text::{truncate_tokens, word_count};

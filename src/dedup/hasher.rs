//! Content fingerprints

use sha2::{Digest, Sha256};

/// Collapses every whitespace run to a single space and trims both ends
///
/// Two extractions of the same content that differ only in layout whitespace produce the
/// same canonical text.
pub fn canonicalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Computes the hex-encoded SHA-256 fingerprint of extracted text
///
/// Only the text goes into the digest. The page URL is deliberately absent, so the same
/// content served under different URLs (or different sites) collapses to one entry.
///
/// # Examples
///
/// ```
/// use corpus_harvest::dedup::content_hash;
///
/// assert_eq!(content_hash("a  b\n"), content_hash("a b"));
/// assert_eq!(content_hash("a b").len(), 64);
/// ```
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonicalize(text).as_bytes());
    hex::encode(hasher.finalize())
}

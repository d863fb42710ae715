//! The admit/reject filter applied to every fetched page

use crate::config::GateConfig;
use crate::crawler::Extractor;
use crate::dedup::hasher::content_hash;
use crate::dedup::text::{truncate_tokens, word_count};
use crate::storage::{HashOrigin, Ledger, LedgerResult, Page};
use std::fmt;

/// Why the gate refused a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Raw payload above the size ceiling
    Oversized { raw_size: usize, limit: usize },

    /// Too few words after truncation
    TooFewWords { words: usize, minimum: usize },

    /// Content hash already present in the corpus
    Duplicate { hash: String },
}

impl RejectReason {
    /// Short reason code used in logs and counters
    pub fn code(&self) -> &'static str {
        match self {
            Self::Oversized { .. } => "oversized",
            Self::TooFewWords { .. } => "too_few_words",
            Self::Duplicate { .. } => "duplicate",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Oversized { raw_size, limit } => {
                write!(f, "payload of {} bytes exceeds {} byte ceiling", raw_size, limit)
            }
            Self::TooFewWords { words, minimum } => {
                write!(f, "{} words is below the {} word minimum", words, minimum)
            }
            Self::Duplicate { hash } => write!(f, "duplicate content {}", hash),
        }
    }
}

/// Result of running a page through the gate
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// New content; the caller must hand it to the page store
    Admit(Page),

    /// Content this same site already stored during an earlier pass
    ///
    /// Counts as accepted but must not be saved again.
    AlreadyStored { hash: String },

    /// Refused; counted but never persisted
    Reject(RejectReason),
}

impl GateDecision {
    /// Returns true if the page counts towards the site's accepted pages
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Admit(_) | Self::AlreadyStored { .. })
    }
}

/// Text that passed size, truncation and word checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub text: String,
    pub word_count: usize,
    pub hash: String,
    pub truncated: bool,
}

/// Quality gate over configured thresholds
#[derive(Debug, Clone)]
pub struct QualityGate {
    config: GateConfig,
}

impl QualityGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Rejects raw payloads above the size ceiling
    pub fn check_size(&self, raw_size: usize) -> Result<(), RejectReason> {
        if raw_size > self.config.max_raw_bytes {
            return Err(RejectReason::Oversized {
                raw_size,
                limit: self.config.max_raw_bytes,
            });
        }
        Ok(())
    }

    /// Truncates, counts words and fingerprints extracted text
    ///
    /// The minimum is inclusive: exactly `min_words` words is admitted.
    pub fn prepare(&self, extracted: &str) -> Result<Candidate, RejectReason> {
        let (text, truncated) = truncate_tokens(extracted, self.config.max_tokens);

        let words = word_count(text);
        if words < self.config.min_words {
            return Err(RejectReason::TooFewWords {
                words,
                minimum: self.config.min_words,
            });
        }

        Ok(Candidate {
            text: text.to_string(),
            word_count: words,
            hash: content_hash(text),
            truncated,
        })
    }

    /// Runs the full gate for one fetched page
    ///
    /// The hash insert is the only ledger write; a rejected page leaves no trace in the
    /// content-hash set.
    pub fn evaluate<L: Ledger + ?Sized>(
        &self,
        ledger: &mut L,
        origin: &HashOrigin,
        url: &str,
        raw: &[u8],
        extractor: &dyn Extractor,
    ) -> LedgerResult<GateDecision> {
        if let Err(reason) = self.check_size(raw.len()) {
            return Ok(GateDecision::Reject(reason));
        }

        let extracted = extractor.clean(raw);
        let candidate = match self.prepare(&extracted) {
            Ok(candidate) => candidate,
            Err(reason) => return Ok(GateDecision::Reject(reason)),
        };

        if ledger.insert_hash(&candidate.hash, origin)? {
            return Ok(GateDecision::Admit(Page {
                url: url.to_string(),
                site_id: origin.site_id.clone(),
                raw_size: raw.len(),
                extracted_text: candidate.text,
                word_count: candidate.word_count,
                content_hash: candidate.hash,
            }));
        }

        // Pages stored by an interrupted earlier pass of this site still count
        match ledger.hash_origin(&candidate.hash)? {
            Some(first) if first.site_id == origin.site_id && first.pass < origin.pass => {
                Ok(GateDecision::AlreadyStored {
                    hash: candidate.hash,
                })
            }
            _ => Ok(GateDecision::Reject(RejectReason::Duplicate {
                hash: candidate.hash,
            })),
        }
    }
}

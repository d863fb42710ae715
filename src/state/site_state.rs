//! Site lifecycle, memory tiers and site-level outcomes

use serde::Deserialize;
use std::fmt;

/// Status of a site in the ledger
///
/// Transitions are monotonic (`Unclaimed → Claimed → Completed | Flagged | Failed`) with a
/// single exception: a claim may go back to `Unclaimed` on release after an out-of-memory
/// escalation or when its lease expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteStatus {
    /// Waiting for a worker of the required tier
    Unclaimed,

    /// Owned by exactly one node
    Claimed,

    // ===== Terminal States =====
    /// Pass finished with enough accepted pages
    Completed,

    /// Pass finished with low yield; needs human review
    Flagged,

    /// Pass could not complete on any tier
    Failed,
}

impl SiteStatus {
    /// Returns true if no further processing will happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Flagged | Self::Failed)
    }

    /// Checks whether the ledger may move a site from `self` to `to`
    pub fn can_transition_to(&self, to: SiteStatus) -> bool {
        match (self, to) {
            (Self::Unclaimed, Self::Claimed) => true,
            (Self::Claimed, Self::Unclaimed) => true,
            (Self::Claimed, to) => to.is_terminal(),
            _ => false,
        }
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Unclaimed => "unclaimed",
            Self::Claimed => "claimed",
            Self::Completed => "completed",
            Self::Flagged => "flagged",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "unclaimed" => Some(Self::Unclaimed),
            "claimed" => Some(Self::Claimed),
            "completed" => Some(Self::Completed),
            "flagged" => Some(Self::Flagged),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn all() -> [SiteStatus; 5] {
        [
            Self::Unclaimed,
            Self::Claimed,
            Self::Completed,
            Self::Flagged,
            Self::Failed,
        ]
    }
}

impl fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Memory-capacity class of a worker node
///
/// `Low` is the default assignment. `High` is reserved for sites that already exhausted
/// memory on a low-tier node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryTier {
    #[default]
    Low,
    High,
}

impl MemoryTier {
    /// The tier an out-of-memory site moves to, if any
    pub fn escalate(&self) -> Option<MemoryTier> {
        match self {
            Self::Low => Some(Self::High),
            Self::High => None,
        }
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::High => "high",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

impl std::str::FromStr for MemoryTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_string(&s.to_lowercase())
            .ok_or_else(|| format!("unknown memory tier '{}' (expected low or high)", s))
    }
}

/// Terminal outcome of one site pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteOutcome {
    /// Enough pages were accepted
    Success,

    /// Pass finished below the accepted-page threshold
    LowYield,

    /// The worker exhausted its memory budget mid-site
    OutOfMemory,
}

impl SiteOutcome {
    /// Decides the outcome of a finished pass
    ///
    /// Out-of-memory dominates; otherwise a pass is low-yield when it accepted fewer pages
    /// than `threshold`.
    pub fn decide(out_of_memory: bool, accepted: u64, threshold: u64) -> Self {
        if out_of_memory {
            Self::OutOfMemory
        } else if accepted < threshold {
            Self::LowYield
        } else {
            Self::Success
        }
    }
}

impl fmt::Display for SiteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::LowYield => "low_yield",
            Self::OutOfMemory => "out_of_memory",
        };
        f.write_str(s)
    }
}

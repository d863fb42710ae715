//! Page attempt state definitions
//!
//! One value tracks a single fetch attempt of a single page during a site pass.

use std::fmt;

/// State of one page attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageAttemptState {
    /// Page is waiting in the site frontier
    Pending,

    /// Fetch is in flight
    Fetching,

    // ===== Terminal States =====
    /// Fetch returned a payload (the quality gate decides what happens next)
    Succeeded,

    /// Fetch exceeded the page timeout and was abandoned
    TimedOut,

    /// Fetch or extraction failed
    Errored,
}

impl PageAttemptState {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::TimedOut | Self::Errored)
    }

    /// Returns true if the attempt failed
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::TimedOut | Self::Errored)
    }

    /// Checks whether the attempt may move from `self` to `to`
    pub fn can_transition_to(&self, to: PageAttemptState) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Fetching)
                | (Self::Fetching, Self::Succeeded)
                | (Self::Fetching, Self::TimedOut)
                | (Self::Fetching, Self::Errored)
        )
    }

    /// Moves to `to`, refusing transitions the state machine does not allow
    pub fn transition(self, to: PageAttemptState) -> crate::Result<PageAttemptState> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(crate::HarvestError::InvalidTransition { from: self, to })
        }
    }
}

impl fmt::Display for PageAttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Fetching => "Fetching",
            Self::Succeeded => "Succeeded",
            Self::TimedOut => "Timed Out",
            Self::Errored => "Errored",
        };
        write!(f, "{}", s)
    }
}

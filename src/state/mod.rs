//! State module for tracking harvest progress
//!
//! This module provides the state vocabulary shared by the ledger, the worker and the
//! orchestrator.
//!
//! # Components
//!
//! - `SiteStatus`: Lifecycle of a site claim (unclaimed, claimed, completed, flagged, failed)
//! - `MemoryTier`: Memory-capacity class of a worker node
//! - `SiteOutcome`: Terminal result of one site pass, as reported by the resilience engine
//! - `PageAttemptState`: Per-page attempt state machine

mod page_state;
mod site_state;

// Re-export main types
pub use page_state::PageAttemptState;
pub use site_state::{MemoryTier, SiteOutcome, SiteStatus};

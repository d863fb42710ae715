//! Output module for statistics and review reports
//!
//! This module handles:
//! - Loading fleet-wide statistics from the ledger
//! - Generating the markdown report of sites awaiting human review

mod markdown;
pub mod stats;

pub use markdown::{format_review_report, generate_review_report};
pub use stats::{load_statistics, print_statistics, HarvestStatistics};

use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

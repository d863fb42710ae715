//! URL handling module for Corpus-Harvest
//!
//! This module provides URL normalization for the per-site frontier and the mapping from a
//! page URL to the site that owns it.

mod normalize;
mod site;

// Re-export main functions
pub use normalize::normalize_url;
pub use site::{belongs_to_site, site_id_for};

//! Integration tests for Corpus-Harvest
//!
//! Scripted fetchers drive full site passes against on-disk ledgers; wiremock covers the
//! HTTP fetcher.

mod common;
mod harvest_tests;
mod http_tests;
mod ledger_tests;

//! Integration tests for Org-Harvest
//!
//! Multi-organization runs are driven against an in-memory data source with
//! a recording sleeper; the GitHub client is driven against wiremock.

mod common;
mod github_tests;
mod run_tests;

//! Shared test utilities for tensorquick integration tests.
//!
//! - `TestHarness` for isolated runs with temp scripts, fake deploy tools and output dirs
//! - Builders for model records and overrides

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;

//! Shared test utilities for omniocr integration tests.
//!
//! - Fake engine backends with scripted replies
//! - `TestHarness` wiring a service around them, in memory or on SQLite

pub mod backends;
pub mod harness;

pub use backends::*;
pub use harness::{submission, test_config, TestHarness};

//! Data models for runtime measurement
//!
//! This module contains the data structures passed between the test runner,
//! the aggregator and the process boundary.

mod outcome;

pub use outcome::{AggregationReport, DurationMs, RunStatus, TestFileId, TestOutcome};

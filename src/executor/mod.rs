//! Test execution engine
//!
//! Runs test files through the external test command, extracts their
//! durations and aggregates them into the runtime ledger.

mod aggregator;
mod extractor;
mod runner;

pub use aggregator::RuntimeAggregator;

//! Output formatting module
//!
//! Renders run summaries and runtime ledgers for the terminal.

mod formatter;

pub use formatter::{OutputFormat, ReportFormatter};

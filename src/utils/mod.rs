//! Shared utilities
//!
//! Logging setup, timing helpers and path normalization.

pub mod logger;
pub mod paths;
pub mod timer;

pub use logger::{init_logger, LogLevel};
pub use timer::Timer;

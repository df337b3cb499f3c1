//! Runtime ledger storage
//!
//! Provides the persisted mapping from test file to its last measured
//! runtime, and the maintenance pass that prunes it.

mod cleaner;
mod ledger;

pub use cleaner::{CleanReport, RuntimeCleaner};
pub use ledger::{LedgerError, RuntimeLedger, DEFAULT_LEDGER_FILE};

//! Ledger maintenance
//!
//! Merges one or more ledgers (typically the per-bucket outputs of a
//! parallel run) and drops entries for test files that no longer exist.

use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

use super::ledger::{LedgerError, RuntimeLedger};
use crate::config::CleanConfig;
use crate::utils::paths;

/// Result of a clean run
#[derive(Clone, Debug, Serialize)]
pub struct CleanReport {
    /// Ledger as written
    pub ledger: RuntimeLedger,
    pub ledger_path: PathBuf,
    /// Ledgers read
    pub inputs: usize,
    /// Entries dropped because their file is gone
    pub removed: usize,
}

/// Prunes stale entries from runtime ledgers
pub struct RuntimeCleaner {
    config: CleanConfig,
}

impl RuntimeCleaner {
    pub fn new(config: CleanConfig) -> Self {
        Self { config }
    }

    /// Merge the input ledgers in order, prune, and write the result
    pub fn run(&self) -> Result<CleanReport, LedgerError> {
        let root = &self.config.execution_path;
        let inputs = self.config.inputs();

        let merged = inputs.iter().fold(RuntimeLedger::new(), |acc, input| {
            let path = paths::resolve(root, input);
            info!("Reading runtimes from {}", path.display());
            RuntimeLedger::merge(acc, &RuntimeLedger::load(&path))
        });

        let before = merged.len();
        let ledger = merged.prune_missing(root);
        let removed = before - ledger.len();
        info!("Removed {} stale entries, {} remain", removed, ledger.len());

        if self.config.verbose {
            println!("{}", ledger.to_json_pretty()?);
        }

        let ledger_path = ledger.save(root, &self.config.output_file)?;

        Ok(CleanReport {
            ledger,
            ledger_path,
            inputs: inputs.len(),
            removed,
        })
    }
}

//! Test outcome models
//!
//! Defines test file identities, per-file outcomes and the run report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::results::RuntimeLedger;
use crate::utils::paths;

/// Elapsed wall-clock time of one test file, in milliseconds.
///
/// Always finite and non-negative.
pub type DurationMs = f64;

/// Identity of a test file: its path relative to the execution root, with
/// `/` separators.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TestFileId(String);

impl TestFileId {
    /// Build the identity for `file` as seen from `root`
    pub fn from_path(root: &Path, file: &Path) -> Self {
        Self(paths::relative_key(root, file))
    }

    /// Rebuild the identity from a stored ledger key
    pub fn from_key(key: &str) -> Self {
        Self(paths::normalize_key(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Absolute location of this file under `root`
    pub fn resolve(&self, root: &Path) -> PathBuf {
        paths::resolve(root, Path::new(&self.0))
    }
}

impl fmt::Display for TestFileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TestFileId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Result of running one test file
#[derive(Clone, Debug, PartialEq)]
pub enum TestOutcome {
    /// The test command passed and reported a duration
    Measured {
        id: TestFileId,
        duration_ms: DurationMs,
    },

    /// The test command failed, could not be spawned, timed out, or its
    /// output carried no duration line
    Failed { id: TestFileId, diagnostic: String },
}

impl TestOutcome {
    pub fn measured(id: TestFileId, duration_ms: DurationMs) -> Self {
        TestOutcome::Measured { id, duration_ms }
    }

    pub fn failed(id: TestFileId, diagnostic: impl Into<String>) -> Self {
        TestOutcome::Failed {
            id,
            diagnostic: diagnostic.into(),
        }
    }
}

/// Final status of an aggregation run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every file was measured
    Success,
    /// At least one file failed
    TestsFailed,
    /// Stopped early by the operator; nothing failed before that
    Interrupted,
}

impl RunStatus {
    /// Process exit code. Internal errors exit with 1 from `main`.
    pub fn exit_code(self) -> u8 {
        match self {
            RunStatus::Success => 0,
            RunStatus::TestsFailed => 2,
            RunStatus::Interrupted => 130,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => write!(f, "SUCCESS"),
            RunStatus::TestsFailed => write!(f, "TESTS FAILED"),
            RunStatus::Interrupted => write!(f, "INTERRUPTED"),
        }
    }
}

/// Result of one aggregation run
#[derive(Clone, Debug, Serialize)]
pub struct AggregationReport {
    /// Ledger as written to disk
    pub ledger: RuntimeLedger,

    /// Where the ledger was written
    pub ledger_path: PathBuf,

    /// Durations measured in this run
    pub batch: RuntimeLedger,

    /// Files that failed, in input order
    pub failures: Vec<TestFileId>,

    /// Number of files that were scheduled
    pub scheduled: usize,

    /// The run was cancelled before every file was processed
    pub interrupted: bool,

    /// Final status
    pub status: RunStatus,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl AggregationReport {
    /// Comma-joined failing identities
    pub fn failure_list(&self) -> String {
        self.failures
            .iter()
            .map(TestFileId::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    /// Status implied by failures and interruption
    pub fn status_for(failures: &[TestFileId], interrupted: bool) -> RunStatus {
        if !failures.is_empty() {
            RunStatus::TestsFailed
        } else if interrupted {
            RunStatus::Interrupted
        } else {
            RunStatus::Success
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_id_normalizes() {
        let root = Path::new("/repo");
        assert_eq!(
            TestFileId::from_path(root, Path::new("./test/a.js")),
            TestFileId::from_path(root, Path::new("/repo/test/a.js"))
        );
        assert_eq!(
            TestFileId::from_path(root, Path::new("test/a.js")).as_str(),
            "test/a.js"
        );
    }

    #[test]
    fn test_file_id_from_key_matches_from_path() {
        let root = Path::new("/repo");
        let expected = TestFileId::from_path(root, Path::new("test/a.js"));
        assert_eq!(TestFileId::from_key("./test/a.js"), expected);
        assert_eq!(TestFileId::from_key("test\\a.js"), expected);
        assert_eq!(TestFileId::from_key("x/../test/a.js"), expected);
    }

    #[test]
    fn test_file_id_resolve() {
        let id = TestFileId::from_path(Path::new("/repo"), Path::new("test/a.js"));
        assert_eq!(id.resolve(Path::new("/repo")), PathBuf::from("/repo/test/a.js"));
    }

    #[test]
    fn test_outcome_constructors() {
        let id = TestFileId::from_path(Path::new("/repo"), Path::new("a.js"));

        assert_eq!(
            TestOutcome::measured(id.clone(), 12.0),
            TestOutcome::Measured {
                id: id.clone(),
                duration_ms: 12.0
            }
        );
        assert_eq!(
            TestOutcome::failed(id.clone(), "exit status 1"),
            TestOutcome::Failed {
                id,
                diagnostic: "exit status 1".to_string()
            }
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(RunStatus::Success.exit_code(), 0);
        assert_eq!(RunStatus::TestsFailed.exit_code(), 2);
        assert_eq!(RunStatus::Interrupted.exit_code(), 130);
    }

    #[test]
    fn test_status_for() {
        let id = TestFileId::from_path(Path::new("/repo"), Path::new("a.js"));
        assert_eq!(AggregationReport::status_for(&[], false), RunStatus::Success);
        assert_eq!(AggregationReport::status_for(&[], true), RunStatus::Interrupted);
        assert_eq!(
            AggregationReport::status_for(&[id], true),
            RunStatus::TestsFailed
        );
    }
}

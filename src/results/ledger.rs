//! Runtime ledger
//!
//! A flat JSON object mapping test file paths (relative to the execution
//! root) to their last measured duration in milliseconds. Keys are kept
//! sorted so the file diffs cleanly between runs.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{DurationMs, TestFileId};
use crate::utils::paths;

/// Default ledger file name, resolved against the execution root
pub const DEFAULT_LEDGER_FILE: &str = "test-runtimes.json";

/// Largest whole number an `f64` holds exactly
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Ledger write errors
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Failed to create ledger directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("Failed to serialize runtime ledger: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write runtime ledger {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Mapping from test file identity to measured duration
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RuntimeLedger {
    entries: BTreeMap<TestFileId, DurationMs>,
}

impl RuntimeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a duration, replacing any previous value for the file
    pub fn insert(&mut self, id: TestFileId, duration_ms: DurationMs) {
        self.entries.insert(id, duration_ms);
    }

    pub fn get(&self, id: &TestFileId) -> Option<DurationMs> {
        self.entries.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TestFileId, DurationMs)> {
        self.entries.iter().map(|(k, v)| (k, *v))
    }

    /// Sum of all recorded durations
    pub fn total_ms(&self) -> DurationMs {
        self.entries.values().sum()
    }

    /// Entries ordered slowest first, ties broken by path
    pub fn slowest_first(&self) -> Vec<(&TestFileId, DurationMs)> {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        entries
    }

    /// Load a ledger from disk.
    ///
    /// A missing or unparseable file yields an empty ledger so the first run
    /// in a fresh checkout can bootstrap one.
    pub fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No runtime ledger at {}, starting empty", path.display());
                return Self::new();
            }
            Err(e) => {
                warn!("Failed to read runtime ledger {}: {}", path.display(), e);
                return Self::new();
            }
        };

        let raw: BTreeMap<String, DurationMs> = match serde_json::from_str(&content) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    "Ignoring unparseable runtime ledger {}: {}",
                    path.display(),
                    e
                );
                return Self::new();
            }
        };

        let mut ledger = Self::new();
        for (key, duration) in raw {
            if !(duration.is_finite() && duration >= 0.0) {
                warn!("Dropping invalid runtime {duration} for {key}");
                continue;
            }
            let id = TestFileId::from_key(&key);
            if id.as_str() != key {
                debug!("Normalized ledger key {key} to {id}");
            }
            if let Some(previous) = ledger.entries.insert(id.clone(), duration) {
                warn!("Duplicate ledger entries for {id}, keeping {duration} over {previous}");
            }
        }

        debug!(
            "Loaded {} runtimes from {}",
            ledger.len(),
            path.display()
        );
        ledger
    }

    /// Combine two ledgers. Every key of both survives; on a collision the
    /// value from `updates` wins.
    pub fn merge(existing: Self, updates: &Self) -> Self {
        let mut merged = existing;
        merged
            .entries
            .extend(updates.entries.iter().map(|(k, v)| (k.clone(), *v)));
        merged
    }

    /// Keep only the entries for which `exists` holds
    pub fn prune<F>(self, mut exists: F) -> Self
    where
        F: FnMut(&TestFileId) -> bool,
    {
        let entries = self
            .entries
            .into_iter()
            .filter(|(id, _)| {
                let keep = exists(id);
                if !keep {
                    debug!("Pruning runtime for missing file {id}");
                }
                keep
            })
            .collect();
        Self { entries }
    }

    /// Keep only the entries whose test file still exists under `root`
    pub fn prune_missing(self, root: &Path) -> Self {
        self.prune(|id| id.resolve(root).is_file())
    }

    /// Pretty-printed JSON form, as written to disk
    pub fn to_json_pretty(&self) -> Result<String, LedgerError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the ledger to `path`, resolved against `root` when relative.
    ///
    /// Missing parent directories are created. The content is written to a
    /// sibling temp file first and renamed into place, so readers never see
    /// a half-written ledger. Returns the resolved path.
    pub fn save(&self, root: &Path, path: &Path) -> Result<PathBuf, LedgerError> {
        let path = paths::resolve(root, path);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| LedgerError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut content = self.to_json_pretty()?;
        content.push('\n');

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_LEDGER_FILE.to_string());
        let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));

        fs::write(&tmp_path, content).map_err(|source| LedgerError::Write {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &path).map_err(|source| {
            let _ = fs::remove_file(&tmp_path);
            LedgerError::Write {
                path: path.clone(),
                source,
            }
        })?;

        info!("Wrote {} runtimes to {}", self.len(), path.display());
        Ok(path)
    }
}

/// Written as a flat JSON object. Whole milliseconds are written without a
/// fractional part (`250`, not `250.0`).
impl Serialize for RuntimeLedger {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, duration) in &self.entries {
            if duration.fract() == 0.0 && (0.0..=MAX_EXACT_INTEGER).contains(duration) {
                map.serialize_entry(id, &(*duration as u64))?;
            } else {
                map.serialize_entry(id, duration)?;
            }
        }
        map.end()
    }
}

impl FromIterator<(TestFileId, DurationMs)> for RuntimeLedger {
    fn from_iter<I: IntoIterator<Item = (TestFileId, DurationMs)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

//! Configuration module
//!
//! Typed run configuration, assembled from built-in defaults, an optional
//! config file, `TEST_BUCKET_*` environment variables and CLI flags, in
//! increasing order of precedence.

mod env;
mod file;

pub use env::{print_env_help, EnvConfig};
pub use file::ConfigFile;

use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::results::DEFAULT_LEDGER_FILE;

/// Test command used when none is configured
pub const DEFAULT_TEST_COMMAND: &str = "yarn mocha";

/// Per-file timeout used when none is configured
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Configuration errors
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("--test-files option required to run tests")]
    MissingTestFiles,

    #[error("--test-command must not be empty")]
    EmptyTestCommand,

    #[error("Bucket total must be at least 1")]
    ZeroBuckets,

    #[error("Bucket index {index} is out of range for {total} buckets")]
    IndexOutOfRange { index: usize, total: usize },

    #[error("Concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("Timeout must be at least 1 second")]
    ZeroTimeout,

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(String),
}

/// Optional settings contributed by one configuration layer
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConfigOverrides {
    pub test_command: Option<String>,
    pub execution_path: Option<PathBuf>,
    pub output_file: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub concurrency: Option<usize>,
    pub verbose: Option<bool>,
}

impl ConfigOverrides {
    /// Layer `other` on top of `self`; set fields in `other` win
    pub fn merge(self, other: ConfigOverrides) -> Self {
        Self {
            test_command: other.test_command.or(self.test_command),
            execution_path: other.execution_path.or(self.execution_path),
            output_file: other.output_file.or(self.output_file),
            timeout_secs: other.timeout_secs.or(self.timeout_secs),
            concurrency: other.concurrency.or(self.concurrency),
            verbose: other.verbose.or(self.verbose),
        }
    }
}

/// Settings for one measurement run
#[derive(Clone, Debug, Serialize)]
pub struct RunConfig {
    /// Zero-based bucket index
    pub current_instance: usize,

    /// Total number of buckets
    pub bucket_total: usize,

    /// Test files, or a single test location for the bucket source
    pub test_files: Vec<String>,

    /// Working directory for the test command; ledger keys are relative to it
    pub execution_path: PathBuf,

    /// Ledger path, resolved against `execution_path` when relative
    pub output_file: PathBuf,

    /// Test command prefix, trimmed with one trailing space
    pub test_command: String,

    /// Echo test output and the merged ledger
    pub verbose: bool,

    /// Per-file timeout in seconds
    pub timeout_secs: u64,

    /// Test files run at once
    pub concurrency: usize,
}

impl RunConfig {
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::default()
    }

    /// Check the invariants the aggregator relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.test_files.is_empty() {
            return Err(ConfigError::MissingTestFiles);
        }
        if self.test_command.trim().is_empty() {
            return Err(ConfigError::EmptyTestCommand);
        }
        if self.bucket_total == 0 {
            return Err(ConfigError::ZeroBuckets);
        }
        if self.current_instance >= self.bucket_total {
            return Err(ConfigError::IndexOutOfRange {
                index: self.current_instance,
                total: self.bucket_total,
            });
        }
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

/// Builder for [`RunConfig`]
#[derive(Clone, Debug)]
pub struct RunConfigBuilder {
    current_instance: usize,
    bucket_total: usize,
    test_files: Vec<String>,
    execution_path: PathBuf,
    output_file: PathBuf,
    test_command: String,
    verbose: bool,
    timeout_secs: u64,
    concurrency: usize,
}

impl Default for RunConfigBuilder {
    fn default() -> Self {
        Self {
            current_instance: 0,
            bucket_total: 1,
            test_files: Vec::new(),
            execution_path: PathBuf::from("."),
            output_file: PathBuf::from(DEFAULT_LEDGER_FILE),
            test_command: DEFAULT_TEST_COMMAND.to_string(),
            verbose: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            concurrency: 1,
        }
    }
}

impl RunConfigBuilder {
    pub fn current_instance(mut self, index: usize) -> Self {
        self.current_instance = index;
        self
    }

    pub fn bucket_total(mut self, total: usize) -> Self {
        self.bucket_total = total;
        self
    }

    pub fn test_files(mut self, files: Vec<String>) -> Self {
        self.test_files = files;
        self
    }

    pub fn execution_path(mut self, path: impl AsRef<Path>) -> Self {
        self.execution_path = path.as_ref().to_path_buf();
        self
    }

    pub fn output_file(mut self, path: impl AsRef<Path>) -> Self {
        self.output_file = path.as_ref().to_path_buf();
        self
    }

    pub fn test_command(mut self, command: impl Into<String>) -> Self {
        self.test_command = command.into();
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Apply every setting present in `overrides`
    pub fn apply(mut self, overrides: &ConfigOverrides) -> Self {
        if let Some(command) = &overrides.test_command {
            self.test_command = command.clone();
        }
        if let Some(path) = &overrides.execution_path {
            self.execution_path = path.clone();
        }
        if let Some(path) = &overrides.output_file {
            self.output_file = path.clone();
        }
        if let Some(secs) = overrides.timeout_secs {
            self.timeout_secs = secs;
        }
        if let Some(concurrency) = overrides.concurrency {
            self.concurrency = concurrency;
        }
        if let Some(verbose) = overrides.verbose {
            self.verbose = verbose;
        }
        self
    }

    pub fn build(self) -> Result<RunConfig, ConfigError> {
        let config = RunConfig {
            current_instance: self.current_instance,
            bucket_total: self.bucket_total,
            test_files: self.test_files,
            execution_path: self.execution_path,
            output_file: self.output_file,
            test_command: format!("{} ", self.test_command.trim()),
            verbose: self.verbose,
            timeout_secs: self.timeout_secs,
            concurrency: self.concurrency,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Settings for the ledger maintenance (clean) mode
#[derive(Clone, Debug, Serialize)]
pub struct CleanConfig {
    /// Root the ledger keys are relative to
    pub execution_path: PathBuf,

    /// Ledgers to merge, later files win; empty means the output ledger
    pub input_files: Vec<PathBuf>,

    /// Where the cleaned ledger is written
    pub output_file: PathBuf,

    pub verbose: bool,
}

impl CleanConfig {
    pub fn new(overrides: &ConfigOverrides, input_files: Vec<PathBuf>) -> Self {
        Self {
            execution_path: overrides
                .execution_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(".")),
            input_files,
            output_file: overrides
                .output_file
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LEDGER_FILE)),
            verbose: overrides.verbose.unwrap_or(false),
        }
    }

    /// Input ledgers, defaulting to the output ledger itself
    pub fn inputs(&self) -> Vec<PathBuf> {
        if self.input_files.is_empty() {
            vec![self.output_file.clone()]
        } else {
            self.input_files.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files() -> Vec<String> {
        vec!["test/a.js".to_string(), "test/b.js".to_string()]
    }

    #[test]
    fn test_builder_defaults() {
        let config = RunConfig::builder().test_files(files()).build().unwrap();
        assert_eq!(config.current_instance, 0);
        assert_eq!(config.bucket_total, 1);
        assert_eq!(config.test_command, "yarn mocha ");
        assert_eq!(config.output_file, PathBuf::from(DEFAULT_LEDGER_FILE));
        assert_eq!(config.execution_path, PathBuf::from("."));
        assert_eq!(config.concurrency, 1);
        assert!(!config.verbose);
    }

    #[test]
    fn test_command_gets_single_trailing_space() {
        let config = RunConfig::builder()
            .test_files(files())
            .test_command("  yarn mocha --require test/setup.js   ")
            .build()
            .unwrap();
        assert_eq!(config.test_command, "yarn mocha --require test/setup.js ");
    }

    #[test]
    fn test_validation_errors() {
        assert_eq!(
            RunConfig::builder().build().unwrap_err(),
            ConfigError::MissingTestFiles
        );
        assert_eq!(
            RunConfig::builder()
                .test_files(files())
                .test_command("   ")
                .build()
                .unwrap_err(),
            ConfigError::EmptyTestCommand
        );
        assert_eq!(
            RunConfig::builder()
                .test_files(files())
                .bucket_total(0)
                .build()
                .unwrap_err(),
            ConfigError::ZeroBuckets
        );
        assert_eq!(
            RunConfig::builder()
                .test_files(files())
                .current_instance(3)
                .bucket_total(3)
                .build()
                .unwrap_err(),
            ConfigError::IndexOutOfRange { index: 3, total: 3 }
        );
        assert_eq!(
            RunConfig::builder()
                .test_files(files())
                .concurrency(0)
                .build()
                .unwrap_err(),
            ConfigError::ZeroConcurrency
        );
        assert_eq!(
            RunConfig::builder()
                .test_files(files())
                .timeout_secs(0)
                .build()
                .unwrap_err(),
            ConfigError::ZeroTimeout
        );
    }

    #[test]
    fn test_overrides_layering() {
        let file = ConfigOverrides {
            test_command: Some("npx mocha".to_string()),
            timeout_secs: Some(60),
            ..Default::default()
        };
        let env = ConfigOverrides {
            timeout_secs: Some(90),
            concurrency: Some(2),
            ..Default::default()
        };
        let cli = ConfigOverrides {
            concurrency: Some(4),
            ..Default::default()
        };

        let merged = file.merge(env).merge(cli);
        let config = RunConfig::builder()
            .test_files(files())
            .apply(&merged)
            .build()
            .unwrap();

        assert_eq!(config.test_command, "npx mocha ");
        assert_eq!(config.timeout_secs, 90);
        assert_eq!(config.concurrency, 4);
    }

    #[test]
    fn test_clean_config_inputs_default_to_output() {
        let config = CleanConfig::new(&ConfigOverrides::default(), Vec::new());
        assert_eq!(config.inputs(), vec![PathBuf::from(DEFAULT_LEDGER_FILE)]);

        let config = CleanConfig::new(
            &ConfigOverrides::default(),
            vec![PathBuf::from("a.json"), PathBuf::from("b.json")],
        );
        assert_eq!(config.inputs().len(), 2);
    }
}

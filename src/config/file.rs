//! Configuration file management
//!
//! Handles finding, loading, and validating configuration files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::{ConfigError, ConfigOverrides, DEFAULT_TEST_COMMAND, DEFAULT_TIMEOUT_SECS};
use crate::results::DEFAULT_LEDGER_FILE;

/// Configuration file locations (in order of precedence)
const CONFIG_LOCATIONS: &[&str] = &[
    "./test-bucket.yaml",
    "./test-bucket.yml",
    "./.test-bucket.yaml",
    "~/.config/test-bucket/config.yaml",
];

const SUPPORTED_VERSIONS: &[&str] = &["1.0"];

/// Configuration file structure
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Version of config file format
    #[serde(default = "default_version")]
    pub version: String,

    /// Test command prefix, e.g. `yarn mocha --require test/setup.js`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_command: Option<String>,

    /// Directory the test command runs in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_directory: Option<PathBuf>,

    /// Runtime ledger path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<PathBuf>,

    /// Per-file timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Test files run at once
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbose: Option<bool>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl ConfigFile {
    /// Find configuration file in standard locations
    pub fn find() -> Option<PathBuf> {
        CONFIG_LOCATIONS
            .iter()
            .map(|location| expand_path(location))
            .find(|path| path.exists())
    }

    /// Load from an explicit path, or the first standard location found.
    /// No file at all yields an empty config.
    pub fn load_or_find(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::find() {
                Some(found) => Self::load(&found),
                None => Ok(Self {
                    version: default_version(),
                    ..Default::default()
                }),
            },
        }
    }

    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = if is_yaml_file(path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        };

        config.validate()?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_yaml_file(path) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !SUPPORTED_VERSIONS.contains(&self.version.as_str()) {
            return Err(ConfigError::UnsupportedVersion(self.version.clone()));
        }
        if matches!(&self.test_command, Some(command) if command.trim().is_empty()) {
            return Err(ConfigError::EmptyTestCommand);
        }
        if self.timeout_secs == Some(0) {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.concurrency == Some(0) {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(())
    }

    /// Settings this file contributes
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            test_command: self.test_command.clone(),
            execution_path: self.execution_directory.clone(),
            output_file: self.output_file.clone(),
            timeout_secs: self.timeout_secs,
            concurrency: self.concurrency,
            verbose: self.verbose,
        }
    }

    /// Generate example configuration
    pub fn example() -> Self {
        Self {
            version: default_version(),
            test_command: Some(format!("{DEFAULT_TEST_COMMAND} --require test/setup-tests.js")),
            execution_directory: Some(PathBuf::from(".")),
            output_file: Some(PathBuf::from(DEFAULT_LEDGER_FILE)),
            timeout_secs: Some(DEFAULT_TIMEOUT_SECS),
            concurrency: Some(1),
            verbose: Some(false),
        }
    }
}

/// Expand ~ to home directory
fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Check if file is YAML based on extension
fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}

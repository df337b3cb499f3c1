//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;
use std::path::PathBuf;

use super::ConfigOverrides;

/// Environment variable prefix
const ENV_PREFIX: &str = "TEST_BUCKET";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnvConfig {
    /// Test command from TEST_BUCKET_TEST_COMMAND
    pub test_command: Option<String>,
    /// Execution directory from TEST_BUCKET_EXECUTION_DIRECTORY
    pub execution_directory: Option<String>,
    /// Ledger path from TEST_BUCKET_OUTPUT_FILE
    pub output_file: Option<String>,
    /// Per-file timeout from TEST_BUCKET_TIMEOUT
    pub timeout: Option<u64>,
    /// Concurrency from TEST_BUCKET_CONCURRENCY
    pub concurrency: Option<usize>,
    /// Verbose from TEST_BUCKET_VERBOSE
    pub verbose: Option<bool>,
    /// Config file from TEST_BUCKET_CONFIG
    pub config_file: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(format!("{ENV_PREFIX}_{name}").as_str()).filter(|v| !v.is_empty())
        };

        Self {
            test_command: get("TEST_COMMAND"),
            execution_directory: get("EXECUTION_DIRECTORY"),
            output_file: get("OUTPUT_FILE"),
            timeout: get("TIMEOUT").and_then(|v| v.parse().ok()),
            concurrency: get("CONCURRENCY").and_then(|v| v.parse().ok()),
            verbose: get("VERBOSE").map(|v| parse_bool(&v)),
            config_file: get("CONFIG"),
        }
    }

    /// Settings the environment contributes
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            test_command: self.test_command.clone(),
            execution_path: self.execution_directory.as_ref().map(PathBuf::from),
            output_file: self.output_file.as_ref().map(PathBuf::from),
            timeout_secs: self.timeout,
            concurrency: self.concurrency,
            verbose: self.verbose,
        }
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "1" | "true" | "yes" | "on" | "enabled"
    )
}

/// Print all TEST_BUCKET environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_TEST_COMMAND         Test command prefix (default: yarn mocha)");
    println!("  {ENV_PREFIX}_EXECUTION_DIRECTORY  Directory the test command runs in");
    println!("  {ENV_PREFIX}_OUTPUT_FILE          Runtime ledger path");
    println!("  {ENV_PREFIX}_TIMEOUT              Per-file timeout in seconds");
    println!("  {ENV_PREFIX}_CONCURRENCY          Test files run at once");
    println!("  {ENV_PREFIX}_VERBOSE              Echo test output (true/false)");
    println!("  {ENV_PREFIX}_CONFIG               Path to configuration file");
    println!();
    println!("Example:");
    println!("  export {ENV_PREFIX}_TEST_COMMAND=\"yarn mocha --require test/setup.js\"");
    println!("  test-bucket test --test-files test/a.spec.js test/b.spec.js");
}

//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Runtime-aware test bucketing
#[derive(Parser, Debug)]
#[command(name = "test-bucket")]
#[command(version)]
#[command(about = "Measure per-file test runtimes and keep a runtime ledger")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Echo test output and the merged ledger
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (YAML or JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

/// Exit status for a command line clap rejected. `--help` and `--version`
/// succeed; any other usage error counts as misconfiguration.
pub fn usage_exit_code(error: &clap::Error) -> u8 {
    if error.exit_code() == 0 {
        0
    } else {
        1
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run timed tests and record their runtimes
    Test(TestArgs),

    /// Merge runtime ledgers and drop entries for deleted test files
    Clean(CleanArgs),

    /// Print a runtime ledger
    Show(ShowArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for test command
#[derive(Parser, Debug)]
pub struct TestArgs {
    /// Test files to measure
    #[arg(long = "test-files", alias = "testFiles", num_args = 1.., required = true)]
    pub test_files: Vec<String>,

    /// Test command prefix the file path is appended to (default: "yarn mocha")
    #[arg(long, alias = "testCommand")]
    pub test_command: Option<String>,

    /// Zero-based bucket index
    #[arg(short, long, default_value = "0")]
    pub index: usize,

    /// Total number of buckets
    #[arg(short, long, default_value = "1")]
    pub bucket: usize,

    /// Directory the test command runs in
    #[arg(long, alias = "executionDirectory")]
    pub execution_directory: Option<PathBuf>,

    /// Runtime ledger path (default: <execution directory>/test-runtimes.json)
    #[arg(long, alias = "outputFile")]
    pub output_file: Option<PathBuf>,

    /// Per-file timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Number of test files run at once
    #[arg(short, long)]
    pub concurrent: Option<usize>,

    /// Summary format (table, json, json-pretty)
    #[arg(short, long, default_value = "table")]
    pub format: String,
}

/// Arguments for clean command
#[derive(Parser, Debug)]
pub struct CleanArgs {
    /// Ledgers to merge, later files win (default: the output ledger)
    #[arg(long = "input-files", alias = "inputFiles", num_args = 1..)]
    pub input_files: Vec<PathBuf>,

    /// Root the ledger keys are relative to
    #[arg(long, alias = "executionDirectory")]
    pub execution_directory: Option<PathBuf>,

    /// Where the cleaned ledger is written
    #[arg(long, alias = "outputFile")]
    pub output_file: Option<PathBuf>,

    /// Summary format (table, json, json-pretty)
    #[arg(short, long, default_value = "table")]
    pub format: String,
}

/// Arguments for show command
#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Ledger to print (default: the configured output ledger)
    #[arg(long)]
    pub input_file: Option<PathBuf>,

    /// Root relative ledger paths are resolved against
    #[arg(long, alias = "executionDirectory")]
    pub execution_directory: Option<PathBuf>,

    /// Output format (table, json, json-pretty, csv)
    #[arg(short, long, default_value = "table")]
    pub format: String,
}

/// Arguments for configuration management
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write an example configuration file
    Init {
        /// Output path
        #[arg(default_value = "test-bucket.yaml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// List supported environment variables
    Env,
}

//! test-bucket - Runtime-aware test bucketing
//!
//! Runs each test file of a bucket through an external test command, reads
//! the elapsed time from its summary line, and merges the measurements into
//! a JSON runtime ledger so later bucket assignments can balance by cost
//! rather than by file count.
//!
//! ## Usage
//!
//! ```bash
//! # Measure two files with mocha and record their runtimes
//! test-bucket test --test-files test/a.spec.js test/b.spec.js \
//!     --test-command "yarn mocha --require test/setup.js"
//!
//! # One ledger per bucket when buckets run concurrently
//! test-bucket test -i 1 -b 4 --test-files ... --output-file runtimes-1.json
//!
//! # Merge the bucket ledgers and drop deleted files
//! test-bucket clean --input-files runtimes-*.json --output-file test-runtimes.json
//!
//! # Inspect the ledger
//! test-bucket show --format csv
//! ```
//!
//! Exit status: 0 when every file was measured, 2 when some test files
//! failed, 130 when interrupted, 1 on bad usage and internal errors.

use anyhow::{Context, Result};
use clap::Parser;
use std::future;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

mod buckets;
mod cli;
mod config;
mod executor;
mod models;
mod output;
mod results;
mod utils;

use cli::Args;
use config::{CleanConfig, ConfigFile, ConfigOverrides, EnvConfig, RunConfig};
use executor::RuntimeAggregator;
use output::{OutputFormat, ReportFormatter};
use results::{RuntimeCleaner, RuntimeLedger, DEFAULT_LEDGER_FILE};
use utils::{init_logger, paths, LogLevel};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            e.print()?;
            return Ok(ExitCode::from(cli::usage_exit_code(&e)));
        }
    };

    let env = EnvConfig::load();
    let layered = {
        let config_path = args
            .config
            .clone()
            .or_else(|| env.config_file.as_ref().map(PathBuf::from));
        let file = ConfigFile::load_or_find(config_path.as_deref())?;
        file.overrides().merge(env.overrides())
    };

    let verbose = args.verbose || layered.verbose.unwrap_or(false);
    init_logger(LogLevel::for_verbosity(verbose));

    let layered = layered.merge(ConfigOverrides {
        verbose: args.verbose.then_some(true),
        ..Default::default()
    });

    match args.command {
        cli::Command::Test(test_args) => run_tests(test_args, layered).await,
        cli::Command::Clean(clean_args) => clean(clean_args, layered),
        cli::Command::Show(show_args) => show(show_args, &layered),
        cli::Command::Config(config_args) => manage_config(config_args),
    }
}

fn formatter(format: &str) -> ReportFormatter {
    ReportFormatter::new(OutputFormat::from_str(format).unwrap_or(OutputFormat::Table))
}

/// Resolves when the operator asks the run to stop
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => warn!("Interrupt received, finishing with the results so far"),
        Err(e) => {
            warn!("Cannot listen for interrupts: {}", e);
            future::pending::<()>().await;
        }
    }
}

async fn run_tests(args: cli::TestArgs, layered: ConfigOverrides) -> Result<ExitCode> {
    let overrides = layered.merge(ConfigOverrides {
        test_command: args.test_command,
        execution_path: args.execution_directory,
        output_file: args.output_file,
        timeout_secs: args.timeout,
        concurrency: args.concurrent,
        verbose: None,
    });

    let config = RunConfig::builder()
        .current_instance(args.index)
        .bucket_total(args.bucket)
        .test_files(args.test_files)
        .apply(&overrides)
        .build()
        .context("Invalid test configuration")?;

    info!(
        "Bucket {}/{}: measuring with `{}` in {}",
        config.current_instance,
        config.bucket_total,
        config.test_command.trim_end(),
        config.execution_path.display()
    );

    let report = RuntimeAggregator::new(config)
        .run_until(shutdown_signal())
        .await?;

    println!("{}", formatter(&args.format).format_report(&report));
    Ok(ExitCode::from(report.status.exit_code()))
}

fn clean(args: cli::CleanArgs, layered: ConfigOverrides) -> Result<ExitCode> {
    let overrides = layered.merge(ConfigOverrides {
        execution_path: args.execution_directory,
        output_file: args.output_file,
        ..Default::default()
    });

    let report = RuntimeCleaner::new(CleanConfig::new(&overrides, args.input_files)).run()?;

    println!("{}", formatter(&args.format).format_clean(&report));
    Ok(ExitCode::SUCCESS)
}

fn show(args: cli::ShowArgs, layered: &ConfigOverrides) -> Result<ExitCode> {
    let root = args
        .execution_directory
        .or_else(|| layered.execution_path.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    let input = args
        .input_file
        .or_else(|| layered.output_file.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LEDGER_FILE));

    let path = paths::resolve(&root, &input);
    let ledger = RuntimeLedger::load(&path);
    if ledger.is_empty() {
        warn!("No runtimes recorded in {}", path.display());
    }

    println!("{}", formatter(&args.format).format_ledger(&ledger)?);
    Ok(ExitCode::SUCCESS)
}

fn manage_config(args: cli::ConfigArgs) -> Result<ExitCode> {
    match args.action {
        cli::ConfigAction::Init { path, force } => init_config(&path, force)?,
        cli::ConfigAction::Env => config::print_env_help(),
    }
    Ok(ExitCode::SUCCESS)
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists, pass --force to overwrite",
            path.display()
        );
    }
    ConfigFile::example().save(path)?;
    println!("Wrote example configuration to {}", path.display());
    Ok(())
}

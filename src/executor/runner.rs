//! Test execution runner
//!
//! Runs the external test command against one test file and turns the result
//! into a [`TestOutcome`]. Failures never escape as errors: a file that
//! cannot be measured becomes a `Failed` outcome and the caller moves on.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{debug, error};

#[cfg(unix)]
use nix::{
    errno::Errno,
    sys::signal::{killpg, Signal},
    unistd::Pid,
};
#[cfg(unix)]
use tracing::warn;

use super::extractor::{DurationExtractor, ExtractError, MochaSummaryExtractor};
use crate::models::{TestFileId, TestOutcome};
use crate::utils::Timer;

/// Why a test file could not be measured
#[derive(Error, Debug)]
pub enum RunFailure {
    #[error("Failed to spawn test command: {0}")]
    Spawn(#[source] io::Error),

    #[error("Test command timed out after {0}s")]
    Timeout(u64),

    #[error("Test command failed with exit code {0}")]
    NonZeroExit(i32),

    #[error("Test command was terminated by a signal")]
    Terminated,

    #[error("Test passed but its output has no usable duration: {0}")]
    Extract(#[from] ExtractError),
}

/// Captured result of one finished command
#[derive(Clone, Debug)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal
    pub exit_code: Option<i32>,

    pub stdout: String,

    pub stderr: String,
}

impl CommandOutput {
    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stdout followed by stderr
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }

    fn exit_failure(&self) -> RunFailure {
        match self.exit_code {
            Some(code) => RunFailure::NonZeroExit(code),
            None => RunFailure::Terminated,
        }
    }
}

/// Runs the configured test command for single test files
#[derive(Clone)]
pub struct TestRunner {
    /// Command prefix, ending in exactly one space
    command: String,
    root: PathBuf,
    timeout_secs: u64,
    verbose: bool,
    extractor: Arc<dyn DurationExtractor>,
}

impl TestRunner {
    /// Create a runner for `command` executing in `root`
    pub fn new(command: &str, root: impl Into<PathBuf>) -> Self {
        Self {
            command: format!("{} ", command.trim()),
            root: root.into(),
            timeout_secs: 600,
            verbose: false,
            extractor: Arc::new(MochaSummaryExtractor),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Use a different summary format
    #[allow(dead_code)]
    pub fn with_extractor(mut self, extractor: Arc<dyn DurationExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Shell invocation for a test file
    pub fn invocation(&self, file: &str) -> String {
        format!("{}{}", self.command, file)
    }

    /// Run the test command for `file` and measure it
    pub async fn run(&self, file: &str) -> TestOutcome {
        let id = TestFileId::from_path(&self.root, Path::new(file));
        let timer = Timer::start(format!("Test {id}"));

        let output = match self.execute(&self.invocation(file)).await {
            Ok(output) => output,
            Err(failure) => return self.fail(id, failure, None),
        };

        if self.verbose {
            println!("{}", output.combined());
        }

        if !output.is_success() {
            let failure = output.exit_failure();
            return self.fail(id, failure, Some(&output));
        }

        match self.extractor.extract(&output.combined()) {
            Ok(duration_ms) => {
                timer.stop();
                debug!("{} reported {}ms", id, duration_ms);
                TestOutcome::measured(id, duration_ms)
            }
            Err(e) => self.fail(id, e.into(), Some(&output)),
        }
    }

    /// Execute a shell invocation in the execution root.
    ///
    /// Non-zero exit is not an error here; only spawn failures and timeouts
    /// are. The command runs in its own process group, and the whole group
    /// is killed once this returns or the future is dropped, which takes
    /// down whatever the shell started as well.
    pub async fn execute(&self, invocation: &str) -> Result<CommandOutput, RunFailure> {
        debug!("Executing `{}` in {}", invocation, self.root.display());

        let mut command = shell_command(invocation);
        command
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(RunFailure::Spawn)?;
        let _group = ProcessGroup::of(&child);

        let output = tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| RunFailure::Timeout(self.timeout_secs))?
        .map_err(RunFailure::Spawn)?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn fail(
        &self,
        id: TestFileId,
        failure: RunFailure,
        output: Option<&CommandOutput>,
    ) -> TestOutcome {
        error!("Error message: {}", failure);

        let mut diagnostic = failure.to_string();
        if let Some(output) = output {
            let captured = output.combined();
            if !captured.trim().is_empty() {
                error!("Error output: {}", captured);
                diagnostic.push('\n');
                diagnostic.push_str(captured.trim_end());
            }
        }

        TestOutcome::failed(id, diagnostic)
    }
}

/// Process group of a spawned test command, killed on drop
#[cfg(unix)]
struct ProcessGroup(Option<Pid>);

#[cfg(unix)]
impl ProcessGroup {
    fn of(child: &Child) -> Self {
        // `process_group(0)` makes the shell the group leader
        Self(child.id().map(|pid| Pid::from_raw(pid as i32)))
    }
}

#[cfg(unix)]
impl Drop for ProcessGroup {
    fn drop(&mut self) {
        let Some(pgid) = self.0 else { return };
        match killpg(pgid, Signal::SIGKILL) {
            Ok(()) => debug!("Killed leftover processes in group {}", pgid),
            Err(Errno::ESRCH) => {}
            Err(e) => warn!("Failed to kill process group {}: {}", pgid, e),
        }
    }
}

#[cfg(not(unix))]
struct ProcessGroup;

#[cfg(not(unix))]
impl ProcessGroup {
    fn of(_child: &Child) -> Self {
        ProcessGroup
    }
}

#[cfg(not(windows))]
fn shell_command(invocation: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(invocation);
    command
}

#[cfg(windows)]
fn shell_command(invocation: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(invocation);
    command
}

//! Runtime aggregation
//!
//! Drives a whole measurement run: resolve the bucket's test files, run each
//! one, collect durations and failures, then merge the batch into the
//! on-disk ledger. One file failing never stops the others, and the ledger is
//! written even when some files failed so their siblings' runtimes are kept.

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::fmt;
use std::future::{self, Future};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::runner::TestRunner;
use crate::buckets::{BucketError, BucketSource, FileListSource};
use crate::config::RunConfig;
use crate::models::{AggregationReport, DurationMs, TestFileId, TestOutcome};
use crate::results::{LedgerError, RuntimeLedger};
use crate::utils::{paths, Timer};

/// Errors that abort a run
#[derive(Error, Debug)]
pub enum AggregateError {
    #[error("Failed to resolve test files: {0}")]
    Bucket(#[from] BucketError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Aggregator lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
    Reporting,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Running => write!(f, "running"),
            Phase::Reporting => write!(f, "reporting"),
            Phase::Done => write!(f, "done"),
        }
    }
}

/// Outcomes collected during the running phase
#[derive(Debug, Default)]
struct Batch {
    /// Successful measurements in input order
    measured: Vec<(TestFileId, DurationMs)>,
    failures: Vec<TestFileId>,
    processed: usize,
}

impl Batch {
    fn record(&mut self, outcome: TestOutcome) {
        self.processed += 1;
        match outcome {
            TestOutcome::Measured { id, duration_ms } => self.measured.push((id, duration_ms)),
            TestOutcome::Failed { id, .. } => self.failures.push(id),
        }
    }

    fn ledger(&self) -> RuntimeLedger {
        self.measured.iter().cloned().collect()
    }
}

/// Measures every test file of a bucket and records the runtimes
pub struct RuntimeAggregator {
    config: RunConfig,
    runner: TestRunner,
    source: Arc<dyn BucketSource>,
    phase: Phase,
}

impl RuntimeAggregator {
    /// Create an aggregator from a validated configuration
    pub fn new(config: RunConfig) -> Self {
        let runner = TestRunner::new(&config.test_command, &config.execution_path)
            .with_timeout(config.timeout_secs)
            .verbose(config.verbose);
        let source = Arc::new(FileListSource::new(&config.execution_path));

        Self {
            config,
            runner,
            source,
            phase: Phase::Idle,
        }
    }

    fn transition(&mut self, next: Phase) {
        debug!("Aggregator {} -> {}", self.phase, next);
        self.phase = next;
    }

    /// Test files for this bucket. An explicit list of several files is used
    /// as given; a single entry is handed to the bucket source.
    pub fn test_files(&self) -> Result<Vec<String>, BucketError> {
        if self.config.test_files.len() > 1 {
            return Ok(self.config.test_files.clone());
        }
        self.source.files(
            &self.config.test_files,
            self.config.current_instance,
            self.config.bucket_total,
        )
    }

    /// Like [`run`](Self::run), but stops starting new test files once
    /// `shutdown` resolves. In-flight invocations are killed and the ledger
    /// is still written with everything measured so far.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<AggregationReport, AggregateError>
    where
        F: Future<Output = ()>,
    {
        let started_at = Utc::now();
        let timer = Timer::start("Aggregation run");

        let files = self.test_files()?;
        if self.config.verbose {
            info!(
                "{}/{} - Running tests: {}",
                self.config.current_instance,
                self.config.bucket_total,
                files.join(", ")
            );
        }

        self.transition(Phase::Running);
        let batch = self.measure(&files, shutdown).await;
        let interrupted = batch.processed < files.len();
        if interrupted {
            warn!(
                "Interrupted after {}/{} test files, recording partial results",
                batch.processed,
                files.len()
            );
        }

        self.transition(Phase::Reporting);
        let batch_ledger = batch.ledger();
        let (ledger, ledger_path) = self.record(&batch_ledger)?;

        self.transition(Phase::Done);
        let status = AggregationReport::status_for(&batch.failures, interrupted);
        let report = AggregationReport {
            ledger,
            ledger_path,
            batch: batch_ledger,
            failures: batch.failures,
            scheduled: files.len(),
            interrupted,
            status,
            started_at,
            finished_at: Utc::now(),
        };

        if !report.failures.is_empty() {
            error!("Failed tests: {}", report.failure_list());
        }
        info!(
            "Run completed in {}ms - measured {}/{} ({})",
            timer.elapsed_ms(),
            report.batch.len(),
            report.scheduled,
            report.status
        );

        Ok(report)
    }

    /// Run the files with at most `concurrency` in flight. Outcomes are
    /// collected as they complete and put back in input order at the end.
    /// Once `shutdown` resolves no new file starts; outcomes that are already
    /// complete are kept and the rest are dropped, which kills their commands.
    async fn measure<F>(&self, files: &[String], shutdown: F) -> Batch
    where
        F: Future<Output = ()>,
    {
        let total = files.len();
        let limit = self.config.concurrency.max(1);
        let runner = &self.runner;

        let mut pending = files.iter().enumerate();
        let mut in_flight = FuturesUnordered::new();
        let mut finished: Vec<(usize, TestOutcome)> = Vec::with_capacity(total);

        tokio::pin!(shutdown);
        loop {
            while in_flight.len() < limit {
                let Some((index, file)) = pending.next() else {
                    break;
                };
                in_flight.push(async move {
                    info!("{}/{}: Starting test: {}", index + 1, total, file);
                    (index, runner.run(file).await)
                });
            }

            tokio::select! {
                biased;
                next = in_flight.next() => match next {
                    Some(done) => finished.push(done),
                    None => break,
                },
                () = &mut shutdown => {
                    while let Some(Some(done)) = in_flight.next().now_or_never() {
                        finished.push(done);
                    }
                    debug!("Abandoning {} running test files", in_flight.len());
                    break;
                }
            }
        }
        drop(in_flight);

        finished.sort_by_key(|(index, _)| *index);
        let mut batch = Batch::default();
        for (_, outcome) in finished {
            batch.record(outcome);
        }
        batch
    }

    /// Load, merge and write back the ledger
    fn record(
        &self,
        batch: &RuntimeLedger,
    ) -> Result<(RuntimeLedger, std::path::PathBuf), LedgerError> {
        let root = &self.config.execution_path;
        let path = paths::resolve(root, &self.config.output_file);

        info!("Writing runtimes to file: {}", path.display());
        let previous = RuntimeLedger::load(&path);
        for (id, duration) in batch.iter() {
            match previous.get(id) {
                Some(old) => debug!("{}: {}ms -> {}ms", id, old, duration),
                None => debug!("{}: {}ms (new)", id, duration),
            }
        }
        let merged = RuntimeLedger::merge(previous, batch);

        if self.config.verbose {
            println!("{}", merged.to_json_pretty()?);
        }

        let written = merged.save(root, &self.config.output_file)?;
        Ok((merged, written))
    }
}

// Seams for other runners and bucket generators. The CLI only drives
// `run_until` with the default collaborators.
#[allow(dead_code)]
impl RuntimeAggregator {
    /// Replace the test runner
    pub fn with_runner(mut self, runner: TestRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Replace the collaborator that expands a test location into files
    pub fn with_bucket_source(mut self, source: Arc<dyn BucketSource>) -> Self {
        self.source = source;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run every test file and record the runtimes
    pub async fn run(&mut self) -> Result<AggregationReport, AggregateError> {
        self.run_until(future::pending()).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::executor::extractor::{DurationExtractor, ExtractError};
    use crate::models::RunStatus;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, body).unwrap();
    }

    fn config(dir: &TempDir, files: &[&str]) -> RunConfig {
        RunConfig::builder()
            .test_files(files.iter().map(|f| f.to_string()).collect())
            .test_command("sh")
            .execution_path(dir.path())
            .build()
            .unwrap()
    }

    fn key(dir: &TempDir, file: &str) -> TestFileId {
        TestFileId::from_path(dir.path(), Path::new(file))
    }

    #[tokio::test]
    async fn test_all_files_pass() {
        let dir = TempDir::new().unwrap();
        write(&dir, "test/a.sh", "echo '1 passing (250ms)'");
        write(&dir, "test/b.sh", "echo '2 passing (2s)'");

        let mut aggregator = RuntimeAggregator::new(config(&dir, &["test/a.sh", "test/b.sh"]));
        assert_eq!(aggregator.phase(), Phase::Idle);

        let report = aggregator.run().await.unwrap();

        assert_eq!(aggregator.phase(), Phase::Done);
        assert_eq!(report.status, RunStatus::Success);
        assert!(report.failures.is_empty());
        assert_eq!(report.ledger.get(&key(&dir, "test/a.sh")), Some(250.0));
        assert_eq!(report.ledger.get(&key(&dir, "test/b.sh")), Some(2000.0));

        let persisted = RuntimeLedger::load(&dir.path().join("test-runtimes.json"));
        assert_eq!(persisted, report.ledger);
    }

    #[tokio::test]
    async fn test_partial_failure_is_contained() {
        let dir = TempDir::new().unwrap();
        write(&dir, "one.sh", "echo '1 passing (10ms)'");
        write(&dir, "two.sh", "echo '1 failing'; exit 1");
        write(&dir, "three.sh", "echo '1 passing (1m)'");

        let report = RuntimeAggregator::new(config(&dir, &["one.sh", "two.sh", "three.sh"]))
            .run()
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::TestsFailed);
        assert_ne!(report.status.exit_code(), 0);
        assert_eq!(report.failures, vec![key(&dir, "two.sh")]);
        assert_eq!(report.failure_list(), "two.sh");

        let persisted = RuntimeLedger::load(&report.ledger_path);
        assert_eq!(persisted.len(), 2);
        assert_eq!(persisted.get(&key(&dir, "one.sh")), Some(10.0));
        assert_eq!(persisted.get(&key(&dir, "three.sh")), Some(60000.0));
        assert_eq!(persisted.get(&key(&dir, "two.sh")), None);
    }

    #[tokio::test]
    async fn test_merges_with_existing_ledger() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.sh", "echo '1 passing (40ms)'");
        write(&dir, "b.sh", "echo '1 passing (50ms)'");
        write(
            &dir,
            "test-runtimes.json",
            r#"{"a.sh": 999, "legacy.sh": 12}"#,
        );

        let report = RuntimeAggregator::new(config(&dir, &["a.sh", "b.sh"]))
            .run()
            .await
            .unwrap();

        assert_eq!(report.ledger.len(), 3);
        assert_eq!(report.ledger.get(&key(&dir, "a.sh")), Some(40.0));
        assert_eq!(report.ledger.get(&key(&dir, "b.sh")), Some(50.0));
        assert_eq!(report.ledger.get(&key(&dir, "legacy.sh")), Some(12.0));
        assert_eq!(report.batch.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_run_keeps_every_result() {
        let dir = TempDir::new().unwrap();
        let files: Vec<String> = (0..6).map(|i| format!("t{i}.sh")).collect();
        for (i, file) in files.iter().enumerate() {
            write(&dir, file, &format!("sleep 0.1; echo '1 passing ({i}ms)'"));
        }

        let names: Vec<&str> = files.iter().map(String::as_str).collect();
        let mut config = config(&dir, &names);
        config.concurrency = 3;

        let report = RuntimeAggregator::new(config).run().await.unwrap();

        assert_eq!(report.status, RunStatus::Success);
        for (i, file) in files.iter().enumerate() {
            assert_eq!(report.ledger.get(&key(&dir, file)), Some(i as f64));
        }
    }

    #[tokio::test]
    async fn test_shutdown_records_partial_batch() {
        let dir = TempDir::new().unwrap();
        write(&dir, "fast.sh", "echo '1 passing (3ms)'");
        write(&dir, "slow.sh", "sleep 10; echo '1 passing (4ms)'");

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let shutdown = async move {
            let _ = rx.await;
        };

        let mut aggregator = RuntimeAggregator::new(config(&dir, &["fast.sh", "slow.sh"]));
        let run = aggregator.run_until(shutdown);
        let trigger = async move {
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            let _ = tx.send(());
        };

        let (report, ()) = tokio::join!(run, trigger);
        let report = report.unwrap();

        assert!(report.interrupted);
        assert_eq!(report.status, RunStatus::Interrupted);
        assert_eq!(report.ledger.get(&key(&dir, "fast.sh")), Some(3.0));
        assert_eq!(report.ledger.get(&key(&dir, "slow.sh")), None);
        assert!(report.ledger_path.exists());
    }

    #[tokio::test]
    async fn test_shutdown_keeps_results_finished_out_of_order() {
        let dir = TempDir::new().unwrap();
        write(&dir, "slow.sh", "sleep 10; echo '1 passing (4ms)'");
        write(&dir, "fast.sh", "echo '1 passing (3ms)'");

        let mut config = config(&dir, &["slow.sh", "fast.sh"]);
        config.concurrency = 2;

        let shutdown = tokio::time::sleep(std::time::Duration::from_millis(500));
        let report = RuntimeAggregator::new(config)
            .run_until(shutdown)
            .await
            .unwrap();

        assert!(report.interrupted);
        assert_eq!(report.status, RunStatus::Interrupted);
        assert_eq!(report.ledger.get(&key(&dir, "fast.sh")), Some(3.0));
        assert_eq!(report.ledger.get(&key(&dir, "slow.sh")), None);

        let persisted = RuntimeLedger::load(&report.ledger_path);
        assert_eq!(persisted.get(&key(&dir, "fast.sh")), Some(3.0));
    }

    #[tokio::test]
    async fn test_concurrent_failures_keep_input_order() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.sh", "sleep 0.3; exit 1");
        write(&dir, "b.sh", "exit 1");
        write(&dir, "c.sh", "echo '1 passing (6ms)'");

        let mut config = config(&dir, &["a.sh", "b.sh", "c.sh"]);
        config.concurrency = 3;

        let report = RuntimeAggregator::new(config).run().await.unwrap();

        assert_eq!(report.failures, vec![key(&dir, "a.sh"), key(&dir, "b.sh")]);
        assert_eq!(report.failure_list(), "a.sh,b.sh");
        assert_eq!(report.batch.len(), 1);
    }

    #[tokio::test]
    async fn test_with_runner_uses_its_extractor() {
        struct Fixed;
        impl DurationExtractor for Fixed {
            fn extract(&self, _output: &str) -> Result<DurationMs, ExtractError> {
                Ok(42.0)
            }
        }

        let dir = TempDir::new().unwrap();
        write(&dir, "a.sh", "echo 'no summary line'");
        write(&dir, "b.sh", "echo 'still none'");

        let runner = TestRunner::new("sh", dir.path()).with_extractor(Arc::new(Fixed));
        let report = RuntimeAggregator::new(config(&dir, &["a.sh", "b.sh"]))
            .with_runner(runner)
            .run()
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Success);
        assert_eq!(report.ledger.get(&key(&dir, "a.sh")), Some(42.0));
        assert_eq!(report.ledger.get(&key(&dir, "b.sh")), Some(42.0));
    }

    #[tokio::test]
    async fn test_unwritable_ledger_is_fatal() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.sh", "echo '1 passing (1ms)'");
        // A regular file where the ledger directory should be
        write(&dir, "blocked", "");

        let mut config = config(&dir, &["a.sh"]);
        config.output_file = "blocked/runtimes.json".into();

        let result = RuntimeAggregator::new(config).run().await;
        assert!(matches!(result, Err(AggregateError::Ledger(_))));
    }

    #[tokio::test]
    async fn test_single_directory_needs_bucket_source() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("test")).unwrap();

        let result = RuntimeAggregator::new(config(&dir, &["test"])).run().await;
        assert!(matches!(result, Err(AggregateError::Bucket(_))));
    }

    #[tokio::test]
    async fn test_custom_bucket_source() {
        struct Fixed;
        impl BucketSource for Fixed {
            fn files(
                &self,
                _inputs: &[String],
                _index: usize,
                _total: usize,
            ) -> Result<Vec<String>, BucketError> {
                Ok(vec!["picked.sh".to_string()])
            }
        }

        let dir = TempDir::new().unwrap();
        write(&dir, "picked.sh", "echo '1 passing (8ms)'");

        let report = RuntimeAggregator::new(config(&dir, &["test"]))
            .with_bucket_source(Arc::new(Fixed))
            .run()
            .await
            .unwrap();

        assert_eq!(report.ledger.get(&key(&dir, "picked.sh")), Some(8.0));
    }
}

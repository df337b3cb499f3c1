//! Output formatters for runs and ledgers
//!
//! Provides table, JSON, and CSV output formats.

use anyhow::{Context, Result};

use crate::models::{AggregationReport, RunStatus};
use crate::results::{CleanReport, RuntimeLedger};

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Csv,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "csv" => Some(OutputFormat::Csv),
            _ => None,
        }
    }
}

/// Formatter for run reports and ledgers
pub struct ReportFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ReportFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    /// Format the result of a measurement run
    pub fn format_report(&self, report: &AggregationReport) -> String {
        match self.format {
            OutputFormat::Json | OutputFormat::Csv => {
                serde_json::to_string(report).unwrap_or_default()
            }
            OutputFormat::JsonPretty => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Table => self.format_report_table(report),
        }
    }

    fn status_str(&self, status: RunStatus) -> String {
        if !self.colorize {
            return status.to_string();
        }
        match status {
            RunStatus::Success => format!("\x1b[32m{status}\x1b[0m"),
            RunStatus::TestsFailed => format!("\x1b[31m{status}\x1b[0m"),
            RunStatus::Interrupted => format!("\x1b[33m{status}\x1b[0m"),
        }
    }

    fn format_report_table(&self, report: &AggregationReport) -> String {
        let mut output = String::new();

        output.push_str("\n╔══════════════════════════════════════════════════════════════╗\n");
        output.push_str(&format!("║  Runtime measurement: {:38} ║\n", report.status.to_string()));
        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");

        for (id, duration_ms) in report.batch.slowest_first() {
            output.push_str(&format!("║  ✓ {:45} {:>10}ms ║\n", id.as_str(), duration_ms));
        }
        for id in &report.failures {
            output.push_str(&format!("║  ✗ {:45} {:>12} ║\n", id.as_str(), "failed"));
        }

        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");
        output.push_str(&format!(
            "║  Measured: {} | Failed: {} | Scheduled: {} | Status: {}\n",
            report.batch.len(),
            report.failures.len(),
            report.scheduled,
            self.status_str(report.status)
        ));
        output.push_str(&format!(
            "║  Ledger: {} ({} entries) in {}ms\n",
            report.ledger_path.display(),
            report.ledger.len(),
            report.duration_ms()
        ));
        output.push_str("╚══════════════════════════════════════════════════════════════╝\n");

        output
    }

    /// Format the result of a clean run
    pub fn format_clean(&self, report: &CleanReport) -> String {
        match self.format {
            OutputFormat::Json | OutputFormat::Csv => {
                serde_json::to_string(report).unwrap_or_default()
            }
            OutputFormat::JsonPretty => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Table => format!(
                "Cleaned {} ledger(s): removed {} stale entries, {} remain in {}",
                report.inputs,
                report.removed,
                report.ledger.len(),
                report.ledger_path.display()
            ),
        }
    }

    /// Format a ledger, slowest file first
    pub fn format_ledger(&self, ledger: &RuntimeLedger) -> Result<String> {
        match self.format {
            OutputFormat::Table => Ok(self.format_ledger_table(ledger)),
            OutputFormat::Json => serde_json::to_string(ledger).context("Failed to format ledger"),
            OutputFormat::JsonPretty => {
                serde_json::to_string_pretty(ledger).context("Failed to format ledger")
            }
            OutputFormat::Csv => self.format_ledger_csv(ledger),
        }
    }

    fn format_ledger_table(&self, ledger: &RuntimeLedger) -> String {
        let mut output = String::new();

        output.push_str(
            "┌──────────────────────────────────────────────────────┬──────────────┐\n",
        );
        output.push_str(
            "│ Test file                                            │ Runtime      │\n",
        );
        output.push_str(
            "├──────────────────────────────────────────────────────┼──────────────┤\n",
        );

        for (id, duration_ms) in ledger.slowest_first() {
            output.push_str(&format!(
                "│ {:52} │ {:>10}ms │\n",
                id.as_str(),
                duration_ms
            ));
        }

        output.push_str(
            "├──────────────────────────────────────────────────────┼──────────────┤\n",
        );
        output.push_str(&format!(
            "│ {:52} │ {:>10}ms │\n",
            format!("Total ({} files)", ledger.len()),
            ledger.total_ms()
        ));
        output.push_str(
            "└──────────────────────────────────────────────────────┴──────────────┘\n",
        );

        output
    }

    fn format_ledger_csv(&self, ledger: &RuntimeLedger) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["test_file", "duration_ms"])?;
        for (id, duration_ms) in ledger.slowest_first() {
            writer.write_record([id.as_str().to_string(), duration_ms.to_string()])?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush CSV output: {}", e.error()))?;
        String::from_utf8(bytes).context("CSV output is not valid UTF-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TestFileId;
    use chrono::Utc;
    use std::path::{Path, PathBuf};

    fn ledger() -> RuntimeLedger {
        [("a.js", 10.0), ("b.js", 2000.0)]
            .into_iter()
            .map(|(k, v)| (TestFileId::from_path(Path::new("/repo"), Path::new(k)), v))
            .collect()
    }

    fn report() -> AggregationReport {
        AggregationReport {
            ledger: ledger(),
            ledger_path: PathBuf::from("/repo/test-runtimes.json"),
            batch: ledger(),
            failures: vec![TestFileId::from_path(Path::new("/repo"), Path::new("c.js"))],
            scheduled: 3,
            interrupted: false,
            status: RunStatus::TestsFailed,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::from_str("table"), Some(OutputFormat::Table));
        assert_eq!(OutputFormat::from_str("CSV"), Some(OutputFormat::Csv));
        assert_eq!(OutputFormat::from_str("xml"), None);
    }

    #[test]
    fn test_ledger_csv_slowest_first() {
        let csv = ReportFormatter::new(OutputFormat::Csv)
            .format_ledger(&ledger())
            .unwrap();
        assert_eq!(csv, "test_file,duration_ms\nb.js,2000\na.js,10\n");
    }

    #[test]
    fn test_ledger_table_has_total() {
        let table = ReportFormatter::new(OutputFormat::Table)
            .no_color()
            .format_ledger(&ledger())
            .unwrap();
        assert!(table.contains("b.js"));
        assert!(table.contains("Total (2 files)"));
        assert!(table.contains("2010ms"));
    }

    #[test]
    fn test_report_json() {
        let json = ReportFormatter::new(OutputFormat::Json).format_report(&report());
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "tests_failed");
        assert_eq!(value["failures"][0], "c.js");
        assert_eq!(value["ledger"]["b.js"], 2000.0);
    }

    #[test]
    fn test_report_table() {
        let table = ReportFormatter::new(OutputFormat::Table)
            .no_color()
            .format_report(&report());
        assert!(table.contains("TESTS FAILED"));
        assert!(table.contains("✗ c.js"));
        assert!(table.contains("Measured: 2 | Failed: 1 | Scheduled: 3"));
    }
}

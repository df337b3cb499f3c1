//! Duration extraction
//!
//! Pulls the elapsed time out of a passing test run's output.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

use crate::models::DurationMs;

/// Duration extraction errors
#[derive(Error, Debug, PartialEq)]
pub enum ExtractError {
    #[error("No duration line found in test output")]
    NoDurationLine,

    #[error("Duration '{0}' is not a finite number")]
    InvalidNumber(String),
}

/// Extracts a duration in milliseconds from captured test output
pub trait DurationExtractor: Send + Sync {
    fn extract(&self, output: &str) -> Result<DurationMs, ExtractError>;
}

/// Reads mocha's summary line, e.g. `  12 passing (2s)`.
///
/// The first line of the form `<anything> passing (<number><unit>)` wins,
/// wherever it appears in the output.
#[derive(Clone, Copy, Debug, Default)]
pub struct MochaSummaryExtractor;

fn summary_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^.* passing \((\d+(?:\.\d+)?)(ms|m|s)\)").expect("valid duration regex")
    })
}

impl DurationExtractor for MochaSummaryExtractor {
    fn extract(&self, output: &str) -> Result<DurationMs, ExtractError> {
        let captures = summary_regex()
            .captures(output)
            .ok_or(ExtractError::NoDurationLine)?;

        let number = &captures[1];
        let value: f64 = number
            .parse()
            .map_err(|_| ExtractError::InvalidNumber(number.to_string()))?;

        let duration = value * unit_multiplier(&captures[2]);
        if !duration.is_finite() {
            return Err(ExtractError::InvalidNumber(number.to_string()));
        }
        Ok(duration)
    }
}

/// Milliseconds per unit. The summary pattern only admits `ms`, `s` and `m`.
fn unit_multiplier(unit: &str) -> f64 {
    match unit {
        "ms" => 1.0,
        "s" => 1000.0,
        _ => 60.0 * 1000.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(output: &str) -> Result<DurationMs, ExtractError> {
        MochaSummaryExtractor.extract(output)
    }

    #[test]
    fn test_units_normalize_to_ms() {
        assert_eq!(extract("1 passing (250ms)"), Ok(250.0));
        assert_eq!(extract("1 passing (2s)"), Ok(2000.0));
        assert_eq!(extract("1 passing (1m)"), Ok(60000.0));
    }

    #[test]
    fn test_fractional_values() {
        assert_eq!(extract("3 passing (1.5s)"), Ok(1500.0));
        assert_eq!(extract("3 passing (0.5m)"), Ok(30000.0));
    }

    #[test]
    fn test_multiplier_for_all_units() {
        for (unit, factor) in [("ms", 1.0), ("s", 1000.0), ("m", 60000.0)] {
            for number in [0.0, 1.0, 7.0, 42.0, 999.0] {
                let output = format!("5 passing ({number}{unit})");
                assert_eq!(extract(&output), Ok(number * factor), "{output}");
            }
        }
    }

    #[test]
    fn test_zero_is_valid() {
        assert_eq!(extract("1 passing (0ms)"), Ok(0.0));
    }

    #[test]
    fn test_line_anywhere_in_output() {
        let output = "\n  Suite\n    ✓ does a thing\n    ✓ does another\n\n\n  2 passing (38ms)\n  1 pending\n";
        assert_eq!(extract(output), Ok(38.0));
    }

    #[test]
    fn test_first_match_wins() {
        let output = "  1 passing (10ms)\n  4 passing (3s)\n";
        assert_eq!(extract(output), Ok(10.0));
    }

    #[test]
    fn test_missing_line_is_error() {
        assert_eq!(extract(""), Err(ExtractError::NoDurationLine));
        assert_eq!(
            extract("  0 passing\n  1 failing (12ms)"),
            Err(ExtractError::NoDurationLine)
        );
        assert_eq!(extract("1 passing (12h)"), Err(ExtractError::NoDurationLine));
    }
}

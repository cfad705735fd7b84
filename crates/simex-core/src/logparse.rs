//! Regular-expression extraction of scalar values from backengine logs.

use crate::domain::{SimexError, SimexResult};
use regex::Regex;

/// Trailing part shared by all `label = value` lines the backengines print.
pub const SCIENTIFIC_AFTER_EQUAL: &str = r"\s\d+\.\d+e[\+,\-]\d+";

/// Finds the first line matching `pattern` and parses the float behind the
/// `= ` separator.
pub fn extract_scalar(pattern: &str, text: &str) -> SimexResult<f64> {
    let regex = compile(pattern)?;
    let matched = regex.find(text).ok_or_else(|| {
        SimexError::computation(
            "RUN.LOG_PARSE",
            format!("pattern '{}' was not found in the backengine log", pattern),
        )
    })?;
    parse_value_after_equal(matched.as_str())
}

fn compile(pattern: &str) -> SimexResult<Regex> {
    Regex::new(pattern).map_err(|source| {
        SimexError::internal(
            "SYS.LOG_PATTERN",
            format!("invalid log pattern '{}': {}", pattern, source),
        )
    })
}

fn parse_value_after_equal(matched: &str) -> SimexResult<f64> {
    let token = matched
        .rsplit('=')
        .next()
        .map(str::trim)
        .unwrap_or_default();
    token.parse::<f64>().map_err(|_| {
        SimexError::computation(
            "RUN.LOG_PARSE",
            format!("could not parse a number from log line '{}'", matched.trim()),
        )
    })
}

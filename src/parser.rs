//! Throughput extraction from load generator reports.

use crate::error::{BenchmarkError, Result};
use regex::Regex;
use std::sync::OnceLock;

fn requests_per_second_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Requests/sec:\s*(?P<value>\d+(?:\.\d+)?)(?P<unit>[A-Za-z])?")
            .expect("requests/sec pattern is valid")
    })
}

fn total_requests_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*(?P<count>\d+) requests in ").expect("request count pattern is valid")
    })
}

fn non_success_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Non-2xx or 3xx responses:\s*(?P<count>\d+)")
            .expect("non-2xx pattern is valid")
    })
}

/// SI unit suffix on a throughput figure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiUnit {
    One,
    Kilo,
    Mega,
    Giga,
}

impl SiUnit {
    /// Closed lookup: an unknown suffix is `None`, absent is `One`.
    pub fn from_suffix(suffix: Option<&str>) -> Option<Self> {
        match suffix {
            None | Some("") => Some(SiUnit::One),
            Some("k") => Some(SiUnit::Kilo),
            Some("M") => Some(SiUnit::Mega),
            Some("G") => Some(SiUnit::Giga),
            Some(_) => None,
        }
    }

    pub fn scale(&self) -> f64 {
        match self {
            SiUnit::One => 1.0,
            SiUnit::Kilo => 1_000.0,
            SiUnit::Mega => 1_000_000.0,
            SiUnit::Giga => 1_000_000_000.0,
        }
    }
}

/// Resolve a mantissa and optional unit suffix to a plain float
pub fn normalize(mantissa: f64, unit: Option<&str>) -> Option<f64> {
    SiUnit::from_suffix(unit).map(|unit| mantissa * unit.scale())
}

/// Extract the normalized requests/second figure from a raw report
///
/// The first `Requests/sec:` line wins.
pub fn parse_requests_per_second(raw: &str) -> Result<f64> {
    let captures = requests_per_second_re()
        .captures(raw)
        .ok_or_else(|| BenchmarkError::malformed_report("no `Requests/sec:` line in report"))?;

    let value = &captures["value"];
    let mantissa: f64 = value
        .parse()
        .map_err(|_| BenchmarkError::malformed_report(format!("invalid number `{}`", value)))?;
    let unit = captures.name("unit").map(|m| m.as_str());

    normalize(mantissa, unit).ok_or_else(|| {
        BenchmarkError::malformed_report(format!("unknown unit suffix {:?}", unit))
    })
}

/// Summary of a load report beyond the headline throughput
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSummary {
    pub requests_per_second: f64,
    pub total_requests: Option<u64>,
    /// Responses the generator counted even though they were not 2xx/3xx.
    pub non_success_responses: u64,
}

impl LoadSummary {
    pub fn parse(raw: &str) -> Result<Self> {
        let requests_per_second = parse_requests_per_second(raw)?;
        let total_requests = total_requests_re()
            .captures(raw)
            .and_then(|c| c["count"].parse().ok());
        let non_success_responses = non_success_re()
            .captures(raw)
            .and_then(|c| c["count"].parse().ok())
            .unwrap_or(0);

        Ok(Self {
            requests_per_second,
            total_requests,
            non_success_responses,
        })
    }
}

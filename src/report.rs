//! Result aggregation and comparison rendering.

use crate::error::{BenchmarkError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

const BAR_WIDTH: usize = 50;

/// One normalized throughput measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub candidate: String,
    pub workload: String,
    pub requests_per_second: f64,
}

impl BenchmarkResult {
    pub fn new(
        candidate: impl Into<String>,
        workload: impl Into<String>,
        requests_per_second: f64,
    ) -> Self {
        Self {
            candidate: candidate.into(),
            workload: workload.into(),
            requests_per_second,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub candidate: String,
    pub requests_per_second: f64,
}

/// All candidates measured under one workload, slowest first once finalized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadRanking {
    pub label: String,
    pub entries: Vec<RankedEntry>,
}

impl WorkloadRanking {
    pub fn candidates(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.candidate.as_str()).collect()
    }

    pub fn fastest(&self) -> Option<&RankedEntry> {
        self.entries.last()
    }
}

/// Stage of the pipeline a candidate failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Spawn,
    Probe,
    Load,
    Parse,
    Shutdown,
    /// Harness-side I/O or configuration trouble outside any pipeline step.
    Other,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureStage::Spawn => "spawn",
            FailureStage::Probe => "probe",
            FailureStage::Load => "load",
            FailureStage::Parse => "parse",
            FailureStage::Shutdown => "shutdown",
            FailureStage::Other => "other",
        };
        write!(f, "{}", s)
    }
}

/// A per-candidate (or per-workload) failure surfaced in the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFailure {
    pub candidate: String,
    pub workload: Option<String>,
    pub stage: FailureStage,
    pub reason: String,
}

impl CandidateFailure {
    pub fn from_error(
        candidate: impl Into<String>,
        workload: Option<&str>,
        error: &BenchmarkError,
    ) -> Self {
        let stage = match error {
            BenchmarkError::Spawn { .. } | BenchmarkError::PortBusy(_) => FailureStage::Spawn,
            BenchmarkError::Probe(_) => FailureStage::Probe,
            BenchmarkError::MalformedReport(_) => FailureStage::Parse,
            BenchmarkError::Shutdown(_) => FailureStage::Shutdown,
            BenchmarkError::LoadInvocation(_) => FailureStage::Load,
            _ if workload.is_some() => FailureStage::Load,
            _ => FailureStage::Other,
        };
        Self {
            candidate: candidate.into(),
            workload: workload.map(str::to_string),
            stage,
            reason: error.to_string(),
        }
    }
}

impl fmt::Display for CandidateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.workload, self.stage) {
            (_, FailureStage::Shutdown) => {
                write!(f, "candidate {} did not shut down cleanly: {}", self.candidate, self.reason)
            }
            (Some(workload), _) => write!(
                f,
                "candidate {} workload {} failed: {}",
                self.candidate, workload, self.reason
            ),
            (None, _) => write!(f, "candidate {} skipped: {}", self.candidate, self.reason),
        }
    }
}

/// Collects results while candidates are processed
#[derive(Debug)]
pub struct Aggregator {
    workloads: Vec<WorkloadRanking>,
    failures: Vec<CandidateFailure>,
    started_at: DateTime<Utc>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator {
    pub fn new() -> Self {
        Self {
            workloads: Vec::new(),
            failures: Vec::new(),
            started_at: Utc::now(),
        }
    }

    pub fn record(&mut self, result: BenchmarkResult) {
        let entry = RankedEntry {
            candidate: result.candidate,
            requests_per_second: result.requests_per_second,
        };
        match self.workloads.iter_mut().find(|w| w.label == result.workload) {
            Some(ranking) => ranking.entries.push(entry),
            None => self.workloads.push(WorkloadRanking {
                label: result.workload,
                entries: vec![entry],
            }),
        }
    }

    pub fn record_failure(&mut self, failure: CandidateFailure) {
        self.failures.push(failure);
    }

    pub fn result_count(&self) -> usize {
        self.workloads.iter().map(|w| w.entries.len()).sum()
    }

    /// Sort every workload ascending by throughput and seal the report
    pub fn finalize(self) -> Report {
        let mut workloads = self.workloads;
        for ranking in &mut workloads {
            ranking
                .entries
                .sort_by(|a, b| a.requests_per_second.total_cmp(&b.requests_per_second));
        }
        Report {
            workloads,
            failures: self.failures,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

/// Final comparison across candidates, per workload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub workloads: Vec<WorkloadRanking>,
    pub failures: Vec<CandidateFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl Report {
    pub fn workload(&self, label: &str) -> Option<&WorkloadRanking> {
        self.workloads.iter().find(|w| w.label == label)
    }

    /// Whether `candidate` has an entry under any workload
    pub fn contains_candidate(&self, candidate: &str) -> bool {
        self.workloads
            .iter()
            .any(|w| w.entries.iter().any(|e| e.candidate == candidate))
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

/// Horizontal bar chart per workload, slowest candidate first
pub fn render(report: &Report) -> String {
    let mut out = String::new();

    for ranking in &report.workloads {
        let title = format!("{} requests/second", ranking.label);
        out.push_str(&title);
        out.push('\n');
        out.push_str(&"#".repeat(title.len().max(BAR_WIDTH + 20)));
        out.push('\n');

        let name_width = ranking
            .entries
            .iter()
            .map(|e| e.candidate.len())
            .max()
            .unwrap_or(0);
        let max = ranking
            .entries
            .iter()
            .map(|e| e.requests_per_second)
            .fold(0.0_f64, f64::max);

        for entry in &ranking.entries {
            out.push_str(&format!(
                "{:<name_width$}  {:<bar_width$}  {:>12.2}\n",
                entry.candidate,
                bar(entry.requests_per_second, max),
                entry.requests_per_second,
                name_width = name_width,
                bar_width = BAR_WIDTH,
            ));
        }

        if let (Some(fastest), Some(slowest)) = (ranking.fastest(), ranking.entries.first()) {
            if ranking.entries.len() > 1 && slowest.requests_per_second > 0.0 {
                out.push_str(&format!(
                    "fastest: {} ({:.2}x {})\n",
                    fastest.candidate,
                    fastest.requests_per_second / slowest.requests_per_second,
                    slowest.candidate
                ));
            }
        }
        out.push('\n');
    }

    if !report.failures.is_empty() {
        out.push_str("skipped:\n");
        for failure in &report.failures {
            out.push_str(&format!("  {}\n", failure));
        }
    }

    out
}

fn bar(value: f64, max: f64) -> String {
    if max <= 0.0 || value <= 0.0 {
        return String::new();
    }
    let len = ((value / max) * BAR_WIDTH as f64).round() as usize;
    "█".repeat(len.clamp(1, BAR_WIDTH))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Report {
        let mut aggregator = Aggregator::new();
        aggregator.record(BenchmarkResult::new("A", "get", 100.0));
        aggregator.record(BenchmarkResult::new("B", "get", 50.0));
        aggregator.record(BenchmarkResult::new("C", "get", 75.0));
        aggregator.record(BenchmarkResult::new("A", "post", 10.0));
        aggregator.finalize()
    }

    #[test]
    fn test_finalize_sorts_ascending() {
        let report = sample();
        let get = report.workload("get").unwrap();
        assert_eq!(get.candidates(), vec!["B", "C", "A"]);
        assert_eq!(get.fastest().unwrap().candidate, "A");
        assert_eq!(report.workload("post").unwrap().candidates(), vec!["A"]);
        assert!(report.workload("put").is_none());
    }

    #[test]
    fn test_workloads_keep_first_recorded_order() {
        let mut aggregator = Aggregator::new();
        aggregator.record(BenchmarkResult::new("A", "post", 1.0));
        aggregator.record(BenchmarkResult::new("A", "get", 1.0));
        aggregator.record(BenchmarkResult::new("B", "post", 2.0));
        assert_eq!(aggregator.result_count(), 3);

        let report = aggregator.finalize();
        let labels: Vec<_> = report.workloads.iter().map(|w| w.label.as_str()).collect();
        assert_eq!(labels, vec!["post", "get"]);
    }

    #[test]
    fn test_render_orders_low_to_high() {
        let rendered = render(&sample());
        let b = rendered.find("\nB ").unwrap();
        let c = rendered.find("\nC ").unwrap();
        let a = rendered.find("\nA ").unwrap();
        assert!(b < c && c < a);
        assert!(rendered.starts_with("get requests/second\n"));
        assert!(rendered.contains("post requests/second"));
        assert!(rendered.contains("fastest: A (2.00x B)"));
        assert!(rendered.contains("100.00"));
    }

    #[test]
    fn test_bar_lengths() {
        assert_eq!(bar(100.0, 100.0).chars().count(), BAR_WIDTH);
        assert_eq!(bar(50.0, 100.0).chars().count(), BAR_WIDTH / 2);
        assert_eq!(bar(0.001, 100.0).chars().count(), 1);
        assert_eq!(bar(0.0, 100.0), "");
    }

    #[test]
    fn test_failures_are_listed() {
        let mut aggregator = Aggregator::new();
        aggregator.record(BenchmarkResult::new("Fast", "get", 2000.0));
        aggregator.record_failure(CandidateFailure::from_error(
            "Broken",
            None,
            &BenchmarkError::probe("POST /: expected status 200 OK, got 500 Internal Server Error"),
        ));
        aggregator.record_failure(CandidateFailure::from_error(
            "Slow",
            Some("post"),
            &BenchmarkError::malformed_report("no `Requests/sec:` line in report"),
        ));
        let report = aggregator.finalize();

        assert_eq!(report.failures[0].stage, FailureStage::Probe);
        assert_eq!(report.failures[1].stage, FailureStage::Parse);
        let rendered = render(&report);
        assert!(rendered.contains("candidate Broken skipped: probe failed: POST /"));
        assert!(rendered.contains("candidate Slow workload post failed: malformed load report"));
        assert!(!report.contains_candidate("Broken"));
        assert!(report.contains_candidate("Fast"));
    }

    #[test]
    fn test_failure_stage_mapping() {
        let load = CandidateFailure::from_error(
            "X",
            Some("get"),
            &BenchmarkError::load_invocation("wrk exited with exit status: 1"),
        );
        assert_eq!(load.stage, FailureStage::Load);

        let busy = CandidateFailure::from_error("X", None, &BenchmarkError::PortBusy("Y".into()));
        assert_eq!(busy.stage, FailureStage::Spawn);

        let shutdown =
            CandidateFailure::from_error("X", None, &BenchmarkError::shutdown("kill failed"));
        assert!(shutdown.to_string().contains("did not shut down cleanly"));

        let log_file = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let io = CandidateFailure::from_error("X", None, &BenchmarkError::Io(log_file));
        assert_eq!(io.stage, FailureStage::Other);
        assert_eq!(io.stage.to_string(), "other");

        let spawn = CandidateFailure::from_error(
            "X",
            None,
            &BenchmarkError::spawn("uvicorn", std::io::Error::from(std::io::ErrorKind::NotFound)),
        );
        assert_eq!(spawn.stage, FailureStage::Spawn);
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results").join("report.json");
        let report = sample();
        report.write_json(&path).unwrap();

        let restored: Report =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(restored, report);
    }
}

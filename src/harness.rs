//! The sequential benchmark run loop.
//!
//! Candidates are processed one at a time, in registry order, and workloads
//! one at a time, in declared order. For each candidate the order is always
//! start, probe, run workloads, stop; the stop happens on every path out of
//! the candidate's window, and completes before the next candidate starts.

use crate::config::FailurePolicy;
use crate::error::{BenchmarkError, Result};
use crate::load::{LoadGenerator, WorkloadSpec};
use crate::parser::LoadSummary;
use crate::probe::ReadinessProbe;
use crate::registry::{CandidateRegistry, CandidateSpec};
use crate::report::{Aggregator, BenchmarkResult, CandidateFailure, Report};
use crate::supervisor::{CandidateProcess, ProcessLauncher, Supervisor};
use chrono::Utc;
use tracing::{error, info, warn};

/// Drives every candidate through start, probe, load and stop
pub struct BenchmarkHarness<L, P, G> {
    supervisor: Supervisor<L>,
    probe: P,
    load: G,
    base_url: String,
    workloads: Vec<WorkloadSpec>,
    policy: FailurePolicy,
}

impl<L, P, G> BenchmarkHarness<L, P, G>
where
    L: ProcessLauncher,
    P: ReadinessProbe,
    G: LoadGenerator,
{
    pub fn new(
        supervisor: Supervisor<L>,
        probe: P,
        load: G,
        workloads: Vec<WorkloadSpec>,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            base_url: supervisor.base_url(),
            supervisor,
            probe,
            load,
            workloads,
            policy,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn supervisor(&self) -> &Supervisor<L> {
        &self.supervisor
    }

    /// Benchmark every candidate and return the finalized report
    pub async fn run(&self, registry: &CandidateRegistry) -> Report {
        let mut aggregator = Aggregator::new();
        for candidate in registry.list() {
            self.run_candidate(candidate, &mut aggregator).await;
        }

        let report = aggregator.finalize();
        info!(
            workloads = report.workloads.len(),
            failures = report.failures.len(),
            "benchmark run complete"
        );
        report
    }

    /// One candidate's full window; failures are recorded, never propagated
    pub async fn run_candidate(&self, candidate: &CandidateSpec, aggregator: &mut Aggregator) {
        info!(
            candidate = %candidate.name,
            at = %Utc::now().to_rfc3339(),
            "testing candidate"
        );

        let mut process = match self.supervisor.start(candidate) {
            Ok(process) => process,
            Err(err) => {
                error!(candidate = %candidate.name, %err, "candidate failed to start");
                aggregator.record_failure(CandidateFailure::from_error(&candidate.name, None, &err));
                return;
            }
        };

        // No early return between start and stop.
        let outcome = self.exercise(candidate, &mut process, aggregator).await;
        if let Err(err) = outcome {
            warn!(candidate = %candidate.name, %err, "candidate skipped");
            aggregator.record_failure(CandidateFailure::from_error(&candidate.name, None, &err));
        }

        if let Err(err) = self.supervisor.stop(process).await {
            error!(candidate = %candidate.name, %err, "candidate did not stop cleanly");
            let err = if matches!(err, BenchmarkError::Shutdown(_)) {
                err
            } else {
                BenchmarkError::shutdown(err.to_string())
            };
            aggregator.record_failure(CandidateFailure::from_error(&candidate.name, None, &err));
        }
    }

    async fn exercise(
        &self,
        candidate: &CandidateSpec,
        process: &mut CandidateProcess,
        aggregator: &mut Aggregator,
    ) -> Result<()> {
        let verdict = self.probe.probe(candidate, &self.base_url).await;
        if let Some(status) = process.exited()? {
            return Err(BenchmarkError::probe(format!(
                "candidate exited before benchmarking ({})",
                status
            )));
        }
        let verdict = verdict.into_result()?;
        info!(candidate = %candidate.name, checks = verdict.checks.len(), "probe passed");

        for workload in &self.workloads {
            match self.run_workload(workload).await {
                Ok(requests_per_second) => {
                    info!(
                        candidate = %candidate.name,
                        workload = %workload.label,
                        requests_per_second,
                        "workload complete"
                    );
                    aggregator.record(BenchmarkResult::new(
                        &candidate.name,
                        &workload.label,
                        requests_per_second,
                    ));
                }
                Err(err) => {
                    warn!(
                        candidate = %candidate.name,
                        workload = %workload.label,
                        %err,
                        "workload failed"
                    );
                    aggregator.record_failure(CandidateFailure::from_error(
                        &candidate.name,
                        Some(&workload.label),
                        &err,
                    ));
                    if self.policy == FailurePolicy::SkipCandidate {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    async fn run_workload(&self, workload: &WorkloadSpec) -> Result<f64> {
        let raw = self.load.run(workload, &self.base_url).await?;
        let summary = LoadSummary::parse(&raw)?;
        if summary.non_success_responses > 0 {
            warn!(
                workload = %workload.label,
                non_success = summary.non_success_responses,
                total = ?summary.total_requests,
                "load generator counted non-2xx/3xx responses"
            );
        }
        Ok(summary.requests_per_second)
    }
}

//! # Web Server Benchmark
//!
//! A comparative throughput harness for HTTP server implementations.
//!
//! Each candidate server is started on the same loopback host and port,
//! checked for correctness with two canonical requests, driven with an
//! external load generator (`wrk`) for every workload, and stopped again
//! before the next candidate is started. Results are ranked per workload and
//! rendered as a horizontal bar chart.
//!
//! ## Pipeline
//!
//! - **Registry**: the candidates and how to launch them
//! - **Supervisor**: one live candidate process at a time
//! - **Probe**: `GET /<n>` and form `POST /` must succeed before timing
//! - **Load**: one `wrk` invocation per (candidate, workload) pair
//! - **Parser**: `Requests/sec:` with SI unit suffixes, normalized
//! - **Report**: ascending ranking per workload plus skipped candidates
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use web_server_benchmark::{
//!     render, BenchmarkHarness, CandidateRegistry, HarnessConfig, HttpProbe, Supervisor,
//!     WrkDriver,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HarnessConfig::default();
//!     let harness = BenchmarkHarness::new(
//!         Supervisor::system(&config.server),
//!         HttpProbe::new(config.server.grace_period(), &config.probe)?,
//!         WrkDriver::new(config.load.clone()),
//!         config.workloads(),
//!         config.failure_policy,
//!     );
//!
//!     let report = harness.run(&CandidateRegistry::asgi_servers()).await;
//!     println!("{}", render(&report));
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod harness;
pub mod load;
pub mod parser;
pub mod probe;
pub mod registry;
pub mod report;
pub mod supervisor;

pub use config::{
    ConfigError, FailurePolicy, HarnessConfig, LoadSettings, ProbeConfig, ServerConfig,
};
pub use error::{BenchmarkError, Result};
pub use harness::BenchmarkHarness;
pub use load::{LoadGenerator, WorkloadSpec, WrkDriver};
pub use parser::{normalize, parse_requests_per_second, LoadSummary, SiUnit};
pub use probe::{CheckOutcome, HttpProbe, ProbeCheck, ProbeResult, ReadinessProbe};
pub use registry::{
    AsgiServerKind, BodyCheck, CandidateRegistry, CandidateSpec, LaunchCommand, LaunchStrategy,
    ProbeExpectations,
};
pub use report::{
    render, Aggregator, BenchmarkResult, CandidateFailure, FailureStage, RankedEntry, Report,
    WorkloadRanking,
};
pub use supervisor::{
    CandidateProcess, ProcessHandle, ProcessLauncher, Supervisor, SystemLauncher,
};

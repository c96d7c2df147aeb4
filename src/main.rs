//! web-server-benchmark
//!
//! Starts each candidate HTTP server in turn, verifies it, drives it with
//! `wrk` and prints a per-workload throughput comparison.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use web_server_benchmark::{
    render, BenchmarkHarness, CandidateRegistry, FailurePolicy, HarnessConfig, HttpProbe, Result,
    Supervisor, WrkDriver,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Suite {
    /// Daphne, Hypercorn and Uvicorn serving the same ASGI app
    Asgi,
    /// Python web frameworks behind gunicorn and friends
    Frameworks,
}

#[derive(Parser, Debug)]
#[command(name = "web-server-benchmark")]
#[command(about = "Comparative throughput benchmark for HTTP servers")]
#[command(version)]
struct Args {
    /// YAML configuration file; built-in defaults are used when omitted.
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Built-in candidate suite, used when the config lists no candidates.
    #[arg(long, value_enum, default_value = "frameworks")]
    suite: Suite,

    /// Only benchmark the named candidate(s).
    #[arg(long = "only", value_name = "NAME", action = clap::ArgAction::Append)]
    only: Vec<String>,

    /// Host every candidate binds to.
    #[arg(long)]
    host: Option<String>,

    /// Port every candidate binds to.
    #[arg(long)]
    port: Option<u16>,

    /// Wait between starting a candidate and probing it.
    #[arg(long, value_parser = humantime::parse_duration)]
    grace: Option<Duration>,

    /// Duration of each wrk run.
    #[arg(long, value_parser = humantime::parse_duration)]
    duration: Option<Duration>,

    /// Number of wrk connections.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    concurrency: Option<u32>,

    /// Path to the wrk binary.
    #[arg(long)]
    wrk: Option<PathBuf>,

    /// Capture candidate stdout/stderr into this directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Keep running a candidate's remaining workloads after one fails.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    continue_on_failure: bool,

    /// Persist the final report as JSON.
    #[arg(long)]
    json_output: Option<PathBuf>,

    /// Print the candidate and wrk command lines without running anything.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    dry_run: bool,
}

impl Args {
    fn apply(&self, config: &mut HarnessConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(grace) = self.grace {
            config.server.grace_period_secs = grace.as_secs();
        }
        if let Some(duration) = self.duration {
            config.load.duration_secs = duration.as_secs();
        }
        if let Some(concurrency) = self.concurrency {
            config.load.concurrency = concurrency;
        }
        if let Some(wrk) = &self.wrk {
            config.load.binary = wrk.clone();
        }
        if let Some(dir) = &self.log_dir {
            config.server.log_dir = Some(dir.clone());
        }
        if self.continue_on_failure {
            config.failure_policy = FailurePolicy::ContinueWorkloads;
        }
    }
}

async fn load_config(args: &Args) -> Result<HarnessConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let config = HarnessConfig::load_from_file(path).await?;
            info!(path = %path.display(), "configuration loaded from file");
            config
        }
        None => HarnessConfig::default(),
    };
    args.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn build_registry(args: &Args, config: &HarnessConfig) -> Result<CandidateRegistry> {
    let registry = if config.candidates.is_empty() {
        match args.suite {
            Suite::Asgi => CandidateRegistry::asgi_servers(),
            Suite::Frameworks => CandidateRegistry::frameworks(),
        }
    } else {
        CandidateRegistry::new(config.candidates.clone())?
    };

    if args.only.is_empty() {
        Ok(registry)
    } else {
        Ok(registry.filter(&args.only)?)
    }
}

fn print_plan(config: &HarnessConfig, registry: &CandidateRegistry) {
    let supervisor = Supervisor::system(&config.server);
    let driver = WrkDriver::new(config.load.clone());
    let base_url = supervisor.base_url();

    for candidate in registry.list() {
        println!("{}", candidate.name);
        println!(
            "  start: (cd {} && {})",
            candidate.working_dir.display(),
            supervisor.command_for(candidate)
        );
        for workload in &config.workloads() {
            println!(
                "  {}: {}",
                workload.label,
                driver.command_line(workload, &base_url)
            );
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = load_config(&args).await?;
    let registry = build_registry(&args, &config)?;
    info!(
        candidates = registry.len(),
        workloads = config.workloads().len(),
        base_url = %config.server.base_url(),
        "benchmark plan ready"
    );

    if args.dry_run {
        print_plan(&config, &registry);
        return Ok(());
    }

    let harness = BenchmarkHarness::new(
        Supervisor::system(&config.server),
        HttpProbe::new(config.server.grace_period(), &config.probe)?,
        WrkDriver::new(config.load.clone()),
        config.workloads(),
        config.failure_policy,
    );

    let report = tokio::select! {
        report = harness.run(&registry) => report,
        _ = tokio::signal::ctrl_c() => {
            // Dropping the run future kills whichever candidate is live.
            warn!("interrupted; stopping current candidate");
            return Ok(());
        }
    };

    println!("{}", render(&report));

    if let Some(path) = &args.json_output {
        report.write_json(path)?;
        info!(path = %path.display(), "report written");
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    let log_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(log_filter)
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "benchmark aborted");
            ExitCode::FAILURE
        }
    }
}

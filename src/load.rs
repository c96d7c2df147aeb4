//! Load generator adapter.
//!
//! The load generator is an external black box: it is invoked once per
//! (candidate, workload) pair, blocks for the configured duration and leaves
//! a human-readable report on stdout.

use crate::config::LoadSettings;
use crate::error::{BenchmarkError, Result};
use crate::registry::LaunchCommand;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// A request shape driven against every candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub label: String,
    /// URL path segment, without the leading slash.
    #[serde(default)]
    pub path: String,
    /// Request-generation script for non-trivial payloads (`wrk -s`).
    #[serde(default)]
    pub script: Option<PathBuf>,
    /// Passed to the script's `init(args)` after the URL.
    #[serde(default)]
    pub script_args: Vec<String>,
    /// Overrides the run-wide concurrency for this workload.
    #[serde(default)]
    pub concurrency: Option<u32>,
    /// Overrides the run-wide duration for this workload.
    #[serde(default)]
    pub duration_secs: Option<u64>,
}

impl WorkloadSpec {
    pub fn new(label: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            path: path.into(),
            script: None,
            script_args: Vec::new(),
            concurrency: None,
            duration_secs: None,
        }
    }

    pub fn script(mut self, script: impl Into<PathBuf>) -> Self {
        self.script = Some(script.into());
        self
    }

    pub fn script_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.script_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// `get` on `/<fib>` and a scripted form `post` of `fib=<fib>` on `/`,
    /// matching the requests the probe checks.
    pub fn defaults(fib: u32) -> Vec<Self> {
        vec![
            WorkloadSpec::new("get", fib.to_string()),
            WorkloadSpec::new("post", "")
                .script("scripts/post.lua")
                .script_args([fib.to_string()]),
        ]
    }

    pub fn url(&self, base_url: &str) -> String {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        )
    }
}

/// Anything that can drive load at a URL and hand back its raw report
#[async_trait]
pub trait LoadGenerator: Send + Sync {
    async fn run(&self, workload: &WorkloadSpec, base_url: &str) -> Result<String>;
}

/// `wrk` (or any tool with the same command-line shape)
#[derive(Debug, Clone)]
pub struct WrkDriver {
    settings: LoadSettings,
}

impl WrkDriver {
    pub fn new(settings: LoadSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &LoadSettings {
        &self.settings
    }

    fn duration_secs(&self, workload: &WorkloadSpec) -> u64 {
        workload.duration_secs.unwrap_or(self.settings.duration_secs)
    }

    /// Hard limit for one run before the tool is killed
    pub fn timeout(&self, workload: &WorkloadSpec) -> Duration {
        Duration::from_secs(self.duration_secs(workload) + self.settings.timeout_slack_secs)
    }

    /// The exact command line used for a workload
    pub fn command_line(&self, workload: &WorkloadSpec, base_url: &str) -> LaunchCommand {
        let concurrency = workload.concurrency.unwrap_or(self.settings.concurrency);
        let mut args = vec![
            "-c".to_string(),
            concurrency.to_string(),
            "-d".to_string(),
            format!("{}s", self.duration_secs(workload)),
        ];
        if let Some(threads) = self.settings.threads {
            args.push("-t".to_string());
            args.push(threads.to_string());
        }
        if let Some(script) = &workload.script {
            args.push("-s".to_string());
            args.push(script.display().to_string());
        }
        args.push(workload.url(base_url));
        if workload.script.is_some() {
            args.extend(workload.script_args.iter().cloned());
        }

        LaunchCommand::new(self.settings.binary.display().to_string(), args)
    }
}

#[async_trait]
impl LoadGenerator for WrkDriver {
    async fn run(&self, workload: &WorkloadSpec, base_url: &str) -> Result<String> {
        if let Some(script) = &workload.script {
            if !script.exists() {
                return Err(BenchmarkError::load_invocation(format!(
                    "script not found at {}",
                    script.display()
                )));
            }
        }

        let command = self.command_line(workload, base_url);
        info!(
            workload = %workload.label,
            command = %command,
            "starting load generator"
        );

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = cmd.spawn().map_err(|e| {
            BenchmarkError::load_invocation(format!("failed to run {}: {}", command.program, e))
        })?;

        // Dropping the pending future on timeout kills the tool via kill_on_drop.
        let limit = self.timeout(workload);
        let output = match timeout(limit, child.wait_with_output()).await {
            Ok(output) => output.map_err(|e| {
                BenchmarkError::load_invocation(format!(
                    "failed waiting for {}: {}",
                    command.program, e
                ))
            })?,
            Err(_) => {
                warn!(
                    workload = %workload.label,
                    timeout_secs = limit.as_secs(),
                    "load generator exceeded timeout; terminating"
                );
                return Err(BenchmarkError::load_invocation(format!(
                    "{} exceeded timeout of {}s",
                    command.program,
                    limit.as_secs()
                )));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BenchmarkError::load_invocation(format!(
                "{} exited with {}: {}",
                command.program,
                output.status,
                stderr.trim()
            )));
        }
        if stdout.trim().is_empty() {
            return Err(BenchmarkError::load_invocation(format!(
                "{} produced no output",
                command.program
            )));
        }

        debug!(workload = %workload.label, bytes = stdout.len(), "load generator finished");
        Ok(stdout)
    }
}

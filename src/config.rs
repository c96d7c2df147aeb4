//! Harness Configuration
//!
//! Every knob of a benchmark run in one serde-backed structure. All fields
//! have defaults matching the classic setup (loopback:5000, five second grace
//! period, `wrk -c 64 -d 30s`), so an empty YAML file is a valid config.

use crate::load::WorkloadSpec;
use crate::registry::CandidateSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Configuration validation error: {message}")]
    Validation { message: String },
    #[error("Unknown candidate: {name}")]
    UnknownCandidate { name: String },
}

impl ConfigError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// What to do with the remaining workloads of a candidate once one fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop benchmarking the candidate and move on.
    #[default]
    SkipCandidate,
    /// Keep running the candidate's other workloads.
    ContinueWorkloads,
}

/// Where candidates listen and how they are started and stopped
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Fixed wait between spawn and the first probe request.
    pub grace_period_secs: u64,
    /// How long a terminated candidate may take to exit before it is killed.
    pub shutdown_grace_secs: u64,
    /// Capture candidate stdout/stderr into `<log_dir>/<name>.log` instead of discarding.
    pub log_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            grace_period_secs: 5,
            shutdown_grace_secs: 10,
            log_dir: None,
        }
    }
}

impl ServerConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Canonical correctness checks issued before a candidate is timed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Parameter sent as `GET /<fib>` and as the `fib` form field.
    pub fib: u32,
    pub expected_status: u16,
    pub timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            fib: 10,
            expected_status: 200,
            timeout_secs: 10,
        }
    }
}

/// Load generator invocation settings, constant for a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadSettings {
    pub binary: PathBuf,
    pub concurrency: u32,
    pub duration_secs: u64,
    pub threads: Option<u32>,
    /// Extra time granted on top of the duration before the tool is killed.
    pub timeout_slack_secs: u64,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("wrk"),
            concurrency: 64,
            duration_secs: 30,
            threads: None,
            timeout_slack_secs: 30,
        }
    }
}

/// Complete harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub server: ServerConfig,
    pub probe: ProbeConfig,
    pub load: LoadSettings,
    /// Empty means the default `get`/`post` pair for `probe.fib`.
    pub workloads: Vec<WorkloadSpec>,
    pub failure_policy: FailurePolicy,
    /// Empty means "use a built-in suite".
    pub candidates: Vec<CandidateSpec>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            probe: ProbeConfig::default(),
            load: LoadSettings::default(),
            workloads: Vec::new(),
            failure_policy: FailurePolicy::default(),
            candidates: Vec::new(),
        }
    }
}

impl HarnessConfig {
    /// Load and validate a YAML configuration file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: HarnessConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Workloads to run, derived from the probe parameter when none are listed
    pub fn workloads(&self) -> Vec<WorkloadSpec> {
        if self.workloads.is_empty() {
            WorkloadSpec::defaults(self.probe.fib)
        } else {
            self.workloads.clone()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::validation("server.host must not be empty"));
        }
        if self.server.port == 0 {
            return Err(ConfigError::validation("server.port must be non-zero"));
        }
        if self.load.concurrency < 1 {
            return Err(ConfigError::validation("load.concurrency must be at least 1"));
        }
        if self.load.duration_secs < 1 {
            return Err(ConfigError::validation("load.duration_secs must be at least 1"));
        }
        if let Some(0) = self.load.threads {
            return Err(ConfigError::validation("load.threads must be at least 1"));
        }
        let workloads = self.workloads();
        let mut labels = HashSet::new();
        for workload in &workloads {
            if workload.label.trim().is_empty() {
                return Err(ConfigError::validation("workload label must not be empty"));
            }
            if !labels.insert(workload.label.as_str()) {
                return Err(ConfigError::validation(format!(
                    "duplicate workload label `{}`",
                    workload.label
                )));
            }
            if let Some(0) = workload.concurrency {
                return Err(ConfigError::validation(format!(
                    "workload `{}` concurrency must be at least 1",
                    workload.label
                )));
            }
            if let Some(0) = workload.duration_secs {
                return Err(ConfigError::validation(format!(
                    "workload `{}` duration_secs must be at least 1",
                    workload.label
                )));
            }
        }
        Ok(())
    }
}

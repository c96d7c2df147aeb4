//! Error types for the benchmark harness.

use crate::config::ConfigError;
use thiserror::Error;

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, BenchmarkError>;

/// Main error type for the benchmark harness
///
/// Every variant except `Config`, `Http`, `Io` and `Json` is scoped to a single
/// candidate (or candidate/workload pair) and is recovered by the run loop.
#[derive(Error, Debug)]
pub enum BenchmarkError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("probe failed: {0}")]
    Probe(String),

    #[error("load generator failed: {0}")]
    LoadInvocation(String),

    #[error("malformed load report: {0}")]
    MalformedReport(String),

    #[error("port is still held by candidate `{0}`")]
    PortBusy(String),

    #[error("shutdown error: {0}")]
    Shutdown(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl BenchmarkError {
    /// Create a spawn error for the given program
    pub fn spawn(program: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }

    /// Create a probe failure
    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe(msg.into())
    }

    /// Create a load invocation error
    pub fn load_invocation(msg: impl Into<String>) -> Self {
        Self::LoadInvocation(msg.into())
    }

    /// Create a malformed report error
    pub fn malformed_report(msg: impl Into<String>) -> Self {
        Self::MalformedReport(msg.into())
    }

    /// Create a shutdown error
    pub fn shutdown(msg: impl Into<String>) -> Self {
        Self::Shutdown(msg.into())
    }
}

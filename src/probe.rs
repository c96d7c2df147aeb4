//! Readiness and correctness probe.
//!
//! A candidate that answers every request with an error would still get a
//! throughput figure from the load generator. The probe gates benchmarking on
//! two canonical requests actually succeeding with the expected content.

use crate::config::{ConfigError, ProbeConfig};
use crate::error::{BenchmarkError, Result};
use crate::registry::{BodyCheck, CandidateSpec};
use async_trait::async_trait;
use http::StatusCode;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

/// Outcome of a single probe request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "result", content = "reason")]
pub enum CheckOutcome {
    Passed,
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeCheck {
    /// e.g. `GET /10`
    pub request: String,
    pub status: Option<u16>,
    pub outcome: CheckOutcome,
}

impl ProbeCheck {
    pub fn passed(request: impl Into<String>, status: u16) -> Self {
        Self {
            request: request.into(),
            status: Some(status),
            outcome: CheckOutcome::Passed,
        }
    }

    pub fn failed(request: impl Into<String>, status: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            status,
            outcome: CheckOutcome::Failed(reason.into()),
        }
    }

    pub fn is_passed(&self) -> bool {
        self.outcome == CheckOutcome::Passed
    }
}

impl fmt::Display for ProbeCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            CheckOutcome::Passed => write!(f, "{}: ok", self.request),
            CheckOutcome::Failed(reason) => write!(f, "{}: {}", self.request, reason),
        }
    }
}

/// Pass/fail verdict for one candidate plus the checks behind it
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub candidate: String,
    pub checks: Vec<ProbeCheck>,
}

impl ProbeResult {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            checks: Vec::new(),
        }
    }

    pub fn push(&mut self, check: ProbeCheck) {
        self.checks.push(check);
    }

    /// A probe with no checks has not passed.
    pub fn passed(&self) -> bool {
        !self.checks.is_empty() && self.checks.iter().all(ProbeCheck::is_passed)
    }

    pub fn first_failure(&self) -> Option<&ProbeCheck> {
        self.checks.iter().find(|check| !check.is_passed())
    }

    /// Turn a failed verdict into a [`BenchmarkError::Probe`]
    pub fn into_result(self) -> Result<Self> {
        if self.passed() {
            return Ok(self);
        }
        let reason = match self.first_failure() {
            Some(check) => check.to_string(),
            None => "no checks were run".to_string(),
        };
        Err(BenchmarkError::probe(reason))
    }
}

/// Decides whether a started candidate may be benchmarked
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn probe(&self, candidate: &CandidateSpec, base_url: &str) -> ProbeResult;
}

/// Probe issuing the canonical `GET /<fib>` and form `POST /` over HTTP
pub struct HttpProbe {
    client: reqwest::Client,
    grace_period: Duration,
    fib: u32,
    expected_status: StatusCode,
}

impl HttpProbe {
    pub fn new(grace_period: Duration, config: &ProbeConfig) -> Result<Self> {
        let expected_status = StatusCode::from_u16(config.expected_status).map_err(|_| {
            ConfigError::validation(format!(
                "probe.expected_status {} is not a valid status code",
                config.expected_status
            ))
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            grace_period,
            fib: config.fib,
            expected_status,
        })
    }

    async fn check(
        &self,
        request: String,
        builder: reqwest::RequestBuilder,
        body_check: &BodyCheck,
    ) -> ProbeCheck {
        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => return ProbeCheck::failed(request, None, describe_request_error(&err)),
        };

        let status = response.status();
        if status != self.expected_status {
            return ProbeCheck::failed(
                request,
                Some(status.as_u16()),
                format!("expected status {}, got {}", self.expected_status, status),
            );
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                return ProbeCheck::failed(
                    request,
                    Some(status.as_u16()),
                    format!("failed to read body: {}", err),
                )
            }
        };
        debug!(request = %request, body = %body, "probe response");

        match body_check.verify(&body, self.fib) {
            Ok(()) => ProbeCheck::passed(request, status.as_u16()),
            Err(reason) => ProbeCheck::failed(request, Some(status.as_u16()), reason),
        }
    }
}

fn describe_request_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {}", err)
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        err.to_string()
    }
}

#[async_trait]
impl ReadinessProbe for HttpProbe {
    async fn probe(&self, candidate: &CandidateSpec, base_url: &str) -> ProbeResult {
        if !self.grace_period.is_zero() {
            info!(
                candidate = %candidate.name,
                grace_secs = self.grace_period.as_secs_f64(),
                "waiting for candidate to bind"
            );
            sleep(self.grace_period).await;
        }

        let base = base_url.trim_end_matches('/');
        let mut result = ProbeResult::new(&candidate.name);

        let get = self.client.get(format!("{}/{}", base, self.fib));
        let check = self
            .check(format!("GET /{}", self.fib), get, &candidate.probe.get)
            .await;
        let passed = check.is_passed();
        result.push(check);
        if !passed {
            return result;
        }

        let post = self
            .client
            .post(format!("{}/", base))
            .form(&[("fib", self.fib.to_string())]);
        let check = self
            .check("POST /".to_string(), post, &candidate.probe.post)
            .await;
        result.push(check);

        result
    }
}

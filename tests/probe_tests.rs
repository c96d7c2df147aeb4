//! HttpProbe against a loopback responder

mod common;

use common::LoopbackServer;
use std::time::Duration;
use web_server_benchmark::{
    BodyCheck, CandidateSpec, CheckOutcome, HttpProbe, LaunchStrategy, ProbeConfig, ReadinessProbe,
};

fn candidate(get: BodyCheck, post: BodyCheck) -> CandidateSpec {
    CandidateSpec::new(
        "loopback",
        LaunchStrategy::CustomCommand {
            program: "true".to_string(),
            args: vec![],
        },
    )
    .with_probe(get, post)
}

fn probe() -> HttpProbe {
    HttpProbe::new(Duration::ZERO, &ProbeConfig::default()).unwrap()
}

#[tokio::test]
async fn test_framework_style_candidate_passes() {
    let server = LoopbackServer::start(|req| match (req.method.as_str(), req.path.as_str()) {
        ("GET", "/10") => (200, "55 from flask_server".to_string()),
        ("POST", "/") if req.body == "fib=10" => (200, "55 from flask_server".to_string()),
        _ => (404, "not found".to_string()),
    })
    .await;

    let spec = candidate(
        BodyCheck::Contains("flask_server".to_string()),
        BodyCheck::Contains("flask_server".to_string()),
    );
    let result = probe().probe(&spec, &server.base_url()).await;

    assert!(result.passed(), "checks: {:?}", result.checks);
    assert_eq!(result.checks.len(), 2);
    assert_eq!(result.checks[0].request, "GET /10");
    assert_eq!(result.checks[1].request, "POST /");
    assert_eq!(result.checks[1].status, Some(200));
}

#[tokio::test]
async fn test_asgi_echo_candidate_passes() {
    let server = LoopbackServer::start(|req| (200, req.body.clone())).await;

    let spec = candidate(BodyCheck::Any, BodyCheck::Equals("fib={fib}".to_string()));
    let result = probe().probe(&spec, &server.base_url()).await;

    assert!(result.passed(), "checks: {:?}", result.checks);
}

#[tokio::test]
async fn test_post_server_error_fails() {
    let server = LoopbackServer::start(|req| match req.method.as_str() {
        "GET" => (200, "ok".to_string()),
        _ => (500, "boom".to_string()),
    })
    .await;

    let spec = candidate(BodyCheck::Any, BodyCheck::Any);
    let result = probe().probe(&spec, &server.base_url()).await;

    assert!(!result.passed());
    let failure = result.first_failure().unwrap();
    assert_eq!(failure.request, "POST /");
    assert_eq!(failure.status, Some(500));
    assert!(result.into_result().is_err());
}

#[tokio::test]
async fn test_get_failure_skips_post() {
    let server = LoopbackServer::start(|_| (503, "starting".to_string())).await;

    let result = probe()
        .probe(&candidate(BodyCheck::Any, BodyCheck::Any), &server.base_url())
        .await;

    assert_eq!(result.checks.len(), 1);
    assert_eq!(result.checks[0].status, Some(503));
}

#[tokio::test]
async fn test_unexpected_body_fails() {
    let server = LoopbackServer::start(|_| (200, "hello from sanic_server".to_string())).await;

    let spec = candidate(
        BodyCheck::Contains("quart_server".to_string()),
        BodyCheck::Any,
    );
    let result = probe().probe(&spec, &server.base_url()).await;

    assert!(!result.passed());
    match &result.checks[0].outcome {
        CheckOutcome::Failed(reason) => assert!(reason.contains("quart_server")),
        CheckOutcome::Passed => panic!("body check should have failed"),
    }
}

#[tokio::test]
async fn test_grace_period_is_waited() {
    let server = LoopbackServer::start(|_| (200, "ok".to_string())).await;
    let probe = HttpProbe::new(Duration::from_millis(200), &ProbeConfig::default()).unwrap();

    let started = std::time::Instant::now();
    let result = probe
        .probe(&candidate(BodyCheck::Any, BodyCheck::Any), &server.base_url())
        .await;

    assert!(result.passed());
    assert!(started.elapsed() >= Duration::from_millis(200));
}

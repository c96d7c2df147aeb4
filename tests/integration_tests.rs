mod common;

use common::LoopbackServer;
use web_server_benchmark::{
    render, BenchmarkHarness, CandidateRegistry, CandidateSpec, FailureStage, HarnessConfig,
    HttpProbe, LaunchStrategy, Supervisor, WrkDriver,
};

#[test]
fn test_builtin_suites() {
    let asgi = CandidateRegistry::asgi_servers();
    let names: Vec<_> = asgi.list().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Daphne", "Hypercorn", "Hypercorn-uvloop", "Uvicorn"]);

    let frameworks = CandidateRegistry::frameworks()
        .filter(&["sanic".to_string(), "flask".to_string()])
        .unwrap();
    let names: Vec<_> = frameworks.list().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["flask", "sanic"]);
}

#[test]
fn test_dry_run_command_lines() {
    let config = HarnessConfig::default();
    let supervisor = Supervisor::system(&config.server);
    let driver = WrkDriver::new(config.load.clone());

    let registry = CandidateRegistry::asgi_servers();
    let uvicorn = &registry.list()[3];
    assert_eq!(
        supervisor.command_for(uvicorn).to_string(),
        "uvicorn asgi:App --host 127.0.0.1 --port 5000"
    );
    assert_eq!(
        driver
            .command_line(&config.workloads()[1], &supervisor.base_url())
            .to_string(),
        "wrk -c 64 -d 30s -s scripts/post.lua http://127.0.0.1:5000/ 10"
    );
}

/// Real processes end to end: `sleep` stands in for the candidate while the
/// loopback responder answers on its port, and a shell script plays `wrk`.
#[cfg(unix)]
#[tokio::test]
async fn test_end_to_end_with_real_processes() {
    use std::os::unix::fs::PermissionsExt;

    let server = LoopbackServer::start(|req| (200, format!("echo {}", req.body))).await;

    let dir = tempfile::tempdir().unwrap();
    let fake_wrk = dir.path().join("fake-wrk");
    std::fs::write(
        &fake_wrk,
        "#!/bin/sh\n\
         for last; do :; done\n\
         case \"$last\" in\n  \
           */10) echo \"Requests/sec:   2.50k\" ;;\n  \
           *) echo \"Requests/sec:   1250.00\" ;;\n\
         esac\n",
    )
    .unwrap();
    std::fs::set_permissions(&fake_wrk, std::fs::Permissions::from_mode(0o755)).unwrap();

    let mut config = HarnessConfig::default();
    config.server.port = server.addr.port();
    config.server.grace_period_secs = 0;
    config.server.shutdown_grace_secs = 2;
    config.load.binary = fake_wrk;
    config.load.duration_secs = 1;

    let sleeper = |name: &str, program: &str| {
        CandidateSpec::new(
            name,
            LaunchStrategy::CustomCommand {
                program: program.to_string(),
                args: vec!["30".to_string()],
            },
        )
        .working_dir(".")
    };
    let registry = CandidateRegistry::new(vec![
        sleeper("sleeper", "sleep"),
        sleeper("ghost", "no-such-candidate-binary"),
    ])
    .unwrap();

    let harness = BenchmarkHarness::new(
        Supervisor::system(&config.server),
        HttpProbe::new(config.server.grace_period(), &config.probe).unwrap(),
        WrkDriver::new(config.load.clone()),
        config.workloads(),
        config.failure_policy,
    );
    let report = harness.run(&registry).await;

    assert_eq!(harness.supervisor().active(), None);
    assert_eq!(
        report.workload("get").unwrap().entries[0].requests_per_second,
        2500.0
    );
    assert_eq!(
        report.workload("post").unwrap().entries[0].requests_per_second,
        1250.0
    );
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].candidate, "ghost");
    assert_eq!(report.failures[0].stage, FailureStage::Spawn);

    let rendered = render(&report);
    assert!(rendered.contains("get requests/second"));
    assert!(rendered.contains("candidate ghost skipped"));
}

//! Candidate registry: the static catalog of servers under comparison.
//!
//! A candidate is described once, before any benchmarking starts, and never
//! mutated afterwards. Malformed catalogs are rejected up front as
//! configuration errors so the run loop never has to deal with them.

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

/// ASGI server flavours understood by [`LaunchStrategy::AsgiServer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AsgiServerKind {
    Daphne,
    Hypercorn,
    Uvicorn,
}

impl AsgiServerKind {
    pub fn program(&self) -> &'static str {
        match self {
            AsgiServerKind::Daphne => "daphne",
            AsgiServerKind::Hypercorn => "hypercorn",
            AsgiServerKind::Uvicorn => "uvicorn",
        }
    }

    /// Arguments binding the server to `host:port`, in the server's own syntax.
    fn bind_args(&self, host: &str, port: u16) -> Vec<String> {
        match self {
            AsgiServerKind::Daphne => vec![
                "-b".to_string(),
                host.to_string(),
                "-p".to_string(),
                port.to_string(),
            ],
            AsgiServerKind::Hypercorn => vec!["-b".to_string(), format!("{}:{}", host, port)],
            AsgiServerKind::Uvicorn => vec![
                "--host".to_string(),
                host.to_string(),
                "--port".to_string(),
                port.to_string(),
            ],
        }
    }
}

/// How a candidate process is launched
///
/// Each case carries exactly the fields it needs; [`LaunchStrategy::command`]
/// turns it into a concrete command line for the shared host/port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LaunchStrategy {
    /// `<interpreter> <module>.py`; the script binds the address itself.
    DirectInterpreter {
        #[serde(default = "default_interpreter")]
        interpreter: String,
        module: String,
    },
    /// A pre-fork process manager with a worker class, e.g. gunicorn.
    ProcessManager {
        #[serde(default = "default_manager")]
        manager: String,
        module: String,
        #[serde(default = "default_wsgi_app")]
        app: String,
        worker_class: String,
    },
    AsgiServer {
        server: AsgiServerKind,
        module: String,
        app: String,
        #[serde(default)]
        extra_args: Vec<String>,
    },
    /// Arbitrary command; `{host}` and `{port}` in the arguments are substituted.
    CustomCommand {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

fn default_interpreter() -> String {
    "python".to_string()
}

fn default_manager() -> String {
    "gunicorn".to_string()
}

fn default_wsgi_app() -> String {
    "app".to_string()
}

impl LaunchStrategy {
    /// Build the concrete command line for a candidate bound to `host:port`
    pub fn command(&self, host: &str, port: u16) -> LaunchCommand {
        match self {
            LaunchStrategy::DirectInterpreter {
                interpreter,
                module,
            } => LaunchCommand::new(interpreter.clone(), vec![format!("{}.py", module)]),
            LaunchStrategy::ProcessManager {
                manager,
                module,
                app,
                worker_class,
            } => LaunchCommand::new(
                manager.clone(),
                vec![
                    format!("{}:{}", module, app),
                    "--worker-class".to_string(),
                    worker_class.clone(),
                    "-b".to_string(),
                    format!("{}:{}", host, port),
                ],
            ),
            LaunchStrategy::AsgiServer {
                server,
                module,
                app,
                extra_args,
            } => {
                let mut args = vec![format!("{}:{}", module, app)];
                args.extend(server.bind_args(host, port));
                args.extend(extra_args.iter().cloned());
                LaunchCommand::new(server.program(), args)
            }
            LaunchStrategy::CustomCommand { program, args } => {
                let port = port.to_string();
                let args = args
                    .iter()
                    .map(|arg| arg.replace("{host}", host).replace("{port}", &port))
                    .collect();
                LaunchCommand::new(program.clone(), args)
            }
        }
    }
}

/// A concrete program plus ordered argument list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl LaunchCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Assertion applied to a probe response body
///
/// `{fib}` inside the expected text is replaced with the probe parameter.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyCheck {
    #[default]
    Any,
    Contains(String),
    Equals(String),
}

impl BodyCheck {
    /// Check `body`, returning a description of the mismatch on failure
    pub fn verify(&self, body: &str, fib: u32) -> std::result::Result<(), String> {
        match self {
            BodyCheck::Any => Ok(()),
            BodyCheck::Contains(needle) => {
                let needle = needle.replace("{fib}", &fib.to_string());
                if body.contains(&needle) {
                    Ok(())
                } else {
                    Err(format!("body does not contain {:?}: {:?}", needle, body))
                }
            }
            BodyCheck::Equals(expected) => {
                let expected = expected.replace("{fib}", &fib.to_string());
                if body == expected {
                    Ok(())
                } else {
                    Err(format!("expected body {:?}, got {:?}", expected, body))
                }
            }
        }
    }
}

/// Body assertions for the canonical GET and POST probe requests
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProbeExpectations {
    #[serde(default)]
    pub get: BodyCheck,
    #[serde(default)]
    pub post: BodyCheck,
}

/// A benchmark target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSpec {
    pub name: String,
    pub launch: LaunchStrategy,
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
    #[serde(default)]
    pub probe: ProbeExpectations,
}

fn default_working_dir() -> PathBuf {
    PathBuf::from("servers")
}

impl CandidateSpec {
    pub fn new(name: impl Into<String>, launch: LaunchStrategy) -> Self {
        Self {
            name: name.into(),
            launch,
            working_dir: default_working_dir(),
            probe: ProbeExpectations::default(),
        }
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_probe(mut self, get: BodyCheck, post: BodyCheck) -> Self {
        self.probe = ProbeExpectations { get, post };
        self
    }
}

/// Ordered, validated catalog of candidates
#[derive(Debug, Clone)]
pub struct CandidateRegistry {
    candidates: Vec<CandidateSpec>,
}

impl CandidateRegistry {
    /// Build a registry, rejecting blank or duplicate names
    pub fn new(candidates: Vec<CandidateSpec>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for candidate in &candidates {
            if candidate.name.trim().is_empty() {
                return Err(ConfigError::validation("candidate name must not be empty"));
            }
            if !seen.insert(candidate.name.as_str()) {
                return Err(ConfigError::validation(format!(
                    "duplicate candidate name `{}`",
                    candidate.name
                )));
            }
            if let LaunchStrategy::CustomCommand { program, .. } = &candidate.launch {
                if program.trim().is_empty() {
                    return Err(ConfigError::validation(format!(
                        "candidate `{}` has an empty program",
                        candidate.name
                    )));
                }
            }
        }
        Ok(Self { candidates })
    }

    /// Candidates in declaration order
    pub fn list(&self) -> &[CandidateSpec] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Keep only the named candidates, preserving registry order
    pub fn filter(self, names: &[String]) -> Result<Self, ConfigError> {
        if names.is_empty() {
            return Ok(self);
        }
        for name in names {
            if !self.candidates.iter().any(|c| &c.name == name) {
                return Err(ConfigError::UnknownCandidate { name: name.clone() });
            }
        }
        let candidates = self
            .candidates
            .into_iter()
            .filter(|c| names.contains(&c.name))
            .collect();
        Ok(Self { candidates })
    }

    /// ASGI servers hosting the echo application in `servers/asgi.py`
    pub fn asgi_servers() -> Self {
        let asgi = |name: &str, server: AsgiServerKind, extra: &[&str]| {
            CandidateSpec::new(
                name,
                LaunchStrategy::AsgiServer {
                    server,
                    module: "asgi".to_string(),
                    app: "App".to_string(),
                    extra_args: extra.iter().map(|s| s.to_string()).collect(),
                },
            )
            .with_probe(BodyCheck::Any, BodyCheck::Equals("fib={fib}".to_string()))
        };

        Self {
            candidates: vec![
                asgi("Daphne", AsgiServerKind::Daphne, &[]),
                asgi("Hypercorn", AsgiServerKind::Hypercorn, &[]),
                asgi("Hypercorn-uvloop", AsgiServerKind::Hypercorn, &["--uvloop"]),
                asgi("Uvicorn", AsgiServerKind::Uvicorn, &[]),
            ],
        }
    }

    /// Python web frameworks, standalone and behind various workers
    pub fn frameworks() -> Self {
        fn direct(name: &str, module: &str) -> CandidateSpec {
            CandidateSpec::new(
                name,
                LaunchStrategy::DirectInterpreter {
                    interpreter: default_interpreter(),
                    module: module.to_string(),
                },
            )
        }

        fn gunicorn(name: &str, module: &str, worker_class: &str) -> CandidateSpec {
            CandidateSpec::new(
                name,
                LaunchStrategy::ProcessManager {
                    manager: default_manager(),
                    module: module.to_string(),
                    app: default_wsgi_app(),
                    worker_class: worker_class.to_string(),
                },
            )
        }

        fn asgi(name: &str, module: &str, server: AsgiServerKind) -> CandidateSpec {
            CandidateSpec::new(
                name,
                LaunchStrategy::AsgiServer {
                    server,
                    module: module.to_string(),
                    app: "asgi_app".to_string(),
                    extra_args: Vec::new(),
                },
            )
        }

        let candidates = vec![
            direct("aiohttp", "aiohttp_server"),
            gunicorn(
                "aiohttp-gunicorn-uvloop",
                "aiohttp_server",
                "aiohttp.worker.GunicornUVLoopWebWorker",
            ),
            direct("flask", "flask_server"),
            gunicorn("flask-gunicorn-eventlet", "flask_server", "eventlet"),
            gunicorn(
                "flask-gunicorn-meinheld",
                "flask_server",
                "meinheld.gmeinheld.MeinheldWorker",
            ),
            direct("quart", "quart_server"),
            asgi("quart-daphne", "quart_server", AsgiServerKind::Daphne),
            gunicorn("quart-gunicorn", "quart_server", "quart.worker.GunicornWorker"),
            gunicorn(
                "quart-gunicorn-uvloop",
                "quart_server",
                "quart.worker.GunicornUVLoopWorker",
            ),
            asgi("quart-uvicorn", "quart_server", AsgiServerKind::Uvicorn),
            direct("sanic", "sanic_server"),
            gunicorn("sanic-gunicorn-uvloop", "sanic_server", "sanic.worker.GunicornWorker"),
        ];

        // Every framework server names its module in both responses.
        let candidates = candidates
            .into_iter()
            .map(|candidate| {
                let module = match &candidate.launch {
                    LaunchStrategy::DirectInterpreter { module, .. }
                    | LaunchStrategy::ProcessManager { module, .. }
                    | LaunchStrategy::AsgiServer { module, .. } => module.clone(),
                    LaunchStrategy::CustomCommand { program, .. } => program.clone(),
                };
                candidate.with_probe(
                    BodyCheck::Contains(module.clone()),
                    BodyCheck::Contains(module),
                )
            })
            .collect();

        Self { candidates }
    }
}

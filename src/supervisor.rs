//! Candidate process supervision.
//!
//! Every candidate binds the same host and port, so at most one candidate
//! process may be alive at any time. The [`Supervisor`] owns a single port
//! slot: [`Supervisor::start`] claims it and hands out a [`CandidateProcess`],
//! and the slot is only released once that process has been terminated and
//! reaped, either through [`CandidateProcess::stop`] or, as a last resort,
//! through its `Drop` implementation.

use crate::config::ServerConfig;
use crate::error::{BenchmarkError, Result};
use crate::registry::{CandidateSpec, LaunchCommand};
use async_trait::async_trait;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// A running OS process as seen by the supervisor
#[async_trait]
pub trait ProcessHandle: Send {
    fn id(&self) -> Option<u32>;

    /// Exit status if the process has already exited, without blocking.
    fn try_exit(&mut self) -> Result<Option<String>>;

    /// Ask the process to exit, escalating to a kill after `grace`, and reap it.
    async fn terminate(&mut self, grace: Duration) -> Result<()>;

    /// Kill immediately and wait until the process has been reaped.
    async fn kill_and_wait(&mut self) -> Result<()>;

    /// Kill immediately; used where awaiting is impossible.
    fn kill(&mut self);
}

/// Spawns candidate processes
pub trait ProcessLauncher: Send + Sync {
    fn launch(
        &self,
        command: &LaunchCommand,
        working_dir: &Path,
        log_file: Option<&Path>,
    ) -> Result<Box<dyn ProcessHandle>>;
}

/// Launches real OS processes through `tokio::process`
#[derive(Debug, Clone, Default)]
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn launch(
        &self,
        command: &LaunchCommand,
        working_dir: &Path,
        log_file: Option<&Path>,
    ) -> Result<Box<dyn ProcessHandle>> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .current_dir(working_dir)
            .kill_on_drop(true)
            .stdin(Stdio::null());
        // Own process group, so workers the candidate forks are signalled with it.
        #[cfg(unix)]
        cmd.process_group(0);

        match log_file {
            Some(path) => {
                if let Some(dir) = path.parent() {
                    fs::create_dir_all(dir)?;
                }
                let stdout = File::create(path)?;
                let stderr = stdout.try_clone()?;
                cmd.stdout(Stdio::from(stdout)).stderr(Stdio::from(stderr));
            }
            None => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        let child = cmd
            .spawn()
            .map_err(|e| BenchmarkError::spawn(command.program.clone(), e))?;
        let group = child.id();
        Ok(Box::new(ChildProcess { child, group }))
    }
}

struct ChildProcess {
    child: Child,
    /// Process group id; equal to the leader's pid.
    group: Option<u32>,
}

#[cfg(unix)]
fn signal_group(group: u32, signal: libc::c_int) -> bool {
    // SAFETY: killpg(2) on a group led by a child we spawned.
    unsafe { libc::killpg(group as libc::pid_t, signal) == 0 }
}

#[cfg(unix)]
fn terminate_group(group: u32) -> bool {
    signal_group(group, libc::SIGTERM)
}

#[cfg(unix)]
fn kill_group(group: u32) -> bool {
    signal_group(group, libc::SIGKILL)
}

#[cfg(not(unix))]
fn terminate_group(_group: u32) -> bool {
    false
}

#[cfg(not(unix))]
fn kill_group(_group: u32) -> bool {
    false
}

impl ChildProcess {
    fn signal_terminate(&mut self) {
        if let Some(group) = self.group {
            if terminate_group(group) {
                return;
            }
        }
        if let Err(err) = self.child.start_kill() {
            warn!(%err, "failed to signal candidate process");
        }
    }

    /// SIGKILL whatever is left of the group once the leader is gone.
    fn sweep_group(&mut self) {
        if let Some(group) = self.group.take() {
            if kill_group(group) {
                debug!(group, "killed leftover candidate processes");
            }
        }
    }
}

#[async_trait]
impl ProcessHandle for ChildProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn try_exit(&mut self) -> Result<Option<String>> {
        Ok(self.child.try_wait()?.map(|status| status.to_string()))
    }

    async fn terminate(&mut self, grace: Duration) -> Result<()> {
        if self.child.try_wait()?.is_some() {
            self.sweep_group();
            return Ok(());
        }

        self.signal_terminate();
        match timeout(grace, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                debug!(%status, "candidate exited");
                self.sweep_group();
                Ok(())
            }
            Err(_) => {
                warn!(
                    grace_secs = grace.as_secs(),
                    "candidate did not exit in time; forcing kill"
                );
                self.kill_and_wait().await
            }
        }
    }

    async fn kill_and_wait(&mut self) -> Result<()> {
        if let Some(group) = self.group {
            kill_group(group);
        }
        let result = self.child.kill().await;
        self.group = None;
        result.map_err(|e| BenchmarkError::shutdown(format!("failed to kill candidate: {}", e)))
    }

    fn kill(&mut self) {
        if let Some(group) = self.group {
            kill_group(group);
        }
        if let Err(err) = self.child.start_kill() {
            debug!(%err, "kill on already exited candidate");
        }
        let _ = self.child.try_wait();
        self.group = None;
    }
}

type PortSlot = Arc<Mutex<Option<String>>>;

fn lock_slot(slot: &PortSlot) -> MutexGuard<'_, Option<String>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Starts and stops candidates on the shared host/port
pub struct Supervisor<L = SystemLauncher> {
    launcher: L,
    host: String,
    port: u16,
    shutdown_grace: Duration,
    log_dir: Option<PathBuf>,
    slot: PortSlot,
}

impl Supervisor<SystemLauncher> {
    pub fn system(config: &ServerConfig) -> Self {
        Self::new(SystemLauncher, config)
    }
}

impl<L: ProcessLauncher> Supervisor<L> {
    pub fn new(launcher: L, config: &ServerConfig) -> Self {
        Self {
            launcher,
            host: config.host.clone(),
            port: config.port,
            shutdown_grace: config.shutdown_grace(),
            log_dir: config.log_dir.clone(),
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// URL every candidate is reachable at once bound
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Command line a candidate is started with
    pub fn command_for(&self, spec: &CandidateSpec) -> LaunchCommand {
        spec.launch.command(&self.host, self.port)
    }

    /// Name of the candidate currently holding the port, if any
    pub fn active(&self) -> Option<String> {
        lock_slot(&self.slot).clone()
    }

    /// Spawn a candidate; returns right after the spawn, without waiting for readiness
    pub fn start(&self, spec: &CandidateSpec) -> Result<CandidateProcess> {
        let mut slot = lock_slot(&self.slot);
        if let Some(holder) = slot.as_ref() {
            return Err(BenchmarkError::PortBusy(holder.clone()));
        }

        let command = self.command_for(spec);
        let log_file = self
            .log_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.log", spec.name)));
        info!(
            candidate = %spec.name,
            command = %command,
            working_dir = %spec.working_dir.display(),
            "starting candidate"
        );

        let handle = self
            .launcher
            .launch(&command, &spec.working_dir, log_file.as_deref())?;
        *slot = Some(spec.name.clone());

        Ok(CandidateProcess {
            name: spec.name.clone(),
            pid: handle.id(),
            handle: Some(handle),
            shutdown_grace: self.shutdown_grace,
            slot: Arc::clone(&self.slot),
        })
    }

    /// Terminate and reap a candidate, releasing the port
    pub async fn stop(&self, process: CandidateProcess) -> Result<()> {
        process.stop().await
    }
}

/// A live candidate process bound to the shared port
///
/// Consumed by [`CandidateProcess::stop`]. Dropping it without stopping kills
/// the process on the spot.
pub struct CandidateProcess {
    name: String,
    pid: Option<u32>,
    handle: Option<Box<dyn ProcessHandle>>,
    shutdown_grace: Duration,
    slot: PortSlot,
}

impl CandidateProcess {
    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    /// Exit status if the candidate died on its own
    pub fn exited(&mut self) -> Result<Option<String>> {
        match self.handle.as_mut() {
            Some(handle) => handle.try_exit(),
            None => Ok(None),
        }
    }

    pub async fn stop(mut self) -> Result<()> {
        let result = match self.handle.take() {
            Some(mut handle) => {
                let result = handle.terminate(self.shutdown_grace).await;
                if result.is_err() {
                    if let Err(err) = handle.kill_and_wait().await {
                        warn!(candidate = %self.name, %err, "candidate could not be reaped");
                    }
                }
                result
            }
            None => Ok(()),
        };
        self.release();
        info!(candidate = %self.name, pid = ?self.pid, "candidate stopped");
        result
    }

    fn release(&self) {
        let mut slot = lock_slot(&self.slot);
        if slot.as_deref() == Some(self.name.as_str()) {
            *slot = None;
        }
    }
}

impl Drop for CandidateProcess {
    fn drop(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            warn!(candidate = %self.name, pid = ?self.pid, "candidate dropped without stop; killing");
            handle.kill();
            self.release();
        }
    }
}

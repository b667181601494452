pub(crate) mod builder;
pub(crate) mod handle;
pub(crate) mod report;

use std::{
    collections::HashMap,
    ffi::OsString,
    os::unix::fs::PermissionsExt,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Local};
use nix::sys::signal::Signal;
use tokio::{sync::Mutex, time::Instant};

use crate::{
    env_file,
    process::{
        output::{self, LogBuffer},
        ProcessHandle,
    },
    supervisor::{
        handle::SupervisorHandle,
        report::{OperationResult, StatusReport},
    },
};

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("binary not found: {}", path.display())]
    BinaryNotFound { path: PathBuf },
    #[error("binary is not executable: {}", path.display())]
    NotExecutable { path: PathBuf },
    #[error("failed to launch {}: {source}", binary.display())]
    LaunchFailure {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to send {signal} to process group {pgid}: {source}")]
    SignalDelivery {
        pgid: i32,
        signal: Signal,
        #[source]
        source: nix::errno::Errno,
    },
    #[error("gateway (pid {pid}) still running {waited:?} after SIGKILL")]
    StopTimeout { pid: u32, waited: Duration },
    #[error("failed to query state of pid {pid}: {source}")]
    Liveness {
        pid: u32,
        #[source]
        source: std::io::Error,
    },
    #[error("restart aborted, gateway did not stop: {source}")]
    RestartAborted {
        #[source]
        source: Box<SupervisorError>,
    },
}

/// The launched child and the moment it started. Kept together so one is
/// never present without the other.
#[derive(Debug)]
pub(crate) struct RunningGateway {
    process: ProcessHandle,
    started_at: DateTime<Local>,
    started: Instant,
}

/// Everything guarded by the supervisor's single lock.
#[derive(Debug)]
pub(crate) struct SupervisorState {
    running: Option<RunningGateway>,
    pub(crate) logs: LogBuffer,
    /// Bumped on every launch; output drains tag their writes with it.
    pub(crate) generation: u64,
}

/// Owns the lifecycle of a single gateway process.
///
/// `start`, `stop`, `restart` and `status` all serialize on one lock, so an
/// observed state is always acted on atomically and at most one child exists
/// at any time. Liveness is re-queried from the OS on every call.
#[derive(Debug)]
pub struct Supervisor {
    binary: PathBuf,
    args: Vec<String>,
    env_files: Vec<PathBuf>,
    poll_interval: Duration,
    grace_period: Duration,
    kill_timeout: Duration,
    restart_cooldown: Duration,
    recent_logs: usize,
    state: Arc<Mutex<SupervisorState>>,
}

impl Supervisor {
    /// Wraps the supervisor in a cloneable handle for request handlers.
    pub fn into_handle(self) -> SupervisorHandle {
        SupervisorHandle::new(self)
    }

    pub fn binary(&self) -> &std::path::Path {
        &self.binary
    }

    /// Snapshot of the gateway. The lock is released before uptime is derived.
    pub async fn status(&self) -> StatusReport {
        let (live, recent_logs) = {
            let mut state = self.state.lock().await;
            let live = match state.running.as_mut() {
                Some(gateway) => match gateway.process.is_alive() {
                    Ok(true) => Some((gateway.process.pid(), gateway.started_at, gateway.started)),
                    Ok(false) => None,
                    Err(err) => {
                        tracing::warn!(error = %err, "liveness check failed");
                        None
                    }
                },
                None => None,
            };
            (live, state.logs.tail(self.recent_logs))
        };

        let binary = self.binary.display().to_string();
        match live {
            Some((pid, started_at, started)) => StatusReport {
                running: true,
                pid: Some(pid),
                started_at: Some(started_at),
                uptime_seconds: Some(started.elapsed().as_secs()),
                binary,
                recent_logs,
            },
            None => StatusReport {
                running: false,
                pid: None,
                started_at: None,
                uptime_seconds: None,
                binary,
                recent_logs,
            },
        }
    }

    /// Launches the gateway unless a live one already exists.
    pub async fn start(&self) -> OperationResult {
        let mut state = self.state.lock().await;
        match self.live_pid(&mut state) {
            Ok(Some(pid)) => return OperationResult::already_running(pid),
            Ok(None) => {}
            Err(err) => return OperationResult::failure(&err),
        }
        match self.start_locked(&mut state).await {
            Ok(pid) => OperationResult::started(pid),
            Err(err) => {
                tracing::error!(error = %err, "failed to start gateway");
                OperationResult::failure(&err)
            }
        }
    }

    /// Stops the gateway: SIGTERM to its group, then SIGKILL once the grace
    /// period runs out. Stopping a stopped gateway succeeds.
    pub async fn stop(&self) -> OperationResult {
        let mut state = self.state.lock().await;
        if let Err(err) = self.live_pid(&mut state) {
            return OperationResult::failure(&err);
        }
        match self.stop_locked(&mut state).await {
            Ok(Some(pid)) => OperationResult::stopped(pid),
            Ok(None) => OperationResult::not_running(),
            Err(err) => {
                tracing::error!(error = %err, "failed to stop gateway");
                OperationResult::failure(&err)
            }
        }
    }

    /// Stop then start under a single lock acquisition. A failed stop aborts
    /// the restart instead of launching a second gateway beside the old one.
    pub async fn restart(&self) -> OperationResult {
        let mut state = self.state.lock().await;
        if let Err(err) = self.live_pid(&mut state) {
            return OperationResult::failure(&err);
        }
        if let Err(err) = self.stop_locked(&mut state).await {
            let err = SupervisorError::RestartAborted {
                source: Box::new(err),
            };
            tracing::error!(error = %err, "failed to restart gateway");
            return OperationResult::failure(&err);
        }

        tokio::time::sleep(self.restart_cooldown).await;

        match self.start_locked(&mut state).await {
            Ok(pid) => OperationResult::restarted(pid),
            Err(err) => {
                tracing::error!(error = %err, "failed to start gateway after stop");
                OperationResult::failure(&err)
            }
        }
    }

    /// Pid of the live gateway, if any. A gateway found to have exited on its
    /// own is dropped from the state here.
    fn live_pid(&self, state: &mut SupervisorState) -> Result<Option<u32>, SupervisorError> {
        let Some(gateway) = state.running.as_mut() else {
            return Ok(None);
        };
        if gateway.process.is_alive()? {
            return Ok(Some(gateway.process.pid()));
        }
        tracing::info!(pid = gateway.process.pid(), "gateway exited on its own");
        state.running = None;
        Ok(None)
    }

    async fn start_locked(&self, state: &mut SupervisorState) -> Result<u32, SupervisorError> {
        self.check_binary().await?;

        state.logs.clear();
        let env = self.environment();
        let (process, output) = ProcessHandle::spawn(&self.binary, &self.args, env)?;
        let pid = process.pid();

        state.generation = state.generation.wrapping_add(1);
        state.running = Some(RunningGateway {
            process,
            started_at: Local::now(),
            started: Instant::now(),
        });
        output::spawn_drain(output, Arc::clone(&self.state), state.generation, pid);

        tracing::info!(pid, binary = %self.binary.display(), "gateway started");
        Ok(pid)
    }

    /// Returns the stopped pid, or `None` when nothing was running. On error
    /// the handle is kept so a later call can retry.
    async fn stop_locked(&self, state: &mut SupervisorState) -> Result<Option<u32>, SupervisorError> {
        let Some(gateway) = state.running.as_mut() else {
            return Ok(None);
        };
        let pid = gateway.process.pid();
        self.terminate(&mut gateway.process).await?;
        state.running = None;
        tracing::info!(pid, "gateway stopped");
        Ok(Some(pid))
    }

    /// Stops the leader, then sweeps the rest of its group so no descendant
    /// outlives it holding the output pipe.
    async fn terminate(&self, process: &mut ProcessHandle) -> Result<(), SupervisorError> {
        self.terminate_leader(process).await?;
        process.sweep_group()
    }

    async fn terminate_leader(&self, process: &mut ProcessHandle) -> Result<(), SupervisorError> {
        let pid = process.pid();
        if let Err(err) = process.signal_group(Signal::SIGTERM) {
            if err.is_no_such_process() && !process.is_alive()? {
                return Ok(());
            }
            return Err(err);
        }

        for _ in 0..self.grace_polls() {
            if !process.is_alive()? {
                return Ok(());
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        if !process.is_alive()? {
            return Ok(());
        }

        tracing::warn!(pid, grace = ?self.grace_period, "gateway ignored SIGTERM, sending SIGKILL");
        if let Err(err) = process.signal_group(Signal::SIGKILL) {
            if err.is_no_such_process() && !process.is_alive()? {
                return Ok(());
            }
            return Err(err);
        }
        if process.wait_timeout(self.kill_timeout).await? {
            Ok(())
        } else {
            Err(SupervisorError::StopTimeout {
                pid,
                waited: self.kill_timeout,
            })
        }
    }

    fn grace_polls(&self) -> u32 {
        let polls = self.grace_period.as_nanos() / self.poll_interval.as_nanos().max(1);
        u32::try_from(polls).unwrap_or(u32::MAX).max(1)
    }

    async fn check_binary(&self) -> Result<(), SupervisorError> {
        let not_found = || SupervisorError::BinaryNotFound {
            path: self.binary.clone(),
        };
        let metadata = tokio::fs::metadata(&self.binary)
            .await
            .map_err(|_| not_found())?;
        if !metadata.is_file() {
            return Err(not_found());
        }
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(SupervisorError::NotExecutable {
                path: self.binary.clone(),
            });
        }
        Ok(())
    }

    /// The supervisor's environment with the first env file found layered on top.
    fn environment(&self) -> HashMap<OsString, OsString> {
        let mut env: HashMap<OsString, OsString> = std::env::vars_os().collect();
        let Some(path) = env_file::find(&self.env_files) else {
            return env;
        };
        match env_file::load(path) {
            Ok(pairs) => {
                tracing::info!(path = %path.display(), count = pairs.len(), "loaded env file");
                env.extend(
                    pairs
                        .into_iter()
                        .map(|(key, value)| (OsString::from(key), OsString::from(value))),
                );
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to read env file");
            }
        }
        env
    }
}

#[cfg(test)]
mod tests {
    use std::{
        os::unix::{fs::PermissionsExt, process::CommandExt},
        path::PathBuf,
        time::Duration,
    };

    use tempfile::TempDir;

    use super::*;
    use crate::SupervisorBuilder;

    fn sleeping_gateway() -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("gateway");
        std::fs::write(&binary, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();
        (dir, binary)
    }

    fn supervisor(binary: &std::path::Path) -> Supervisor {
        SupervisorBuilder::new(binary)
            .with_env_files(Vec::<PathBuf>::new())
            .with_poll_interval(Duration::from_millis(20))
            .with_grace_period(Duration::from_millis(100))
            .with_kill_timeout(Duration::from_millis(200))
            .with_restart_cooldown(Duration::from_millis(10))
            .build()
    }

    async fn retarget(supervisor: &Supervisor, pgid: i32) {
        let mut state = supervisor.state.lock().await;
        state.running.as_mut().unwrap().process.retarget_group(pgid);
    }

    #[tokio::test]
    async fn undeliverable_signal_keeps_gateway_tracked() {
        let (_dir, binary) = sleeping_gateway();
        let supervisor = supervisor(&binary);
        let pid = supervisor.start().await.pid.unwrap();

        // No process group can have this id, so killpg fails with ESRCH
        // while the gateway itself is still alive.
        retarget(&supervisor, i32::MAX).await;

        let stopped = supervisor.stop().await;
        assert!(!stopped.success);
        assert!(stopped.message.contains("failed to send"), "{}", stopped.message);
        let status = supervisor.status().await;
        assert!(status.running);
        assert_eq!(status.pid, Some(pid));

        let restarted = supervisor.restart().await;
        assert!(!restarted.success);
        assert!(restarted.message.starts_with("restart aborted"), "{}", restarted.message);
        assert_eq!(supervisor.status().await.pid, Some(pid));

        retarget(&supervisor, pid as i32).await;
        assert!(supervisor.stop().await.success);
        assert!(!supervisor.status().await.running);
    }

    #[tokio::test]
    async fn unconfirmed_kill_reports_timeout() {
        let (_dir, binary) = sleeping_gateway();
        let supervisor = supervisor(&binary);
        let pid = supervisor.start().await.pid.unwrap();

        // Signals land on a decoy group; the gateway never sees them.
        let mut decoy = std::process::Command::new("sleep")
            .arg("30")
            .process_group(0)
            .spawn()
            .unwrap();
        retarget(&supervisor, decoy.id() as i32).await;

        let stopped = supervisor.stop().await;
        assert!(!stopped.success);
        assert!(stopped.message.contains("still running"), "{}", stopped.message);
        assert_eq!(supervisor.status().await.pid, Some(pid));

        decoy.wait().unwrap();
        retarget(&supervisor, pid as i32).await;
        assert!(supervisor.stop().await.success);
    }
}

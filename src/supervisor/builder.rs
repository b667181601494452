use std::{path::PathBuf, sync::Arc, time::Duration};

use tokio::sync::Mutex;

use crate::{
    env_file,
    process::output::LogBuffer,
    supervisor::{Supervisor, SupervisorState},
};

/// Builds a `Supervisor` for one gateway binary.
///
/// Defaults: liveness polled every 100ms during a 5s grace period, 3s to
/// confirm a SIGKILL, 1s cooldown between the stop and start of a restart,
/// 100 buffered output lines of which the last 20 are reported by `status`.
pub struct SupervisorBuilder {
    binary: PathBuf,
    args: Vec<String>,
    env_files: Option<Vec<PathBuf>>,
    poll_interval: Duration,
    grace_period: Duration,
    kill_timeout: Duration,
    restart_cooldown: Duration,
    log_capacity: usize,
    recent_logs: usize,
}

impl SupervisorBuilder {
    /// Creates a new builder with default configuration values.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            args: Vec::new(),
            env_files: None,
            poll_interval: Duration::from_millis(100),
            grace_period: Duration::from_secs(5),
            kill_timeout: Duration::from_secs(3),
            restart_cooldown: Duration::from_secs(1),
            log_capacity: 100,
            recent_logs: 20,
        }
    }

    /// Arguments passed to the gateway binary on every launch.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the env-file search order. The first existing file wins.
    pub fn with_env_files<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.env_files = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    /// Sets how often liveness is polled while waiting for a graceful exit.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets how long the gateway gets to exit after SIGTERM before SIGKILL.
    pub fn with_grace_period(mut self, period: Duration) -> Self {
        self.grace_period = period;
        self
    }

    /// Sets how long to wait for exit confirmation after SIGKILL.
    pub fn with_kill_timeout(mut self, timeout: Duration) -> Self {
        self.kill_timeout = timeout;
        self
    }

    /// Sets the pause between the stop and start phases of a restart.
    pub fn with_restart_cooldown(mut self, cooldown: Duration) -> Self {
        self.restart_cooldown = cooldown;
        self
    }

    /// Sets how many output lines are buffered.
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }

    /// Sets how many of the buffered lines `status` reports.
    pub fn with_recent_logs(mut self, count: usize) -> Self {
        self.recent_logs = count;
        self
    }

    /// Constructs the `Supervisor` with the configured settings.
    pub fn build(self) -> Supervisor {
        let env_files = self
            .env_files
            .unwrap_or_else(|| env_file::default_search_paths(&self.binary));
        let state = SupervisorState {
            running: None,
            logs: LogBuffer::with_capacity(self.log_capacity),
            generation: 0,
        };
        Supervisor {
            binary: self.binary,
            args: self.args,
            env_files,
            poll_interval: self.poll_interval,
            grace_period: self.grace_period,
            kill_timeout: self.kill_timeout,
            restart_cooldown: self.restart_cooldown,
            recent_logs: self.recent_logs,
            state: Arc::new(Mutex::new(state)),
        }
    }
}

pub(crate) mod output;

use std::{
    collections::HashMap,
    ffi::OsString,
    os::{fd::OwnedFd, unix::process::CommandExt},
    path::Path,
    process::Stdio,
    time::Duration,
};

use nix::{
    errno::Errno,
    sys::signal::{killpg, Signal},
    unistd::Pid,
};
use tokio::{
    net::unix::pipe,
    process::{Child, Command},
};

use crate::SupervisorError;

/// A launched gateway: the child itself plus the process group it leads.
///
/// The child is spawned as the leader of a fresh process group, so signalling
/// the group also reaches anything the gateway forks.
#[derive(Debug)]
pub(crate) struct ProcessHandle {
    child: Child,
    pid: u32,
    pgid: Pid,
}

impl ProcessHandle {
    /// Launches `binary` in a new process group with stdout and stderr merged
    /// into a single pipe, returning the handle and the read end of that pipe.
    pub(crate) fn spawn(
        binary: &Path,
        args: &[String],
        env: HashMap<OsString, OsString>,
    ) -> Result<(Self, pipe::Receiver), SupervisorError> {
        let launch_failure = |source: std::io::Error| SupervisorError::LaunchFailure {
            binary: binary.to_path_buf(),
            source,
        };

        let (reader, writer) = std::io::pipe().map_err(launch_failure)?;
        let stderr_writer = writer.try_clone().map_err(launch_failure)?;
        let output = pipe::Receiver::from_owned_fd(OwnedFd::from(reader)).map_err(launch_failure)?;

        // The command owns the parent's copies of the write end; it must be
        // dropped right after spawning or the pipe never reports EOF.
        let mut command = Command::new(binary);
        command
            .args(args)
            .env_clear()
            .envs(env)
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(stderr_writer);
        command.as_std_mut().process_group(0);
        let mut child = command.spawn().map_err(launch_failure)?;
        drop(command);

        let Some(pid) = child.id() else {
            let _ = child.start_kill();
            return Err(launch_failure(std::io::Error::other(
                "process exited before its pid could be read",
            )));
        };
        let pgid = Pid::from_raw(pid as i32);

        Ok((Self { child, pid, pgid }, output))
    }

    pub(crate) const fn pid(&self) -> u32 {
        self.pid
    }

    /// Asks the OS whether the child is still running. Reaps it if it exited.
    pub(crate) fn is_alive(&mut self) -> Result<bool, SupervisorError> {
        match self.child.try_wait() {
            Ok(None) => Ok(true),
            Ok(Some(_)) => Ok(false),
            Err(source) => Err(SupervisorError::Liveness {
                pid: self.pid,
                source,
            }),
        }
    }

    /// Delivers `signal` to every process in the child's group.
    pub(crate) fn signal_group(&self, signal: Signal) -> Result<(), SupervisorError> {
        killpg(self.pgid, signal).map_err(|source| SupervisorError::SignalDelivery {
            pgid: self.pgid.as_raw(),
            signal,
            source,
        })
    }

    /// SIGKILLs whatever is left in the group once the leader is gone.
    /// A group that no longer exists counts as swept.
    pub(crate) fn sweep_group(&self) -> Result<(), SupervisorError> {
        match killpg(self.pgid, None) {
            Ok(()) => {}
            Err(Errno::ESRCH) => return Ok(()),
            Err(source) => {
                return Err(SupervisorError::SignalDelivery {
                    pgid: self.pgid.as_raw(),
                    signal: Signal::SIGKILL,
                    source,
                })
            }
        }
        tracing::warn!(pgid = self.pgid.as_raw(), "gateway left processes behind, sending SIGKILL");
        match self.signal_group(Signal::SIGKILL) {
            Err(err) if err.is_no_such_process() => Ok(()),
            result => result,
        }
    }

    /// Points group signals at another group, leaving the child untouched.
    #[cfg(test)]
    pub(crate) fn retarget_group(&mut self, pgid: i32) {
        self.pgid = Pid::from_raw(pgid);
    }

    /// Waits up to `timeout` for the child to exit. `Ok(false)` means it is
    /// still running when the window closes.
    pub(crate) async fn wait_timeout(&mut self, timeout: Duration) -> Result<bool, SupervisorError> {
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(pid = self.pid, %status, "gateway reaped");
                Ok(true)
            }
            Ok(Err(source)) => Err(SupervisorError::Liveness {
                pid: self.pid,
                source,
            }),
            Err(_) => Ok(false),
        }
    }
}

impl SupervisorError {
    /// True when a group signal failed because the group no longer exists.
    pub(crate) fn is_no_such_process(&self) -> bool {
        matches!(
            self,
            SupervisorError::SignalDelivery {
                source: Errno::ESRCH,
                ..
            }
        )
    }
}

use std::{
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    time::Duration,
};

use gateway_supervisor::{StatusReport, SupervisorBuilder, SupervisorHandle};
use tempfile::TempDir;

/// A scratch directory holding a dummy gateway script.
#[allow(unused)]
pub struct Gateway {
    pub dir: TempDir,
    pub binary: PathBuf,
}

/// Writes `body` as an executable `/bin/sh` script.
#[allow(unused)]
pub fn gateway_script(body: &str) -> Gateway {
    let dir = tempfile::tempdir().unwrap();
    let binary = dir.path().join("gateway");
    write_executable(&binary, body);
    Gateway { dir, binary }
}

#[allow(unused)]
pub fn write_executable(path: &Path, body: &str) {
    std::fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// Builder with shortened timings and no env-file lookup.
#[allow(unused)]
pub fn fast_builder(binary: &Path) -> SupervisorBuilder {
    SupervisorBuilder::new(binary)
        .with_env_files(Vec::<PathBuf>::new())
        .with_poll_interval(Duration::from_millis(20))
        .with_grace_period(Duration::from_millis(500))
        .with_kill_timeout(Duration::from_secs(2))
        .with_restart_cooldown(Duration::from_millis(100))
}

#[allow(unused)]
pub fn fast_supervisor(binary: &Path) -> SupervisorHandle {
    fast_builder(binary).build().into_handle()
}

/// Polls `status` until `check` holds or the timeout expires.
#[allow(unused)]
pub async fn wait_for_status(
    supervisor: &SupervisorHandle,
    timeout: Duration,
    check: impl Fn(&StatusReport) -> bool,
) -> StatusReport {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let status = supervisor.status().await;
        if check(&status) || tokio::time::Instant::now() >= deadline {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// True once `pid` no longer exists or is a zombie awaiting its reaper.
#[allow(unused)]
pub fn process_gone(pid: i32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .is_some_and(|state| state == "Z" || state == "X"),
        Err(_) => true,
    }
}

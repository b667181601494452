use chrono::{DateTime, Local};
use serde::Serialize;

use crate::SupervisorError;

/// Outcome of `start`, `stop` or `restart`.
///
/// Failures are carried here rather than raised, so the supervisor stays
/// queryable after any failed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl OperationResult {
    pub(crate) fn started(pid: u32) -> Self {
        Self {
            success: true,
            message: format!("gateway started (pid {pid})"),
            pid: Some(pid),
        }
    }

    pub(crate) fn restarted(pid: u32) -> Self {
        Self {
            success: true,
            message: format!("gateway restarted (pid {pid})"),
            pid: Some(pid),
        }
    }

    pub(crate) fn stopped(pid: u32) -> Self {
        Self {
            success: true,
            message: format!("gateway stopped (pid {pid})"),
            pid: Some(pid),
        }
    }

    pub(crate) fn already_running(pid: u32) -> Self {
        Self {
            success: false,
            message: "already running".to_owned(),
            pid: Some(pid),
        }
    }

    pub(crate) fn not_running() -> Self {
        Self {
            success: true,
            message: "not running".to_owned(),
            pid: None,
        }
    }

    pub(crate) fn failure(err: &SupervisorError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            pid: None,
        }
    }
}

/// Point-in-time view of the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub running: bool,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Local>>,
    pub uptime_seconds: Option<u64>,
    pub binary: String,
    pub recent_logs: Vec<String>,
}

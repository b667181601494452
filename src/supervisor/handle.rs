use std::{future::Future, path::Path, sync::Arc};

use crate::supervisor::{
    report::{OperationResult, StatusReport},
    Supervisor,
};

/// Cloneable reference to the process-wide `Supervisor`.
///
/// Built once at startup and handed to every request handler and to the
/// shutdown task.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    inner: Arc<Supervisor>,
}

impl SupervisorHandle {
    pub(crate) fn new(supervisor: Supervisor) -> Self {
        Self {
            inner: Arc::new(supervisor),
        }
    }

    pub fn binary(&self) -> &Path {
        self.inner.binary()
    }

    pub async fn status(&self) -> StatusReport {
        self.inner.status().await
    }

    pub async fn start(&self) -> OperationResult {
        self.inner.start().await
    }

    /// May block for the full grace period plus the kill timeout.
    pub async fn stop(&self) -> OperationResult {
        self.inner.stop().await
    }

    pub async fn restart(&self) -> OperationResult {
        self.inner.restart().await
    }

    /// Best-effort stop of a live gateway before the supervisor exits.
    pub async fn shutdown(&self) -> OperationResult {
        let result = self.inner.stop().await;
        if result.success {
            tracing::info!(message = %result.message, "gateway shut down");
        } else {
            tracing::error!(message = %result.message, "gateway shutdown failed");
        }
        result
    }

    /// Runs `work`; if it fails, the gateway is stopped before the error is
    /// handed back, so it never outlives the supervisor untracked.
    pub async fn shutdown_on_error<F, T, E>(&self, work: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        let result = work.await;
        if result.is_err() {
            self.shutdown().await;
        }
        result
    }
}

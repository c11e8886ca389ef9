//! Release guard: best-effort release of the held resource when the session
//! is abandoned.
//!
//! The guard may run while the process is being torn down. It sends exactly
//! one release request, clears the local handle without waiting for the
//! answer, and then gives the request a bounded window to finish. It never
//! retries and never reports failures to the user.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cloudram_sdk::{ProvisionError, ProvisioningApi, ReleaseRequest};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::auth::{NotAuthenticated, SessionGate};
use crate::handle::{HandleError, ReleaseAccess};

pub const DEFAULT_RELEASE_DEADLINE: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum ReleaseBestEffortFailed {
    #[error(transparent)]
    NotAuthenticated(#[from] NotAuthenticated),
    #[error("resource handle unavailable: {0}")]
    Store(#[from] HandleError),
    #[error("release request failed: {0}")]
    Transport(#[from] ProvisionError),
    #[error("release request did not complete within {0:?}")]
    DeadlineElapsed(Duration),
    #[error("release task aborted: {0}")]
    Aborted(String),
}

#[derive(Debug)]
pub enum ReleaseOutcome {
    NoHandle,
    /// No request was sent; the handle is left in place.
    Skipped(ReleaseBestEffortFailed),
    Sent {
        resource_id: String,
        result: Result<StatusCode, ReleaseBestEffortFailed>,
    },
}

pub struct ReleaseGuard {
    gate: Arc<dyn SessionGate>,
    api: Arc<dyn ProvisioningApi>,
    access: ReleaseAccess,
    deadline: Duration,
}

impl ReleaseGuard {
    pub fn new(
        gate: Arc<dyn SessionGate>,
        api: Arc<dyn ProvisioningApi>,
        access: ReleaseAccess,
    ) -> Self {
        Self {
            gate,
            api,
            access,
            deadline: DEFAULT_RELEASE_DEADLINE,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Wait for `signal`, then run one abandonment pass.
    pub async fn watch<S>(&self, signal: S) -> ReleaseOutcome
    where
        S: Future<Output = ()>,
    {
        signal.await;
        info!(target: "cloudram::guard", "session abandoned");
        self.on_abandon().await
    }

    pub async fn on_abandon(&self) -> ReleaseOutcome {
        let handle = match self.access.read() {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                debug!(target: "cloudram::guard", "no resource held; nothing to release");
                return ReleaseOutcome::NoHandle;
            }
            Err(err) => {
                warn!(target: "cloudram::guard", error = %err, "cannot read resource handle");
                return ReleaseOutcome::Skipped(err.into());
            }
        };

        let token = match self.gate.bearer_token().await {
            Ok(token) => token,
            Err(err) => {
                warn!(
                    target: "cloudram::guard",
                    resource_id = %handle.resource_id,
                    error = %err,
                    "skipping release; no session"
                );
                return ReleaseOutcome::Skipped(err.into());
            }
        };

        let api = Arc::clone(&self.api);
        let request = ReleaseRequest {
            vm_id: handle.resource_id.clone(),
        };
        let in_flight = tokio::spawn(async move { api.release(&token, &request).await });

        // The response may never arrive; the handle goes regardless.
        if let Err(err) = self.access.clear() {
            warn!(target: "cloudram::guard", error = %err, "failed to clear resource handle");
        }

        let result = match tokio::time::timeout(self.deadline, in_flight).await {
            Ok(Ok(Ok(status))) => Ok(status),
            Ok(Ok(Err(err))) => Err(ReleaseBestEffortFailed::Transport(err)),
            Ok(Err(join)) => Err(ReleaseBestEffortFailed::Aborted(join.to_string())),
            Err(_) => Err(ReleaseBestEffortFailed::DeadlineElapsed(self.deadline)),
        };

        match &result {
            Ok(status) => info!(
                target: "cloudram::guard",
                resource_id = %handle.resource_id,
                status = %status,
                "release sent"
            ),
            Err(err) => warn!(
                target: "cloudram::guard",
                resource_id = %handle.resource_id,
                error = %err,
                "release not confirmed"
            ),
        }

        ReleaseOutcome::Sent {
            resource_id: handle.resource_id,
            result,
        }
    }
}

/// Resolves when the user interrupts or the process is asked to stop.
pub async fn abandonment_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate()).ok();
        let mut hangup = signal(SignalKind::hangup()).ok();
        tokio::select! {
            _ = interrupt() => {}
            _ = next_signal(&mut terminate) => {}
            _ = next_signal(&mut hangup) => {}
        }
    }

    #[cfg(not(unix))]
    interrupt().await;
}

async fn interrupt() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(target: "cloudram::guard", error = %err, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn next_signal(signal: &mut Option<tokio::signal::unix::Signal>) {
    match signal {
        Some(signal) => {
            signal.recv().await;
        }
        None => std::future::pending::<()>().await,
    }
}

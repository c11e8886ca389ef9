//! Allocation controller: drives one RAM allocation from request through the
//! long provisioning wait to either an active resource or a recoverable
//! failure.

use std::sync::Arc;
use std::time::Duration;

use cloudram_sdk::{AllocateRequest, ProvisionError, ProvisioningApi, RamSize, ReleaseRequest};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::{NotAuthenticated, SessionGate};
use crate::handle::{HandleError, PersistedHandle, ResourceHandle};
use crate::view::{AllocationView, Screen, ViewRouter};

pub const PROVISIONING_MESSAGE: &str = "Processing... This may take 10-15 minutes.";
pub const DEFAULT_PROGRESS_LINGER: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Requesting,
    Succeeded,
    Failed,
}

#[derive(Debug, Error)]
pub enum AllocationError {
    #[error(transparent)]
    NotAuthenticated(#[from] NotAuthenticated),
    #[error(transparent)]
    ProvisioningFailed(#[from] ProvisionError),
    #[error("resource {resource_id} was allocated but could not be recorded locally: {source}")]
    HandlePersist {
        resource_id: String,
        #[source]
        source: HandleError,
    },
}

#[derive(Debug)]
pub enum AllocationOutcome {
    /// A request was already in flight; nothing happened.
    Busy,
    Allocated(ResourceHandle),
    Failed(AllocationError),
}

pub struct AllocationController {
    gate: Arc<dyn SessionGate>,
    api: Arc<dyn ProvisioningApi>,
    handle: PersistedHandle,
    view: Arc<dyn AllocationView>,
    router: Arc<dyn ViewRouter>,
    state: Mutex<ControllerState>,
    progress_linger: Duration,
    pending_hide: Mutex<Option<JoinHandle<()>>>,
}

/// Held across the provisioning await. If the request future is dropped
/// before an outcome is recorded, the controller falls back to `Failed`
/// with the control enabled again.
struct InFlight<'a> {
    controller: &'a AllocationController,
    settled: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        *self.controller.state.lock() = ControllerState::Failed;
        warn!(target: "cloudram::controller", "allocation request dropped before completing");
        self.controller.view.hide_progress();
        self.controller.view.set_control_enabled(true);
    }
}

impl AllocationController {
    pub fn new(
        gate: Arc<dyn SessionGate>,
        api: Arc<dyn ProvisioningApi>,
        handle: PersistedHandle,
        view: Arc<dyn AllocationView>,
        router: Arc<dyn ViewRouter>,
    ) -> Self {
        Self {
            gate,
            api,
            handle,
            view,
            router,
            state: Mutex::new(ControllerState::Idle),
            progress_linger: DEFAULT_PROGRESS_LINGER,
            pending_hide: Mutex::new(None),
        }
    }

    pub fn with_progress_linger(mut self, linger: Duration) -> Self {
        self.progress_linger = linger;
        self
    }

    pub fn state(&self) -> ControllerState {
        *self.state.lock()
    }

    /// Request a new allocation. Only one request runs at a time; a call made
    /// while another is in flight returns [`AllocationOutcome::Busy`].
    ///
    /// Failures are rendered through the view and leave the control enabled
    /// so the user can retry. A call after a success allocates again and
    /// overwrites the stored handle without releasing the earlier resource.
    pub async fn request_allocation(&self, ram_size: RamSize) -> AllocationOutcome {
        {
            let mut state = self.state.lock();
            if *state == ControllerState::Requesting {
                debug!(target: "cloudram::controller", "allocation already in flight; ignoring request");
                return AllocationOutcome::Busy;
            }
            *state = ControllerState::Requesting;
        }
        self.cancel_pending_hide();
        let mut in_flight = InFlight {
            controller: self,
            settled: false,
        };
        self.view.set_control_enabled(false);
        self.view.show_progress(PROVISIONING_MESSAGE);
        info!(target: "cloudram::controller", ram_gb = ram_size.get(), "requesting allocation");

        let outcome = match self.provision(ram_size).await {
            Ok(handle) => {
                *self.state.lock() = ControllerState::Succeeded;
                info!(
                    target: "cloudram::controller",
                    resource_id = %handle.resource_id,
                    resource_address = %handle.resource_address,
                    "allocation succeeded"
                );
                self.router.show(Screen::ActiveResource(handle.clone()));
                AllocationOutcome::Allocated(handle)
            }
            Err(err) => {
                *self.state.lock() = ControllerState::Failed;
                warn!(target: "cloudram::controller", error = %err, "allocation failed");
                self.view.show_error(&err.to_string());
                self.view.set_control_enabled(true);
                AllocationOutcome::Failed(err)
            }
        };
        in_flight.settled = true;

        self.schedule_progress_hide();
        outcome
    }

    async fn provision(&self, ram_size: RamSize) -> Result<ResourceHandle, AllocationError> {
        let token = self.gate.bearer_token().await?;
        let result = self
            .api
            .allocate(&token, &AllocateRequest { ram_size })
            .await?;
        let handle = ResourceHandle::from(result);

        if let Err(source) = self.handle.replace(&handle) {
            // Nothing local will ever release this resource; give it back now.
            warn!(
                target: "cloudram::controller",
                resource_id = %handle.resource_id,
                error = %source,
                "could not persist handle; releasing fresh resource"
            );
            let release = ReleaseRequest {
                vm_id: handle.resource_id.clone(),
            };
            if let Err(err) = self.api.release(&token, &release).await {
                warn!(target: "cloudram::controller", error = %err, "compensating release failed");
            }
            return Err(AllocationError::HandlePersist {
                resource_id: handle.resource_id,
                source,
            });
        }

        Ok(handle)
    }

    fn schedule_progress_hide(&self) {
        if self.progress_linger.is_zero() {
            self.view.hide_progress();
            return;
        }
        let view = Arc::clone(&self.view);
        let linger = self.progress_linger;
        let task = tokio::spawn(async move {
            tokio::time::sleep(linger).await;
            view.hide_progress();
        });
        if let Some(previous) = self.pending_hide.lock().replace(task) {
            previous.abort();
        }
    }

    // A timer left over from an earlier attempt must not hide a new one.
    fn cancel_pending_hide(&self) {
        if let Some(previous) = self.pending_hide.lock().take() {
            previous.abort();
        }
    }
}

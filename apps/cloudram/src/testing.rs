//! Fakes shared by the unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use cloudram_sdk::{
    AllocateRequest, AllocationResult, ProvisionError, ProvisioningApi, RamUsage, ReleaseRequest,
};
use parking_lot::Mutex;
use reqwest::StatusCode;
use tokio::sync::Notify;

use crate::auth::{Identity, NotAuthenticated, SessionGate};
use crate::handle::ResourceHandle;
use crate::view::{AllocationView, Screen, ViewRouter};

pub fn handle(id: &str, address: &str) -> ResourceHandle {
    ResourceHandle {
        resource_id: id.into(),
        resource_address: address.into(),
    }
}

pub struct FakeGate {
    token: Option<String>,
    token_calls: AtomicUsize,
}

impl FakeGate {
    pub fn signed_in(token: &str) -> Self {
        Self {
            token: Some(token.into()),
            token_calls: AtomicUsize::new(0),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            token: None,
            token_calls: AtomicUsize::new(0),
        }
    }

    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionGate for FakeGate {
    async fn current_identity(&self) -> Result<Identity, NotAuthenticated> {
        match &self.token {
            Some(_) => Ok(Identity {
                profile: "default".into(),
                subject: Some("sub-test".into()),
                email: None,
            }),
            None => Err(NotAuthenticated::new("signed out")),
        }
    }

    async fn bearer_token(&self) -> Result<String, NotAuthenticated> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        self.token
            .clone()
            .ok_or_else(|| NotAuthenticated::new("signed out"))
    }
}

#[derive(Debug, Clone)]
pub enum AllocateScript {
    Ok(ResourceHandle),
    Status(u16),
    Rejected(String),
}

#[derive(Debug, Clone, Copy)]
pub enum ReleaseScript {
    Status(u16),
    Fail,
    Hang,
}

pub struct FakeApi {
    allocate: Mutex<AllocateScript>,
    release: Mutex<ReleaseScript>,
    allocations: Mutex<Vec<(String, u32)>>,
    releases: Mutex<Vec<(String, String)>>,
    hold: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl FakeApi {
    pub fn new(allocate: AllocateScript) -> Self {
        Self {
            allocate: Mutex::new(allocate),
            release: Mutex::new(ReleaseScript::Status(200)),
            allocations: Mutex::new(Vec::new()),
            releases: Mutex::new(Vec::new()),
            hold: None,
        }
    }

    pub fn releasing(script: ReleaseScript) -> Self {
        let api = Self::new(AllocateScript::Status(500));
        *api.release.lock() = script;
        api
    }

    /// Park every allocate call until [`FakeApi::finish_allocate`].
    pub fn held(mut self) -> Self {
        self.hold = Some((Arc::new(Notify::new()), Arc::new(Notify::new())));
        self
    }

    pub async fn wait_for_allocate(&self) {
        if let Some((entered, _)) = &self.hold {
            entered.notified().await;
        }
    }

    pub fn finish_allocate(&self) {
        if let Some((_, proceed)) = &self.hold {
            proceed.notify_one();
        }
    }

    pub fn set_allocate(&self, script: AllocateScript) {
        *self.allocate.lock() = script;
    }

    pub fn allocate_count(&self) -> usize {
        self.allocations.lock().len()
    }

    pub fn allocate_tokens(&self) -> Vec<String> {
        self.allocations.lock().iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn allocate_sizes(&self) -> Vec<u32> {
        self.allocations.lock().iter().map(|(_, s)| *s).collect()
    }

    pub fn released(&self) -> Vec<(String, String)> {
        self.releases.lock().clone()
    }
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

#[async_trait]
impl ProvisioningApi for FakeApi {
    async fn allocate(
        &self,
        token: &str,
        request: &AllocateRequest,
    ) -> Result<AllocationResult, ProvisionError> {
        self.allocations
            .lock()
            .push((token.to_string(), request.ram_size.get()));
        if let Some((entered, proceed)) = &self.hold {
            entered.notify_one();
            proceed.notified().await;
        }
        let script = self.allocate.lock().clone();
        match script {
            AllocateScript::Ok(handle) => Ok(AllocationResult {
                resource_id: handle.resource_id,
                resource_address: handle.resource_address,
            }),
            AllocateScript::Status(code) => Err(ProvisionError::UnexpectedStatus {
                status: status(code),
                message: None,
            }),
            AllocateScript::Rejected(message) => Err(ProvisionError::Rejected(message)),
        }
    }

    async fn release(
        &self,
        token: &str,
        request: &ReleaseRequest,
    ) -> Result<StatusCode, ProvisionError> {
        self.releases
            .lock()
            .push((token.to_string(), request.vm_id.clone()));
        let script = *self.release.lock();
        match script {
            ReleaseScript::Status(code) => Ok(status(code)),
            ReleaseScript::Fail => Err(ProvisionError::MalformedResponse("connection reset".into())),
            ReleaseScript::Hang => std::future::pending().await,
        }
    }

    async fn ram_usage(&self, _token: &str, _vm_ip: &str) -> Result<RamUsage, ProvisionError> {
        Ok(RamUsage {
            total_ram: 8.0,
            used_ram: 2.0,
            available_ram: 6.0,
            percent_used: 25.0,
        })
    }

    async fn sync_notepad(&self, _token: &str, _vm_ip: &str) -> Result<String, ProvisionError> {
        Ok("Synced Notepad++ files".into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    Control(bool),
    Progress(String),
    Error(String),
    Hidden,
    Screen(Screen),
}

#[derive(Default)]
pub struct RecordingView {
    events: Mutex<Vec<ViewEvent>>,
}

impl RecordingView {
    pub fn events(&self) -> Vec<ViewEvent> {
        self.events.lock().clone()
    }
}

impl AllocationView for RecordingView {
    fn set_control_enabled(&self, enabled: bool) {
        self.events.lock().push(ViewEvent::Control(enabled));
    }

    fn show_progress(&self, message: &str) {
        self.events.lock().push(ViewEvent::Progress(message.into()));
    }

    fn show_error(&self, message: &str) {
        self.events.lock().push(ViewEvent::Error(message.into()));
    }

    fn hide_progress(&self) {
        self.events.lock().push(ViewEvent::Hidden);
    }
}

impl ViewRouter for RecordingView {
    fn show(&self, screen: Screen) {
        self.events.lock().push(ViewEvent::Screen(screen));
    }
}

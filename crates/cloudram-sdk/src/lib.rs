//! Asynchronous client for the CloudRAM provisioning backend.
//!
//! Consumed by the `cloudram` CLI and by tests. Callers hand in a fresh bearer
//! credential on every call; the client never stores one.

pub mod wire;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use url::Url;

pub use wire::{
    interpret_allocate, interpret_sync, AllocateRequest, AllocationResult, InvalidRamSize,
    RamSize, RamUsage, ReleaseRequest, SyncRequest, NOTEPAD_TASK,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),
    #[error("HTTP error! Status: {status}{}", message_suffix(.message))]
    UnexpectedStatus {
        status: StatusCode,
        message: Option<String>,
    },
    #[error("{0}")]
    Rejected(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

fn message_suffix(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|msg| format!(" ({msg})"))
        .unwrap_or_default()
}

/// Contract of the remote provisioning service.
#[async_trait]
pub trait ProvisioningApi: Send + Sync {
    async fn allocate(
        &self,
        token: &str,
        request: &AllocateRequest,
    ) -> Result<AllocationResult, ProvisionError>;

    /// Fire a release. The returned status is informational only.
    async fn release(
        &self,
        token: &str,
        request: &ReleaseRequest,
    ) -> Result<StatusCode, ProvisionError>;

    async fn ram_usage(&self, token: &str, vm_ip: &str) -> Result<RamUsage, ProvisionError>;

    /// Push the editor files open locally onto the machine at `vm_ip`.
    async fn sync_notepad(&self, token: &str, vm_ip: &str) -> Result<String, ProvisionError>;
}

#[derive(Debug, Clone)]
pub struct ProvisionClient {
    http: Client,
    base_url: Url,
}

impl ProvisionClient {
    /// Builds a client without an overall request timeout: provisioning a
    /// machine routinely takes 10-15 minutes.
    pub fn new(base_url: Url) -> Result<Self, ProvisionError> {
        let http = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Ok(Self::with_client(http, base_url))
    }

    pub fn with_client(http: Client, mut base_url: Url) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, ProvisionError> {
        self.base_url
            .join(path)
            .map_err(|err| ProvisionError::InvalidUrl(format!("{path}: {err}")))
    }
}

#[async_trait]
impl ProvisioningApi for ProvisionClient {
    async fn allocate(
        &self,
        token: &str,
        request: &AllocateRequest,
    ) -> Result<AllocationResult, ProvisionError> {
        let res = self
            .http
            .post(self.url("allocate")?)
            .bearer_auth(token)
            .json(request)
            .send()
            .await?;
        let status = res.status();
        let body = res.text().await?;
        interpret_allocate(status, &body)
    }

    async fn release(
        &self,
        token: &str,
        request: &ReleaseRequest,
    ) -> Result<StatusCode, ProvisionError> {
        let res = self
            .http
            .post(self.url("release_ram/")?)
            .bearer_auth(token)
            .json(request)
            .send()
            .await?;
        Ok(res.status())
    }

    async fn ram_usage(&self, token: &str, vm_ip: &str) -> Result<RamUsage, ProvisionError> {
        let mut url = self.url("ram_usage")?;
        url.query_pairs_mut().append_pair("vm_ip", vm_ip);
        let res = self.http.get(url).bearer_auth(token).send().await?;

        if res.status().is_success() {
            Ok(res.json::<RamUsage>().await?)
        } else {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            Err(ProvisionError::UnexpectedStatus {
                status,
                message: wire::error_message(&body),
            })
        }
    }

    async fn sync_notepad(&self, token: &str, vm_ip: &str) -> Result<String, ProvisionError> {
        let res = self
            .http
            .post(self.url("sync_notepad/")?)
            .bearer_auth(token)
            .json(&SyncRequest::notepad(vm_ip))
            .send()
            .await?;
        let status = res.status();
        let body = res.text().await?;
        interpret_sync(status, &body)
    }
}

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::ProvisionError;

/// Requested RAM in gigabytes. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RamSize(NonZeroU32);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("ram size must be a positive whole number of gigabytes, got '{0}'")]
pub struct InvalidRamSize(pub String);

impl RamSize {
    pub fn new(gigabytes: u32) -> Option<Self> {
        NonZeroU32::new(gigabytes).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl FromStr for RamSize {
    type Err = InvalidRamSize;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        raw.trim()
            .parse::<u32>()
            .ok()
            .and_then(RamSize::new)
            .ok_or_else(|| InvalidRamSize(raw.to_string()))
    }
}

impl fmt::Display for RamSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} GB", self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AllocateRequest {
    pub ram_size: RamSize,
}

/// Release payload. The backend names the identifier `vm_id` here.
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseRequest {
    pub vm_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub resource_id: String,
    pub resource_address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RamUsage {
    #[serde(default)]
    pub total_ram: f64,
    #[serde(default)]
    pub used_ram: f64,
    #[serde(default)]
    pub available_ram: f64,
    #[serde(default)]
    pub percent_used: f64,
}

/// Editor whose open files the backend syncs onto the machine.
pub const NOTEPAD_TASK: &str = "notepad++.exe";

/// `/sync_notepad/` payload.
#[derive(Debug, Clone, Serialize)]
pub struct SyncRequest {
    pub task_name: String,
    pub vm_ip: String,
}

impl SyncRequest {
    pub fn notepad(vm_ip: impl Into<String>) -> Self {
        Self {
            task_name: NOTEPAD_TASK.to_string(),
            vm_ip: vm_ip.into(),
        }
    }
}

// The deployed backend answers with `vm_id`/`ip`; newer builds use the
// descriptive names. Either or both may be present; descriptive names win.
#[derive(Debug, Default, Deserialize)]
struct AllocateBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    resource_id: Option<String>,
    #[serde(default)]
    resource_address: Option<String>,
    #[serde(default)]
    vm_id: Option<String>,
    #[serde(default)]
    ip: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MessageBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

pub(crate) fn error_message(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    parsed.error.or(parsed.detail)
}

/// Classify an `/allocate` response. Non-2xx statuses and bodies carrying an
/// `error` field are both failures.
pub fn interpret_allocate(status: StatusCode, body: &str) -> Result<AllocationResult, ProvisionError> {
    if !status.is_success() {
        return Err(ProvisionError::UnexpectedStatus {
            status,
            message: error_message(body),
        });
    }

    let parsed: AllocateBody = serde_json::from_str(body)
        .map_err(|err| ProvisionError::MalformedResponse(err.to_string()))?;

    if let Some(error) = parsed.error {
        return Err(ProvisionError::Rejected(error));
    }

    match (
        parsed.resource_id.or(parsed.vm_id),
        parsed.resource_address.or(parsed.ip),
    ) {
        (Some(resource_id), Some(resource_address)) => Ok(AllocationResult {
            resource_id,
            resource_address,
        }),
        _ => Err(ProvisionError::MalformedResponse(
            "response is missing the resource id or address".into(),
        )),
    }
}

/// Classify a `/sync_notepad/` response and return the backend's message.
pub fn interpret_sync(status: StatusCode, body: &str) -> Result<String, ProvisionError> {
    if !status.is_success() {
        return Err(ProvisionError::UnexpectedStatus {
            status,
            message: error_message(body),
        });
    }

    let parsed: MessageBody = serde_json::from_str(body)
        .map_err(|err| ProvisionError::MalformedResponse(err.to_string()))?;
    if let Some(error) = parsed.error {
        return Err(ProvisionError::Rejected(error));
    }
    Ok(parsed.message.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ram_size_rejects_zero_and_garbage() {
        assert_eq!("4".parse::<RamSize>().unwrap().get(), 4);
        assert_eq!(" 16 ".parse::<RamSize>().unwrap().get(), 16);
        assert!("0".parse::<RamSize>().is_err());
        assert!("-2".parse::<RamSize>().is_err());
        assert!("four".parse::<RamSize>().is_err());
        assert!("".parse::<RamSize>().is_err());
    }

    #[test]
    fn ram_size_serializes_as_plain_integer() {
        let body = AllocateRequest {
            ram_size: RamSize::new(8).unwrap(),
        };
        assert_eq!(serde_json::to_string(&body).unwrap(), r#"{"ram_size":8}"#);
    }

    #[test]
    fn accepts_backend_field_names() {
        let result =
            interpret_allocate(StatusCode::OK, r#"{"vm_id":"i-0abc","ip":"10.0.0.5"}"#).unwrap();
        assert_eq!(result.resource_id, "i-0abc");
        assert_eq!(result.resource_address, "10.0.0.5");
    }

    #[test]
    fn accepts_descriptive_field_names() {
        let result = interpret_allocate(
            StatusCode::OK,
            r#"{"resource_id":"vm-123","resource_address":"10.0.0.9"}"#,
        )
        .unwrap();
        assert_eq!(result.resource_id, "vm-123");
        assert_eq!(result.resource_address, "10.0.0.9");
    }

    #[test]
    fn body_with_both_spellings_decodes() {
        let result = interpret_allocate(
            StatusCode::OK,
            r#"{"vm_id":"i-0abc","ip":"10.0.0.5","resource_id":"i-0abc","resource_address":"10.0.0.5"}"#,
        )
        .unwrap();
        assert_eq!(result.resource_id, "i-0abc");
        assert_eq!(result.resource_address, "10.0.0.5");

        let mixed =
            interpret_allocate(StatusCode::OK, r#"{"vm_id":"i-7","resource_address":"10.0.0.7"}"#)
                .unwrap();
        assert_eq!(mixed.resource_id, "i-7");
        assert_eq!(mixed.resource_address, "10.0.0.7");
    }

    #[test]
    fn sync_returns_backend_message() {
        let message =
            interpret_sync(StatusCode::OK, r#"{"message":"Synced Notepad++ files"}"#).unwrap();
        assert_eq!(message, "Synced Notepad++ files");

        let err = interpret_sync(StatusCode::BAD_REQUEST, r#"{"error":"VM IP is required"}"#)
            .unwrap_err();
        assert_eq!(err.to_string(), "HTTP error! Status: 400 Bad Request (VM IP is required)");

        let err = interpret_sync(StatusCode::OK, r#"{"error":"Sync failed"}"#).unwrap_err();
        assert!(matches!(err, ProvisionError::Rejected(ref msg) if msg == "Sync failed"));
    }

    #[test]
    fn sync_request_names_the_editor_task() {
        let body = serde_json::to_value(SyncRequest::notepad("10.0.0.5")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "task_name": "notepad++.exe", "vm_ip": "10.0.0.5" })
        );
    }

    #[test]
    fn error_payload_on_success_status_is_rejection() {
        let err = interpret_allocate(StatusCode::OK, r#"{"error":"no capacity"}"#).unwrap_err();
        assert!(matches!(err, ProvisionError::Rejected(ref msg) if msg == "no capacity"));
    }

    #[test]
    fn server_error_keeps_status_and_message() {
        let err = interpret_allocate(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"error":"Failed to allocate RAM","details":"boom"}"#,
        )
        .unwrap_err();
        match err {
            ProvisionError::UnexpectedStatus { status, message } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(message.as_deref(), Some("Failed to allocate RAM"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn fastapi_detail_is_used_when_error_missing() {
        let err = interpret_allocate(StatusCode::UNAUTHORIZED, r#"{"detail":"Invalid token"}"#)
            .unwrap_err();
        assert_eq!(err.to_string(), "HTTP error! Status: 401 Unauthorized (Invalid token)");
    }

    #[test]
    fn missing_fields_are_malformed() {
        let err = interpret_allocate(StatusCode::OK, r#"{"vm_id":"i-1"}"#).unwrap_err();
        assert!(matches!(err, ProvisionError::MalformedResponse(_)));
        let err = interpret_allocate(StatusCode::OK, "<html>").unwrap_err();
        assert!(matches!(err, ProvisionError::MalformedResponse(_)));
    }
}

//! Durable record of the resource currently held by this user.
//!
//! At most one handle exists at a time. The allocation controller owns the
//! [`PersistedHandle`] and overwrites it on every successful allocation; the
//! release guard only ever receives a [`ReleaseAccess`], which can read and
//! clear but never write.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cloudram_sdk::AllocationResult;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stored under the same keys the web client used (`vm_id`, `vm_ip`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHandle {
    #[serde(rename = "vm_id")]
    pub resource_id: String,
    #[serde(rename = "vm_ip")]
    pub resource_address: String,
}

impl From<AllocationResult> for ResourceHandle {
    fn from(result: AllocationResult) -> Self {
        Self {
            resource_id: result.resource_id,
            resource_address: result.resource_address,
        }
    }
}

#[derive(Debug, Error)]
pub enum HandleError {
    #[error("io error on {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("corrupt resource handle {path:?}: {message}")]
    Corrupt { path: PathBuf, message: String },
    #[error("failed to encode resource handle: {0}")]
    Encode(String),
}

pub trait HandleStore: Send + Sync {
    fn load(&self) -> Result<Option<ResourceHandle>, HandleError>;
    fn save(&self, handle: &ResourceHandle) -> Result<(), HandleError>;
    /// Removing an absent handle succeeds.
    fn clear(&self) -> Result<(), HandleError>;
}

/// TOML file, replaced atomically on every write.
#[derive(Debug, Clone)]
pub struct FileHandleStore {
    path: PathBuf,
}

impl FileHandleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: io::Error) -> HandleError {
        HandleError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl HandleStore for FileHandleStore {
    fn load(&self) -> Result<Option<ResourceHandle>, HandleError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.io_err(err)),
        };
        toml::from_str(&raw)
            .map(Some)
            .map_err(|err| HandleError::Corrupt {
                path: self.path.clone(),
                message: err.to_string(),
            })
    }

    fn save(&self, handle: &ResourceHandle) -> Result<(), HandleError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| self.io_err(err))?;
        }

        let serialized =
            toml::to_string_pretty(handle).map_err(|err| HandleError::Encode(err.to_string()))?;
        let staging = self.path.with_extension("toml.tmp");
        let mut options = OpenOptions::new();
        options.create(true).write(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&staging).map_err(|err| self.io_err(err))?;
        file.write_all(serialized.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|err| self.io_err(err))?;
        fs::rename(&staging, &self.path).map_err(|err| self.io_err(err))
    }

    fn clear(&self) -> Result<(), HandleError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(self.io_err(err)),
        }
    }
}

/// In-memory adapter for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryHandleStore {
    slot: Mutex<Option<ResourceHandle>>,
}

impl InMemoryHandleStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_handle(handle: ResourceHandle) -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(Some(handle)),
        })
    }
}

impl HandleStore for InMemoryHandleStore {
    fn load(&self) -> Result<Option<ResourceHandle>, HandleError> {
        Ok(self.slot.lock().clone())
    }

    fn save(&self, handle: &ResourceHandle) -> Result<(), HandleError> {
        *self.slot.lock() = Some(handle.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), HandleError> {
        self.slot.lock().take();
        Ok(())
    }
}

/// Write side of the handle, owned by the allocation controller.
#[derive(Clone)]
pub struct PersistedHandle {
    store: Arc<dyn HandleStore>,
}

impl PersistedHandle {
    pub fn new(store: Arc<dyn HandleStore>) -> Self {
        Self { store }
    }

    /// Overwrite whatever handle is stored. The previous resource, if any, is
    /// not released here.
    pub fn replace(&self, handle: &ResourceHandle) -> Result<(), HandleError> {
        match self.store.load() {
            Ok(Some(previous)) if previous.resource_id != handle.resource_id => {
                tracing::warn!(
                    target: "cloudram::handle",
                    previous = %previous.resource_id,
                    next = %handle.resource_id,
                    "superseding a resource handle that was never released"
                );
            }
            Err(err) => {
                tracing::debug!(target: "cloudram::handle", error = %err, "previous handle unreadable");
            }
            _ => {}
        }
        self.store.save(handle)
    }

    pub fn current(&self) -> Result<Option<ResourceHandle>, HandleError> {
        self.store.load()
    }

    pub fn release_access(&self) -> ReleaseAccess {
        ReleaseAccess {
            store: Arc::clone(&self.store),
        }
    }
}

/// Read-then-clear capability granted to the release guard.
#[derive(Clone)]
pub struct ReleaseAccess {
    store: Arc<dyn HandleStore>,
}

impl ReleaseAccess {
    pub fn read(&self) -> Result<Option<ResourceHandle>, HandleError> {
        self.store.load()
    }

    pub fn clear(&self) -> Result<(), HandleError> {
        self.store.clear()
    }
}

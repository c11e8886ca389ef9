use std::sync::Arc;

use cloudram_sdk::{ProvisionClient, ProvisioningApi};
use tracing::debug;

use crate::auth::config::AuthConfig;
use crate::auth::{ProfileSessionGate, SessionGate};
use crate::config::ClientConfig;
use crate::controller::AllocationController;
use crate::guard::ReleaseGuard;
use crate::handle::{FileHandleStore, PersistedHandle};
use crate::terminal::cli::{self, Command};
use crate::terminal::error::CliError;
use crate::terminal::{allocate, auth};
use crate::view::{AllocationView, ViewRouter};

/// Collaborators shared by the resource commands.
pub struct Services {
    pub config: ClientConfig,
    pub gate: Arc<dyn SessionGate>,
    pub api: Arc<dyn ProvisioningApi>,
    pub handle: PersistedHandle,
}

impl Services {
    pub fn from_config(config: ClientConfig, profile: Option<String>) -> Result<Self, CliError> {
        let auth_config = match AuthConfig::from_env() {
            Ok(auth_config) => Some(auth_config),
            Err(err) => {
                debug!(target: "cloudram::auth", error = %err, "token refresh unavailable");
                None
            }
        };
        let gate = ProfileSessionGate::new(config.credentials_path(), profile, auth_config);
        let api = ProvisionClient::new(config.api_url.clone())?;
        let handle = PersistedHandle::new(Arc::new(FileHandleStore::new(config.handle_path())));

        Ok(Self {
            config,
            gate: Arc::new(gate),
            api: Arc::new(api),
            handle,
        })
    }

    pub fn controller<V>(&self, view: Arc<V>) -> AllocationController
    where
        V: AllocationView + ViewRouter + 'static,
    {
        AllocationController::new(
            Arc::clone(&self.gate),
            Arc::clone(&self.api),
            self.handle.clone(),
            view.clone(),
            view,
        )
        .with_progress_linger(self.config.progress_linger)
    }

    pub fn guard(&self) -> ReleaseGuard {
        ReleaseGuard::new(
            Arc::clone(&self.gate),
            Arc::clone(&self.api),
            self.handle.release_access(),
        )
        .with_deadline(self.config.release_deadline)
    }
}

pub async fn run(cli: cli::Cli) -> Result<(), CliError> {
    let config = ClientConfig::from_env()?.with_api_url(cli.api_url.as_deref())?;

    match cli.command {
        Command::Auth(command) => auth::run(command, &config, cli.profile).await,
        Command::Allocate(args) => {
            let services = Services::from_config(config, cli.profile)?;
            allocate::allocate(&services, args).await
        }
        Command::Release => {
            let services = Services::from_config(config, cli.profile)?;
            allocate::release(&services).await
        }
        Command::Status => {
            let services = Services::from_config(config, cli.profile)?;
            allocate::status(&services).await
        }
        Command::Sync => {
            let services = Services::from_config(config, cli.profile)?;
            allocate::sync(&services).await
        }
    }
}

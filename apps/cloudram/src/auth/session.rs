//! The session gate: the single place privileged operations obtain an identity
//! and a bearer credential from.
//!
//! Implementations must consult the identity source on every call. Callers
//! never hold on to a token between operations because the provider may have
//! revoked or rotated it in the meantime.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::auth::config::AuthConfig;
use crate::auth::credentials::{CredentialsStore, StoredProfile};
use crate::auth::error::AuthError;
use crate::auth::gate::IdentityGatewayClient;
use crate::auth::{active_profile_name, persist_profile_update};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub profile: String,
    pub subject: Option<String>,
    pub email: Option<String>,
}

impl Identity {
    pub fn display_name(&self) -> &str {
        self.email
            .as_deref()
            .or(self.subject.as_deref())
            .unwrap_or(&self.profile)
    }
}

/// Every gate failure collapses into this one classification.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("not authenticated: {reason}")]
pub struct NotAuthenticated {
    pub reason: String,
}

impl NotAuthenticated {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<AuthError> for NotAuthenticated {
    fn from(err: AuthError) -> Self {
        tracing::debug!(target: "cloudram::auth", error = %err, "session unavailable");
        NotAuthenticated::new(err.to_string())
    }
}

#[async_trait]
pub trait SessionGate: Send + Sync {
    async fn current_identity(&self) -> Result<Identity, NotAuthenticated>;

    async fn bearer_token(&self) -> Result<String, NotAuthenticated>;
}

/// Gate backed by the on-disk credential store, refreshing through the
/// identity gateway when the cached access token is close to expiry.
#[derive(Debug, Clone)]
pub struct ProfileSessionGate {
    store_path: PathBuf,
    profile: Option<String>,
    config: Option<AuthConfig>,
}

impl ProfileSessionGate {
    pub fn new(store_path: PathBuf, profile: Option<String>, config: Option<AuthConfig>) -> Self {
        Self {
            store_path,
            profile,
            config,
        }
    }

    async fn fresh_profile(&self) -> Result<(String, StoredProfile), AuthError> {
        let mut store = CredentialsStore::load(&self.store_path)?;
        let name = active_profile_name(&store, self.profile.as_deref())?;
        let profile = store
            .profile(&name)
            .cloned()
            .ok_or_else(|| AuthError::ProfileNotFound(name.clone()))?;

        if profile.usable_access_token().is_some() {
            return Ok((name, profile));
        }

        let config = self.config.clone().ok_or(AuthError::GatewayNotConfigured)?;
        let client = IdentityGatewayClient::new(config)?;
        let refresh_token = profile.refresh_token()?;
        let tokens = client.refresh_tokens(&refresh_token).await?;
        persist_profile_update(&self.store_path, &mut store, &name, &tokens, client.config())?;
        tracing::debug!(target: "cloudram::auth", profile = %name, "refreshed access token");

        let updated = store
            .profile(&name)
            .cloned()
            .ok_or_else(|| AuthError::ProfileNotFound(name.clone()))?;
        Ok((name, updated))
    }
}

#[async_trait]
impl SessionGate for ProfileSessionGate {
    async fn current_identity(&self) -> Result<Identity, NotAuthenticated> {
        let (name, profile) = self.fresh_profile().await?;
        Ok(Identity {
            profile: name,
            subject: profile.subject,
            email: profile.email,
        })
    }

    async fn bearer_token(&self) -> Result<String, NotAuthenticated> {
        let (_, profile) = self.fresh_profile().await?;
        profile
            .usable_access_token()
            .map(str::to_string)
            .ok_or_else(|| NotAuthenticated::new("gateway returned an unusable access token"))
    }
}

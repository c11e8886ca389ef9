pub mod config;
pub mod credentials;
pub mod error;
pub mod gate;
pub mod session;

use crate::auth::config::AuthConfig;
use crate::auth::credentials::{CredentialsStore, RefreshTokenRecord, StoredProfile};
use crate::auth::error::AuthError;
use crate::auth::gate::{DeviceStartResponse, IdentityGatewayClient, TokenResponse};
use std::path::Path;

pub use session::{Identity, NotAuthenticated, ProfileSessionGate, SessionGate};

/// Resolve which stored profile a command acts on: explicit override first,
/// then the store's current profile.
pub fn active_profile_name(
    store: &CredentialsStore,
    profile_override: Option<&str>,
) -> Result<String, AuthError> {
    if let Some(override_name) = profile_override {
        let trimmed = override_name.trim();
        if !trimmed.is_empty() {
            if store.profile(trimmed).is_some() {
                return Ok(trimmed.to_string());
            }
            return Err(AuthError::ProfileNotFound(trimmed.to_string()));
        }
    }

    store.current_profile.clone().ok_or(AuthError::NotLoggedIn)
}

pub fn persist_profile_update(
    path: &Path,
    store: &mut CredentialsStore,
    profile_name: &str,
    tokens: &TokenResponse,
    config: &AuthConfig,
) -> Result<(), AuthError> {
    let existing = store.profile(profile_name).cloned();

    let refresh = match (&tokens.refresh_token, &existing) {
        (Some(token), _) => {
            RefreshTokenRecord::write(profile_name, &config.gateway, token, config.use_keyring)?
        }
        (None, Some(profile)) => profile.refresh.clone(),
        (None, None) => return Err(AuthError::MissingRefreshToken),
    };

    let mut profile = existing.unwrap_or_else(|| StoredProfile {
        issuer: config.gateway.to_string(),
        subject: None,
        email: None,
        refresh: refresh.clone(),
        access_token: None,
        updated_at: time::OffsetDateTime::now_utc(),
    });

    profile.refresh = refresh;
    if tokens.subject.is_some() {
        profile.subject = tokens.subject.clone();
    }
    if tokens.email.is_some() {
        profile.email = tokens.email.clone();
    }
    profile.cache_access_token(tokens.access_token.clone(), tokens.access_token_expires_in);
    profile.issuer = config.gateway.to_string();

    store.upsert_profile(profile_name.to_string(), profile, false);
    store.save(path)?;
    Ok(())
}

pub async fn perform_device_login(
    config: AuthConfig,
) -> Result<(DeviceStartResponse, IdentityGatewayClient), AuthError> {
    let client = IdentityGatewayClient::new(config)?;
    let start = client.start_device_flow().await?;
    Ok((start, client))
}

pub async fn complete_device_login(
    path: &Path,
    profile_name: &str,
    client: &IdentityGatewayClient,
    device_code: &str,
) -> Result<TokenResponse, AuthError> {
    let tokens = client.finish_device_flow(device_code).await?;
    let mut store = CredentialsStore::load(path)?;
    persist_profile_update(path, &mut store, profile_name, &tokens, client.config())?;
    Ok(tokens)
}

pub fn profile_exists(path: &Path, profile_name: &str) -> Result<bool, AuthError> {
    let store = CredentialsStore::load(path)?;
    Ok(store.profile(profile_name).is_some())
}

pub fn set_current_profile(path: &Path, profile_name: Option<String>) -> Result<(), AuthError> {
    let mut store = CredentialsStore::load(path)?;
    store.set_current_profile(profile_name)?;
    store.save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn tokens(refresh: Option<&str>) -> TokenResponse {
        TokenResponse {
            access_token: "access".into(),
            access_token_expires_in: 3600,
            refresh_token: refresh.map(str::to_string),
            subject: Some("sub-42".into()),
            email: Some("grace@example.com".into()),
        }
    }

    fn config() -> AuthConfig {
        AuthConfig::for_gateway(Url::parse("https://auth.example.com/").unwrap())
    }

    #[test]
    fn override_must_exist() {
        let store = CredentialsStore::default();
        assert!(matches!(
            active_profile_name(&store, Some("work")),
            Err(AuthError::ProfileNotFound(_))
        ));
        assert!(matches!(
            active_profile_name(&store, None),
            Err(AuthError::NotLoggedIn)
        ));
    }

    #[test]
    fn first_login_creates_current_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials");
        let mut store = CredentialsStore::load(&path).unwrap();
        persist_profile_update(&path, &mut store, "default", &tokens(Some("r1")), &config())
            .unwrap();

        let reloaded = CredentialsStore::load(&path).unwrap();
        assert_eq!(active_profile_name(&reloaded, None).unwrap(), "default");
        let profile = reloaded.profile("default").unwrap();
        assert_eq!(profile.email.as_deref(), Some("grace@example.com"));
        assert_eq!(profile.usable_access_token(), Some("access"));
        assert_eq!(profile.refresh_token().unwrap(), "r1");
    }

    #[test]
    fn refresh_without_rotation_keeps_previous_refresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials");
        let mut store = CredentialsStore::default();
        persist_profile_update(&path, &mut store, "default", &tokens(Some("r1")), &config())
            .unwrap();
        persist_profile_update(&path, &mut store, "default", &tokens(None), &config()).unwrap();
        assert_eq!(
            store.profile("default").unwrap().refresh_token().unwrap(),
            "r1"
        );
    }

    #[test]
    fn new_profile_without_refresh_token_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials");
        let mut store = CredentialsStore::default();
        assert!(matches!(
            persist_profile_update(&path, &mut store, "default", &tokens(None), &config()),
            Err(AuthError::MissingRefreshToken)
        ));
    }
}

use crate::auth::error::AuthError;
use std::env;
use url::Url;

const DEFAULT_SCOPE: &str = "openid email profile";

/// Identity gateway settings. Deployments that front a different provider
/// only change these values.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub gateway: Url,
    pub client_id: Option<String>,
    pub scope: Option<String>,
    pub use_keyring: bool,
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, AuthError> {
        let gateway = env::var("CLOUDRAM_AUTH_GATEWAY")
            .map_err(|_| AuthError::GatewayNotConfigured)?;
        let gateway = parse_gateway(&gateway)?;

        let client_id = env::var("CLOUDRAM_AUTH_CLIENT_ID")
            .ok()
            .filter(|s| !s.trim().is_empty());
        let scope = env::var("CLOUDRAM_AUTH_SCOPE")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| Some(DEFAULT_SCOPE.to_string()));
        let use_keyring = env::var("CLOUDRAM_AUTH_KEYRING")
            .map(|value| {
                !matches!(
                    value.trim().to_ascii_lowercase().as_str(),
                    "0" | "false" | "no" | "off"
                )
            })
            .unwrap_or(true);

        Ok(Self {
            gateway,
            client_id,
            scope,
            use_keyring,
        })
    }

    pub fn for_gateway(gateway: Url) -> Self {
        Self {
            gateway,
            client_id: None,
            scope: Some(DEFAULT_SCOPE.to_string()),
            use_keyring: false,
        }
    }
}

// `Url::join` drops the last path segment unless it ends with a slash.
fn parse_gateway(raw: &str) -> Result<Url, AuthError> {
    let mut gateway = Url::parse(raw)
        .map_err(|err| AuthError::Config(format!("invalid CLOUDRAM_AUTH_GATEWAY: {err}")))?;
    if !gateway.path().ends_with('/') {
        let path = format!("{}/", gateway.path());
        gateway.set_path(&path);
    }
    Ok(gateway)
}

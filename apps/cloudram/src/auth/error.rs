use std::io;
use thiserror::Error;

/// Failures while signing in or producing a bearer credential for the
/// provisioning backend.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid sign-in configuration: {0}")]
    Config(String),
    #[error("CLOUDRAM_AUTH_GATEWAY is not set; the identity gateway is unreachable")]
    GatewayNotConfigured,
    #[error("credential store i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("credential store is unreadable: {0}")]
    CredentialsFormat(String),
    #[error("identity gateway request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("identity gateway error: {0}")]
    Gateway(String),
    #[error("OS keyring unavailable: {0}")]
    Keyring(String),
    #[error("not signed in to CloudRAM; run `cloudram auth login`")]
    NotLoggedIn,
    #[error("profile '{0}' not found")]
    ProfileNotFound(String),
    #[error("stored refresh token was rejected; run `cloudram auth login` again")]
    RefreshRejected,
    #[error("identity gateway did not issue a refresh token for a new profile")]
    MissingRefreshToken,
    #[error("authorization is still pending")]
    AuthorizationPending,
    #[error("device authorization was denied or has expired")]
    AuthorizationDenied,
}

impl From<toml::de::Error> for AuthError {
    fn from(value: toml::de::Error) -> Self {
        AuthError::CredentialsFormat(value.to_string())
    }
}

impl From<toml::ser::Error> for AuthError {
    fn from(value: toml::ser::Error) -> Self {
        AuthError::CredentialsFormat(value.to_string())
    }
}

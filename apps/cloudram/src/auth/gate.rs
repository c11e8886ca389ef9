use crate::auth::config::AuthConfig;
use crate::auth::error::AuthError;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// HTTP client for the identity gateway that issues and refreshes bearer
/// credentials.
#[derive(Debug, Clone)]
pub struct IdentityGatewayClient {
    client: Client,
    config: AuthConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DeviceStartResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default)]
    pub verification_uri_complete: Option<String>,
    pub expires_in: u64,
    pub interval: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TokenResponse {
    pub access_token: String,
    pub access_token_expires_in: u64,
    /// Refresh responses may omit this when the gateway does not rotate.
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    detail: Option<String>,
}

impl IdentityGatewayClient {
    pub fn new(config: AuthConfig) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| AuthError::Config(err.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    fn url(&self, path: &str) -> Result<Url, AuthError> {
        self.config
            .gateway
            .join(path)
            .map_err(|err| AuthError::Config(format!("invalid auth gateway path '{path}': {err}")))
    }

    pub async fn start_device_flow(&self) -> Result<DeviceStartResponse, AuthError> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct RequestBody {
            client_id: Option<String>,
            scope: Option<String>,
        }

        let url = self.url("device/start")?;
        let body = RequestBody {
            client_id: self.config.client_id.clone(),
            scope: self.config.scope.clone(),
        };

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await?
            .error_for_status()
            .map_err(AuthError::from)?;

        Ok(response.json().await?)
    }

    pub async fn finish_device_flow(&self, device_code: &str) -> Result<TokenResponse, AuthError> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct RequestBody<'a> {
            device_code: &'a str,
        }

        let url = self.url("device/finish")?;
        let response = self
            .client
            .post(url)
            .json(&RequestBody { device_code })
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(response.json().await?);
        }

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let err_body = parse_error_body(&text);

        if let Some(err) = classify_device_error(status, &err_body) {
            return Err(err);
        }

        Err(AuthError::Gateway(format!(
            "device finish failed ({status}): {}",
            err_body
                .detail
                .or(err_body.error)
                .unwrap_or_else(|| "unknown error".into())
        )))
    }

    pub async fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct RefreshRequest<'a> {
            refresh_token: &'a str,
            client_id: Option<&'a str>,
        }

        let url = self.url("token/refresh")?;
        let response = self
            .client
            .post(url)
            .json(&RefreshRequest {
                refresh_token,
                client_id: self.config.client_id.as_deref(),
            })
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(response.json().await?);
        }

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(AuthError::RefreshRejected);
        }

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let err_body = parse_error_body(&text);

        Err(AuthError::Gateway(format!(
            "token refresh failed ({status}): {}",
            err_body
                .detail
                .or(err_body.error)
                .unwrap_or_else(|| "unknown error".into())
        )))
    }
}

fn parse_error_body(text: &str) -> ErrorBody {
    serde_json::from_str(text).unwrap_or(ErrorBody {
        error: None,
        detail: Some(text.to_string()),
    })
}

fn classify_device_error(status: StatusCode, body: &ErrorBody) -> Option<AuthError> {
    if status == StatusCode::BAD_REQUEST || status == StatusCode::BAD_GATEWAY {
        let reason = body.error.as_deref().or(body.detail.as_deref())?;
        if reason.contains("authorization_pending") || reason.contains("slow_down") {
            return Some(AuthError::AuthorizationPending);
        }
        if reason.contains("access_denied") || reason.contains("expired_token") {
            return Some(AuthError::AuthorizationDenied);
        }
    }

    if status == StatusCode::UNAUTHORIZED {
        return Some(AuthError::AuthorizationDenied);
    }

    None
}

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use directories::BaseDirs;
use thiserror::Error;
use url::Url;

use crate::controller::DEFAULT_PROGRESS_LINGER;
use crate::guard::DEFAULT_RELEASE_DEADLINE;

const DEFAULT_API_URL: &str = "http://127.0.0.1:5000/";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {var}: {message}")]
    Invalid { var: &'static str, message: String },
    #[error("unable to determine home directory")]
    NoHome,
}

/// CloudRAM client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the provisioning frontend (`/allocate`, `/release_ram/`)
    pub api_url: Url,
    /// Directory holding credentials and the resource handle
    pub home: PathBuf,
    pub progress_linger: Duration,
    pub release_deadline: Duration,
}

impl ClientConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = match env::var("CLOUDRAM_API_URL") {
            Ok(raw) if !raw.trim().is_empty() => parse_api_url(&raw)?,
            _ => parse_api_url(DEFAULT_API_URL)?,
        };

        let home = match env::var("CLOUDRAM_HOME") {
            Ok(raw) if !raw.trim().is_empty() => PathBuf::from(raw),
            _ => BaseDirs::new()
                .ok_or(ConfigError::NoHome)?
                .home_dir()
                .join(".cloudram"),
        };

        Ok(Self {
            api_url,
            home,
            progress_linger: millis_var("CLOUDRAM_PROGRESS_LINGER_MS", DEFAULT_PROGRESS_LINGER)?,
            release_deadline: millis_var("CLOUDRAM_RELEASE_DEADLINE_MS", DEFAULT_RELEASE_DEADLINE)?,
        })
    }

    pub fn with_api_url(mut self, raw: Option<&str>) -> Result<Self, ConfigError> {
        if let Some(raw) = raw.filter(|raw| !raw.trim().is_empty()) {
            self.api_url = parse_api_url(raw)?;
        }
        Ok(self)
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.home.join("credentials")
    }

    pub fn handle_path(&self) -> PathBuf {
        self.home.join("resource.toml")
    }
}

fn parse_api_url(raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw.trim()).map_err(|err| ConfigError::Invalid {
        var: "CLOUDRAM_API_URL",
        message: err.to_string(),
    })
}

fn millis_var(var: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|err| ConfigError::Invalid {
                var,
                message: err.to_string(),
            }),
        _ => Ok(default),
    }
}

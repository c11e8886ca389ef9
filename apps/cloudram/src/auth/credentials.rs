use crate::auth::error::AuthError;
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use time::{Duration, OffsetDateTime};
use url::Url;

const KEYRING_SERVICE: &str = "cloudram-auth";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenCache {
    pub token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RefreshTokenRecord {
    Keyring { service: String, account: String },
    Inline { token: String },
}

impl RefreshTokenRecord {
    pub fn read(&self) -> Result<String, AuthError> {
        match self {
            RefreshTokenRecord::Keyring { service, account } => {
                let entry = Entry::new(service, account)
                    .map_err(|err| AuthError::Keyring(err.to_string()))?;
                entry
                    .get_password()
                    .map_err(|err| AuthError::Keyring(err.to_string()))
            }
            RefreshTokenRecord::Inline { token } => Ok(token.clone()),
        }
    }

    pub fn write(
        profile: &str,
        gateway: &Url,
        token: &str,
        use_keyring: bool,
    ) -> Result<Self, AuthError> {
        if !use_keyring {
            return Ok(RefreshTokenRecord::Inline {
                token: token.to_string(),
            });
        }

        let host = gateway.host_str().unwrap_or("cloudram");
        let account = format!("{profile}@{host}");
        let stored = Entry::new(KEYRING_SERVICE, &account)
            .and_then(|entry| entry.set_password(token));
        match stored {
            Ok(()) => Ok(RefreshTokenRecord::Keyring {
                service: KEYRING_SERVICE.to_string(),
                account,
            }),
            Err(err) => {
                tracing::warn!(
                    target: "cloudram::auth",
                    error = %err,
                    "keyring unavailable; storing refresh token in the credentials file"
                );
                Ok(RefreshTokenRecord::Inline {
                    token: token.to_string(),
                })
            }
        }
    }

    pub fn delete(&self) {
        if let RefreshTokenRecord::Keyring { service, account } = self {
            if let Ok(entry) = Entry::new(service, account) {
                if let Err(err) = entry.delete_password() {
                    tracing::warn!(
                        target: "cloudram::auth",
                        error = %err,
                        service = %service,
                        account = %account,
                        "failed to delete keyring entry"
                    );
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredProfile {
    pub issuer: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub refresh: RefreshTokenRecord,
    #[serde(default)]
    pub access_token: Option<AccessTokenCache>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl StoredProfile {
    pub fn refresh_token(&self) -> Result<String, AuthError> {
        self.refresh.read()
    }

    pub fn cache_access_token(&mut self, token: String, expires_in_seconds: u64) {
        let expires_at = OffsetDateTime::now_utc() + Duration::seconds(expires_in_seconds as i64);
        self.access_token = Some(AccessTokenCache { token, expires_at });
        self.updated_at = OffsetDateTime::now_utc();
    }

    /// The cached access token, if it has enough life left to be sent.
    pub fn usable_access_token(&self) -> Option<&str> {
        self.access_token
            .as_ref()
            .filter(|cache| access_token_is_valid(cache))
            .map(|cache| cache.token.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CredentialsStore {
    #[serde(default)]
    pub current_profile: Option<String>,
    #[serde(default)]
    pub profiles: HashMap<String, StoredProfile>,
}

impl CredentialsStore {
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        if !path.exists() {
            return Ok(CredentialsStore::default());
        }

        let raw = fs::read_to_string(path)?;
        let mut store: CredentialsStore = toml::from_str(&raw)?;
        store.compact();
        Ok(store)
    }

    pub fn save(&self, path: &Path) -> Result<(), AuthError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let serialized = toml::to_string_pretty(self)?;
        let mut options = OpenOptions::new();
        options.create(true).write(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path)?;
        file.write_all(serialized.as_bytes())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = file.metadata()?;
            let mut perms = metadata.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(path, perms)?;
        }
        Ok(())
    }

    pub fn profile_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn profile(&self, name: &str) -> Option<&StoredProfile> {
        self.profiles.get(name)
    }

    pub fn upsert_profile(&mut self, name: String, profile: StoredProfile, set_current: bool) {
        self.profiles.insert(name.clone(), profile);
        if set_current || self.current_profile.is_none() {
            self.current_profile = Some(name);
        }
    }

    pub fn remove_profile(&mut self, name: &str) -> Option<StoredProfile> {
        let removed = self.profiles.remove(name);
        if let Some(removed_profile) = &removed {
            removed_profile.refresh.delete();
        }
        if self.current_profile.as_deref() == Some(name) {
            self.current_profile = self.profile_names().into_iter().next();
        }
        removed
    }

    pub fn set_current_profile(&mut self, name: Option<String>) -> Result<(), AuthError> {
        if let Some(name_ref) = name.as_ref() {
            if !self.profiles.contains_key(name_ref) {
                return Err(AuthError::ProfileNotFound(name_ref.clone()));
            }
        }
        self.current_profile = name;
        Ok(())
    }

    pub fn compact(&mut self) {
        if let Some(current) = self.current_profile.clone() {
            if !self.profiles.contains_key(&current) {
                self.current_profile = self.profile_names().into_iter().next();
            }
        }
    }
}

/// Tokens this close to expiry are refreshed rather than sent.
pub const ACCESS_TOKEN_GRACE: Duration = Duration::seconds(30);

pub fn access_token_is_valid(entry: &AccessTokenCache) -> bool {
    entry.expires_at > OffsetDateTime::now_utc() + ACCESS_TOKEN_GRACE
}

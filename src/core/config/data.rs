use crate::auth::{CredentialBackend, FileBackend, KeyringBackend, SessionSettings};
use crate::core::config::io::ConfigError;
use crate::utils::url::validate_base_url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const API_URL_KEY: &str = "api-url";
pub const BACKEND_KEY: &str = "credential-backend";
pub const CREDENTIALS_PATH_KEY: &str = "credentials-path";
pub const TIMEOUT_KEY: &str = "request-timeout";

pub const CONFIG_KEYS: &[&str] = &[API_URL_KEY, BACKEND_KEY, CREDENTIALS_PATH_KEY, TIMEOUT_KEY];

/// Where the credential pair is persisted.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackendKind {
    #[default]
    Keyring,
    File,
}

impl fmt::Display for CredentialBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialBackendKind::Keyring => write!(f, "keyring"),
            CredentialBackendKind::File => write!(f, "file"),
        }
    }
}

impl FromStr for CredentialBackendKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keyring" => Ok(CredentialBackendKind::Keyring),
            "file" => Ok(CredentialBackendKind::File),
            other => Err(format!(
                "unknown credential backend '{other}' (expected 'keyring' or 'file')"
            )),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Root that request paths such as `/login` and `/refresh` are joined to
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub credential_backend: CredentialBackendKind,
    /// Credentials file used by the `file` backend
    pub credentials_path: Option<PathBuf>,
    /// Per-request timeout applied by the HTTP client
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    /// Picks the API root: an explicit override wins over the config file.
    pub fn resolve_api_base_url(&self, override_url: Option<&str>) -> Result<String, ConfigError> {
        let candidate = override_url
            .filter(|url| !url.trim().is_empty())
            .or(self.api_base_url.as_deref())
            .ok_or(ConfigError::MissingApiUrl)?;
        validate_base_url(candidate)
    }

    pub fn session_settings(
        &self,
        override_url: Option<&str>,
    ) -> Result<SessionSettings, ConfigError> {
        let mut settings = SessionSettings::new(self.resolve_api_base_url(override_url)?);
        settings.timeout = self
            .request_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        Ok(settings)
    }

    pub fn credentials_file(&self) -> Result<PathBuf, ConfigError> {
        match &self.credentials_path {
            Some(path) => Ok(path.clone()),
            None => Self::default_credentials_path(),
        }
    }

    pub fn build_backend(&self) -> Result<Box<dyn CredentialBackend>, ConfigError> {
        match self.credential_backend {
            CredentialBackendKind::Keyring => Ok(Box::new(KeyringBackend::new())),
            CredentialBackendKind::File => Ok(Box::new(FileBackend::new(self.credentials_file()?))),
        }
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        match key {
            API_URL_KEY => {
                self.api_base_url = Some(validate_base_url(value)?);
            }
            BACKEND_KEY => {
                self.credential_backend = value.parse().map_err(invalid)?;
            }
            CREDENTIALS_PATH_KEY => {
                if value.trim().is_empty() {
                    return Err(invalid("path cannot be empty".to_string()));
                }
                self.credentials_path = Some(PathBuf::from(value.trim()));
            }
            TIMEOUT_KEY => {
                let secs = value
                    .trim()
                    .parse::<u64>()
                    .map_err(|err| invalid(format!("expected whole seconds: {err}")))?;
                self.request_timeout_secs = Some(secs);
            }
            other => return Err(ConfigError::UnknownKey(other.to_string())),
        }
        Ok(())
    }

    pub fn unset_value(&mut self, key: &str) -> Result<(), ConfigError> {
        match key {
            API_URL_KEY => self.api_base_url = None,
            BACKEND_KEY => self.credential_backend = CredentialBackendKind::default(),
            CREDENTIALS_PATH_KEY => self.credentials_path = None,
            TIMEOUT_KEY => self.request_timeout_secs = None,
            other => return Err(ConfigError::UnknownKey(other.to_string())),
        }
        Ok(())
    }
}

pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

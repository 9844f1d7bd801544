use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::get_config_path;
use crate::error::{Error, Result};

/// Long-lived secrets for one ecobee developer app.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub authorization_code: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    pub fn has_tokens(&self) -> bool {
        !self.access_token.is_empty() && !self.refresh_token.is_empty()
    }

    pub(crate) fn clear_tokens(&mut self) {
        self.access_token.clear();
        self.refresh_token.clear();
    }
}

fn redact(secret: &str) -> String {
    match secret.chars().count() {
        0 => "<empty>".to_string(),
        n if n <= 4 => "****".to_string(),
        _ => format!("{}****", secret.chars().take(4).collect::<String>()),
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &redact(&self.api_key))
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("authorization_code", &redact(&self.authorization_code))
            .finish()
    }
}

/// Somewhere to keep [`Credentials`] between runs.
///
/// Implementations only move data in and out. Retry and recovery belong to
/// the token manager, which treats a failed save as a warning.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Option<Credentials>>;
    fn save(&self, credentials: &Credentials) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Keeps credentials in memory only. Useful for tests and for hosts that
/// persist them through their own preference store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    credentials: Mutex<Option<Credentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            credentials: Mutex::new(Some(credentials)),
        }
    }

    /// Last saved value, if any.
    pub fn current(&self) -> Option<Credentials> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Credentials>> {
        // A poisoned lock still holds a complete value; keep using it.
        self.credentials
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<Credentials>> {
        Ok(self.lock().clone())
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        *self.lock() = Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.lock() = None;
        Ok(())
    }
}

/// Stores credentials as YAML, by default in `~/.ecobee.yml`.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_location() -> Result<Self> {
        Ok(Self::new(get_config_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<Credentials>> {
        if !self.path.exists() {
            debug!("No credentials file at {}", self.path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            Error::Config(format!(
                "Failed to read credentials file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let credentials: Credentials = serde_yaml::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse credentials file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        debug!("Loaded credentials from {}", self.path.display());
        Ok(Some(credentials))
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        let content = serde_yaml::to_string(credentials)?;

        fs::write(&self.path, content).map_err(|e| {
            Error::Config(format!(
                "Failed to write credentials file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        debug!("Saved credentials to {}", self.path.display());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
            debug!("Credentials file cleared");
        } else {
            warn!("Credentials file does not exist, nothing to clear");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Credentials {
        Credentials {
            api_key: "key123".to_string(),
            access_token: "access123".to_string(),
            refresh_token: "refresh456".to_string(),
            authorization_code: String::new(),
        }
    }

    #[test]
    fn test_credentials_serialization() {
        let yaml = serde_yaml::to_string(&sample()).unwrap();
        assert!(yaml.contains("api_key: key123"));
        assert!(yaml.contains("access_token: access123"));
        assert!(yaml.contains("refresh_token: refresh456"));
    }

    #[test]
    fn test_partial_file_loads_with_empty_tokens() {
        let credentials: Credentials = serde_yaml::from_str("api_key: key123\n").unwrap();
        assert_eq!(credentials.api_key, "key123");
        assert!(!credentials.has_tokens());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let printed = format!("{:?}", sample());
        assert!(!printed.contains("access123"));
        assert!(printed.contains("acce****"));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryCredentialStore::new();
        assert!(store.load().unwrap().is_none());
        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), Some(sample()));
        store.clear().unwrap();
        assert!(store.current().is_none());
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("ecobee.yml"));

        assert!(store.load().unwrap().is_none());
        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), Some(sample()));

        store.clear().unwrap();
        assert!(!store.path().exists());
        store.clear().unwrap();
    }

    #[test]
    fn test_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecobee.yml");
        fs::write(&path, "- not\n- a mapping\n").unwrap();

        let store = FileCredentialStore::new(path);
        assert!(matches!(store.load(), Err(Error::Config(_))));
    }
}

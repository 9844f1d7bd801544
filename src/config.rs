use dirs::home_dir;
use log::debug;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.ecobee.com";
pub const DEFAULT_CACHE_TTL_SECS: u64 = 180;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Settings for an [`EcobeeClient`](crate::EcobeeClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// How long a fetched thermostat list is served without asking the API again.
    pub cache_ttl: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden by `ECOBEE_API_URL`, `ECOBEE_CACHE_TTL_SECS` and
    /// `ECOBEE_REQUEST_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("ECOBEE_API_URL") {
            if !url.trim().is_empty() {
                config.base_url = url.trim().trim_end_matches('/').to_string();
            }
        }
        if let Some(secs) = env_secs("ECOBEE_CACHE_TTL_SECS")? {
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_secs("ECOBEE_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }

        debug!(
            "Client config: base_url={}, cache_ttl={}s, request_timeout={}s",
            config.base_url,
            config.cache_ttl.as_secs(),
            config.request_timeout.as_secs()
        );
        Ok(config)
    }
}

fn env_secs(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} must be a whole number of seconds", name))),
        _ => Ok(None),
    }
}

/// Get the path to the credentials file (~/.ecobee.yml)
pub fn get_config_path() -> Result<PathBuf> {
    let home = home_dir()
        .ok_or_else(|| Error::Config("Failed to determine home directory".to_string()))?;
    Ok(home.join(".ecobee.yml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "https://api.ecobee.com");
        assert_eq!(config.cache_ttl, Duration::from_secs(180));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_with_base_url_keeps_defaults() {
        let config = ClientConfig::with_base_url("http://127.0.0.1:9999");
        assert_eq!(config.base_url, "http://127.0.0.1:9999");
        assert_eq!(config.cache_ttl, Duration::from_secs(180));
    }

    #[test]
    fn test_config_path_file_name() {
        if let Ok(path) = get_config_path() {
            assert!(path.ends_with(".ecobee.yml"));
        }
    }
}

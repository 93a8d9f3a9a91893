//! Client configuration
//!
//! Loads connection settings from `urbanease.toml`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::channel::ReconnectPolicy;

/// Default configuration file name
pub const CONFIG_FILE: &str = "urbanease.toml";

/// Errors that can occur during config operations
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Realtime client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Origin of the dashboard page; the socket follows its scheme and host
    pub origin: String,
    /// Subscriber identity; "anonymous" when unset
    pub user_id: Option<String>,
    /// Delay before reconnecting after a lost connection
    pub reconnect_delay_ms: u64,
    /// Retry when the socket cannot even be constructed
    pub retry_on_connect_failure: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:8000".to_string(),
            user_id: None,
            reconnect_delay_ms: 5000,
            retry_on_connect_failure: true,
        }
    }
}

impl ClientConfig {
    /// Load configuration from a file, falling back to defaults if it is missing
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.origin.trim().is_empty() {
            return Err(ConfigError::Invalid("origin cannot be empty".to_string()));
        }
        if self.reconnect_delay_ms == 0 {
            return Err(ConfigError::Invalid(
                "reconnect_delay_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Override the origin
    pub fn with_origin(mut self, origin: Option<String>) -> Self {
        if let Some(origin) = origin {
            self.origin = origin;
        }
        self
    }

    /// Override the subscriber identity
    pub fn with_user_id(mut self, user_id: Option<String>) -> Self {
        if user_id.is_some() {
            self.user_id = user_id;
        }
        self
    }

    /// Reconnect policy described by this config
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            delay: Duration::from_millis(self.reconnect_delay_ms),
            retry_on_connect_failure: self.retry_on_connect_failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.origin, "http://localhost:8000");
        assert!(config.user_id.is_none());
        assert_eq!(config.reconnect_policy(), ReconnectPolicy::default());
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let dir = tempdir().unwrap();
        let config = ClientConfig::load(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_load_partial_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            "origin = \"https://city.example.org\"\nuser_id = \"citizen-9\"\n",
        )
        .unwrap();

        let config = ClientConfig::load(&path).unwrap();
        assert_eq!(config.origin, "https://city.example.org");
        assert_eq!(config.user_id.as_deref(), Some("citizen-9"));
        assert_eq!(config.reconnect_delay_ms, 5000);
        assert!(config.retry_on_connect_failure);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let config = ClientConfig {
            origin: "https://urbanease.example.org".to_string(),
            user_id: Some("42".to_string()),
            reconnect_delay_ms: 2500,
            retry_on_connect_failure: false,
        };
        config.save(&path).unwrap();

        let loaded = ClientConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.reconnect_policy().delay, Duration::from_millis(2500));
    }

    #[test]
    fn test_parse_invalid_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "origin = [unclosed").unwrap();

        let result = ClientConfig::load(&path);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_zero_delay_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "reconnect_delay_ms = 0\n").unwrap();

        let result = ClientConfig::load(&path);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_overrides() {
        let config = ClientConfig::default()
            .with_origin(Some("https://a.example.org".to_string()))
            .with_user_id(None);
        assert_eq!(config.origin, "https://a.example.org");
        assert!(config.user_id.is_none());

        let config = config.with_origin(None).with_user_id(Some("7".to_string()));
        assert_eq!(config.origin, "https://a.example.org");
        assert_eq!(config.user_id.as_deref(), Some("7"));
    }
}

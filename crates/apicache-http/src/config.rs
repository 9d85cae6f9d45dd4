//! Transport configuration.
//!
//! Configuration is stored at `~/.config/apicache/config.json` (or the
//! platform equivalent) and can be overridden per field from the environment:
//! `APICACHE_SCHEME`, `APICACHE_HOST`, `APICACHE_PORT`, `APICACHE_USERNAME`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::client::{Options, DEFAULT_MAX_RESPONSE_SIZE, DEFAULT_TIMEOUT_SECS};
use crate::endpoint::{Endpoint, Scheme};

/// Application name used for config directory paths
const APP_NAME: &str = "apicache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const ENV_SCHEME: &str = "APICACHE_SCHEME";
pub const ENV_HOST: &str = "APICACHE_HOST";
pub const ENV_PORT: &str = "APICACHE_PORT";
pub const ENV_USERNAME: &str = "APICACHE_USERNAME";
pub const ENV_PASSWORD: &str = "APICACHE_PASSWORD";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid APICACHE_SCHEME value: {0}")]
    InvalidScheme(String),

    #[error("Invalid APICACHE_PORT value: {0}")]
    InvalidPort(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    pub base_path: Vec<String>,
    pub username: Option<String>,
    pub timeout_secs: u64,
    pub max_response_size: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            scheme: Scheme::Http,
            host: "localhost".to_string(),
            port: 8080,
            base_path: Vec::new(),
            username: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
        }
    }
}

impl HttpConfig {
    /// Load the config file (defaults if absent), then apply environment
    /// overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file()?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_file() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Override fields from variables found by `lookup`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(scheme) = lookup(ENV_SCHEME) {
            self.scheme = scheme
                .parse()
                .map_err(|_| ConfigError::InvalidScheme(scheme))?;
        }
        if let Some(host) = lookup(ENV_HOST) {
            self.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(port))?;
        }
        if let Some(username) = lookup(ENV_USERNAME) {
            self.username = Some(username).filter(|name| !name.is_empty());
        }
        Ok(())
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.scheme, self.host.clone(), self.port).with_path(self.base_path.clone())
    }

    pub fn options(&self) -> Options {
        Options {
            timeout: Duration::from_secs(self.timeout_secs),
            max_response_size: self.max_response_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_overrides_apply() {
        let mut config = HttpConfig::default();
        config
            .apply_overrides(env(&[
                (ENV_SCHEME, "https"),
                (ENV_HOST, "api.example.com"),
                (ENV_PORT, "443"),
                (ENV_USERNAME, "alice"),
            ]))
            .expect("valid overrides");

        assert_eq!(config.scheme, Scheme::Https);
        assert_eq!(config.host, "api.example.com");
        assert_eq!(config.port, 443);
        assert_eq!(config.username.as_deref(), Some("alice"));
    }

    #[test]
    fn test_invalid_overrides() {
        let mut config = HttpConfig::default();
        assert_eq!(
            config.apply_overrides(env(&[(ENV_PORT, "eighty")])),
            Err(ConfigError::InvalidPort("eighty".into()))
        );
        assert_eq!(
            config.apply_overrides(env(&[(ENV_SCHEME, "gopher")])),
            Err(ConfigError::InvalidScheme("gopher".into()))
        );
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: HttpConfig =
            serde_json::from_str(r#"{ "host": "example.org", "scheme": "https" }"#).expect("parse");
        assert_eq!(config.host, "example.org");
        assert_eq!(config.scheme, Scheme::Https);
        assert_eq!(config.port, 8080);
        assert_eq!(config.options(), Options::default());
    }

    #[test]
    fn test_endpoint_from_config() {
        let config = HttpConfig {
            base_path: vec!["v1".into()],
            ..HttpConfig::default()
        };
        let endpoint = config.endpoint();
        assert_eq!(endpoint.host, "localhost");
        assert_eq!(endpoint.path, vec!["v1"]);
    }
}

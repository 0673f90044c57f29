//! Client configuration
//!
//! ## Configuration Sources (in precedence order)
//!
//! 1. Command-line flags (applied by the CLI)
//! 2. Environment variables (`HUB_BASE`, `HUB_TOKEN`, ...)
//! 3. `--config <path>` or `~/.config/hubreg/config.yaml`
//! 4. Built-in defaults
//!
//! ```yaml
//! hub_base: http://127.0.0.1:7300
//! index_url: https://example.com/matrix/index.json
//! entity_uid: mcp_server:hello-sse-server@0.1.0
//! retry:
//!   attempts: 3
//!   initial_delay_secs: 2
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{HubError, Result};
use crate::retry::RetryPolicy;
use crate::uid::EntityUid;

pub const ENV_HUB_BASE: &str = "HUB_BASE";
pub const ENV_HUB_TOKEN: &str = "HUB_TOKEN";
pub const ENV_INDEX_URL: &str = "HUB_INDEX_URL";
pub const ENV_MANIFEST_URL: &str = "HUB_MANIFEST_URL";
pub const ENV_ENTITY_UID: &str = "HUB_ENTITY_UID";

/// Default hub address
pub const DEFAULT_HUB_BASE: &str = "http://127.0.0.1:7300";

/// Everything one invocation needs to know
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Hub address as supplied (normalized later by the locator)
    pub hub_base: String,

    /// Bearer token for authenticated calls
    pub token: Option<String>,

    /// Remote index to register and ingest
    pub index_url: Option<String>,

    /// Manifest to install directly
    pub manifest_url: Option<String>,

    /// Entity to install (`type:id@version`)
    pub entity_uid: Option<String>,

    /// Install target passed to the hub
    pub install_target: String,

    /// Timeout for health, route and auth probes
    pub probe_timeout_secs: u64,

    /// Timeout for document downloads and registration calls
    pub transfer_timeout_secs: u64,

    pub retry: RetrySettings,
}

/// Retry settings for the ingest and install stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub attempts: u32,
    pub initial_delay_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay_secs: 2,
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            hub_base: DEFAULT_HUB_BASE.to_string(),
            token: None,
            index_url: None,
            manifest_url: None,
            entity_uid: None,
            install_target: "./".to_string(),
            probe_timeout_secs: 5,
            transfer_timeout_secs: 30,
            retry: RetrySettings::default(),
        }
    }
}

impl HubConfig {
    /// Load file config (explicit path or default location), then apply the environment
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match explicit_path {
            Some(path) => Self::load_from_path(path)?,
            None => match Self::default_config_path() {
                Some(path) if path.exists() => Self::load_from_path(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HubError::Usage(format!("Failed to read config {}: {e}", path.display()))
        })?;

        let config: Self = serde_yaml_ng::from_str(&content).map_err(|e| {
            HubError::Usage(format!("Failed to parse config {}: {e}", path.display()))
        })?;

        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Default config file location
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "hubreg", "hubreg")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Override fields from environment variables; empty values are ignored
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(base) = read(ENV_HUB_BASE) {
            self.hub_base = base;
        }
        if let Some(token) = read(ENV_HUB_TOKEN) {
            self.token = Some(token);
        }
        if let Some(url) = read(ENV_INDEX_URL) {
            self.index_url = Some(url);
        }
        if let Some(url) = read(ENV_MANIFEST_URL) {
            self.manifest_url = Some(url);
        }
        if let Some(uid) = read(ENV_ENTITY_UID) {
            self.entity_uid = Some(uid);
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.attempts,
            Duration::from_secs(self.retry.initial_delay_secs),
        )
    }

    /// Parsed entity UID, if one is configured
    pub fn entity_uid(&self) -> Result<Option<EntityUid>> {
        self.entity_uid
            .as_deref()
            .map(|raw| raw.parse::<EntityUid>().map_err(HubError::from))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = HubConfig::default();
        assert_eq!(config.hub_base, "http://127.0.0.1:7300");
        assert_eq!(config.install_target, "./");
        assert_eq!(config.probe_timeout(), Duration::from_secs(5));
        assert_eq!(
            config.retry_policy(),
            RetryPolicy::new(3, Duration::from_secs(2))
        );
    }

    #[test]
    fn test_load_partial_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "hub_base: 0.0.0.0:9000\nindex_url: https://host/matrix/index.json\nretry:\n  attempts: 5\n",
        )
        .unwrap();

        let config = HubConfig::load_from_path(&path).unwrap();
        assert_eq!(config.hub_base, "0.0.0.0:9000");
        assert_eq!(
            config.index_url.as_deref(),
            Some("https://host/matrix/index.json")
        );
        assert_eq!(config.retry.attempts, 5);
        assert_eq!(config.retry.initial_delay_secs, 2);
        assert_eq!(config.transfer_timeout_secs, 30);
    }

    #[test]
    fn test_missing_explicit_file_is_usage_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = HubConfig::load(Some(&temp_dir.path().join("absent.yaml"))).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_malformed_yaml_is_usage_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(&path, "retry: [not, a, map").unwrap();

        assert!(matches!(
            HubConfig::load_from_path(&path),
            Err(HubError::Usage(_))
        ));
    }

    #[test]
    fn test_env_overrides_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_HUB_BASE, "http://hub:7300"),
            (ENV_HUB_TOKEN, "secret"),
            (ENV_ENTITY_UID, "tool:hello@0.1.0"),
            (ENV_INDEX_URL, "  "),
        ]);

        let mut config = HubConfig {
            index_url: Some("https://from-file/index.json".to_string()),
            ..HubConfig::default()
        };
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.hub_base, "http://hub:7300");
        assert_eq!(config.token.as_deref(), Some("secret"));
        assert_eq!(
            config.index_url.as_deref(),
            Some("https://from-file/index.json")
        );
        assert_eq!(
            config.entity_uid().unwrap(),
            Some(EntityUid::new("tool", "hello", "0.1.0"))
        );
    }

    #[test]
    fn test_invalid_uid_surfaces_as_error() {
        let config = HubConfig {
            entity_uid: Some("not-a-uid".to_string()),
            ..HubConfig::default()
        };
        assert!(matches!(
            config.entity_uid(),
            Err(HubError::InvalidUid(_))
        ));
    }
}

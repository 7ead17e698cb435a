//! Application configuration management.
//!
//! Configuration is read from `~/.config/tokenwarden/config.json` when present
//! and then overridden by `TOKENWARDEN_*` environment variables, so a `.env`
//! file is enough to run without a config file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::{ExpiryPolicy, ProviderEndpoints};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "tokenwarden";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Prefix for environment overrides
const ENV_PREFIX: &str = "TOKENWARDEN_";

const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/calendar";
const DEFAULT_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_DEVICE_ENDPOINT: &str = "https://oauth2.googleapis.com/device/code";
const DEFAULT_INTROSPECTION_ENDPOINT: &str = "https://oauth2.googleapis.com/tokeninfo";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub scope: String,
    pub token_endpoint: String,
    pub device_endpoint: String,
    /// Empty disables validation at mount.
    pub introspection_endpoint: String,
    pub lifetime_secs: u64,
    pub warning_lead_secs: u64,
    pub idle_window_secs: u64,
    /// Credential to mount with, usually only set from the environment.
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            scope: DEFAULT_SCOPE.to_string(),
            token_endpoint: DEFAULT_TOKEN_ENDPOINT.to_string(),
            device_endpoint: DEFAULT_DEVICE_ENDPOINT.to_string(),
            introspection_endpoint: DEFAULT_INTROSPECTION_ENDPOINT.to_string(),
            lifetime_secs: 60 * 60,
            warning_lead_secs: 5 * 60,
            idle_window_secs: 3 * 60,
            access_token: None,
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    /// Override fields from `TOKENWARDEN_*` variables looked up through `var`.
    pub fn apply_env<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| var(&format!("{}{}", ENV_PREFIX, name));
        let seconds = |name: &str| -> Result<Option<u64>> {
            match get(name) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map(Some)
                    .with_context(|| format!("{}{} must be a number of seconds", ENV_PREFIX, name)),
                None => Ok(None),
            }
        };

        if let Some(v) = get("CLIENT_ID") {
            self.client_id = v;
        }
        if let Some(v) = get("CLIENT_SECRET") {
            self.client_secret = Some(v).filter(|s| !s.is_empty());
        }
        if let Some(v) = get("SCOPE") {
            self.scope = v;
        }
        if let Some(v) = get("TOKEN_ENDPOINT") {
            self.token_endpoint = v;
        }
        if let Some(v) = get("DEVICE_ENDPOINT") {
            self.device_endpoint = v;
        }
        if let Some(v) = get("INTROSPECTION_ENDPOINT") {
            self.introspection_endpoint = v;
        }
        if let Some(v) = seconds("LIFETIME_SECS")? {
            self.lifetime_secs = v;
        }
        if let Some(v) = seconds("WARNING_LEAD_SECS")? {
            self.warning_lead_secs = v;
        }
        if let Some(v) = seconds("IDLE_WINDOW_SECS")? {
            self.idle_window_secs = v;
        }
        if let Some(v) = get("ACCESS_TOKEN") {
            self.access_token = Some(v).filter(|s| !s.is_empty());
        }
        Ok(())
    }

    pub fn expiry_policy(&self) -> Result<ExpiryPolicy> {
        let lifetime = i64::try_from(self.lifetime_secs).context("lifetime_secs is too large")?;
        let lead = i64::try_from(self.warning_lead_secs).context("warning_lead_secs is too large")?;
        ExpiryPolicy::new(chrono::Duration::seconds(lifetime), chrono::Duration::seconds(lead))
    }

    pub fn idle_window(&self) -> Duration {
        Duration::from_secs(self.idle_window_secs)
    }

    pub fn provider_endpoints(&self) -> ProviderEndpoints {
        ProviderEndpoints {
            token: Some(self.token_endpoint.clone()).filter(|s| !s.is_empty()),
            device: Some(self.device_endpoint.clone()).filter(|s| !s.is_empty()),
        }
    }

    pub fn introspection_endpoint(&self) -> Option<&str> {
        Some(self.introspection_endpoint.as_str()).filter(|s| !s.is_empty())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for the log file.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}

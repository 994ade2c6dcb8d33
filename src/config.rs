//! Configuration types for the editor bridge.

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for the editor bridge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Embedded editor boundary settings.
    pub embed: EmbedConfig,
    /// RPC deadlines and delays.
    pub timeouts: TimeoutsConfig,
    /// Backend REST API settings.
    pub api: ApiConfig,
    /// Project defaults.
    pub project: ProjectConfig,
}

/// Embedded editor boundary configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    /// The only origin frames are accepted from and sent to.
    pub expected_origin: String,
    /// Diagnostic event broadcast capacity.
    pub event_capacity: usize,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            expected_origin: "http://localhost:8601".to_owned(),
            event_capacity: 128,
        }
    }
}

/// RPC deadlines, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub title_ms: u64,
    pub export_ms: u64,
    pub thumbnail_ms: u64,
    /// Delay between a readiness signal and the session push it schedules.
    pub session_push_delay_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            title_ms: 2000,
            export_ms: 5000,
            thumbnail_ms: 3000,
            session_push_delay_ms: 300,
        }
    }
}

impl TimeoutsConfig {
    #[must_use]
    pub fn title(&self) -> Duration {
        Duration::from_millis(self.title_ms)
    }

    #[must_use]
    pub fn export(&self) -> Duration {
        Duration::from_millis(self.export_ms)
    }

    #[must_use]
    pub fn thumbnail(&self) -> Duration {
        Duration::from_millis(self.thumbnail_ms)
    }

    #[must_use]
    pub fn session_push_delay(&self) -> Duration {
        Duration::from_millis(self.session_push_delay_ms)
    }
}

/// Backend REST API configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    /// Bearer token sent with every request (None = cookie/anonymous).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_owned(),
            request_timeout_secs: 15,
            bearer_token: None,
        }
    }
}

impl ApiConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Project defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Title shown when a project has none.
    pub placeholder_title: String,
    /// Directory for exported project files.
    pub export_dir: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            placeholder_title: crate::host::title::DEFAULT_PLACEHOLDER_TITLE.to_owned(),
            export_dir: PathBuf::from("."),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| BridgeError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| BridgeError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config dir>/editor-bridge/config.toml`.
    ///
    /// The directory can be overridden with `EDITOR_BRIDGE_CONFIG_DIR`.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        if let Some(override_dir) = std::env::var_os("EDITOR_BRIDGE_CONFIG_DIR") {
            return PathBuf::from(override_dir).join("config.toml");
        }
        dirs::config_dir()
            .map(|d| d.join("editor-bridge"))
            .unwrap_or_else(|| PathBuf::from("/tmp/editor-bridge-config"))
            .join("config.toml")
    }

    /// Check values that would make the bridge misbehave at runtime.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.embed.expected_origin.trim().is_empty() {
            return Err(BridgeError::Config(
                "embed.expected_origin must not be empty".into(),
            ));
        }
        let timeouts = [
            ("timeouts.title_ms", self.timeouts.title_ms),
            ("timeouts.export_ms", self.timeouts.export_ms),
            ("timeouts.thumbnail_ms", self.timeouts.thumbnail_ms),
            ("api.request_timeout_secs", self.api.request_timeout_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, value)| *value == 0) {
            return Err(BridgeError::Config(format!("{name} must be greater than 0")));
        }
        url::Url::parse(&self.api.base_url)
            .map_err(|e| BridgeError::Config(format!("api.base_url is invalid: {e}")))?;
        Ok(())
    }
}

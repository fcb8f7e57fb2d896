use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/api/v1";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 1000;
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Parley client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParleyConfig {
    /// Base URL of the chat API, without the `chat/` route
    pub api_url: String,
    pub request_timeout_ms: u64,
    pub max_message_chars: usize,
    pub history_capacity: usize,
    /// Where interactive sessions write their log
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
    pub server: ServerConfig,
}

/// Settings for the local echo backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub rate_limit_per_minute: u32,
}

impl Default for ParleyConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            max_message_chars: DEFAULT_MAX_MESSAGE_CHARS,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            log_path: None,
            server: ServerConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            rate_limit_per_minute: 60,
        }
    }
}

impl ParleyConfig {
    /// Get config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Cannot find config directory"))?
            .join("parley");
        Ok(config_dir.join("config.json"))
    }

    /// Load configuration from the default location, falling back to defaults
    pub async fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit file; `.toml` files are parsed as TOML, anything else as JSON
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(&content)
                .with_context(|| format!("failed to parse TOML config {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("failed to parse config {}", path.display()))?
        };
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Apply `PARLEY_*` environment overrides
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("PARLEY_API_URL").filter(|v| !v.is_empty()) {
            self.api_url = url;
        }
        if let Some(timeout) = lookup("PARLEY_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.request_timeout_ms = timeout;
        }
        if let Some(path) = lookup("PARLEY_LOG_PATH").filter(|v| !v.is_empty()) {
            self.log_path = Some(PathBuf::from(path));
        }
    }

    /// Full URL of the chat route
    pub fn chat_endpoint(&self) -> String {
        format!("{}/chat/", self.api_url.trim_end_matches('/'))
    }

    pub fn log_path_or_default(&self) -> PathBuf {
        self.log_path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("parley.log"))
    }
}

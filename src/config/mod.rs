use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub google: GoogleConfig,
    pub extension: ExtensionConfig,
    pub transcription: TranscriptionConfig,
    pub agent: AgentConfig,
}

/// Which meeting backend handles join/leave requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendStrategy {
    /// Browser extension connected over the local WebSocket bridge.
    Extension,
    /// Google Meet REST API.
    Api,
}

impl BackendStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extension => "extension",
            Self::Api => "api",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub strategy: BackendStrategy,
    pub api_port: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            strategy: BackendStrategy::Extension,
            api_port: 6338, // MEET on a phone keypad
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub refresh_token: Option<String>,
    pub default_access_type: String,
    pub api_endpoint: Option<String>,
    pub token_endpoint: Option<String>,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: "http://localhost:3000/oauth2callback".to_string(),
            refresh_token: None,
            default_access_type: "OPEN".to_string(),
            api_endpoint: None,
            token_endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionConfig {
    pub ws_port: u16,
    pub join_timeout_seconds: u64,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            ws_port: 8765,
            join_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub enabled: bool,
    pub provider: Option<String>,
    pub api_key: Option<String>,
    pub api_endpoint: Option<String>,
    pub model: Option<String>,
    pub language: Option<String>,
    /// Interval between buffered audio flushes.
    pub chunk_duration_ms: u64,
    /// Buffered audio length that forces an early flush.
    pub max_buffered_seconds: u32,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: Some("openai-api".to_string()),
            api_key: None,
            api_endpoint: None,
            model: Some("whisper-1".to_string()),
            language: Some("en".to_string()),
            chunk_duration_ms: 30_000,
            max_buffered_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub display_name: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            display_name: "Meet Agent".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from an explicit path, writing defaults there if the file is missing.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Overlay settings from the environment. Secrets usually live here rather
    /// than in the config file.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("GOOGLE_CLIENT_ID") {
            self.google.client_id = Some(v);
        }
        if let Some(v) = non_empty("GOOGLE_CLIENT_SECRET") {
            self.google.client_secret = Some(v);
        }
        if let Some(v) = non_empty("GOOGLE_REDIRECT_URI") {
            self.google.redirect_uri = v;
        }
        if let Some(v) = non_empty("GOOGLE_REFRESH_TOKEN") {
            self.google.refresh_token = Some(v);
        }
        if let Some(v) = non_empty("GOOGLE_MEET_DEFAULT_ACCESS_TYPE") {
            self.google.default_access_type = v;
        }
        if let Some(v) = non_empty("OPENAI_API_KEY") {
            self.transcription.api_key = Some(v);
        }
        if let Some(v) = non_empty("TRANSCRIPTION_LANGUAGE") {
            self.transcription.language = Some(v);
        }
        if let Some(v) = non_empty("EXTENSION_WS_PORT") {
            match v.parse() {
                Ok(port) => self.extension.ws_port = port,
                Err(_) => warn!("Ignoring invalid EXTENSION_WS_PORT: {}", v),
            }
        }
        if let Some(v) = non_empty("AUDIO_CHUNK_DURATION_MS") {
            match v.parse() {
                Ok(ms) => self.transcription.chunk_duration_ms = ms,
                Err(_) => warn!("Ignoring invalid AUDIO_CHUNK_DURATION_MS: {}", v),
            }
        }
        if let Some(v) = non_empty("ENABLE_REAL_TIME_TRANSCRIPTION") {
            self.transcription.enabled = v.eq_ignore_ascii_case("true");
        }
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub player: PlayerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// API root, e.g. `http://localhost:3001/api`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// The stream slot this viewer watches.
    #[serde(default)]
    pub stream_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_session_interval")]
    pub session_interval_secs: u64,
    #[serde(default = "default_services_interval")]
    pub services_interval_secs: u64,
    #[serde(default = "default_events_interval")]
    pub events_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Set to false to run the viewer without a video window.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Explicit mpv binary; searched beside the executable and on PATH otherwise.
    #[serde(default)]
    pub mpv_path: Option<PathBuf>,
    /// Demuxer pre-buffer in bytes.
    #[serde(default = "default_prebuffer")]
    pub prebuffer_bytes: u64,
    /// Trim buffered backlog instead of letting latency grow.
    #[serde(default = "default_true")]
    pub low_latency: bool,
    /// mpv `--vo` value; empty lets mpv pick.
    #[serde(default)]
    pub video_output: String,
    /// Embed into an existing native window (mpv `--wid`).
    #[serde(default)]
    pub window_id: Option<i64>,
    #[serde(default = "default_volume")]
    pub volume: f32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            stream_id: 0,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            session_interval_secs: default_session_interval(),
            services_interval_secs: default_services_interval(),
            events_interval_secs: default_events_interval(),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mpv_path: None,
            prebuffer_bytes: default_prebuffer(),
            low_latency: true,
            video_output: String::new(),
            window_id: None,
            volume: default_volume(),
        }
    }
}

impl PollingConfig {
    pub fn session_interval(&self) -> Duration {
        Duration::from_secs(self.session_interval_secs.max(1))
    }

    pub fn services_interval(&self) -> Duration {
        Duration::from_secs(self.services_interval_secs.max(1))
    }

    pub fn events_interval(&self) -> Duration {
        Duration::from_secs(self.events_interval_secs.max(1))
    }
}

fn default_base_url() -> String {
    "http://localhost:3001/api".to_string()
}

fn default_session_interval() -> u64 {
    5
}

fn default_services_interval() -> u64 {
    60
}

fn default_events_interval() -> u64 {
    30
}

fn default_prebuffer() -> u64 {
    2 * 1024 * 1024
}

fn default_volume() -> f32 {
    0.8
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load from the default location, writing defaults there on first run.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save_to(&config_path)?;
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

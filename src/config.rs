//! Configuration management for xtreamview
//!
//! Handles config file loading/saving and environment overrides.
//! Config is stored at ~/.config/xtreamview/config.toml

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::DEFAULT_TIMEOUT;
use crate::player::PlayerType;

/// Env var overriding the request timeout (seconds)
pub const TIMEOUT_ENV: &str = "XTREAMVIEW_TIMEOUT";
/// Env var overriding the local player (vlc, mpv)
pub const PLAYER_ENV: &str = "XTREAMVIEW_PLAYER";

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Panel request timeout in seconds
    pub request_timeout_secs: Option<u64>,
    /// Preferred local player (vlc, mpv)
    pub player: Option<String>,
    /// Log filter used when RUST_LOG is not set
    pub log_filter: Option<String>,
}

impl Config {
    /// Get config file path (~/.config/xtreamview/config.toml)
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("xtreamview").join("config.toml"))
    }

    /// Load config from the default file, or return default if not found
    pub fn load() -> Self {
        Self::path()
            .map(|p| Self::load_from(&p))
            .unwrap_or_default()
    }

    /// Load config from a file, or return default if missing or invalid
    pub fn load_from(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| toml::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path = Self::path().ok_or_else(|| anyhow::anyhow!("Could not determine config path"))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml = toml::to_string_pretty(self)?;
        std::fs::write(path, toml)?;
        Ok(())
    }

    /// Request timeout with fallback chain:
    /// 1. Environment variable XTREAMVIEW_TIMEOUT
    /// 2. Value from config file
    /// 3. 10 seconds
    pub fn request_timeout(&self) -> Duration {
        std::env::var(TIMEOUT_ENV)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .or(self.request_timeout_secs)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT)
    }

    /// Local player: XTREAMVIEW_PLAYER, then config file, then VLC
    pub fn player_type(&self) -> PlayerType {
        std::env::var(PLAYER_ENV)
            .ok()
            .or_else(|| self.player.clone())
            .and_then(|name| PlayerType::from_name(&name))
            .unwrap_or_default()
    }

    /// Log filter, defaulting to warnings from this crate
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or("xtreamview=warn")
    }
}

//! Local Player - VLC/mpv playback
//!
//! Playback itself is not handled here: a resolved stream URL is handed to an
//! external player process.

use std::process::Stdio;
use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::info;

/// Supported local players
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerType {
    /// VLC media player (default)
    #[default]
    Vlc,
    /// mpv media player
    Mpv,
}

impl PlayerType {
    /// Parse a player name as found in config files and env vars
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "vlc" => Some(PlayerType::Vlc),
            "mpv" => Some(PlayerType::Mpv),
            _ => None,
        }
    }

    /// Get the command name for this player
    pub fn command(&self) -> &'static str {
        match self {
            PlayerType::Vlc => {
                // On macOS, VLC is an app bundle - check for it
                #[cfg(target_os = "macos")]
                if std::path::Path::new("/Applications/VLC.app").exists() {
                    return "/Applications/VLC.app/Contents/MacOS/VLC";
                }
                "vlc"
            }
            PlayerType::Mpv => "mpv",
        }
    }

    /// Get a display name for this player
    pub fn display_name(&self) -> &'static str {
        match self {
            PlayerType::Vlc => "VLC",
            PlayerType::Mpv => "mpv",
        }
    }
}

impl std::fmt::Display for PlayerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Errors from local player operations
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Player '{0}' not found. Install it first.")]
    NotFound(String),
    #[error("Failed to start player: {0}")]
    StartFailed(#[from] std::io::Error),
    #[error("No stream URL for this item")]
    NoStreamUrl,
}

/// Local player for live channels and movies
pub struct LocalPlayer {
    player_type: PlayerType,
}

impl LocalPlayer {
    pub fn new(player_type: PlayerType) -> Self {
        Self { player_type }
    }

    pub fn player_type(&self) -> PlayerType {
        self.player_type
    }

    /// Check if the player is available on the system
    pub async fn is_available(&self) -> bool {
        let cmd = self.player_type.command();

        // If it's a full path (macOS app bundle), check if it exists
        if cmd.starts_with('/') {
            return std::path::Path::new(cmd).exists();
        }

        Command::new("which")
            .arg(cmd)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Arguments passed to the player for a stream URL
    pub fn args(&self, stream_url: &str) -> Vec<String> {
        let mut args = vec![stream_url.to_string()];
        match self.player_type {
            // Don't show filename overlay: it would expose the credentials
            PlayerType::Vlc => args.push("--no-video-title-show".to_string()),
            PlayerType::Mpv => args.push("--force-window=immediate".to_string()),
        }
        args
    }

    /// Start the player on a stream URL and return the child process
    pub async fn play(&self, stream_url: &str) -> Result<Child, PlayerError> {
        if stream_url.trim().is_empty() {
            return Err(PlayerError::NoStreamUrl);
        }

        let mut cmd = Command::new(self.player_type.command());
        cmd.args(self.args(stream_url));

        // Don't capture output - let the player run on its own
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());

        info!(player = %self.player_type, "Starting local player");
        cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PlayerError::NotFound(self.player_type.command().to_string())
            } else {
                PlayerError::StartFailed(e)
            }
        })
    }

    /// Play a stream and wait for the player to close
    pub async fn play_and_wait(&self, stream_url: &str) -> Result<(), PlayerError> {
        let mut child = self.play(stream_url).await?;
        let _ = child.wait().await;
        Ok(())
    }
}

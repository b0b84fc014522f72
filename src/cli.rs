//! CLI - Command Line Interface for xtreamview
//!
//! The presentation shell over the session controller. Every command has a
//! JSON mode so it can be scripted.
//!
//! # Examples
//!
//! ```bash
//! # Log in once, credentials are remembered
//! xtreamview login panel.example.com:8080 alice secret
//!
//! # Browse the catalog
//! xtreamview categories -t movie
//! xtreamview channels 12 --search news --json
//!
//! # Guide and playback
//! xtreamview epg 1043
//! xtreamview play 1043 -C 12 --player mpv
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::io::IsTerminal;
use std::path::PathBuf;

use crate::models::ContentType;
use crate::player::PlayerType;

// =============================================================================
// Exit Codes
// =============================================================================

/// Exit codes for CLI operations (semantic for scripting)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// General error
    Error = 1,
    /// Invalid arguments
    InvalidArgs = 2,
    /// Network error or rejected account
    NetworkError = 3,
    /// No stored session
    NotLoggedIn = 4,
    /// Requested item not found
    NotFound = 5,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

// =============================================================================
// Main CLI Structure
// =============================================================================

/// xtreamview - Xtream Codes IPTV client
#[derive(Parser, Debug)]
#[command(
    name = "xtreamview",
    version,
    about = "Xtream Codes IPTV client",
    long_about = "Browse live channels, movies and series of an Xtream Codes panel, \
                  read the program guide and open streams in a local player.",
    after_help = "EXAMPLES:\n\
                  xtreamview login panel.tv:8080 alice secret   Log in and remember the account\n\
                  xtreamview categories -t movie                List movie categories\n\
                  xtreamview channels 12 --search news          List items of category 12\n\
                  xtreamview play 1043 -C 12                    Open a live channel in VLC"
)]
pub struct Cli {
    /// Output format as JSON (default for non-TTY)
    #[arg(long, short = 'j', global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable debug logging on stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Check if JSON output should be used
    pub fn should_json(&self) -> bool {
        self.json || !std::io::stdout().is_terminal()
    }
}

// =============================================================================
// Subcommands
// =============================================================================

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate an account and remember it
    Login(LoginCmd),

    /// Forget the stored account
    Logout,

    /// Show the stored session
    Status,

    /// List categories of a content type
    #[command(visible_alias = "cat")]
    Categories(CategoriesCmd),

    /// List the items of a category
    #[command(visible_alias = "ch")]
    Channels(ChannelsCmd),

    /// Show the program guide
    Epg(EpgCmd),

    /// Print the stream URL of an item
    Url(UrlCmd),

    /// Open an item in a local player
    #[command(visible_alias = "p")]
    Play(PlayCmd),
}

/// Content type selector
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentTypeArg {
    /// Live channels
    #[default]
    Live,
    /// Movies (VOD)
    #[value(alias = "vod")]
    Movie,
    /// Series
    Series,
}

impl From<ContentTypeArg> for ContentType {
    fn from(arg: ContentTypeArg) -> Self {
        match arg {
            ContentTypeArg::Live => ContentType::Live,
            ContentTypeArg::Movie => ContentType::Movie,
            ContentTypeArg::Series => ContentType::Series,
        }
    }
}

/// Local player selection
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerChoice {
    /// VLC media player
    Vlc,
    /// mpv media player
    Mpv,
}

impl From<PlayerChoice> for PlayerType {
    fn from(choice: PlayerChoice) -> Self {
        match choice {
            PlayerChoice::Vlc => PlayerType::Vlc,
            PlayerChoice::Mpv => PlayerType::Mpv,
        }
    }
}

// =============================================================================
// Login Command
// =============================================================================

/// Validate an account against the panel
#[derive(Args, Debug)]
pub struct LoginCmd {
    /// Panel URL (scheme optional, e.g. panel.tv:8080)
    pub url: String,

    /// Account username
    pub username: String,

    /// Account password
    pub password: String,
}

// =============================================================================
// Catalog Commands
// =============================================================================

/// List categories
#[derive(Args, Debug)]
pub struct CategoriesCmd {
    /// Content type
    #[arg(long, short = 't', value_enum, default_value = "live")]
    pub content_type: ContentTypeArg,
}

/// List the items of a category
#[derive(Args, Debug)]
pub struct ChannelsCmd {
    /// Category id from `categories` output
    #[arg(required = true)]
    pub category_id: String,

    /// Content type of the category
    #[arg(long, short = 't', value_enum, default_value = "live")]
    pub content_type: ContentTypeArg,

    /// Only items whose name contains this text
    #[arg(long, short = 's')]
    pub search: Option<String>,

    /// Maximum number of results
    #[arg(long, short = 'l')]
    pub limit: Option<usize>,
}

/// Show the program guide
#[derive(Args, Debug)]
pub struct EpgCmd {
    /// Stream id of a live channel (omit for the full guide)
    pub stream_id: Option<String>,

    /// Only the program airing now
    #[arg(long, short = 'n')]
    pub now: bool,
}

// =============================================================================
// Playback Commands
// =============================================================================

/// Print the stream URL of an item
#[derive(Args, Debug)]
pub struct UrlCmd {
    /// Stream id from `channels` output
    #[arg(required = true)]
    pub stream_id: String,

    /// Category holding the item
    #[arg(long = "category", short = 'C', required = true)]
    pub category_id: String,

    /// Content type of the item
    #[arg(long, short = 't', value_enum, default_value = "live")]
    pub content_type: ContentTypeArg,
}

/// Open an item in a local player
#[derive(Args, Debug)]
pub struct PlayCmd {
    /// Stream id from `channels` output
    #[arg(required = true)]
    pub stream_id: String,

    /// Category holding the item
    #[arg(long = "category", short = 'C', required = true)]
    pub category_id: String,

    /// Content type of the item
    #[arg(long, short = 't', value_enum, default_value = "live")]
    pub content_type: ContentTypeArg,

    /// Player to use (default from config, then VLC)
    #[arg(long, value_enum)]
    pub player: Option<PlayerChoice>,

    /// Wait for the player to exit
    #[arg(long, short = 'w')]
    pub wait: bool,
}

// =============================================================================
// JSON Output Types
// =============================================================================

/// Generic JSON output wrapper with status
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonOutput<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "is_zero")]
    pub exit_code: i32,
}

fn is_zero(n: &i32) -> bool {
    *n == 0
}

impl<T: Serialize> JsonOutput<T> {
    /// Create success output with data
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            exit_code: 0,
        }
    }

    /// Create error output (no data)
    pub fn error_msg(msg: impl Into<String>, code: ExitCode) -> JsonOutput<()> {
        JsonOutput::<()> {
            data: None,
            error: Some(msg.into()),
            exit_code: code.into(),
        }
    }
}

/// Login success response
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub server_url: String,
    pub username: String,
    pub categories: usize,
}

/// Stream URL response
#[derive(Debug, Serialize, Deserialize)]
pub struct UrlResponse {
    pub id: String,
    pub name: String,
    pub stream_url: String,
}

/// Play success response
#[derive(Debug, Serialize, Deserialize)]
pub struct PlayResponse {
    pub status: &'static str,
    pub player: String,
    pub title: String,
}

// =============================================================================
// Output Helpers
// =============================================================================

/// Output handler for consistent formatting
pub struct Output {
    pub json: bool,
    pub quiet: bool,
}

impl Output {
    pub fn new(cli: &Cli) -> Self {
        Self {
            json: cli.should_json(),
            quiet: cli.quiet,
        }
    }

    /// Print success data
    pub fn print<T: Serialize>(&self, data: T) -> anyhow::Result<()> {
        if self.json {
            let output = JsonOutput::success(data);
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        Ok(())
    }

    /// Print a list: JSON array, or one display line per item
    pub fn list<T: Serialize + Display>(&self, items: &[T]) -> anyhow::Result<()> {
        if self.json {
            return self.print(items);
        }
        for item in items {
            println!("{}", item);
        }
        Ok(())
    }

    /// Print error and return exit code
    pub fn error(&self, msg: impl Into<String>, code: ExitCode) -> ExitCode {
        let msg = msg.into();
        if self.json {
            let output = JsonOutput::<()>::error_msg(&msg, code);
            if let Ok(json) = serde_json::to_string_pretty(&output) {
                eprintln!("{}", json);
            }
        } else if !self.quiet {
            eprintln!("Error: {}", msg);
        }
        code
    }

    /// Print info message (suppressed in quiet mode)
    pub fn info(&self, msg: impl Display) {
        if !self.quiet && !self.json {
            eprintln!("{}", msg);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_content_type_conversion() {
        assert_eq!(ContentType::from(ContentTypeArg::Live), ContentType::Live);
        assert_eq!(ContentType::from(ContentTypeArg::Movie), ContentType::Movie);
        assert_eq!(ContentType::from(ContentTypeArg::Series), ContentType::Series);
    }

    #[test]
    fn test_json_output_skips_empty_fields() {
        let json = serde_json::to_string(&JsonOutput::success(vec![1, 2])).unwrap();
        assert_eq!(json, r#"{"data":[1,2]}"#);

        let err = JsonOutput::<()>::error_msg("boom", ExitCode::NotLoggedIn);
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, r#"{"error":"boom","exit_code":4}"#);
    }
}

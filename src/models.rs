//! Data structures and types for xtreamview
//!
//! Contains all shared models used across the crate organized by domain:
//! - **Account**: panel credentials and login form normalization
//! - **Catalog**: content types, categories and playable items
//! - **Guide**: EPG programs and the per-channel program index

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

// =============================================================================
// Account Models
// =============================================================================

/// Credentials for an Xtream Codes panel
///
/// Always built through [`LoginForm::normalize`], so `server_url` carries a
/// scheme and no trailing slash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub server_url: String,
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Server URL with any trailing slash stripped
    pub fn base_url(&self) -> &str {
        self.server_url.trim_end_matches('/')
    }

    /// Endpoint for every panel API call
    pub fn api_url(&self) -> String {
        format!("{}/player_api.php", self.base_url())
    }

    /// Build the playable URL of an item
    ///
    /// Series items have no direct stream; resolving an episode needs a
    /// second lookup which is not part of the panel contract used here.
    pub fn stream_url(&self, content_type: ContentType, stream_id: &str) -> String {
        match content_type {
            ContentType::Live => format!(
                "{}/live/{}/{}/{}.m3u8",
                self.base_url(),
                self.username,
                self.password,
                stream_id
            ),
            ContentType::Movie => format!(
                "{}/movie/{}/{}/{}.mp4",
                self.base_url(),
                self.username,
                self.password,
                stream_id
            ),
            ContentType::Series => String::new(),
        }
    }
}

impl fmt::Display for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.username, self.server_url)
    }
}

/// Errors raised by the login form before any network call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoginError {
    #[error("URL is required")]
    MissingUrl,

    #[error("Username is required")]
    MissingUsername,

    #[error("Password is required")]
    MissingPassword,
}

/// Raw login form input as typed by the user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginForm {
    pub url: String,
    pub username: String,
    pub password: String,
}

impl LoginForm {
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// Validate and normalize into [`Credentials`]
    ///
    /// Fields are trimmed, `http://` is prepended when the URL has no `http`
    /// prefix and trailing slashes are removed.
    pub fn normalize(&self) -> Result<Credentials, LoginError> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(LoginError::MissingUrl);
        }
        let username = self.username.trim();
        if username.is_empty() {
            return Err(LoginError::MissingUsername);
        }
        let password = self.password.trim();
        if password.is_empty() {
            return Err(LoginError::MissingPassword);
        }

        let mut server_url = if url.starts_with("http") {
            url.to_string()
        } else {
            format!("http://{}", url)
        };
        let trimmed_len = server_url.trim_end_matches('/').len();
        server_url.truncate(trimmed_len);

        Ok(Credentials {
            server_url,
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

// =============================================================================
// Catalog Models
// =============================================================================

/// Content type partition of the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Live,
    Movie,
    Series,
}

impl ContentType {
    pub const ALL: [ContentType; 3] = [ContentType::Live, ContentType::Movie, ContentType::Series];

    /// Panel action listing the categories of this type
    pub fn categories_action(&self) -> &'static str {
        match self {
            ContentType::Live => "get_live_categories",
            ContentType::Movie => "get_vod_categories",
            ContentType::Series => "get_series_categories",
        }
    }

    /// Panel action listing the items of a category of this type
    pub fn streams_action(&self) -> &'static str {
        match self {
            ContentType::Live => "get_live_streams",
            ContentType::Movie => "get_vod_streams",
            ContentType::Series => "get_series",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentType::Live => write!(f, "live"),
            ContentType::Movie => write!(f, "movie"),
            ContentType::Series => write!(f, "series"),
        }
    }
}

/// Category as listed by the panel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub content_type: ContentType,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>6}  {}", self.id, self.name)
    }
}

/// One selectable item: a live channel, a movie or a series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    /// Empty for series items
    pub stream_url: String,
    pub icon: Option<String>,
    pub epg_channel_id: Option<String>,
    pub category_id: String,
    pub content_type: ContentType,
}

impl Channel {
    /// Whether a direct stream URL is known for this item
    pub fn is_playable(&self) -> bool {
        !self.stream_url.is_empty()
    }

    /// Whether guide data can be requested for this item
    pub fn has_epg(&self) -> bool {
        self.content_type == ContentType::Live && self.epg_channel_id.is_some()
    }

    /// Case-insensitive name match used by channel search
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim();
        query.is_empty() || self.name.to_lowercase().contains(&query.to_lowercase())
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>6}  {}", self.id, self.name)
    }
}

// =============================================================================
// Guide Models
// =============================================================================

/// A single program from the electronic program guide
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpgProgram {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
    pub channel_id: String,
}

impl EpgProgram {
    pub fn new(
        channel_id: impl Into<String>,
        title: impl Into<String>,
        description: Option<String>,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
    ) -> Self {
        let channel_id = channel_id.into();
        Self {
            id: Self::program_id(&channel_id, start, stop),
            title: title.into(),
            description,
            start,
            stop,
            channel_id,
        }
    }

    /// Deterministic id so re-fetching an unchanged window yields the same ids
    pub fn program_id(channel_id: &str, start: DateTime<Utc>, stop: DateTime<Utc>) -> String {
        format!("{}-{}-{}", channel_id, start.timestamp(), stop.timestamp())
    }

    /// Whether the program is on air at `now`; a program ends at `stop`
    pub fn is_airing(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now < self.stop
    }
}

impl fmt::Display for EpgProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}  {}",
            self.start.format("%H:%M"),
            self.stop.format("%H:%M"),
            self.title
        )
    }
}

/// Programs grouped by channel id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpgIndex {
    channels: HashMap<String, Vec<EpgProgram>>,
}

impl EpgIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the bucket of one channel
    pub fn insert(&mut self, channel_id: impl Into<String>, programs: Vec<EpgProgram>) {
        self.channels.insert(channel_id.into(), programs);
    }

    /// Add one program to its channel bucket
    pub fn push(&mut self, program: EpgProgram) {
        self.channels
            .entry(program.channel_id.clone())
            .or_default()
            .push(program);
    }

    /// Merge another index: its buckets overwrite ours, others are kept
    pub fn merge(&mut self, other: EpgIndex) {
        self.channels.extend(other.channels);
    }

    /// Programs of a channel sorted by start time
    pub fn programs_for(&self, channel_id: &str) -> Vec<&EpgProgram> {
        let mut programs: Vec<&EpgProgram> = self
            .channels
            .get(channel_id)
            .map(|p| p.iter().collect())
            .unwrap_or_default();
        programs.sort_by_key(|p| p.start);
        programs
    }

    /// Program airing at `now` on a channel
    pub fn airing(&self, channel_id: &str, now: DateTime<Utc>) -> Option<&EpgProgram> {
        self.channels
            .get(channel_id)?
            .iter()
            .find(|p| p.is_airing(now))
    }

    pub fn contains(&self, channel_id: &str) -> bool {
        self.channels.contains_key(channel_id)
    }

    pub fn channel_ids(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    /// Number of channel buckets
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn clear(&mut self) {
        self.channels.clear();
    }
}

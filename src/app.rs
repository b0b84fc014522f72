//! Session state and core controller logic
//!
//! `App` owns the authenticated session, the content type filter, the loaded
//! categories and channels, the current selections and the EPG index. It is
//! a plain state machine: every intent mutates state synchronously and hands
//! back a ticket for the fetch it needs, and the matching `apply_*` method
//! consumes the result once the fetch resolves.
//!
//! Tickets carry a per-slot sequence number. A categories or channels result
//! whose ticket is no longer the latest issued for its slot is dropped, so a
//! slow response for an abandoned selection can never overwrite a newer one.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::models::*;

// =============================================================================
// App State Enum
// =============================================================================

/// Authentication state of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppState {
    /// No credentials
    #[default]
    LoggedOut,
    /// Credentials submitted, account check in flight
    Authenticating,
    /// Account validated, catalog browsing enabled
    LoggedIn,
}

// =============================================================================
// Fetch Tickets
// =============================================================================

/// Request to list every category of the panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoriesRequest {
    pub seq: u64,
    pub credentials: Credentials,
}

/// Request to list the items of one category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelsRequest {
    pub seq: u64,
    pub credentials: Credentials,
    pub category: Category,
}

/// Request for guide data of one channel, or all channels when `None`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpgRequest {
    pub seq: u64,
    pub credentials: Credentials,
    pub channel_id: Option<String>,
}

/// Sequence bookkeeping of one fetch slot
#[derive(Debug, Clone, Default)]
struct FetchSlot {
    /// Last sequence number handed out
    issued: u64,
    /// Sequence number whose result is still awaited
    pending: Option<u64>,
    /// Results at or below this number belong to a torn down session
    floor: u64,
}

impl FetchSlot {
    fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.pending = Some(self.issued);
        self.issued
    }

    /// Complete `seq`; false when it is not the latest outstanding request
    fn complete(&mut self, seq: u64) -> bool {
        if self.pending == Some(seq) {
            self.pending = None;
            true
        } else {
            false
        }
    }

    /// Forget the outstanding request so its result is treated as stale
    fn abandon(&mut self) {
        self.pending = None;
    }

    /// Invalidate every request issued so far
    fn reset(&mut self) {
        self.pending = None;
        self.floor = self.issued;
    }

    fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn is_current_session(&self, seq: u64) -> bool {
        seq > self.floor
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Read-only view of the session for the presentation layer
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: AppState,
    pub server_url: Option<String>,
    pub username: Option<String>,
    pub content_type: ContentType,
    pub categories: Vec<Category>,
    pub channels: Vec<Channel>,
    pub selected_category_id: Option<String>,
    pub selected_channel: Option<Channel>,
    pub catalog_loading: bool,
    pub epg_loading: bool,
}

// =============================================================================
// App
// =============================================================================

/// Playback session controller state
#[derive(Debug, Default)]
pub struct App {
    state: AppState,
    credentials: Option<Credentials>,
    /// Credentials awaiting the account check
    pending_login: Option<Credentials>,
    content_type: ContentType,
    /// Every fetched category, all content types
    categories: Vec<Category>,
    channels: Vec<Channel>,
    selected_category: Option<String>,
    selected_channel: Option<Channel>,
    epg: EpgIndex,
    categories_fetch: FetchSlot,
    channels_fetch: FetchSlot,
    epg_fetch: FetchSlot,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------------
    // Authentication
    // -------------------------------------------------------------------------

    /// Validate the login form and enter `Authenticating`
    ///
    /// A form error leaves the state untouched and needs no network call.
    pub fn begin_login(&mut self, form: &LoginForm) -> Result<Credentials, LoginError> {
        let credentials = form.normalize()?;
        self.reset();
        self.state = AppState::Authenticating;
        self.pending_login = Some(credentials.clone());
        debug!(account = %credentials, "Authenticating");
        Ok(credentials)
    }

    /// Apply the account check result
    ///
    /// On success the session is logged in and the initial category fetch is
    /// returned.
    pub fn finish_login(
        &mut self,
        credentials: &Credentials,
        valid: bool,
    ) -> Option<CategoriesRequest> {
        if self.state != AppState::Authenticating
            || self.pending_login.as_ref() != Some(credentials)
        {
            warn!(account = %credentials, "Ignoring result of an abandoned login");
            return None;
        }
        self.pending_login = None;

        if !valid {
            self.state = AppState::LoggedOut;
            return None;
        }

        self.credentials = Some(credentials.clone());
        self.state = AppState::LoggedIn;
        self.request_categories()
    }

    /// Resume a session from stored credentials
    pub fn restore(&mut self, credentials: Credentials) -> Option<CategoriesRequest> {
        self.reset();
        debug!(account = %credentials, "Restoring session");
        self.credentials = Some(credentials);
        self.state = AppState::LoggedIn;
        self.request_categories()
    }

    /// Drop the session and every piece of derived state
    pub fn logout(&mut self) {
        self.reset();
    }

    fn reset(&mut self) {
        self.state = AppState::LoggedOut;
        self.credentials = None;
        self.pending_login = None;
        self.content_type = ContentType::default();
        self.categories.clear();
        self.channels.clear();
        self.selected_category = None;
        self.selected_channel = None;
        self.epg.clear();
        self.categories_fetch.reset();
        self.channels_fetch.reset();
        self.epg_fetch.reset();
    }

    // -------------------------------------------------------------------------
    // Catalog navigation
    // -------------------------------------------------------------------------

    /// Switch the content type filter
    ///
    /// Category and channel selections and the channel list are cleared right
    /// away; the returned fetch reloads the categories.
    pub fn set_content_type(&mut self, content_type: ContentType) -> Option<CategoriesRequest> {
        if content_type == self.content_type {
            return None;
        }
        self.content_type = content_type;
        self.selected_category = None;
        self.selected_channel = None;
        self.channels.clear();
        self.channels_fetch.abandon();
        self.request_categories()
    }

    /// Fetch ticket for a full category reload
    pub fn request_categories(&mut self) -> Option<CategoriesRequest> {
        let credentials = self.logged_in_credentials()?;
        Some(CategoriesRequest {
            seq: self.categories_fetch.issue(),
            credentials,
        })
    }

    /// Apply a category listing
    ///
    /// When nothing is selected the first category of the active content type
    /// is selected, and its channel fetch is returned.
    pub fn apply_categories(
        &mut self,
        seq: u64,
        categories: Vec<Category>,
    ) -> Option<ChannelsRequest> {
        if !self.categories_fetch.complete(seq) {
            debug!(seq, "Dropping stale category listing");
            return None;
        }
        self.categories = categories;

        if self.selected_category.is_some() {
            return None;
        }
        let first = self.visible_categories().first().map(|c| c.id.clone())?;
        self.select_category(&first)
    }

    /// Select a category of the active content type
    ///
    /// The previous channel list and channel selection are cleared before the
    /// new list is requested.
    pub fn select_category(&mut self, category_id: &str) -> Option<ChannelsRequest> {
        let credentials = self.logged_in_credentials()?;
        let category = match self
            .visible_categories()
            .into_iter()
            .find(|c| c.id == category_id)
        {
            Some(category) => category.clone(),
            None => {
                warn!(category = category_id, content_type = %self.content_type, "Unknown category");
                return None;
            }
        };

        self.selected_category = Some(category.id.clone());
        self.selected_channel = None;
        self.channels.clear();

        Some(ChannelsRequest {
            seq: self.channels_fetch.issue(),
            credentials,
            category,
        })
    }

    /// Apply a channel listing
    ///
    /// When no channel is selected the first one is, and its EPG fetch is
    /// returned if it has guide data.
    pub fn apply_channels(&mut self, seq: u64, channels: Vec<Channel>) -> Option<EpgRequest> {
        if !self.channels_fetch.complete(seq) {
            debug!(seq, "Dropping stale channel listing");
            return None;
        }
        self.channels = channels;

        if self.selected_channel.is_some() {
            return None;
        }
        let first = self.channels.first().map(|c| c.id.clone())?;
        self.select_channel(&first)
    }

    /// Select a channel from the loaded list
    pub fn select_channel(&mut self, channel_id: &str) -> Option<EpgRequest> {
        let channel = match self.channels.iter().find(|c| c.id == channel_id) {
            Some(channel) => channel.clone(),
            None => {
                warn!(channel = channel_id, "Channel is not in the loaded list");
                return None;
            }
        };

        let wants_epg = self.content_type == ContentType::Live && channel.has_epg();
        let channel_id = channel.id.clone();
        self.selected_channel = Some(channel);

        if !wants_epg {
            return None;
        }
        let credentials = self.logged_in_credentials()?;
        Some(EpgRequest {
            seq: self.epg_fetch.issue(),
            credentials,
            channel_id: Some(channel_id),
        })
    }

    // -------------------------------------------------------------------------
    // Guide
    // -------------------------------------------------------------------------

    /// Fetch ticket for the full guide table
    pub fn request_full_epg(&mut self) -> Option<EpgRequest> {
        let credentials = self.logged_in_credentials()?;
        Some(EpgRequest {
            seq: self.epg_fetch.issue(),
            credentials,
            channel_id: None,
        })
    }

    /// Merge guide data into the index
    ///
    /// Buckets are per channel so any result of the current session is
    /// merged; only the latest request clears the loading flag.
    pub fn apply_epg(&mut self, seq: u64, index: EpgIndex) {
        if !self.epg_fetch.is_current_session(seq) || self.state != AppState::LoggedIn {
            debug!(seq, "Dropping guide data of a closed session");
            return;
        }
        self.epg_fetch.complete(seq);
        self.epg.merge(index);
    }

    // -------------------------------------------------------------------------
    // Read surface
    // -------------------------------------------------------------------------

    pub fn state(&self) -> AppState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == AppState::LoggedIn
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    /// Every fetched category regardless of content type
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Categories of the active content type
    pub fn visible_categories(&self) -> Vec<&Category> {
        self.categories
            .iter()
            .filter(|c| c.content_type == self.content_type)
            .collect()
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Loaded channels whose name matches `query`
    pub fn search_channels(&self, query: &str) -> Vec<&Channel> {
        self.channels.iter().filter(|c| c.matches(query)).collect()
    }

    pub fn selected_category_id(&self) -> Option<&str> {
        self.selected_category.as_deref()
    }

    pub fn selected_category(&self) -> Option<&Category> {
        let id = self.selected_category.as_deref()?;
        self.categories
            .iter()
            .find(|c| c.id == id && c.content_type == self.content_type)
    }

    pub fn selected_channel(&self) -> Option<&Channel> {
        self.selected_channel.as_ref()
    }

    /// Stream URL of the selected channel, if it has one
    pub fn playable_url(&self) -> Option<&str> {
        self.selected_channel
            .as_ref()
            .filter(|c| c.is_playable())
            .map(|c| c.stream_url.as_str())
    }

    pub fn epg(&self) -> &EpgIndex {
        &self.epg
    }

    /// Guide of a channel sorted by start time
    ///
    /// Looks up the stream id bucket first, then the EPG channel id bucket
    /// filled by the full guide table.
    pub fn programs_for(&self, channel: &Channel) -> Vec<&EpgProgram> {
        let programs = self.epg.programs_for(&channel.id);
        if !programs.is_empty() {
            return programs;
        }
        channel
            .epg_channel_id
            .as_deref()
            .map(|id| self.epg.programs_for(id))
            .unwrap_or_default()
    }

    /// Guide of the selected channel
    pub fn selected_programs(&self) -> Vec<&EpgProgram> {
        self.selected_channel
            .as_ref()
            .map(|c| self.programs_for(c))
            .unwrap_or_default()
    }

    /// Program on air on the selected channel at `now`
    pub fn current_program(&self, now: DateTime<Utc>) -> Option<&EpgProgram> {
        self.selected_programs()
            .into_iter()
            .find(|p| p.is_airing(now))
    }

    /// True while a category or channel fetch is outstanding
    pub fn catalog_loading(&self) -> bool {
        self.categories_fetch.is_pending() || self.channels_fetch.is_pending()
    }

    pub fn epg_loading(&self) -> bool {
        self.epg_fetch.is_pending()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            server_url: self.credentials.as_ref().map(|c| c.server_url.clone()),
            username: self.credentials.as_ref().map(|c| c.username.clone()),
            content_type: self.content_type,
            categories: self.visible_categories().into_iter().cloned().collect(),
            channels: self.channels.clone(),
            selected_category_id: self.selected_category.clone(),
            selected_channel: self.selected_channel.clone(),
            catalog_loading: self.catalog_loading(),
            epg_loading: self.epg_loading(),
        }
    }

    fn logged_in_credentials(&self) -> Option<Credentials> {
        if self.state != AppState::LoggedIn {
            return None;
        }
        self.credentials.clone()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn creds() -> Credentials {
        Credentials {
            server_url: "http://ex.com:80".to_string(),
            username: "u".to_string(),
            password: "p".to_string(),
        }
    }

    fn category(id: &str, content_type: ContentType) -> Category {
        Category {
            id: id.to_string(),
            name: format!("Category {}", id),
            content_type,
        }
    }

    fn channel(id: &str, category_id: &str, epg: Option<&str>) -> Channel {
        Channel {
            id: id.to_string(),
            name: format!("Channel {}", id),
            stream_url: creds().stream_url(ContentType::Live, id),
            icon: None,
            epg_channel_id: epg.map(str::to_string),
            category_id: category_id.to_string(),
            content_type: ContentType::Live,
        }
    }

    fn catalog() -> Vec<Category> {
        vec![
            category("l1", ContentType::Live),
            category("l2", ContentType::Live),
            category("m1", ContentType::Movie),
            category("s1", ContentType::Series),
        ]
    }

    fn logged_in() -> (App, CategoriesRequest) {
        let mut app = App::new();
        let request = app.restore(creds()).unwrap();
        (app, request)
    }

    #[test]
    fn test_login_flow() {
        let mut app = App::new();
        let form = LoginForm::new("ex.com:80/", "u", "p");
        let credentials = app.begin_login(&form).unwrap();
        assert_eq!(app.state(), AppState::Authenticating);
        assert_eq!(credentials, creds());

        let request = app.finish_login(&credentials, true).unwrap();
        assert_eq!(app.state(), AppState::LoggedIn);
        assert_eq!(request.credentials, creds());
        assert!(app.catalog_loading());
    }

    #[test]
    fn test_login_rejected() {
        let mut app = App::new();
        let credentials = app.begin_login(&LoginForm::new("ex.com", "u", "p")).unwrap();
        assert!(app.finish_login(&credentials, false).is_none());
        assert_eq!(app.state(), AppState::LoggedOut);
        assert!(app.credentials().is_none());
    }

    #[test]
    fn test_login_form_error_keeps_state() {
        let mut app = App::new();
        assert_eq!(
            app.begin_login(&LoginForm::new("ex.com", "", "p")),
            Err(LoginError::MissingUsername)
        );
        assert_eq!(app.state(), AppState::LoggedOut);
    }

    #[test]
    fn test_auto_selects_first_category_and_channel() {
        let (mut app, request) = logged_in();
        let channels_request = app.apply_categories(request.seq, catalog()).unwrap();
        assert_eq!(channels_request.category.id, "l1");
        assert_eq!(app.selected_category_id(), Some("l1"));

        let epg_request = app
            .apply_channels(
                channels_request.seq,
                vec![channel("1", "l1", Some("one.tv")), channel("2", "l1", None)],
            )
            .unwrap();
        assert_eq!(app.selected_channel().unwrap().id, "1");
        assert_eq!(epg_request.channel_id.as_deref(), Some("1"));
        assert!(app.epg_loading());
        assert!(!app.catalog_loading());
    }

    #[test]
    fn test_no_epg_request_without_epg_id() {
        let (mut app, request) = logged_in();
        let channels_request = app.apply_categories(request.seq, catalog()).unwrap();
        let epg_request = app.apply_channels(channels_request.seq, vec![channel("2", "l1", None)]);
        assert!(epg_request.is_none());
        assert_eq!(app.selected_channel().unwrap().id, "2");
    }

    #[test]
    fn test_content_type_change_clears_selection() {
        let (mut app, request) = logged_in();
        let channels_request = app.apply_categories(request.seq, catalog()).unwrap();
        app.apply_channels(channels_request.seq, vec![channel("1", "l1", None)]);
        assert!(app.selected_channel().is_some());

        let refetch = app.set_content_type(ContentType::Movie);
        assert!(refetch.is_some());
        assert!(app.selected_category_id().is_none());
        assert!(app.selected_channel().is_none());
        assert!(app.channels().is_empty());
        // Categories are not filtered destructively
        assert_eq!(app.categories().len(), 4);
        assert_eq!(app.visible_categories().len(), 1);
    }

    #[test]
    fn test_same_content_type_is_noop() {
        let (mut app, _) = logged_in();
        assert!(app.set_content_type(ContentType::Live).is_none());
    }

    #[test]
    fn test_stale_channel_listing_dropped() {
        let (mut app, request) = logged_in();
        let first = app.apply_categories(request.seq, catalog()).unwrap();
        let second = app.select_category("l2").unwrap();

        // Response for the abandoned category arrives last
        assert!(app
            .apply_channels(second.seq, vec![channel("20", "l2", None)])
            .is_none());
        assert!(app
            .apply_channels(first.seq, vec![channel("10", "l1", None)])
            .is_none());

        assert_eq!(app.channels().len(), 1);
        assert_eq!(app.channels()[0].id, "20");
        assert_eq!(app.selected_channel().unwrap().id, "20");
    }

    #[test]
    fn test_stale_category_listing_dropped() {
        let (mut app, first) = logged_in();
        let second = app.request_categories().unwrap();
        assert!(app.apply_categories(second.seq, catalog()).is_some());
        assert!(app.apply_categories(first.seq, Vec::new()).is_none());
        assert_eq!(app.categories().len(), 4);
    }

    #[test]
    fn test_select_unknown_category_or_channel() {
        let (mut app, request) = logged_in();
        app.apply_categories(request.seq, catalog());
        // Movie category is not visible while browsing live
        assert!(app.select_category("m1").is_none());
        assert!(app.select_category("nope").is_none());
        assert!(app.select_channel("nope").is_none());
        assert_eq!(app.selected_category_id(), Some("l1"));
    }

    #[test]
    fn test_select_category_clears_previous_channel() {
        let (mut app, request) = logged_in();
        let first = app.apply_categories(request.seq, catalog()).unwrap();
        app.apply_channels(first.seq, vec![channel("1", "l1", None)]);

        app.select_category("l2").unwrap();
        assert!(app.selected_channel().is_none());
        assert!(app.channels().is_empty());
        assert!(app.catalog_loading());
    }

    #[test]
    fn test_epg_merge_and_current_program() {
        let (mut app, request) = logged_in();
        let channels_request = app.apply_categories(request.seq, catalog()).unwrap();
        let epg_request = app
            .apply_channels(channels_request.seq, vec![channel("1", "l1", Some("one.tv"))])
            .unwrap();

        let start = Utc.timestamp_opt(1_000, 0).unwrap();
        let stop = Utc.timestamp_opt(2_000, 0).unwrap();
        let mut index = EpgIndex::new();
        index.insert("1", vec![EpgProgram::new("1", "Show", None, start, stop)]);
        let mut other = EpgIndex::new();
        other.insert("9", vec![EpgProgram::new("9", "Other", None, start, stop)]);

        app.apply_epg(epg_request.seq, index);
        let full = app.request_full_epg().unwrap();
        app.apply_epg(full.seq, other);

        assert!(!app.epg_loading());
        assert_eq!(app.epg().len(), 2);
        assert_eq!(app.selected_programs().len(), 1);
        let now = Utc.timestamp_opt(1_500, 0).unwrap();
        assert_eq!(app.current_program(now).unwrap().title, "Show");
    }

    #[test]
    fn test_logout_resets_everything() {
        let (mut app, request) = logged_in();
        let channels_request = app.apply_categories(request.seq, catalog()).unwrap();
        let epg_request = app
            .apply_channels(channels_request.seq, vec![channel("1", "l1", Some("one.tv"))])
            .unwrap();

        app.logout();
        assert_eq!(app.state(), AppState::LoggedOut);
        assert!(app.categories().is_empty());
        assert!(app.channels().is_empty());
        assert!(app.selected_category_id().is_none());
        assert!(app.selected_channel().is_none());
        assert!(app.credentials().is_none());

        // Late guide data of the closed session is ignored
        let mut index = EpgIndex::new();
        index.insert("1", Vec::new());
        app.apply_epg(epg_request.seq, index);
        assert!(app.epg().is_empty());
        assert!(app.request_categories().is_none());
    }

    #[test]
    fn test_playable_url_and_search() {
        let (mut app, request) = logged_in();
        let channels_request = app.apply_categories(request.seq, catalog()).unwrap();
        app.apply_channels(
            channels_request.seq,
            vec![channel("42", "l1", None), channel("43", "l1", None)],
        );
        assert_eq!(
            app.playable_url(),
            Some("http://ex.com:80/live/u/p/42.m3u8")
        );
        assert_eq!(app.search_channels("43").len(), 1);
        assert_eq!(app.search_channels("").len(), 2);
    }

    #[test]
    fn test_snapshot_hides_password() {
        let (app, _) = logged_in();
        let json = serde_json::to_string(&app.snapshot()).unwrap();
        assert!(json.contains("\"logged_in\""));
        assert!(!json.contains("\"password\""));
    }
}

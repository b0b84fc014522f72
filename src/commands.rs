//! CLI Command Handlers
//!
//! Implements all CLI commands on top of the catalog client and the session
//! controller. Each handler takes CLI args and Output, returns ExitCode.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::api::{Catalog, XtreamClient};
use crate::cli::{
    CategoriesCmd, ChannelsCmd, EpgCmd, ExitCode, LoginCmd, LoginResponse, Output, PlayCmd,
    PlayResponse, UrlCmd, UrlResponse,
};
use crate::config::Config;
use crate::models::{Category, Channel, ContentType, Credentials, EpgIndex, LoginForm};
use crate::notify::{NoticeLevel, NoticeLog, Operation};
use crate::player::{LocalPlayer, PlayerType};
use crate::session::Session;
use crate::store::{CredentialStore, FileCredentialStore};

// =============================================================================
// Shared Context
// =============================================================================

/// Per-invocation wiring: config, credential slot and the notice buffer
pub struct Context {
    config: Config,
    notices: NoticeLog,
}

impl Context {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            notices: NoticeLog::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn client(&self) -> XtreamClient {
        XtreamClient::with_timeout(self.config.request_timeout())
            .with_notifier(Arc::new(self.notices.clone()))
    }

    fn session(&self) -> anyhow::Result<Session<XtreamClient, FileCredentialStore>> {
        let store = FileCredentialStore::open_default()?;
        Ok(Session::new(self.client(), store).with_notifier(Arc::new(self.notices.clone())))
    }

    /// Stored credentials, or the exit code explaining why there are none
    fn credentials(&self, output: &Output) -> Result<Credentials, ExitCode> {
        let store = FileCredentialStore::open_default()
            .map_err(|e| output.error(e.to_string(), ExitCode::Error))?;
        match store.load() {
            Ok(Some(credentials)) => Ok(credentials),
            Ok(None) => Err(output.error(
                "Not logged in. Run `xtreamview login <url> <username> <password>` first.",
                ExitCode::NotLoggedIn,
            )),
            Err(e) => Err(output.error(
                format!("Could not read stored credentials: {}", e),
                ExitCode::Error,
            )),
        }
    }

    /// Message of the last failure notice of an operation
    fn failure(&self, operation: Operation) -> Option<String> {
        failure_in(&self.notices, operation)
    }
}

// =============================================================================
// Account Commands
// =============================================================================

pub async fn login_cmd(cmd: LoginCmd, ctx: &Context, output: &Output) -> ExitCode {
    let mut session = match ctx.session() {
        Ok(session) => session,
        Err(e) => return output.error(e.to_string(), ExitCode::Error),
    };

    let form = LoginForm::new(cmd.url, cmd.username, cmd.password);
    output.info("Validating account...");

    match session.login(&form).await {
        Err(e) => output.error(e.to_string(), ExitCode::InvalidArgs),
        Ok(false) => {
            let msg = ctx
                .failure(Operation::Login)
                .unwrap_or_else(|| "Login failed".to_string());
            output.error(msg, ExitCode::NetworkError)
        }
        Ok(true) => {
            let app = session.app();
            let Some(credentials) = app.credentials() else {
                return output.error("Login was not applied", ExitCode::Error);
            };
            let response = LoginResponse {
                server_url: credentials.server_url.clone(),
                username: credentials.username.clone(),
                categories: app.categories().len(),
            };
            output.info(format!("Logged in as {}", credentials));
            if let Some(msg) = ctx.failure(Operation::Login) {
                output.info(format!("Warning: {}", msg));
            }
            if let Err(e) = output.print(&response) {
                return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
            }
            ExitCode::Success
        }
    }
}

pub fn logout_cmd(ctx: &Context, output: &Output) -> ExitCode {
    let mut session = match ctx.session() {
        Ok(session) => session,
        Err(e) => return output.error(e.to_string(), ExitCode::Error),
    };
    session.logout();

    #[derive(Serialize)]
    struct LoggedOut {
        status: &'static str,
    }

    if let Err(e) = output.print(LoggedOut {
        status: "logged_out",
    }) {
        return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
    }
    ExitCode::Success
}

/// Stored session summary
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub logged_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

pub fn status_cmd(output: &Output) -> ExitCode {
    let stored = FileCredentialStore::open_default().and_then(|store| store.load());
    let response = match stored {
        Ok(Some(credentials)) => StatusResponse {
            logged_in: true,
            server_url: Some(credentials.server_url),
            username: Some(credentials.username),
        },
        Ok(None) => StatusResponse {
            logged_in: false,
            server_url: None,
            username: None,
        },
        Err(e) => {
            return output.error(
                format!("Could not read stored credentials: {}", e),
                ExitCode::Error,
            )
        }
    };

    if let Err(e) = output.print(&response) {
        return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
    }
    if response.logged_in {
        ExitCode::Success
    } else {
        ExitCode::NotLoggedIn
    }
}

// =============================================================================
// Catalog Commands
// =============================================================================

pub async fn categories_cmd(cmd: CategoriesCmd, ctx: &Context, output: &Output) -> ExitCode {
    let credentials = match ctx.credentials(output) {
        Ok(credentials) => credentials,
        Err(code) => return code,
    };
    let content_type = ContentType::from(cmd.content_type);

    output.info(format!("Fetching {} categories...", content_type));
    let categories: Vec<Category> = ctx
        .client()
        .list_categories(&credentials)
        .await
        .into_iter()
        .filter(|c| c.content_type == content_type)
        .collect();

    if let Some(msg) = ctx.failure(Operation::Categories) {
        if categories.is_empty() {
            return output.error(msg, ExitCode::NetworkError);
        }
        // Partial listing: the other content types still loaded
        output.info(msg);
    }

    if categories.is_empty() {
        return output.error(
            format!("No {} categories on this panel", content_type),
            ExitCode::NotFound,
        );
    }

    if let Err(e) = output.list(&categories) {
        return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
    }
    ExitCode::Success
}

pub async fn channels_cmd(cmd: ChannelsCmd, ctx: &Context, output: &Output) -> ExitCode {
    let credentials = match ctx.credentials(output) {
        Ok(credentials) => credentials,
        Err(code) => return code,
    };

    let category = category_ref(&cmd.category_id, cmd.content_type.into());
    output.info(format!("Fetching items of category {}...", category.id));

    let mut channels = ctx.client().list_channels(&credentials, &category).await;
    if let Some(msg) = ctx.failure(Operation::Channels) {
        return output.error(msg, ExitCode::NetworkError);
    }

    if let Some(query) = cmd.search.as_deref() {
        channels.retain(|c| c.matches(query));
    }
    if let Some(limit) = cmd.limit {
        channels.truncate(limit);
    }

    if channels.is_empty() {
        return output.error("No items found", ExitCode::NotFound);
    }

    if let Err(e) = output.list(&channels) {
        return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
    }
    ExitCode::Success
}

pub async fn epg_cmd(cmd: EpgCmd, ctx: &Context, output: &Output) -> ExitCode {
    let credentials = match ctx.credentials(output) {
        Ok(credentials) => credentials,
        Err(code) => return code,
    };

    match &cmd.stream_id {
        Some(id) => output.info(format!("Fetching guide for {}...", id)),
        None => output.info("Fetching full guide..."),
    }

    let index = ctx
        .client()
        .fetch_epg(&credentials, cmd.stream_id.as_deref())
        .await;
    if let Some(msg) = ctx.failure(Operation::Epg) {
        return output.error(msg, ExitCode::NetworkError);
    }

    let index = if cmd.now { airing_only(&index) } else { index };

    let result = match &cmd.stream_id {
        Some(id) => {
            let programs: Vec<_> = index.programs_for(id).into_iter().cloned().collect();
            if programs.is_empty() {
                return output.error("No guide data for this channel", ExitCode::NotFound);
            }
            output.list(&programs)
        }
        None => {
            if index.is_empty() {
                return output.error("No guide data on this panel", ExitCode::NotFound);
            }
            print_guide(&index, output)
        }
    };

    if let Err(e) = result {
        return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
    }
    ExitCode::Success
}

/// Keep only the programs on air right now
fn airing_only(index: &EpgIndex) -> EpgIndex {
    let now = Utc::now();
    let mut airing = EpgIndex::new();
    for id in index.channel_ids() {
        if let Some(program) = index.airing(id, now) {
            airing.push(program.clone());
        }
    }
    airing
}

fn print_guide(index: &EpgIndex, output: &Output) -> anyhow::Result<()> {
    if output.json {
        return output.print(index);
    }
    let mut ids: Vec<&str> = index.channel_ids().collect();
    ids.sort_unstable();
    for id in ids {
        println!("[{}]", id);
        for program in index.programs_for(id) {
            println!("  {}", program);
        }
    }
    Ok(())
}

// =============================================================================
// Playback Commands
// =============================================================================

pub async fn url_cmd(cmd: UrlCmd, ctx: &Context, output: &Output) -> ExitCode {
    let credentials = match ctx.credentials(output) {
        Ok(credentials) => credentials,
        Err(code) => return code,
    };

    let category = category_ref(&cmd.category_id, cmd.content_type.into());
    let channels = ctx.client().list_channels(&credentials, &category).await;
    if let Some(msg) = ctx.failure(Operation::Channels) {
        return output.error(msg, ExitCode::NetworkError);
    }

    let Some(channel) = channels.into_iter().find(|c| c.id == cmd.stream_id) else {
        return output.error(
            format!("Item {} not found in category {}", cmd.stream_id, category.id),
            ExitCode::NotFound,
        );
    };
    if !channel.is_playable() {
        return output.error(
            format!("{} has no direct stream", channel.name),
            ExitCode::NotFound,
        );
    }

    let response = UrlResponse {
        id: channel.id,
        name: channel.name,
        stream_url: channel.stream_url,
    };
    let printed = if output.json {
        output.print(&response)
    } else {
        println!("{}", response.stream_url);
        Ok(())
    };
    if let Err(e) = printed {
        return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
    }
    ExitCode::Success
}

pub async fn play_cmd(cmd: PlayCmd, ctx: &Context, output: &Output) -> ExitCode {
    let mut session = match ctx.session() {
        Ok(session) => session,
        Err(e) => return output.error(e.to_string(), ExitCode::Error),
    };

    if let Err((msg, code)) = resolve_item(
        &mut session,
        &ctx.notices,
        cmd.content_type.into(),
        &cmd.category_id,
        &cmd.stream_id,
    )
    .await
    {
        return output.error(msg, code);
    }

    let app = session.app();
    let (Some(channel), Some(url)) = (app.selected_channel(), app.playable_url()) else {
        return output.error(
            format!("Item {} has no direct stream", cmd.stream_id),
            ExitCode::NotFound,
        );
    };

    let now_playing = app.current_program(Utc::now()).map(|p| p.title.clone());
    let player_type = cmd
        .player
        .map(PlayerType::from)
        .unwrap_or_else(|| ctx.config().player_type());
    let player = LocalPlayer::new(player_type);

    if !player.is_available().await {
        return output.error(
            format!("{} not found. Install it first.", player_type),
            ExitCode::Error,
        );
    }

    output.info(format!("Opening {} in {}...", channel.name, player_type));
    if let Some(title) = &now_playing {
        output.info(format!("Now: {}", title));
    }

    let started = if cmd.wait {
        player.play_and_wait(url).await
    } else {
        player.play(url).await.map(|_| ())
    };
    if let Err(e) = started {
        return output.error(e.to_string(), ExitCode::Error);
    }

    let response = PlayResponse {
        status: "playing",
        player: player_type.to_string(),
        title: channel_title(channel, now_playing),
    };
    if let Err(e) = output.print(&response) {
        return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
    }
    ExitCode::Success
}

/// Drive the session to one item of one category
///
/// The stored session is resumed in `content_type`, then the category and the
/// item are selected. Notices left by the automatic selection of another
/// category are cleared first, so a failure there is not reported as a
/// failure of the requested item.
pub async fn resolve_item<C: Catalog, S: CredentialStore>(
    session: &mut Session<C, S>,
    notices: &NoticeLog,
    content_type: ContentType,
    category_id: &str,
    stream_id: &str,
) -> Result<(), (String, ExitCode)> {
    if !session.resume(content_type).await {
        return Err((
            "Not logged in. Run `xtreamview login <url> <username> <password>` first.".to_string(),
            ExitCode::NotLoggedIn,
        ));
    }
    let categories_failed = failure_in(notices, Operation::Categories).is_some();

    if session.app().selected_category_id() != Some(category_id) {
        notices.drain();
        session.select_category(category_id).await;
    }
    if session.app().selected_category_id() != Some(category_id) {
        let code = if categories_failed {
            ExitCode::NetworkError
        } else {
            ExitCode::NotFound
        };
        return Err((format!("Category {} not found", category_id), code));
    }

    session.select_channel(stream_id).await;
    let selected = session
        .app()
        .selected_channel()
        .is_some_and(|c| c.id == stream_id);
    if !selected {
        let code = if failure_in(notices, Operation::Channels).is_some() {
            ExitCode::NetworkError
        } else {
            ExitCode::NotFound
        };
        return Err((format!("Item {} not found", stream_id), code));
    }
    Ok(())
}

/// Message of the last failure notice of an operation
fn failure_in(notices: &NoticeLog, operation: Operation) -> Option<String> {
    notices
        .snapshot()
        .into_iter()
        .rev()
        .find(|n| n.operation == operation && n.level == NoticeLevel::Error)
        .map(|n| n.message)
}

/// Category handle for direct catalog calls; only id and type are sent
fn category_ref(id: &str, content_type: ContentType) -> Category {
    Category {
        id: id.to_string(),
        name: String::new(),
        content_type,
    }
}

fn channel_title(channel: &Channel, now_playing: Option<String>) -> String {
    match now_playing {
        Some(program) => format!("{} - {}", channel.name, program),
        None => channel.name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EpgProgram;
    use crate::notify::{Notice, Notifier};
    use crate::store::MemoryCredentialStore;
    use std::sync::Mutex;

    /// Panel whose first live category fails to list its items
    #[derive(Clone, Default)]
    struct FlakyPanel {
        notices: NoticeLog,
        category_calls: Arc<Mutex<usize>>,
        channel_calls: Arc<Mutex<Vec<String>>>,
    }

    impl Catalog for FlakyPanel {
        async fn validate_account(&self, _credentials: &Credentials) -> bool {
            true
        }

        async fn list_categories(&self, _credentials: &Credentials) -> Vec<Category> {
            *self.category_calls.lock().unwrap() += 1;
            vec![
                category_ref("1", ContentType::Live),
                category_ref("2", ContentType::Live),
                category_ref("10", ContentType::Movie),
            ]
        }

        async fn list_channels(
            &self,
            credentials: &Credentials,
            category: &Category,
        ) -> Vec<Channel> {
            self.channel_calls.lock().unwrap().push(category.id.clone());
            let id = match category.id.as_str() {
                "1" => {
                    self.notices.notify(Notice::failure(Operation::Channels));
                    return Vec::new();
                }
                "2" => "201",
                "10" => "1001",
                _ => return Vec::new(),
            };
            vec![Channel {
                id: id.to_string(),
                name: format!("Item {}", id),
                stream_url: credentials.stream_url(category.content_type, id),
                icon: None,
                epg_channel_id: None,
                category_id: category.id.clone(),
                content_type: category.content_type,
            }]
        }

        async fn fetch_epg(&self, _credentials: &Credentials, _channel_id: Option<&str>) -> EpgIndex {
            EpgIndex::new()
        }
    }

    fn logged_in(panel: &FlakyPanel) -> Session<FlakyPanel, MemoryCredentialStore> {
        let creds = LoginForm::new("ex.com", "u", "p").normalize().unwrap();
        Session::new(panel.clone(), MemoryCredentialStore::with(creds))
    }

    #[tokio::test]
    async fn test_missing_item_is_not_found_despite_other_category_failure() {
        let panel = FlakyPanel::default();
        let mut session = logged_in(&panel);

        let result =
            resolve_item(&mut session, &panel.notices, ContentType::Live, "2", "999").await;

        assert_eq!(result.map_err(|(_, code)| code), Err(ExitCode::NotFound));
        assert_eq!(*panel.channel_calls.lock().unwrap(), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_failure_of_requested_category_is_network_error() {
        let panel = FlakyPanel::default();
        let mut session = logged_in(&panel);

        let result =
            resolve_item(&mut session, &panel.notices, ContentType::Live, "1", "101").await;

        assert_eq!(result.map_err(|(_, code)| code), Err(ExitCode::NetworkError));
    }

    #[tokio::test]
    async fn test_resolve_movie_fetches_categories_once() {
        let panel = FlakyPanel::default();
        let mut session = logged_in(&panel);

        let result =
            resolve_item(&mut session, &panel.notices, ContentType::Movie, "10", "1001").await;

        assert!(result.is_ok());
        assert_eq!(*panel.category_calls.lock().unwrap(), 1);
        assert_eq!(*panel.channel_calls.lock().unwrap(), vec!["10"]);
        assert_eq!(
            session.app().playable_url(),
            Some("http://ex.com/movie/u/p/1001.mp4")
        );
    }

    #[tokio::test]
    async fn test_resolve_without_stored_session() {
        let panel = FlakyPanel::default();
        let mut session = Session::new(panel.clone(), MemoryCredentialStore::new());

        let result =
            resolve_item(&mut session, &panel.notices, ContentType::Live, "2", "201").await;

        assert_eq!(result.map_err(|(_, code)| code), Err(ExitCode::NotLoggedIn));
    }

    fn channel(name: &str) -> Channel {
        Channel {
            id: "1".to_string(),
            name: name.to_string(),
            stream_url: "http://ex.com/live/u/p/1.m3u8".to_string(),
            icon: None,
            epg_channel_id: None,
            category_id: "10".to_string(),
            content_type: ContentType::Live,
        }
    }

    #[test]
    fn test_channel_title() {
        let ch = channel("News One");
        assert_eq!(channel_title(&ch, None), "News One");
        assert_eq!(
            channel_title(&ch, Some("Headlines".to_string())),
            "News One - Headlines"
        );
    }

    #[test]
    fn test_category_ref_keeps_type() {
        let category = category_ref("7", ContentType::Series);
        assert_eq!(category.id, "7");
        assert_eq!(category.content_type, ContentType::Series);
    }

    #[test]
    fn test_airing_only_keeps_current_program() {
        let now = Utc::now();
        let mut index = EpgIndex::new();
        index.push(EpgProgram::new(
            "1",
            "On air",
            None,
            now - chrono::Duration::minutes(10),
            now + chrono::Duration::minutes(10),
        ));
        index.push(EpgProgram::new(
            "1",
            "Later",
            None,
            now + chrono::Duration::hours(1),
            now + chrono::Duration::hours(2),
        ));

        let airing = airing_only(&index);
        let programs = airing.programs_for("1");
        assert_eq!(programs.len(), 1);
        assert_eq!(programs[0].title, "On air");
    }
}

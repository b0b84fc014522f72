//! Session driver
//!
//! Runs user intents against the catalog: each intent goes through `App`,
//! the returned fetch tickets are executed on the `Catalog`, and results are
//! applied back. Chained fetches (categories, then the auto-selected
//! category's channels, then the auto-selected channel's guide) run in order
//! within one intent.

use std::sync::Arc;
use tracing::{info, warn};

use crate::api::Catalog;
use crate::app::{App, CategoriesRequest, ChannelsRequest, EpgRequest};
use crate::models::{ContentType, LoginError, LoginForm};
use crate::notify::{LogNotifier, Notice, Notifier, Operation};
use crate::store::CredentialStore;

/// Playback session over a catalog and a credential store
pub struct Session<C, S> {
    app: App,
    catalog: C,
    store: S,
    notifier: Arc<dyn Notifier>,
}

impl<C: Catalog, S: CredentialStore> Session<C, S> {
    pub fn new(catalog: C, store: S) -> Self {
        Self {
            app: App::new(),
            catalog,
            store,
            notifier: Arc::new(LogNotifier),
        }
    }

    /// Route session notices to another sink
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Read-only session state
    pub fn app(&self) -> &App {
        &self.app
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Resume the stored session, if any, and load its categories
    ///
    /// Returns whether a session was restored.
    pub async fn start(&mut self) -> bool {
        self.resume(ContentType::default()).await
    }

    /// Resume the stored session browsing `content_type`
    ///
    /// Categories are fetched once, already scoped to `content_type`.
    pub async fn resume(&mut self, content_type: ContentType) -> bool {
        let credentials = match self.store.load() {
            Ok(Some(credentials)) => credentials,
            Ok(None) => return false,
            Err(e) => {
                warn!(error = %e, "Could not read stored credentials");
                return false;
            }
        };

        info!(account = %credentials, "Resuming stored session");
        // The restore ticket is superseded by the one issued below
        let _ = self.app.restore(credentials);
        let request = self
            .app
            .set_content_type(content_type)
            .or_else(|| self.app.request_categories());
        if let Some(request) = request {
            self.run_categories(request).await;
        }
        true
    }

    /// Log in with the submitted form
    ///
    /// Form errors come back as `Err` without any network call. `Ok(false)`
    /// means the panel rejected or could not validate the account; the
    /// catalog has already notified the user. A login that could not be
    /// persisted still succeeds, with an error notice instead of the success
    /// notice.
    pub async fn login(&mut self, form: &LoginForm) -> Result<bool, LoginError> {
        let credentials = self.app.begin_login(form)?;
        let valid = self.catalog.validate_account(&credentials).await;
        let request = self.app.finish_login(&credentials, valid);

        if !valid {
            return Ok(false);
        }

        let notice = match self.store.save(&credentials) {
            Ok(()) => Notice::success(Operation::Login, "Successfully logged in!"),
            Err(e) => {
                warn!(error = %e, "Could not persist credentials");
                Notice::error(
                    Operation::Login,
                    "Logged in, but your account could not be remembered on this device.",
                )
            }
        };
        self.notifier.notify(notice);

        if let Some(request) = request {
            self.run_categories(request).await;
        }
        Ok(true)
    }

    /// Forget the session and the stored credentials
    pub fn logout(&mut self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Could not clear stored credentials");
        }
        self.app.logout();
        self.notifier
            .notify(Notice::info(Operation::Logout, "Logged out successfully"));
    }

    /// Switch content type and reload categories
    pub async fn set_content_type(&mut self, content_type: ContentType) {
        if let Some(request) = self.app.set_content_type(content_type) {
            self.run_categories(request).await;
        }
    }

    /// Reload every category
    pub async fn refresh_categories(&mut self) {
        if let Some(request) = self.app.request_categories() {
            self.run_categories(request).await;
        }
    }

    /// Select a category and load its items
    pub async fn select_category(&mut self, category_id: &str) {
        if let Some(request) = self.app.select_category(category_id) {
            self.run_channels(request).await;
        }
    }

    /// Select an item and load its guide when it is a live channel
    pub async fn select_channel(&mut self, channel_id: &str) {
        if let Some(request) = self.app.select_channel(channel_id) {
            self.run_epg(request).await;
        }
    }

    /// Load the full guide table into the index
    pub async fn load_full_epg(&mut self) {
        if let Some(request) = self.app.request_full_epg() {
            self.run_epg(request).await;
        }
    }

    async fn run_categories(&mut self, request: CategoriesRequest) {
        let categories = self.catalog.list_categories(&request.credentials).await;
        if let Some(next) = self.app.apply_categories(request.seq, categories) {
            self.run_channels(next).await;
        }
    }

    async fn run_channels(&mut self, request: ChannelsRequest) {
        let channels = self
            .catalog
            .list_channels(&request.credentials, &request.category)
            .await;
        if let Some(next) = self.app.apply_channels(request.seq, channels) {
            self.run_epg(next).await;
        }
    }

    async fn run_epg(&mut self, request: EpgRequest) {
        let index = self
            .catalog
            .fetch_epg(&request.credentials, request.channel_id.as_deref())
            .await;
        self.app.apply_epg(request.seq, index);
    }
}

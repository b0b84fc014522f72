//! Xtream Codes panel client
//!
//! Talks to `{server}/player_api.php` with query-string requests.
//! Panel API notes: every call carries `username` and `password`, the
//! account check has no `action`, listings select their data with `action`.
//!
//! The public catalog operations never fail: transport errors, timeouts,
//! panel-reported errors and malformed payloads are logged, turned into a
//! single user notice and replaced by an empty result.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::payload;
use super::Catalog;
use crate::models::{Category, Channel, ContentType, Credentials, EpgIndex};
use crate::notify::{LogNotifier, Notice, Notifier, Operation};

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Panel client error types
#[derive(Error, Debug)]
pub enum XtreamError {
    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error: {0}")]
    Http(u16),

    #[error("Invalid response: {0}")]
    Parse(String),

    #[error("Panel reported an error: {0}")]
    Panel(String),
}

impl From<reqwest::Error> for XtreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            XtreamError::Timeout
        } else {
            // The request URL carries the password in its query string
            XtreamError::Network(err.without_url().to_string())
        }
    }
}

/// Xtream Codes panel client
pub struct XtreamClient {
    client: reqwest::Client,
    timeout: Duration,
    notifier: Arc<dyn Notifier>,
}

impl XtreamClient {
    /// Create a client with the default 10 second timeout
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom request timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            timeout,
            notifier: Arc::new(LogNotifier),
        }
    }

    /// Route user notices to another sink
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET `player_api.php` and parse the body as an untyped document
    async fn get(
        &self,
        credentials: &Credentials,
        action: Option<&str>,
        params: &[(&str, &str)],
    ) -> Result<Value, XtreamError> {
        let mut query: Vec<(&str, &str)> = vec![
            ("username", credentials.username.as_str()),
            ("password", credentials.password.as_str()),
        ];
        if let Some(action) = action {
            query.push(("action", action));
        }
        query.extend_from_slice(params);

        debug!(
            server = credentials.base_url(),
            action = action.unwrap_or("account_info"),
            "Xtream API request"
        );

        let response = self
            .client
            .get(credentials.api_url())
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(XtreamError::Http(status.as_u16()));
        }

        let body = response.text().await?;

        // Some panels answer an empty body when there is nothing to list
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        let doc: Value = serde_json::from_str(&body).map_err(|e| {
            debug!("Response text: {}", body.chars().take(200).collect::<String>());
            XtreamError::Parse(format!("JSON parse error: {}", e))
        })?;

        if let Some(message) = payload::panel_error(&doc) {
            return Err(XtreamError::Panel(message));
        }

        Ok(doc)
    }

    async fn fetch_categories(
        &self,
        credentials: &Credentials,
        content_type: ContentType,
    ) -> Result<Vec<Category>, XtreamError> {
        let doc = self
            .get(credentials, Some(content_type.categories_action()), &[])
            .await?;
        payload::parse_categories(&doc, content_type)
    }

    async fn fetch_channels(
        &self,
        credentials: &Credentials,
        category: &Category,
    ) -> Result<Vec<Channel>, XtreamError> {
        let doc = self
            .get(
                credentials,
                Some(category.content_type.streams_action()),
                &[("category_id", category.id.as_str())],
            )
            .await?;
        payload::parse_channels(&doc, credentials, category)
    }

    async fn fetch_guide(
        &self,
        credentials: &Credentials,
        channel_id: Option<&str>,
    ) -> Result<EpgIndex, XtreamError> {
        let doc = match channel_id {
            Some(id) => {
                self.get(credentials, Some("get_short_epg"), &[("stream_id", id)])
                    .await?
            }
            None => {
                self.get(credentials, Some("get_simple_data_table"), &[])
                    .await?
            }
        };
        payload::parse_epg(&doc, channel_id)
    }
}

impl Default for XtreamClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog for XtreamClient {
    async fn validate_account(&self, credentials: &Credentials) -> bool {
        match self.get(credentials, None, &[]).await {
            Ok(doc) if payload::is_authorized(&doc) => {
                info!(account = %credentials, "Account validated");
                true
            }
            Ok(_) => {
                warn!(account = %credentials, "Account check returned no user info");
                self.notifier.notify(Notice::error(
                    Operation::Login,
                    "Invalid credentials. Please try again.",
                ));
                false
            }
            Err(e) => {
                warn!(account = %credentials, error = %e, "Error validating account");
                self.notifier.notify(Notice::failure(Operation::Login));
                false
            }
        }
    }

    async fn list_categories(&self, credentials: &Credentials) -> Vec<Category> {
        let (live, vod, series) = tokio::join!(
            self.fetch_categories(credentials, ContentType::Live),
            self.fetch_categories(credentials, ContentType::Movie),
            self.fetch_categories(credentials, ContentType::Series),
        );

        let mut categories = Vec::new();
        let mut failed = false;
        for (content_type, result) in [
            (ContentType::Live, live),
            (ContentType::Movie, vod),
            (ContentType::Series, series),
        ] {
            match result {
                Ok(mut partition) => categories.append(&mut partition),
                Err(e) => {
                    warn!(%content_type, error = %e, "Error fetching categories");
                    failed = true;
                }
            }
        }

        if failed {
            self.notifier.notify(Notice::failure(Operation::Categories));
        }
        debug!(count = categories.len(), "Categories loaded");
        categories
    }

    async fn list_channels(&self, credentials: &Credentials, category: &Category) -> Vec<Channel> {
        match self.fetch_channels(credentials, category).await {
            Ok(channels) => {
                debug!(category = %category.id, count = channels.len(), "Channels loaded");
                channels
            }
            Err(e) => {
                warn!(category = %category.id, error = %e, "Error fetching channels");
                self.notifier.notify(Notice::failure(Operation::Channels));
                Vec::new()
            }
        }
    }

    async fn fetch_epg(&self, credentials: &Credentials, channel_id: Option<&str>) -> EpgIndex {
        match self.fetch_guide(credentials, channel_id).await {
            Ok(index) => {
                debug!(channels = index.len(), "Guide loaded");
                index
            }
            Err(e) => {
                warn!(channel = channel_id.unwrap_or("*"), error = %e, "Error fetching EPG");
                self.notifier.notify(Notice::failure(Operation::Epg));
                EpgIndex::new()
            }
        }
    }
}

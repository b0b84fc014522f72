//! Catalog access for Xtream Codes panels
//!
//! - `xtream`: HTTP client for `player_api.php`
//! - `payload`: normalization of panel responses into domain models

pub mod payload;
pub mod xtream;

pub use xtream::{XtreamClient, XtreamError, DEFAULT_TIMEOUT};

use crate::models::{Category, Channel, Credentials, EpgIndex};

/// Catalog operations the session controller depends on
///
/// Implementations absorb every upstream fault: callers only ever see
/// success-shaped values, possibly empty.
#[allow(async_fn_in_trait)]
pub trait Catalog {
    /// Check the account; `true` only for a recognized, error-free account
    async fn validate_account(&self, credentials: &Credentials) -> bool;

    /// Live, then movie, then series categories in panel order
    async fn list_categories(&self, credentials: &Credentials) -> Vec<Category>;

    /// Items of one category
    async fn list_channels(&self, credentials: &Credentials, category: &Category) -> Vec<Channel>;

    /// Guide for one channel, or for every channel when `channel_id` is `None`
    async fn fetch_epg(&self, credentials: &Credentials, channel_id: Option<&str>) -> EpgIndex;
}

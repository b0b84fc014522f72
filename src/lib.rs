//! xtreamview - Xtream Codes IPTV client
//!
//! A catalog client for Xtream Codes panels and a session controller that
//! drives login, category and channel browsing, the program guide and
//! playback URL resolution.
//!
//! # Modules
//!
//! - `models` - Credentials, categories, channels and guide data
//! - `api` - Catalog trait and the Xtream HTTP client
//! - `app` - Session state machine
//! - `session` - Runs session intents against a catalog
//! - `store` - Credential persistence
//! - `notify` - User notices
//! - `player` - Local VLC/mpv playback
//! - `cli` / `commands` - Command line shell

pub mod api;
pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod models;
pub mod notify;
pub mod player;
pub mod session;
pub mod store;

// Re-export commonly used types
pub use models::{
    Category, Channel, ContentType, Credentials, EpgIndex, EpgProgram, LoginError, LoginForm,
};

pub use api::{Catalog, XtreamClient, XtreamError};
pub use app::{App, AppState, SessionSnapshot};
pub use notify::{Notice, NoticeLevel, NoticeLog, Notifier, Operation};
pub use session::Session;
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};

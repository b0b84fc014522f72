//! User-facing notifications
//!
//! Transient messages shown to the user when something happens that they
//! should know about, most importantly catalog failures. Raw panel payloads
//! and transport errors never end up in a notice; those go to the log.

use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Severity of a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// Operation a notice refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Login,
    Logout,
    Categories,
    Channels,
    Epg,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Login => write!(f, "login"),
            Operation::Logout => write!(f, "logout"),
            Operation::Categories => write!(f, "categories"),
            Operation::Channels => write!(f, "channels"),
            Operation::Epg => write!(f, "epg"),
        }
    }
}

/// A transient user notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub operation: Operation,
    pub message: String,
}

impl Notice {
    pub fn error(operation: Operation, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            operation,
            message: message.into(),
        }
    }

    pub fn success(operation: Operation, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            operation,
            message: message.into(),
        }
    }

    pub fn info(operation: Operation, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            operation,
            message: message.into(),
        }
    }

    /// Generic failure text for an operation
    pub fn failure(operation: Operation) -> Self {
        let message = match operation {
            Operation::Login => "Failed to validate your account. Please check your credentials.",
            Operation::Logout => "Failed to log out.",
            Operation::Categories => "Failed to load categories. Please try again.",
            Operation::Channels => "Failed to load channels. Please try again.",
            Operation::Epg => "Failed to load the program guide.",
        };
        Self::error(operation, message)
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Sink for user notifications
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Writes notices to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => tracing::warn!(operation = %notice.operation, "{}", notice.message),
            _ => tracing::info!(operation = %notice.operation, "{}", notice.message),
        }
    }
}

/// Collects notices in memory; cloned handles share the same buffer
#[derive(Debug, Clone, Default)]
pub struct NoticeLog {
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl NoticeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every notice collected so far
    pub fn drain(&self) -> Vec<Notice> {
        match self.notices.lock() {
            Ok(mut notices) => std::mem::take(&mut *notices),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    pub fn snapshot(&self) -> Vec<Notice> {
        match self.notices.lock() {
            Ok(notices) => notices.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Notices of a given operation
    pub fn count(&self, operation: Operation) -> usize {
        self.snapshot()
            .iter()
            .filter(|n| n.operation == operation)
            .count()
    }
}

impl Notifier for NoticeLog {
    fn notify(&self, notice: Notice) {
        LogNotifier.notify(notice.clone());
        match self.notices.lock() {
            Ok(mut notices) => notices.push(notice),
            Err(poisoned) => poisoned.into_inner().push(notice),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_log_shared_between_clones() {
        let log = NoticeLog::new();
        let handle = log.clone();
        handle.notify(Notice::failure(Operation::Channels));
        handle.notify(Notice::success(Operation::Login, "Successfully logged in!"));

        assert_eq!(log.count(Operation::Channels), 1);
        assert_eq!(log.count(Operation::Login), 1);

        let drained = log.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].level, NoticeLevel::Error);
        assert!(log.snapshot().is_empty());
    }

    #[test]
    fn test_failure_messages_are_generic() {
        let notice = Notice::failure(Operation::Categories);
        assert_eq!(notice.to_string(), "Failed to load categories. Please try again.");
        assert_eq!(notice.level, NoticeLevel::Error);
    }
}

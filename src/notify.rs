//! User-facing notifications.
//!
//! Every failure and success the client surfaces to a person goes through a
//! [`Notifier`]. The [`NotificationCenter`] keeps a short, expiring history
//! for front ends that render toasts and mirrors each entry to the log.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

const MAX_NOTIFICATIONS: usize = 10;
const DEFAULT_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub level: Level,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

fn log_notification(level: Level, title: &str, description: &str) {
    match level {
        Level::Error => error!(%title, %description, "notification"),
        Level::Warning => warn!(%title, %description, "notification"),
        Level::Success | Level::Info => info!(%title, %description, "notification"),
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, level: Level, title: &str, description: &str);

    fn success(&self, title: &str, description: &str) {
        self.notify(Level::Success, title, description);
    }

    fn error(&self, title: &str, description: &str) {
        self.notify(Level::Error, title, description);
    }

    fn warning(&self, title: &str, description: &str) {
        self.notify(Level::Warning, title, description);
    }

    fn info(&self, title: &str, description: &str) {
        self.notify(Level::Info, title, description);
    }
}

/// Bounded, newest-first notification history with per-entry expiry.
#[derive(Debug)]
pub struct NotificationCenter {
    ttl: Duration,
    items: Mutex<VecDeque<Notification>>,
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl NotificationCenter {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            items: Mutex::new(VecDeque::with_capacity(MAX_NOTIFICATIONS)),
        }
    }

    fn items(&self) -> std::sync::MutexGuard<'_, VecDeque<Notification>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, level: Level, title: &str, description: &str) -> Uuid {
        log_notification(level, title, description);
        let notification = Notification {
            id: Uuid::new_v4(),
            level,
            title: title.to_string(),
            description: description.to_string(),
            created_at: Utc::now(),
        };
        let id = notification.id;
        let mut items = self.items();
        items.push_front(notification);
        items.truncate(MAX_NOTIFICATIONS);
        id
    }

    pub fn remove(&self, id: Uuid) -> bool {
        let mut items = self.items();
        let before = items.len();
        items.retain(|n| n.id != id);
        items.len() != before
    }

    /// Notifications that have not yet expired, newest first.
    pub fn active(&self) -> Vec<Notification> {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::days(365));
        let cutoff = Utc::now() - ttl;
        let mut items = self.items();
        items.retain(|n| n.created_at > cutoff);
        items.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<Notification> {
        self.items().front().cloned()
    }

    pub fn clear(&self) {
        self.items().clear();
    }
}

impl Notifier for NotificationCenter {
    fn notify(&self, level: Level, title: &str, description: &str) {
        self.push(level, title, description);
    }
}

use crate::core::clock::Clock;
use crate::core::refresh::RefreshTrigger;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

const APP_NAME: &str = "publika";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl Notification {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let elapsed = now.signed_duration_since(self.created_at);
        elapsed.to_std().is_ok_and(|elapsed| elapsed >= self.ttl)
    }
}

/// Ordered, self-expiring user-facing messages.
#[derive(Debug, Default)]
pub struct NotificationQueue {
    entries: Vec<Notification>,
    sent: Vec<(String, Duration)>,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a message unless the same `(message, ttl)` was pushed before.
    ///
    /// The first message of the process is kept on screen twice as long.
    pub fn push(&mut self, message: &str, ttl: Duration, now: DateTime<Utc>) -> Option<Notification> {
        let key = (message.to_string(), ttl);
        if self.sent.contains(&key) {
            return None;
        }

        let ttl = if self.sent.is_empty() { ttl * 2 } else { ttl };
        self.sent.push(key);

        let notification = Notification {
            id: Uuid::new_v4(),
            message: message.to_string(),
            created_at: now,
            ttl,
        };
        self.entries.push(notification.clone());
        Some(notification)
    }

    /// Drops expired entries and returns how many were removed.
    pub fn tick(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|n| !n.is_expired(now));
        before - self.entries.len()
    }

    pub fn list(&self) -> &[Notification] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shared handle that queues notifications and signals the renderer.
#[derive(Clone)]
pub struct Notifier {
    queue: Arc<RwLock<NotificationQueue>>,
    trigger: RefreshTrigger,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    desktop: bool,
}

impl Notifier {
    pub fn new(trigger: RefreshTrigger, clock: Arc<dyn Clock>, ttl: Duration, desktop: bool) -> Self {
        Self {
            queue: Arc::new(RwLock::new(NotificationQueue::new())),
            trigger,
            clock,
            ttl,
            desktop,
        }
    }

    pub async fn notify(&self, message: &str) {
        let pushed = {
            let mut queue = self.queue.write().await;
            queue.push(message, self.ttl, self.clock.now())
        };

        let Some(notification) = pushed else {
            tracing::debug!(text = message, "Dropping duplicate notification");
            return;
        };

        tracing::info!(id = %notification.id, text = message, "Queued notification");
        if self.desktop {
            if let Err(e) = send_desktop_notification(message, notification.ttl) {
                tracing::warn!(error = %e, "Failed to send desktop notification");
            }
        }
        self.trigger.trigger();
    }

    /// Expires old notifications; returns whether any remain.
    pub async fn tick(&self) -> bool {
        let (removed, remaining) = {
            let mut queue = self.queue.write().await;
            let removed = queue.tick(self.clock.now());
            (removed, !queue.is_empty())
        };

        if removed > 0 {
            tracing::debug!(removed, "Expired notifications");
            self.trigger.trigger();
        }
        remaining
    }

    pub async fn list(&self) -> Vec<Notification> {
        self.queue.read().await.list().to_vec()
    }
}

fn send_desktop_notification(message: &str, ttl: Duration) -> Result<()> {
    notify_rust::Notification::new()
        .summary("Publika")
        .body(message)
        .appname(APP_NAME)
        .timeout(notify_rust::Timeout::Milliseconds(ttl.as_millis() as u32))
        .show()?;
    Ok(())
}

//! Per-user notification surface: inbox, history, preferences and test sends.

use std::sync::Arc;

use mockable::Clock;

use super::model::{
    Channel, HistoryEntry, InboxItem, Notification, NotificationDraft, NotificationType, Recipient,
};
use super::preferences::NotificationPreferences;
use super::queue::NotificationQueue;
use crate::domain::ports::{
    InboxRepository, NotificationRepository, PreferencesRepository, RecipientDirectory,
};
use crate::domain::{Error, NotificationId, UserId};

pub const DEFAULT_INBOX_LIMIT: usize = 10;
pub const MAX_INBOX_LIMIT: usize = 50;
pub const HISTORY_LIMIT: usize = 50;

/// Requested page size, falling back to the default when out of range.
pub fn inbox_limit(requested: Option<usize>) -> usize {
    requested
        .filter(|n| (1..=MAX_INBOX_LIMIT).contains(n))
        .unwrap_or(DEFAULT_INBOX_LIMIT)
}

/// Storage ports behind the notification center.
#[derive(Clone)]
pub struct NotificationCenterPorts {
    pub notifications: Arc<dyn NotificationRepository>,
    pub inbox: Arc<dyn InboxRepository>,
    pub preferences: Arc<dyn PreferencesRepository>,
    pub directory: Arc<dyn RecipientDirectory>,
}

pub struct NotificationCenter {
    ports: NotificationCenterPorts,
    queue: Arc<NotificationQueue>,
    clock: Arc<dyn Clock>,
}

impl NotificationCenter {
    pub fn new(
        ports: NotificationCenterPorts,
        queue: Arc<NotificationQueue>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ports,
            queue,
            clock,
        }
    }

    pub async fn inbox(
        &self,
        user_id: &UserId,
        limit: Option<usize>,
    ) -> Result<Vec<InboxItem>, Error> {
        Ok(self.ports.inbox.list(user_id, inbox_limit(limit)).await?)
    }

    pub async fn unread_count(&self, user_id: &UserId) -> Result<u64, Error> {
        Ok(self.ports.inbox.unread_count(user_id).await?)
    }

    /// # Errors
    /// `not_found` when the notification is not in the caller's inbox.
    pub async fn mark_read(&self, user_id: &UserId, id: &NotificationId) -> Result<(), Error> {
        if self
            .ports
            .inbox
            .mark_read(user_id, id, self.clock.utc())
            .await?
        {
            Ok(())
        } else {
            Err(Error::not_found(format!("notification {id} not found")))
        }
    }

    pub async fn mark_all_read(&self, user_id: &UserId) -> Result<u64, Error> {
        Ok(self
            .ports
            .inbox
            .mark_all_read(user_id, self.clock.utc())
            .await?)
    }

    /// Latest delivery records for the caller, newest first.
    pub async fn history(&self, user_id: &UserId) -> Result<Vec<HistoryEntry>, Error> {
        Ok(self
            .ports
            .notifications
            .recent_history(user_id, HISTORY_LIMIT)
            .await?)
    }

    /// Stored preferences, or the defaults for a user who never saved any.
    pub async fn preferences(&self, user_id: &UserId) -> Result<NotificationPreferences, Error> {
        Ok(self
            .ports
            .preferences
            .find(user_id)
            .await?
            .unwrap_or_default())
    }

    pub async fn update_preferences(
        &self,
        user_id: &UserId,
        preferences: NotificationPreferences,
    ) -> Result<NotificationPreferences, Error> {
        self.ports.preferences.save(user_id, &preferences).await?;
        Ok(preferences)
    }

    /// Send a `system_alert` to the caller over every channel they enabled.
    pub async fn send_test(&self, user_id: &UserId) -> Result<Notification, Error> {
        let mut recipient = self
            .ports
            .directory
            .user(user_id)
            .await?
            .unwrap_or_else(|| Recipient::new(user_id.clone()));
        recipient.preferences = self.preferences(user_id).await?;
        let channels: Vec<Channel> = Channel::ALL
            .into_iter()
            .filter(|c| recipient.preferences.channel_enabled(*c))
            .collect();
        let draft = NotificationDraft::new(
            NotificationType::SystemAlert,
            "Test Notification",
            "This is a test notification. If you can read it, delivery works.",
        )
        .channels(channels)
        .data("test", true)
        .recipients(vec![recipient]);
        self.queue.send(draft).await
    }
}

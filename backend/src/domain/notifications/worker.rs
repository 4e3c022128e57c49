//! Notification workers: preference filtering, channel dispatch and delivery
//! bookkeeping.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use mockable::Clock;
use serde_json::{Map, Value, json};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::model::{
    Channel, DeliveryRecord, DeliveryStatus, Notification, NotificationStatus, Recipient,
    SkipReason,
};
use super::queue::QueueReceiver;
use crate::domain::ports::{ChannelError, ChannelSender, NotificationRepository};

/// Default size of the worker pool.
pub const DEFAULT_WORKERS: usize = 5;

/// Per-channel dispatch deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelTimeouts {
    pub email: Duration,
    /// Applies to SMS, push and in-app dispatch.
    pub http: Duration,
}

impl Default for ChannelTimeouts {
    fn default() -> Self {
        Self {
            email: Duration::from_secs(20),
            http: Duration::from_secs(10),
        }
    }
}

impl ChannelTimeouts {
    pub fn for_channel(&self, channel: Channel) -> Duration {
        match channel {
            Channel::Email => self.email,
            Channel::Sms | Channel::Push | Channel::InApp => self.http,
        }
    }
}

/// Why a whole recipient is skipped before any channel is considered.
pub fn recipient_skip_reason(
    notification: &Notification,
    recipient: &Recipient,
    now: chrono::DateTime<chrono::Utc>,
) -> Option<SkipReason> {
    let preferences = &recipient.preferences;
    if !notification.priority.bypasses_quiet_hours() && preferences.is_quiet_at(now) {
        return Some(SkipReason::QuietHours);
    }
    if !preferences.type_enabled(notification.notification_type) {
        return Some(SkipReason::TypeDisabled);
    }
    None
}

/// Why one channel is skipped for a recipient that passed the global checks.
pub fn channel_skip_reason(recipient: &Recipient, channel: Channel) -> Option<SkipReason> {
    if !recipient.preferences.channel_enabled(channel) {
        Some(SkipReason::ChannelDisabled)
    } else if !recipient.has_contact_for(channel) {
        Some(SkipReason::MissingContact)
    } else {
        None
    }
}

/// Delivers one notification to all of its recipients.
pub struct Dispatcher {
    repository: Arc<dyn NotificationRepository>,
    senders: HashMap<Channel, Arc<dyn ChannelSender>>,
    clock: Arc<dyn Clock>,
    timeouts: ChannelTimeouts,
}

impl Dispatcher {
    pub fn new(
        repository: Arc<dyn NotificationRepository>,
        senders: Vec<Arc<dyn ChannelSender>>,
        clock: Arc<dyn Clock>,
        timeouts: ChannelTimeouts,
    ) -> Self {
        let senders = senders
            .into_iter()
            .map(|sender| (sender.channel(), sender))
            .collect();
        Self {
            repository,
            senders,
            clock,
            timeouts,
        }
    }

    /// Process every recipient concurrently and mark the notification sent.
    pub async fn dispatch(&self, notification: &Notification) {
        let now = self.clock.utc();
        if notification.is_deferred(now) {
            warn!(
                notification_id = %notification.id,
                "refusing to dispatch notification before its scheduled time"
            );
            if let Err(error) = self.repository.release_claim(&notification.id).await {
                warn!(notification_id = %notification.id, error = %error, "failed to release claim");
            }
            return;
        }
        join_all(
            notification
                .recipients
                .iter()
                .map(|recipient| self.deliver_to(notification, recipient)),
        )
        .await;
        if let Err(error) = self
            .repository
            .mark_status(&notification.id, NotificationStatus::Sent, self.clock.utc())
            .await
        {
            warn!(
                notification_id = %notification.id,
                error = %error,
                "failed to mark notification sent"
            );
        }
        info!(
            notification_id = %notification.id,
            recipients = notification.recipients.len(),
            "notification processed"
        );
    }

    async fn deliver_to(&self, notification: &Notification, recipient: &Recipient) {
        if let Some(reason) = recipient_skip_reason(notification, recipient, self.clock.utc()) {
            debug!(
                notification_id = %notification.id,
                user_id = %recipient.user_id,
                reason = reason.as_str(),
                "recipient skipped"
            );
            for channel in &notification.channels {
                self.record(notification, recipient, *channel, Outcome::Skipped(reason))
                    .await;
            }
            return;
        }
        for channel in &notification.channels {
            let outcome = match channel_skip_reason(recipient, *channel) {
                Some(reason) => Outcome::Skipped(reason),
                None => self.attempt(notification, recipient, *channel).await,
            };
            self.record(notification, recipient, *channel, outcome).await;
        }
    }

    async fn attempt(
        &self,
        notification: &Notification,
        recipient: &Recipient,
        channel: Channel,
    ) -> Outcome {
        let Some(sender) = self.senders.get(&channel) else {
            return Outcome::Failed(ChannelError::configuration(format!(
                "no sender registered for {channel}"
            )));
        };
        let deadline = self.timeouts.for_channel(channel);
        match tokio::time::timeout(deadline, sender.send(notification, recipient)).await {
            Ok(Ok(())) => Outcome::Sent,
            Ok(Err(error)) => Outcome::Failed(error),
            Err(_) => Outcome::Failed(ChannelError::timeout(deadline.as_secs())),
        }
    }

    async fn record(
        &self,
        notification: &Notification,
        recipient: &Recipient,
        channel: Channel,
        outcome: Outcome,
    ) {
        let mut metadata = Map::new();
        metadata.insert("attempt".into(), json!(1));
        let (status, error) = match outcome {
            Outcome::Sent => (DeliveryStatus::Sent, None),
            Outcome::Skipped(reason) => {
                metadata.insert("reason".into(), Value::from(reason.as_str()));
                (DeliveryStatus::Skipped, None)
            }
            Outcome::Failed(error) => {
                warn!(
                    notification_id = %notification.id,
                    user_id = %recipient.user_id,
                    channel = %channel,
                    error = %error,
                    "notification delivery failed"
                );
                (DeliveryStatus::Failed, Some(error.to_string()))
            }
        };
        let record = DeliveryRecord {
            notification_id: notification.id.clone(),
            user_id: recipient.user_id.clone(),
            channel,
            status,
            delivered_at: self.clock.utc(),
            error,
            metadata,
        };
        if let Err(error) = self.repository.record_delivery(&record).await {
            warn!(
                notification_id = %notification.id,
                error = %error,
                "failed to record delivery"
            );
        }
    }
}

enum Outcome {
    Sent,
    Skipped(SkipReason),
    Failed(ChannelError),
}

/// Handles of the running worker tasks.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` workers sharing `receiver`.
    pub fn spawn(dispatcher: Arc<Dispatcher>, receiver: QueueReceiver, count: usize) -> Self {
        let handles = (0..count.max(1))
            .map(|worker| {
                let dispatcher = Arc::clone(&dispatcher);
                let receiver = Arc::clone(&receiver);
                tokio::spawn(async move {
                    debug!(worker, "notification worker started");
                    loop {
                        let next = receiver.lock().await.recv().await;
                        let Some(notification) = next else {
                            break;
                        };
                        dispatcher.dispatch(&notification).await;
                    }
                    debug!(worker, "notification worker stopped");
                })
            })
            .collect();
        Self { handles }
    }

    /// Wait for the workers to drain the closed queue, at most `timeout`.
    pub async fn drain(self, timeout: Duration) {
        if tokio::time::timeout(timeout, join_all(self.handles))
            .await
            .is_err()
        {
            warn!(timeout_s = timeout.as_secs(), "notification workers did not drain in time");
        }
    }
}

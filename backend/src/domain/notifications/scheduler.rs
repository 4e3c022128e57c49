//! Releases future-scheduled notifications to the workers once due.

use std::sync::Arc;
use std::time::Duration;

use mockable::Clock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::queue::NotificationQueue;
use crate::domain::ports::NotificationRepository;

pub const DEFAULT_SCHEDULER_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_SCHEDULER_BATCH: usize = 10;

/// Polls the notification store for due work.
pub struct NotificationScheduler {
    repository: Arc<dyn NotificationRepository>,
    queue: Arc<NotificationQueue>,
    clock: Arc<dyn Clock>,
    batch: usize,
}

impl NotificationScheduler {
    pub fn new(
        repository: Arc<dyn NotificationRepository>,
        queue: Arc<NotificationQueue>,
        clock: Arc<dyn Clock>,
        batch: usize,
    ) -> Self {
        Self {
            repository,
            queue,
            clock,
            batch: batch.max(1),
        }
    }

    /// Claim one batch of due notifications and enqueue them in claim order.
    ///
    /// Returns how many were handed to the workers. A notification refused by
    /// the queue has its claim released for the next tick.
    pub async fn tick(&self) -> usize {
        let due = match self.repository.claim_due(self.clock.utc(), self.batch).await {
            Ok(due) => due,
            Err(error) => {
                warn!(error = %error, "failed to claim due notifications");
                return 0;
            }
        };
        let mut enqueued = 0;
        for notification in due {
            let id = notification.id.clone();
            match self.queue.enqueue(notification) {
                Ok(()) => enqueued += 1,
                Err(reason) => {
                    warn!(notification_id = %id, reason = ?reason, "deferring due notification");
                    if let Err(error) = self.repository.release_claim(&id).await {
                        warn!(notification_id = %id, error = %error, "failed to release claim");
                    }
                }
            }
        }
        if enqueued > 0 {
            debug!(enqueued, "scheduled notifications released");
        }
        enqueued
    }

    /// Tick every `interval` until `cancel` fires.
    pub async fn run(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        info!(interval_s = interval.as_secs(), "notification scheduler started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
        info!("notification scheduler stopped");
    }
}

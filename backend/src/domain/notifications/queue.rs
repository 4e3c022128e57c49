//! Bounded in-process queue feeding the notification workers.

use std::sync::{Arc, Mutex, PoisonError};

use mockable::Clock;
use serde_json::json;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use super::model::{Notification, NotificationDraft};
use crate::domain::Error;
use crate::domain::ports::NotificationRepository;

/// Default number of notifications held before producers are refused.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1_000;

/// Why a notification could not be handed to the workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    Full,
    Closed,
}

impl From<EnqueueError> for Error {
    fn from(value: EnqueueError) -> Self {
        match value {
            EnqueueError::Full => Error::service_unavailable("notification queue is full")
                .with_details(json!({ "reason": "queue_full" })),
            EnqueueError::Closed => Error::service_unavailable("notification queue is closed")
                .with_details(json!({ "reason": "queue_closed" })),
        }
    }
}

/// Receive half shared by the worker pool.
pub type QueueReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<Notification>>>;

/// Producer-facing half of the notification pipeline.
///
/// [`NotificationQueue::send`] persists first, so a notification refused by a
/// full queue is still on record as `pending`.
pub struct NotificationQueue {
    repository: Arc<dyn NotificationRepository>,
    clock: Arc<dyn Clock>,
    sender: Mutex<Option<mpsc::Sender<Notification>>>,
}

impl NotificationQueue {
    /// Create a queue holding at most `capacity` notifications and the receiver
    /// the workers drain.
    pub fn new(
        repository: Arc<dyn NotificationRepository>,
        clock: Arc<dyn Clock>,
        capacity: usize,
    ) -> (Self, QueueReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                repository,
                clock,
                sender: Mutex::new(Some(sender)),
            },
            Arc::new(tokio::sync::Mutex::new(receiver)),
        )
    }

    /// Validate, persist and enqueue `draft`.
    ///
    /// Future-scheduled notifications are only persisted; the scheduler
    /// enqueues them once due.
    ///
    /// # Errors
    /// `invalid_request` for an incomplete draft and `service_unavailable`
    /// when the queue is full or closed.
    pub async fn send(&self, draft: NotificationDraft) -> Result<Notification, Error> {
        let now = self.clock.utc();
        let notification = draft.into_notification(now)?;
        self.repository.insert(&notification).await?;
        if notification.is_deferred(now) {
            info!(
                notification_id = %notification.id,
                scheduled_at = ?notification.scheduled_at,
                "notification scheduled"
            );
            return Ok(notification);
        }
        self.enqueue(notification.clone())?;
        debug!(notification_id = %notification.id, "notification queued");
        Ok(notification)
    }

    /// Hand an already persisted notification to the workers without waiting.
    pub fn enqueue(&self, notification: Notification) -> Result<(), EnqueueError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(EnqueueError::Closed)?;
        sender.try_send(notification).map_err(|error| match error {
            TrySendError::Full(n) => {
                warn!(notification_id = %n.id, "notification queue full");
                EnqueueError::Full
            }
            TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Stop accepting work. Workers finish what is already queued and exit.
    pub fn close(&self) {
        if self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
        {
            info!("notification queue closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorCode;
    use crate::domain::UserId;
    use crate::domain::notifications::{NotificationStatus, NotificationType, Recipient};
    use crate::domain::ports::{MockNotificationRepository, NotificationRepositoryError};
    use crate::test_support::{InMemoryNotificationRepository, MutableClock};
    use chrono::{TimeDelta, TimeZone, Utc};
    use rstest::{fixture, rstest};

    fn clock() -> Arc<MutableClock> {
        Arc::new(MutableClock::new(
            Utc.with_ymd_and_hms(2025, 2, 1, 9, 0, 0)
                .single()
                .expect("valid instant"),
        ))
    }

    fn draft() -> NotificationDraft {
        NotificationDraft::new(NotificationType::SystemAlert, "Subject", "Body")
            .recipients(vec![Recipient::new(UserId::new("u1").expect("valid id"))])
    }

    struct Harness {
        clock: Arc<MutableClock>,
        store: Arc<InMemoryNotificationRepository>,
        queue: NotificationQueue,
        receiver: QueueReceiver,
    }

    #[fixture]
    fn harness() -> Harness {
        let clock = clock();
        let store = Arc::new(InMemoryNotificationRepository::default());
        let (queue, receiver) = NotificationQueue::new(store.clone(), clock.clone(), 1);
        Harness {
            clock,
            store,
            queue,
            receiver,
        }
    }

    #[rstest]
    #[tokio::test]
    async fn send_persists_then_enqueues(harness: Harness) {
        let sent = harness.queue.send(draft()).await.expect("queued");

        let stored = harness.store.notification(&sent.id).expect("persisted");
        assert_eq!(stored.status, NotificationStatus::Pending);
        let queued = harness.receiver.lock().await.try_recv().expect("queued");
        assert_eq!(queued.id, sent.id);
    }

    #[rstest]
    #[tokio::test]
    async fn future_notifications_are_only_persisted(harness: Harness) {
        let at = harness.clock.utc() + TimeDelta::minutes(2);
        let sent = harness
            .queue
            .send(draft().scheduled_at(at))
            .await
            .expect("scheduled");

        assert!(harness.store.notification(&sent.id).is_some());
        assert!(harness.receiver.lock().await.try_recv().is_err());
    }

    #[rstest]
    #[tokio::test]
    async fn full_queue_is_service_unavailable(harness: Harness) {
        harness.queue.send(draft()).await.expect("first fits");

        let err = harness.queue.send(draft()).await.expect_err("queue full");

        assert_eq!(err.code(), ErrorCode::ServiceUnavailable);
        assert_eq!(
            err.details().and_then(|d| d.get("reason")),
            Some(&json!("queue_full"))
        );
        assert_eq!(harness.store.notifications().len(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn closed_queue_refuses_work(harness: Harness) {
        harness.queue.close();
        harness.queue.close();

        let err = harness.queue.send(draft()).await.expect_err("closed");
        assert_eq!(err.code(), ErrorCode::ServiceUnavailable);
        assert!(harness.receiver.lock().await.recv().await.is_none());
    }

    #[tokio::test]
    async fn storage_failure_surfaces_before_enqueue() {
        let mut repository = MockNotificationRepository::new();
        repository
            .expect_insert()
            .returning(|_| Err(NotificationRepositoryError::connection("down")));
        let (queue, receiver) = NotificationQueue::new(Arc::new(repository), clock(), 4);

        let err = queue.send(draft()).await.expect_err("store down");

        assert_eq!(err.code(), ErrorCode::ServiceUnavailable);
        assert!(receiver.lock().await.try_recv().is_err());
    }

    #[rstest]
    #[tokio::test]
    async fn invalid_drafts_are_not_persisted(harness: Harness) {
        let err = harness
            .queue
            .send(NotificationDraft::new(NotificationType::SystemAlert, "S", "M"))
            .await
            .expect_err("no recipients");
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
        assert!(harness.store.notifications().is_empty());
    }
}

//! Notification delivery engine.
//!
//! Producers hand a [`NotificationDraft`] to the [`NotificationQueue`], which
//! persists it and feeds the [`WorkerPool`]. Workers apply each recipient's
//! preferences and dispatch through the registered channel senders; the
//! [`NotificationScheduler`] releases future-scheduled records once due.

mod center;
mod in_app;
mod model;
mod preferences;
mod queue;
mod scheduler;
mod templates;
mod triggers;
mod worker;

pub use center::{
    DEFAULT_INBOX_LIMIT, HISTORY_LIMIT, MAX_INBOX_LIMIT, NotificationCenter,
    NotificationCenterPorts, inbox_limit,
};
pub use in_app::InAppChannel;
pub use model::{
    Channel, DeliveryRecord, DeliveryStatus, HistoryEntry, InboxItem, Notification,
    NotificationDraft, NotificationPayload, NotificationStatus, NotificationType, Priority,
    Recipient, SkipReason,
};
pub use preferences::{NotificationPreferences, QuietHours, TimeZoneName};
pub use queue::{DEFAULT_QUEUE_CAPACITY, EnqueueError, NotificationQueue, QueueReceiver};
pub use scheduler::{DEFAULT_SCHEDULER_BATCH, DEFAULT_SCHEDULER_INTERVAL, NotificationScheduler};
pub use templates::{escape_html, render_email};
pub use triggers::{DailyCheck, NotificationTriggers, next_daily_check, run_daily_triggers};
pub use worker::{
    ChannelTimeouts, DEFAULT_WORKERS, Dispatcher, WorkerPool, channel_skip_reason,
    recipient_skip_reason,
};

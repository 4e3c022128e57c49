//! Notification records, recipients and delivery bookkeeping.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::preferences::NotificationPreferences;
use crate::domain::Error;
use crate::domain::deviation::Severity;
use crate::domain::ids::{NotificationId, UserId};

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident ($label:literal) {
            $($variant:ident => $wire:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $wire)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$(Self::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|value| value.as_str() == s)
                    .ok_or_else(|| Error::invalid_request(format!(concat!("unknown ", $label, ": {}"), s)))
            }
        }
    };
}

wire_enum! {
    /// Kind of notification; drives templates and per-type opt-outs.
    pub enum NotificationType ("notification type") {
        MaintenanceDue => "maintenance_due",
        RouteChange => "route_change",
        Emergency => "emergency",
        AttendanceIssue => "attendance_issue",
        VehicleIssue => "vehicle_issue",
        ScheduleReminder => "schedule_reminder",
        SystemAlert => "system_alert",
        ReportReady => "report_ready",
        RouteDeviation => "route_deviation",
    }
}

wire_enum! {
    /// Urgency; `high` and above bypass quiet hours.
    pub enum Priority ("priority") {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

wire_enum! {
    /// Lifecycle of a notification record.
    pub enum NotificationStatus ("notification status") {
        Pending => "pending",
        Sent => "sent",
        Failed => "failed",
    }
}

wire_enum! {
    /// Outcome of one channel attempt for one recipient.
    pub enum DeliveryStatus ("delivery status") {
        Queued => "queued",
        Sent => "sent",
        Failed => "failed",
        Skipped => "skipped",
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

impl Priority {
    /// High and anything above it are urgent, so `critical` bypasses quiet
    /// hours as well as `high`.
    pub fn bypasses_quiet_hours(self) -> bool {
        self >= Self::High
    }
}

impl From<Severity> for Priority {
    fn from(value: Severity) -> Self {
        match value {
            Severity::Low => Self::Low,
            Severity::Medium => Self::Medium,
            Severity::High => Self::High,
            Severity::Critical => Self::Critical,
        }
    }
}

/// Delivery channel.
///
/// Serialised as `in_app`; the hyphenated `in-app` is accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
    Push,
    #[serde(alias = "in-app")]
    InApp,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Self::Email, Self::Sms, Self::Push, Self::InApp];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Push => "push",
            Self::InApp => "in_app",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "sms" => Ok(Self::Sms),
            "push" => Ok(Self::Push),
            "in_app" | "in-app" => Ok(Self::InApp),
            other => Err(Error::invalid_request(format!("unknown channel: {other}"))),
        }
    }
}

/// Why a channel was not attempted for a recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    QuietHours,
    TypeDisabled,
    ChannelDisabled,
    MissingContact,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::QuietHours => "quiet_hours",
            Self::TypeDisabled => "type_disabled",
            Self::ChannelDisabled => "channel_disabled",
            Self::MissingContact => "missing_contact",
        }
    }
}

/// Contact snapshot taken when a notification is enqueued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub user_id: UserId,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub device_tokens: Vec<String>,
    #[serde(default)]
    pub preferences: NotificationPreferences,
}

impl Recipient {
    /// Recipient with default preferences and no contact details.
    pub fn new(user_id: UserId) -> Self {
        let username = user_id.to_string();
        Self {
            user_id,
            username,
            email: None,
            phone: None,
            device_tokens: Vec::new(),
            preferences: NotificationPreferences::default(),
        }
    }

    /// Whether the recipient holds the contact datum `channel` needs.
    pub fn has_contact_for(&self, channel: Channel) -> bool {
        fn present(value: &Option<String>) -> bool {
            value.as_deref().is_some_and(|v| !v.trim().is_empty())
        }
        match channel {
            Channel::Email => present(&self.email),
            Channel::Sms => present(&self.phone),
            Channel::Push => self.device_tokens.iter().any(|t| !t.trim().is_empty()),
            Channel::InApp => true,
        }
    }
}

/// A notification as produced by a trigger or an API caller.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NotificationDraft {
    pub id: Option<String>,
    pub notification_type: Option<NotificationType>,
    pub priority: Option<Priority>,
    pub subject: String,
    pub message: String,
    pub data: Map<String, Value>,
    pub recipients: Vec<Recipient>,
    pub channels: Vec<Channel>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl NotificationDraft {
    pub fn new(
        notification_type: NotificationType,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            notification_type: Some(notification_type),
            subject: subject.into(),
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn channels(mut self, channels: impl IntoIterator<Item = Channel>) -> Self {
        self.channels = channels.into_iter().collect();
        self
    }

    pub fn recipients(mut self, recipients: Vec<Recipient>) -> Self {
        self.recipients = recipients;
        self
    }

    pub fn data(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_owned(), value.into());
        self
    }

    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    /// Validate and apply defaults, producing a pending notification.
    ///
    /// Channels default to email and in-app, priority to medium, and the id to
    /// a generated `notif-` value. Duplicate channels collapse in order.
    pub fn into_notification(self, now: DateTime<Utc>) -> Result<Notification, Error> {
        if self.recipients.is_empty() {
            return Err(Error::invalid_request("notification has no recipients"));
        }
        if self.subject.trim().is_empty() {
            return Err(Error::invalid_request("notification subject is required"));
        }
        if self.message.trim().is_empty() {
            return Err(Error::invalid_request("notification message is required"));
        }
        let notification_type = self
            .notification_type
            .ok_or_else(|| Error::invalid_request("notification type is required"))?;

        let mut channels = Vec::with_capacity(self.channels.len());
        for channel in self.channels {
            if !channels.contains(&channel) {
                channels.push(channel);
            }
        }
        if channels.is_empty() {
            channels = vec![Channel::Email, Channel::InApp];
        }

        Ok(Notification {
            id: self
                .id
                .and_then(NotificationId::from_raw)
                .unwrap_or_else(NotificationId::generate),
            notification_type,
            priority: self.priority.unwrap_or_default(),
            subject: self.subject,
            message: self.message,
            data: self.data,
            recipients: self.recipients,
            channels,
            scheduled_at: self.scheduled_at,
            status: NotificationStatus::Pending,
            created_at: now,
        })
    }
}

/// A validated notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub priority: Priority,
    pub subject: String,
    pub message: String,
    pub data: Map<String, Value>,
    pub recipients: Vec<Recipient>,
    pub channels: Vec<Channel>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub status: NotificationStatus,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// True when dispatch must wait for the scheduler.
    pub fn is_deferred(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at.is_some_and(|at| at > now)
    }
}

/// Client-facing view of a notification, without recipient contact data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationPayload {
    pub id: NotificationId,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub priority: Priority,
    pub subject: String,
    pub message: String,
    pub data: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl From<&Notification> for NotificationPayload {
    fn from(value: &Notification) -> Self {
        Self {
            id: value.id.clone(),
            notification_type: value.notification_type,
            priority: value.priority,
            subject: value.subject.clone(),
            message: value.message.clone(),
            data: value.data.clone(),
            created_at: value.created_at,
        }
    }
}

/// One channel attempt for one recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub notification_id: NotificationId,
    pub user_id: UserId,
    pub channel: Channel,
    pub status: DeliveryStatus,
    pub delivered_at: DateTime<Utc>,
    pub error: Option<String>,
    pub metadata: Map<String, Value>,
}

impl DeliveryRecord {
    pub fn attempt(&self) -> Option<u64> {
        self.metadata.get("attempt").and_then(Value::as_u64)
    }

    pub fn reason(&self) -> Option<&str> {
        self.metadata.get("reason").and_then(Value::as_str)
    }
}

/// An in-app notification as listed in a user's inbox.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InboxItem {
    pub notification_id: NotificationId,
    pub notification_type: NotificationType,
    pub priority: Priority,
    pub subject: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl InboxItem {
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}

/// A delivery record joined with the notification it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub notification_id: NotificationId,
    pub notification_type: NotificationType,
    pub priority: Priority,
    pub subject: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub channel: Channel,
    pub status: DeliveryStatus,
    pub delivered_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    fn manager() -> Recipient {
        Recipient::new(UserId::new("manager1").expect("valid id"))
    }

    #[fixture]
    fn recipient() -> Recipient {
        manager()
    }

    #[rstest]
    fn defaults_are_applied(recipient: Recipient) {
        let now = Utc::now();
        let notification =
            NotificationDraft::new(NotificationType::SystemAlert, "Subject", "Body")
                .recipients(vec![recipient])
                .into_notification(now)
                .expect("valid draft");
        assert_eq!(notification.channels, vec![Channel::Email, Channel::InApp]);
        assert_eq!(notification.priority, Priority::Medium);
        assert_eq!(notification.status, NotificationStatus::Pending);
        assert!(notification.id.as_str().starts_with("notif-"));
        assert_eq!(notification.created_at, now);
    }

    #[rstest]
    fn caller_id_is_kept(recipient: Recipient) {
        let mut draft = NotificationDraft::new(NotificationType::SystemAlert, "S", "M")
            .recipients(vec![recipient]);
        draft.id = Some("custom-1".into());
        let notification = draft.into_notification(Utc::now()).expect("valid draft");
        assert_eq!(notification.id.as_str(), "custom-1");
    }

    #[rstest]
    #[case(NotificationDraft::new(NotificationType::SystemAlert, "S", "M"))]
    #[case(NotificationDraft::new(NotificationType::SystemAlert, " ", "M").recipients(vec![manager()]))]
    #[case(NotificationDraft::new(NotificationType::SystemAlert, "S", "").recipients(vec![manager()]))]
    fn incomplete_drafts_are_rejected(#[case] draft: NotificationDraft) {
        let err = draft.into_notification(Utc::now()).expect_err("invalid draft");
        assert_eq!(err.code(), crate::domain::ErrorCode::InvalidRequest);
    }

    #[rstest]
    fn duplicate_channels_collapse(recipient: Recipient) {
        let notification = NotificationDraft::new(NotificationType::Emergency, "S", "M")
            .channels([Channel::Sms, Channel::Sms, Channel::Push])
            .recipients(vec![recipient])
            .into_notification(Utc::now())
            .expect("valid draft");
        assert_eq!(notification.channels, vec![Channel::Sms, Channel::Push]);
    }

    #[rstest]
    fn legacy_in_app_spelling_is_accepted() {
        let channel: Channel = serde_json::from_str("\"in-app\"").expect("legacy spelling");
        assert_eq!(channel, Channel::InApp);
        assert_eq!(serde_json::to_string(&channel).expect("encode"), "\"in_app\"");
        assert_eq!("in-app".parse::<Channel>().ok(), Some(Channel::InApp));
    }

    #[rstest]
    fn unknown_type_is_a_validation_error() {
        let err = "birthday".parse::<NotificationType>().expect_err("unknown");
        assert_eq!(err.code(), crate::domain::ErrorCode::InvalidRequest);
    }

    #[rstest]
    #[case(Priority::Low, false)]
    #[case(Priority::Medium, false)]
    #[case(Priority::High, true)]
    #[case(Priority::Critical, true)]
    fn quiet_hours_bypass(#[case] priority: Priority, #[case] expected: bool) {
        assert_eq!(priority.bypasses_quiet_hours(), expected);
    }

    #[rstest]
    fn contact_checks(mut recipient: Recipient) {
        assert!(!recipient.has_contact_for(Channel::Email));
        assert!(recipient.has_contact_for(Channel::InApp));
        recipient.email = Some("m@example.org".into());
        recipient.device_tokens = vec!["ios:abc".into()];
        assert!(recipient.has_contact_for(Channel::Email));
        assert!(recipient.has_contact_for(Channel::Push));
        assert!(!recipient.has_contact_for(Channel::Sms));
    }
}

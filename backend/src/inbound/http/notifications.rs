//! Notification inbox and preference handlers.
//!
//! ```text
//! GET  /api/v1/notifications?limit=N
//! GET  /api/v1/notifications/history
//! GET  /api/v1/notifications/unread-count
//! POST /api/v1/notifications/{id}/read
//! POST /api/v1/notifications/read-all
//! GET  /api/v1/notifications/preferences
//! PUT  /api/v1/notifications/preferences
//! POST /api/v1/notifications/test
//! ```

use std::collections::BTreeMap;

use actix_web::{get, post, put, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, ToSchema};

use crate::domain::notifications::{
    HistoryEntry, InboxItem, NotificationPreferences, NotificationType, QuietHours,
};
use crate::domain::{Error, NotificationId};
use crate::inbound::http::ApiResult;
use crate::inbound::http::schemas::ErrorSchema;
use crate::inbound::http::session::SessionContext;
use crate::inbound::http::state::HttpState;

/// In-app inbox entry.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InboxItemBody {
    pub id: String,
    #[serde(rename = "type")]
    #[schema(example = "route_change")]
    pub notification_type: String,
    #[schema(example = "high")]
    pub priority: String,
    pub subject: String,
    pub message: String,
    pub read: bool,
    #[schema(format = "date-time")]
    pub created_at: String,
    #[schema(format = "date-time")]
    pub read_at: Option<String>,
}

impl From<InboxItem> for InboxItemBody {
    fn from(value: InboxItem) -> Self {
        Self {
            read: value.is_read(),
            id: value.notification_id.to_string(),
            notification_type: value.notification_type.to_string(),
            priority: value.priority.to_string(),
            subject: value.subject,
            message: value.message,
            created_at: value.created_at.to_rfc3339(),
            read_at: value.read_at.map(|at| at.to_rfc3339()),
        }
    }
}

/// Delivery record joined with its notification.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HistoryEntryBody {
    pub notification_id: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub priority: String,
    pub subject: String,
    pub message: String,
    #[schema(example = "email")]
    pub channel: String,
    #[schema(example = "sent")]
    pub status: String,
    #[schema(format = "date-time")]
    pub created_at: String,
    #[schema(format = "date-time")]
    pub delivered_at: String,
}

impl From<HistoryEntry> for HistoryEntryBody {
    fn from(value: HistoryEntry) -> Self {
        Self {
            notification_id: value.notification_id.to_string(),
            notification_type: value.notification_type.to_string(),
            priority: value.priority.to_string(),
            subject: value.subject,
            message: value.message,
            channel: value.channel.as_str().to_owned(),
            status: value.status.to_string(),
            created_at: value.created_at.to_rfc3339(),
            delivered_at: value.delivered_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UnreadCountBody {
    pub count: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MarkedReadBody {
    /// Entries that changed from unread to read.
    pub updated: u64,
}

/// Local `HH:MM` window during which low-priority delivery is held back.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuietHoursBody {
    #[schema(example = "22:00")]
    pub start: String,
    #[schema(example = "07:00")]
    pub end: String,
}

/// Per-user delivery preferences.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PreferencesBody {
    pub email: bool,
    pub sms: bool,
    pub push: bool,
    pub quiet_hours: Option<QuietHoursBody>,
    /// Opt-in flag keyed by notification type; absent types are opted in.
    #[serde(default)]
    pub types: BTreeMap<String, bool>,
    /// IANA time zone name; defaults to `UTC`.
    #[schema(example = "America/New_York")]
    pub timezone: Option<String>,
}

impl From<NotificationPreferences> for PreferencesBody {
    fn from(value: NotificationPreferences) -> Self {
        Self {
            email: value.email,
            sms: value.sms,
            push: value.push,
            quiet_hours: value.quiet_hours.map(|window| QuietHoursBody {
                start: window.start_label(),
                end: window.end_label(),
            }),
            types: value
                .types
                .into_iter()
                .map(|(kind, enabled)| (kind.to_string(), enabled))
                .collect(),
            timezone: Some(value.timezone.to_string()),
        }
    }
}

fn field_error(field: &str, error: Error) -> Error {
    let message = error.message().to_owned();
    Error::invalid_request(message).with_details(json!({ "field": field }))
}

impl TryFrom<PreferencesBody> for NotificationPreferences {
    type Error = Error;

    fn try_from(value: PreferencesBody) -> Result<Self, Self::Error> {
        let quiet_hours = match value.quiet_hours {
            Some(window) => QuietHours::parse(&window.start, &window.end)
                .map_err(|err| field_error("quiet_hours", err))?,
            None => None,
        };
        let types = value
            .types
            .into_iter()
            .map(|(kind, enabled)| {
                kind.parse::<NotificationType>()
                    .map(|kind| (kind, enabled))
                    .map_err(|err| field_error("types", err))
            })
            .collect::<Result<_, _>>()?;
        let timezone = match value.timezone.as_deref().map(str::trim) {
            None | Some("") => Default::default(),
            Some(name) => name.parse().map_err(|err| field_error("timezone", err))?,
        };
        Ok(Self {
            email: value.email,
            sms: value.sms,
            push: value.push,
            quiet_hours,
            types,
            timezone,
        })
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct InboxQuery {
    /// 1 to 50; anything else falls back to 10.
    pub limit: Option<String>,
}

/// Outcome of a test send.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TestSendBody {
    pub notification_id: String,
    /// Channels attempted, e.g. `["email", "in_app"]`.
    pub channels: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications",
    params(InboxQuery),
    responses(
        (status = 200, description = "Inbox, newest first", body = [InboxItemBody]),
        (status = 401, description = "Unauthorized", body = ErrorSchema)
    ),
    tags = ["notifications"],
    operation_id = "listInbox",
    security(("SessionCookie" = []))
)]
#[get("/notifications")]
pub async fn list_inbox(
    state: web::Data<HttpState>,
    session: SessionContext,
    query: web::Query<InboxQuery>,
) -> ApiResult<web::Json<Vec<InboxItemBody>>> {
    let user = session.require_user()?;
    let limit = query
        .into_inner()
        .limit
        .and_then(|raw| raw.trim().parse::<usize>().ok());
    let items = state.notifications.inbox(&user.user_id, limit).await?;
    Ok(web::Json(items.into_iter().map(InboxItemBody::from).collect()))
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications/history",
    responses(
        (status = 200, description = "Latest deliveries", body = [HistoryEntryBody]),
        (status = 401, description = "Unauthorized", body = ErrorSchema)
    ),
    tags = ["notifications"],
    operation_id = "notificationHistory",
    security(("SessionCookie" = []))
)]
#[get("/notifications/history")]
pub async fn notification_history(
    state: web::Data<HttpState>,
    session: SessionContext,
) -> ApiResult<web::Json<Vec<HistoryEntryBody>>> {
    let user = session.require_user()?;
    let entries = state.notifications.history(&user.user_id).await?;
    Ok(web::Json(
        entries.into_iter().map(HistoryEntryBody::from).collect(),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications/unread-count",
    responses(
        (status = 200, description = "Unread entries", body = UnreadCountBody),
        (status = 401, description = "Unauthorized", body = ErrorSchema)
    ),
    tags = ["notifications"],
    operation_id = "unreadCount",
    security(("SessionCookie" = []))
)]
#[get("/notifications/unread-count")]
pub async fn unread_count(
    state: web::Data<HttpState>,
    session: SessionContext,
) -> ApiResult<web::Json<UnreadCountBody>> {
    let user = session.require_user()?;
    let count = state.notifications.unread_count(&user.user_id).await?;
    Ok(web::Json(UnreadCountBody { count }))
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications/{id}/read",
    params(("id" = String, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Entry marked read", body = MarkedReadBody),
        (status = 401, description = "Unauthorized", body = ErrorSchema),
        (status = 404, description = "Not in the caller's inbox", body = ErrorSchema)
    ),
    tags = ["notifications"],
    operation_id = "markRead",
    security(("SessionCookie" = []))
)]
#[post("/notifications/{id}/read")]
pub async fn mark_read(
    state: web::Data<HttpState>,
    session: SessionContext,
    path: web::Path<String>,
) -> ApiResult<web::Json<MarkedReadBody>> {
    let user = session.require_user()?;
    let raw = path.into_inner();
    // A malformed id cannot name an inbox entry.
    let id = NotificationId::from_raw(raw.as_str())
        .ok_or_else(|| Error::not_found(format!("notification {raw} not found")))?;
    state.notifications.mark_read(&user.user_id, &id).await?;
    Ok(web::Json(MarkedReadBody { updated: 1 }))
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications/read-all",
    responses(
        (status = 200, description = "Entries marked read", body = MarkedReadBody),
        (status = 401, description = "Unauthorized", body = ErrorSchema)
    ),
    tags = ["notifications"],
    operation_id = "markAllRead",
    security(("SessionCookie" = []))
)]
#[post("/notifications/read-all")]
pub async fn mark_all_read(
    state: web::Data<HttpState>,
    session: SessionContext,
) -> ApiResult<web::Json<MarkedReadBody>> {
    let user = session.require_user()?;
    let updated = state.notifications.mark_all_read(&user.user_id).await?;
    Ok(web::Json(MarkedReadBody { updated }))
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications/preferences",
    responses(
        (status = 200, description = "Stored or default preferences", body = PreferencesBody),
        (status = 401, description = "Unauthorized", body = ErrorSchema)
    ),
    tags = ["notifications"],
    operation_id = "getNotificationPreferences",
    security(("SessionCookie" = []))
)]
#[get("/notifications/preferences")]
pub async fn get_preferences(
    state: web::Data<HttpState>,
    session: SessionContext,
) -> ApiResult<web::Json<PreferencesBody>> {
    let user = session.require_user()?;
    let preferences = state.notifications.preferences(&user.user_id).await?;
    Ok(web::Json(preferences.into()))
}

/// Replace the caller's preferences.
#[utoipa::path(
    put,
    path = "/api/v1/notifications/preferences",
    request_body = PreferencesBody,
    responses(
        (status = 200, description = "Preferences saved", body = PreferencesBody),
        (status = 400, description = "Invalid time, zone or type", body = ErrorSchema),
        (status = 401, description = "Unauthorized", body = ErrorSchema)
    ),
    tags = ["notifications"],
    operation_id = "updateNotificationPreferences",
    security(("SessionCookie" = []))
)]
#[put("/notifications/preferences")]
pub async fn update_preferences(
    state: web::Data<HttpState>,
    session: SessionContext,
    payload: web::Json<PreferencesBody>,
) -> ApiResult<web::Json<PreferencesBody>> {
    let user = session.require_user()?;
    let preferences = NotificationPreferences::try_from(payload.into_inner())?;
    let saved = state
        .notifications
        .update_preferences(&user.user_id, preferences)
        .await?;
    Ok(web::Json(saved.into()))
}

/// Send a `system_alert` to the caller over every enabled channel.
#[utoipa::path(
    post,
    path = "/api/v1/notifications/test",
    responses(
        (status = 200, description = "Test notification queued", body = TestSendBody),
        (status = 401, description = "Unauthorized", body = ErrorSchema),
        (status = 503, description = "Queue unavailable", body = ErrorSchema)
    ),
    tags = ["notifications"],
    operation_id = "sendTestNotification",
    security(("SessionCookie" = []))
)]
#[post("/notifications/test")]
pub async fn send_test(
    state: web::Data<HttpState>,
    session: SessionContext,
) -> ApiResult<web::Json<TestSendBody>> {
    let user = session.require_user()?;
    let notification = state.notifications.send_test(&user.user_id).await?;
    Ok(web::Json(TestSendBody {
        notification_id: notification.id.to_string(),
        channels: notification
            .channels
            .iter()
            .map(|channel| channel.as_str().to_owned())
            .collect(),
    }))
}

#[cfg(test)]
#[path = "notifications_tests.rs"]
mod tests;

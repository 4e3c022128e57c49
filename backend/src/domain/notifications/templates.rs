//! HTML email bodies per notification type.
//!
//! Types without a dedicated layout fall back to the bare message. Every
//! interpolated value is HTML-escaped.

use super::model::{Notification, NotificationType, Recipient};

/// Render the HTML body sent to `recipient`.
///
/// # Examples
/// ```
/// use busfleet::domain::UserId;
/// use busfleet::domain::notifications::{NotificationDraft, NotificationType, Recipient, render_email};
/// use chrono::Utc;
///
/// let recipient = Recipient::new(UserId::new("sam").expect("valid id"));
/// let notification = NotificationDraft::new(NotificationType::Emergency, "SOS", "Bus 4 needs help")
///     .recipients(vec![recipient.clone()])
///     .into_notification(Utc::now())
///     .expect("valid draft");
/// assert!(render_email(&notification, &recipient).contains("EMERGENCY ALERT"));
/// ```
pub fn render_email(notification: &Notification, recipient: &Recipient) -> String {
    let username = escape_html(&recipient.username);
    let message = escape_html(&notification.message);
    match notification.notification_type {
        NotificationType::MaintenanceDue => format!(
            "<h2>Vehicle Maintenance Due</h2>\n<p>Hello {username},</p>\n<p>{message}</p>\n\
             <p>Please schedule maintenance as soon as possible.</p>"
        ),
        NotificationType::RouteChange => format!(
            "<h2>Route Assignment Change</h2>\n<p>Hello {username},</p>\n<p>{message}</p>\n\
             <p>Please review your updated schedule in the app.</p>"
        ),
        NotificationType::Emergency => format!(
            "<h2 style=\"color: red;\">EMERGENCY ALERT</h2>\n<p>{message}</p>\n\
             <p>Please take immediate action.</p>"
        ),
        NotificationType::RouteDeviation => format!(
            "<h2>Route Deviation</h2>\n<p>Hello {username},</p>\n<p>{message}</p>\n\
             <p>Check the live map for the vehicle's current position.</p>"
        ),
        _ => message,
    }
}

/// Escape the five HTML-significant characters.
pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

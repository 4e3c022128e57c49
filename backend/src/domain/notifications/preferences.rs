//! Per-user delivery preferences and quiet-hours evaluation.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::model::{Channel, NotificationType};
use crate::domain::Error;

/// IANA time zone name used to evaluate quiet hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeZoneName(Tz);

impl TimeZoneName {
    pub fn tz(&self) -> Tz {
        self.0
    }

    pub fn name(&self) -> &'static str {
        self.0.name()
    }
}

impl Default for TimeZoneName {
    fn default() -> Self {
        Self(Tz::UTC)
    }
}

impl FromStr for TimeZoneName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<Tz>()
            .map(Self)
            .map_err(|_| Error::invalid_request(format!("unknown time zone: {s}")))
    }
}

impl TryFrom<String> for TimeZoneName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeZoneName> for String {
    fn from(value: TimeZoneName) -> Self {
        value.name().to_owned()
    }
}

impl fmt::Display for TimeZoneName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Daily window, in local `HH:MM`, during which low-priority delivery is held
/// back. A window whose start is after its end wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "QuietHoursWire", into = "QuietHoursWire")]
pub struct QuietHours {
    start: NaiveTime,
    end: NaiveTime,
}

#[derive(Serialize, Deserialize)]
struct QuietHoursWire {
    start: String,
    end: String,
}

impl QuietHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            start: truncate_to_minute(start),
            end: truncate_to_minute(end),
        }
    }

    /// Parse a window from `HH:MM` strings; either side blank means no window.
    ///
    /// # Examples
    /// ```
    /// use busfleet::domain::notifications::QuietHours;
    ///
    /// let window = QuietHours::parse("22:00", "07:00").expect("valid").expect("present");
    /// assert_eq!(window.start_label(), "22:00");
    /// assert!(QuietHours::parse("", "07:00").expect("valid").is_none());
    /// ```
    pub fn parse(start: &str, end: &str) -> Result<Option<Self>, Error> {
        let (start, end) = (start.trim(), end.trim());
        if start.is_empty() || end.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self::new(parse_hhmm(start)?, parse_hhmm(end)?)))
    }

    pub fn start_label(&self) -> String {
        self.start.format("%H:%M").to_string()
    }

    pub fn end_label(&self) -> String {
        self.end.format("%H:%M").to_string()
    }

    /// Whether the local wall-clock time `t` falls inside the window.
    pub fn contains(&self, t: NaiveTime) -> bool {
        let t = truncate_to_minute(t);
        if self.start <= self.end {
            self.start <= t && t <= self.end
        } else {
            t >= self.start || t <= self.end
        }
    }
}

impl TryFrom<QuietHoursWire> for QuietHours {
    type Error = Error;

    fn try_from(value: QuietHoursWire) -> Result<Self, Self::Error> {
        Ok(Self::new(parse_hhmm(&value.start)?, parse_hhmm(&value.end)?))
    }
}

impl From<QuietHours> for QuietHoursWire {
    fn from(value: QuietHours) -> Self {
        Self {
            start: value.start_label(),
            end: value.end_label(),
        }
    }
}

fn parse_hhmm(raw: &str) -> Result<NaiveTime, Error> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|_| Error::invalid_request(format!("time {raw} is not HH:MM")))
}

fn truncate_to_minute(t: NaiveTime) -> NaiveTime {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

/// A user's notification preferences.
///
/// Types absent from `types` are opted in. In-app delivery has no switch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub email: bool,
    pub sms: bool,
    pub push: bool,
    #[serde(default)]
    pub quiet_hours: Option<QuietHours>,
    #[serde(default)]
    pub types: BTreeMap<NotificationType, bool>,
    #[serde(default)]
    pub timezone: TimeZoneName,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            email: true,
            sms: true,
            push: true,
            quiet_hours: None,
            types: BTreeMap::new(),
            timezone: TimeZoneName::default(),
        }
    }
}

impl NotificationPreferences {
    pub fn channel_enabled(&self, channel: Channel) -> bool {
        match channel {
            Channel::Email => self.email,
            Channel::Sms => self.sms,
            Channel::Push => self.push,
            Channel::InApp => true,
        }
    }

    pub fn type_enabled(&self, notification_type: NotificationType) -> bool {
        self.types.get(&notification_type).copied().unwrap_or(true)
    }

    /// Evaluate quiet hours at `now` in the user's own time zone.
    pub fn is_quiet_at(&self, now: DateTime<Utc>) -> bool {
        self.quiet_hours
            .is_some_and(|window| window.contains(now.with_timezone(&self.timezone.tz()).time()))
    }
}

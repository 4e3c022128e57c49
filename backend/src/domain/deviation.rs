//! Route deviation records and monitoring thresholds.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Error;
use super::geo::GeoPoint;
use super::ids::{DeviationId, RouteId, UserId, VehicleId};

/// Speed at or below which a vehicle counts as stopped.
pub const STOPPED_SPEED: f64 = 5.0;
/// Minimum speed for the wrong-direction check.
pub const WRONG_DIRECTION_MIN_SPEED: f64 = 10.0;
/// A stop inside this distance of any planned stop is never "stopped too long".
pub const PLANNED_STOP_TOLERANCE_M: f64 = 50.0;
/// Heading error beyond which a vehicle is heading the wrong way.
pub const WRONG_DIRECTION_DEG: f64 = 90.0;

/// The five kinds of deviation the monitor detects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviationType {
    OffRoute,
    WrongDirection,
    StoppedTooLong,
    SkippedStop,
    UnauthorizedStop,
}

impl DeviationType {
    pub const ALL: [DeviationType; 5] = [
        Self::OffRoute,
        Self::WrongDirection,
        Self::StoppedTooLong,
        Self::SkippedStop,
        Self::UnauthorizedStop,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OffRoute => "off_route",
            Self::WrongDirection => "wrong_direction",
            Self::StoppedTooLong => "stopped_too_long",
            Self::SkippedStop => "skipped_stop",
            Self::UnauthorizedStop => "unauthorized_stop",
        }
    }
}

impl fmt::Display for DeviationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::invalid_request(format!("unknown deviation type: {s}")))
    }
}

/// Ordered severity scale shared by deviations and notification priorities.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    /// Off-route severity banding by distance from the nearest stop.
    ///
    /// # Examples
    /// ```
    /// use busfleet::domain::Severity;
    ///
    /// assert_eq!(Severity::from_distance(333.0), Severity::Low);
    /// assert_eq!(Severity::from_distance(1500.0), Severity::High);
    /// ```
    pub fn from_distance(distance_m: f64) -> Self {
        if distance_m < 500.0 {
            Self::Low
        } else if distance_m < 1000.0 {
            Self::Medium
        } else if distance_m < 2000.0 {
            Self::High
        } else {
            Self::Critical
        }
    }

    /// High and critical deviations page managers.
    pub fn is_alerting(self) -> bool {
        self >= Self::High
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| Error::invalid_request(format!("unknown severity: {s}")))
    }
}

/// A detected departure from the planned route.
///
/// `id` is `None` until the record has been persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deviation {
    pub id: Option<DeviationId>,
    pub vehicle_id: VehicleId,
    pub route_id: RouteId,
    pub driver_id: UserId,
    pub deviation_type: DeviationType,
    pub severity: Severity,
    pub location: GeoPoint,
    pub expected_location: Option<GeoPoint>,
    pub distance_m: f64,
    pub duration_ms: i64,
    pub description: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub auto_resolved: bool,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Deviation {
    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }

    /// Stamp the record as resolved at `at`.
    pub fn resolve(&mut self, at: DateTime<Utc>, auto_resolved: bool) {
        self.resolved_at = Some(at);
        self.auto_resolved = auto_resolved;
    }

    /// Time elapsed since the deviation opened, clamped at zero.
    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_milliseconds().max(0)
    }
}

/// Deviation count for one vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleDeviationCount {
    pub vehicle_id: VehicleId,
    pub count: u64,
}

/// Aggregate counters for the monitoring dashboard.
///
/// `by_type` and `by_severity` cover the last 7 days; `top_vehicles` covers
/// the last 30 days and holds at most [`DeviationStats::TOP_VEHICLES`] rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviationStats {
    pub total_today: u64,
    pub active: u64,
    pub by_type: BTreeMap<DeviationType, u64>,
    pub by_severity: BTreeMap<Severity, u64>,
    pub top_vehicles: Vec<VehicleDeviationCount>,
}

impl DeviationStats {
    pub const TOP_VEHICLES: usize = 5;
}

/// Runtime-tunable thresholds for the route monitor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorSettings {
    pub deviation_radius_m: f64,
    pub stop_duration: Duration,
    pub check_interval: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            deviation_radius_m: 200.0,
            stop_duration: Duration::from_secs(300),
            check_interval: Duration::from_secs(10),
        }
    }
}

impl MonitorSettings {
    /// Validate a manager-supplied update.
    pub fn try_new(
        deviation_radius_m: f64,
        stop_duration_s: u64,
        check_interval_s: u64,
    ) -> Result<Self, Error> {
        if !deviation_radius_m.is_finite() || deviation_radius_m <= 0.0 {
            return Err(Error::invalid_request("deviation_radius_m must be positive"));
        }
        if stop_duration_s == 0 {
            return Err(Error::invalid_request("stop_duration_s must be positive"));
        }
        if check_interval_s == 0 {
            return Err(Error::invalid_request("check_interval_s must be positive"));
        }
        Ok(Self {
            deviation_radius_m,
            stop_duration: Duration::from_secs(stop_duration_s),
            check_interval: Duration::from_secs(check_interval_s),
        })
    }
}

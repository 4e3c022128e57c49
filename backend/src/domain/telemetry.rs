//! GPS position samples.
//!
//! A [`PositionDraft`] is what a vehicle reports; [`PositionDraft::validate`]
//! turns it into an immutable [`Position`] once the server has stamped the
//! driver and (when absent) the timestamp.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Error;
use super::geo::GeoPoint;
use super::ids::{RouteId, UserId, VehicleId};

/// Reported operating state of a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    #[default]
    Active,
    Stopped,
    Offline,
}

impl VehicleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Stopped => "stopped",
            Self::Offline => "offline",
        }
    }
}

impl FromStr for VehicleStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "stopped" => Ok(Self::Stopped),
            "offline" => Ok(Self::Offline),
            other => Err(Error::invalid_request(format!("unknown vehicle status: {other}"))),
        }
    }
}

/// Unit every speed in the system is expressed in.
///
/// The stopped and wrong-direction thresholds are compared against raw speeds,
/// so they are effectively interpreted in this unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedUnit {
    #[default]
    Kmh,
    Mph,
    Mps,
}

impl SpeedUnit {
    pub fn label(self) -> &'static str {
        match self {
            Self::Kmh => "km/h",
            Self::Mph => "mph",
            Self::Mps => "m/s",
        }
    }
}

impl fmt::Display for SpeedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SpeedUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kmh" | "km/h" => Ok(Self::Kmh),
            "mph" => Ok(Self::Mph),
            "mps" | "m/s" => Ok(Self::Mps),
            other => Err(Error::invalid_request(format!("unknown speed unit: {other}"))),
        }
    }
}

/// A stored GPS sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub vehicle_id: VehicleId,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub heading: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub driver_id: UserId,
    pub route_id: Option<RouteId>,
    pub status: VehicleStatus,
}

impl Position {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    /// Heading when present and finite.
    pub fn usable_heading(&self) -> Option<f64> {
        self.heading.filter(|h| h.is_finite())
    }
}

/// An unvalidated sample as reported by a vehicle.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PositionDraft {
    pub vehicle_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub heading: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub route_id: Option<String>,
    pub status: Option<VehicleStatus>,
}

impl PositionDraft {
    /// Validate the sample for `driver_id`, defaulting a missing or zero
    /// timestamp to `now`.
    ///
    /// # Examples
    /// ```
    /// use busfleet::domain::{PositionDraft, UserId};
    /// use chrono::Utc;
    ///
    /// let draft = PositionDraft {
    ///     vehicle_id: "BUS-1".into(),
    ///     latitude: 40.0,
    ///     longitude: -74.0,
    ///     speed: 30.0,
    ///     ..PositionDraft::default()
    /// };
    /// let driver = UserId::new("driver1").expect("valid id");
    /// let position = draft.validate(driver, Utc::now()).expect("valid sample");
    /// assert_eq!(position.vehicle_id.as_str(), "BUS-1");
    /// ```
    pub fn validate(self, driver_id: UserId, now: DateTime<Utc>) -> Result<Position, Error> {
        let vehicle_id = VehicleId::new(self.vehicle_id.trim())
            .map_err(|err| Error::invalid_request(err.to_string()))?;
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(field_error("latitude", "latitude must be between -90 and 90"));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(field_error(
                "longitude",
                "longitude must be between -180 and 180",
            ));
        }
        if !self.speed.is_finite() || self.speed < 0.0 {
            return Err(field_error("speed", "speed must be a non-negative number"));
        }
        if self
            .heading
            .is_some_and(|h| !h.is_finite() || !(0.0..=360.0).contains(&h))
        {
            return Err(field_error("heading", "heading must be between 0 and 360"));
        }
        let route_id = match self.route_id.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => {
                Some(RouteId::new(raw).map_err(|err| Error::invalid_request(err.to_string()))?)
            }
        };
        let timestamp = match self.timestamp {
            Some(ts) if ts.timestamp() != 0 => ts,
            _ => now,
        };

        Ok(Position {
            vehicle_id,
            latitude: self.latitude,
            longitude: self.longitude,
            speed: self.speed,
            heading: self.heading,
            timestamp,
            driver_id,
            route_id,
            status: self.status.unwrap_or_default(),
        })
    }
}

fn field_error(field: &str, message: &str) -> Error {
    Error::invalid_request(message).with_details(serde_json::json!({ "field": field }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::{fixture, rstest};

    #[fixture]
    fn draft() -> PositionDraft {
        PositionDraft {
            vehicle_id: "BUS-1".into(),
            latitude: 40.0,
            longitude: -74.0,
            speed: 25.0,
            heading: Some(90.0),
            timestamp: None,
            route_id: Some("R1".into()),
            status: None,
        }
    }

    #[fixture]
    fn driver() -> UserId {
        UserId::new("driver1").expect("valid id")
    }

    #[rstest]
    fn missing_timestamp_defaults_to_now(draft: PositionDraft, driver: UserId) {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 7, 0, 0).single().expect("valid time");
        let position = draft.validate(driver, now).expect("valid sample");
        assert_eq!(position.timestamp, now);
        assert_eq!(position.status, VehicleStatus::Active);
        assert_eq!(position.route_id.map(String::from), Some("R1".to_owned()));
    }

    #[rstest]
    fn epoch_timestamp_is_treated_as_absent(mut draft: PositionDraft, driver: UserId) {
        draft.timestamp = DateTime::from_timestamp(0, 0);
        let now = Utc::now();
        let position = draft.validate(driver, now).expect("valid sample");
        assert_eq!(position.timestamp, now);
    }

    #[rstest]
    #[case::latitude(|d: &mut PositionDraft| d.latitude = 91.0, "latitude")]
    #[case::longitude(|d: &mut PositionDraft| d.longitude = -180.5, "longitude")]
    #[case::nan_latitude(|d: &mut PositionDraft| d.latitude = f64::NAN, "latitude")]
    #[case::speed(|d: &mut PositionDraft| d.speed = -1.0, "speed")]
    #[case::heading(|d: &mut PositionDraft| d.heading = Some(361.0), "heading")]
    fn rejects_out_of_range_fields(
        mut draft: PositionDraft,
        driver: UserId,
        #[case] mutate: fn(&mut PositionDraft),
        #[case] field: &str,
    ) {
        mutate(&mut draft);
        let err = draft.validate(driver, Utc::now()).expect_err("invalid sample");
        assert_eq!(err.code(), crate::domain::ErrorCode::InvalidRequest);
        assert_eq!(err.details().and_then(|d| d["field"].as_str()), Some(field));
    }

    #[rstest]
    fn rejects_missing_vehicle(mut draft: PositionDraft, driver: UserId) {
        draft.vehicle_id = "  ".into();
        assert!(draft.validate(driver, Utc::now()).is_err());
    }

    #[rstest]
    fn nan_heading_is_unusable_but_absent_heading_is_fine(draft: PositionDraft, driver: UserId) {
        let mut position = draft.validate(driver, Utc::now()).expect("valid sample");
        assert_eq!(position.usable_heading(), Some(90.0));
        position.heading = Some(f64::NAN);
        assert_eq!(position.usable_heading(), None);
    }

    #[rstest]
    #[case("kmh", SpeedUnit::Kmh)]
    #[case("MPH", SpeedUnit::Mph)]
    #[case("m/s", SpeedUnit::Mps)]
    fn parses_speed_units(#[case] raw: &str, #[case] expected: SpeedUnit) {
        assert_eq!(raw.parse::<SpeedUnit>().ok(), Some(expected));
    }
}

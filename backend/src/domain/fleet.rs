//! Read models for fleet records owned by the wider application.
//!
//! Vehicles, students and route assignments are managed elsewhere; the core
//! only reads them to decide who to notify and to record status changes.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::Error;
use super::ids::{RouteId, UserId, VehicleId};

/// Mileage since the last oil change that triggers a maintenance notice.
pub const OIL_CHANGE_DUE_MILES: i64 = 4_500;
/// Mileage since the last tire service that triggers a maintenance notice.
pub const TIRE_SERVICE_DUE_MILES: i64 = 19_000;

/// Service state of a vehicle in the fleet register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Active,
    Maintenance,
    OutOfService,
    Inactive,
}

impl ServiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Maintenance => "maintenance",
            Self::OutOfService => "out_of_service",
            Self::Inactive => "inactive",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "maintenance" => Ok(Self::Maintenance),
            "out_of_service" => Ok(Self::OutOfService),
            "inactive" => Ok(Self::Inactive),
            other => Err(Error::invalid_request(format!(
                "unknown vehicle status: {other}"
            ))),
        }
    }
}

/// Odometer snapshot for an active vehicle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceSnapshot {
    pub vehicle_id: VehicleId,
    pub model: String,
    pub current_mileage: i64,
    pub last_oil_change: i64,
    pub last_tire_service: i64,
}

impl MaintenanceSnapshot {
    pub fn oil_change_due(&self) -> bool {
        self.current_mileage - self.last_oil_change >= OIL_CHANGE_DUE_MILES
    }

    pub fn tire_service_due(&self) -> bool {
        self.current_mileage - self.last_tire_service >= TIRE_SERVICE_DUE_MILES
    }

    /// Display label, falling back to the vehicle id when no model is recorded.
    pub fn label(&self) -> &str {
        if self.model.trim().is_empty() {
            self.vehicle_id.as_str()
        } else {
            self.model.as_str()
        }
    }
}

/// Register entry for a vehicle as seen by status changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleRecord {
    pub vehicle_id: VehicleId,
    pub model: String,
    pub status: ServiceStatus,
}

/// A student marked absent on a given day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbsentStudent {
    pub student_id: String,
    pub name: String,
    pub route_id: Option<RouteId>,
    pub date: NaiveDate,
}

/// A driver's assignment to a route and vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteAssignment {
    pub driver_id: UserId,
    pub vehicle_id: VehicleId,
    pub route_id: RouteId,
    pub assigned_date: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn snapshot(current: i64, oil: i64, tires: i64) -> MaintenanceSnapshot {
        MaintenanceSnapshot {
            vehicle_id: VehicleId::new("BUS-1").expect("valid id"),
            model: String::new(),
            current_mileage: current,
            last_oil_change: oil,
            last_tire_service: tires,
        }
    }

    #[rstest]
    #[case(snapshot(14_500, 10_000, 0), true, false)]
    #[case(snapshot(14_499, 10_000, 0), false, false)]
    #[case(snapshot(19_000, 19_000, 0), false, true)]
    fn maintenance_thresholds(
        #[case] vehicle: MaintenanceSnapshot,
        #[case] oil: bool,
        #[case] tires: bool,
    ) {
        assert_eq!(vehicle.oil_change_due(), oil);
        assert_eq!(vehicle.tire_service_due(), tires);
    }

    #[rstest]
    fn label_falls_back_to_vehicle_id() {
        assert_eq!(snapshot(0, 0, 0).label(), "BUS-1");
    }

    #[rstest]
    #[case("out_of_service", ServiceStatus::OutOfService)]
    #[case("maintenance", ServiceStatus::Maintenance)]
    fn parses_service_status(#[case] raw: &str, #[case] expected: ServiceStatus) {
        assert_eq!(raw.parse::<ServiceStatus>().ok(), Some(expected));
        assert_eq!(expected.as_str(), raw);
    }
}

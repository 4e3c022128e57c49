//! Port over the fleet register: vehicles, attendance and assignments.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::{
    AbsentStudent, Error, MaintenanceSnapshot, RouteAssignment, ServiceStatus, UserId, VehicleId,
    VehicleRecord,
};

use super::define_port_error;

define_port_error! {
    /// Errors raised by fleet repository adapters.
    pub enum FleetRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "fleet repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "fleet repository query failed: {message}",
    }
}

impl From<FleetRepositoryError> for Error {
    fn from(error: FleetRepositoryError) -> Self {
        match error {
            FleetRepositoryError::Connection { message } => {
                Self::service_unavailable(format!("fleet store unavailable: {message}"))
            }
            FleetRepositoryError::Query { message } => {
                Self::internal(format!("fleet store error: {message}"))
            }
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FleetRepository: Send + Sync {
    /// Odometer readings for active vehicles.
    async fn maintenance_snapshots(&self) -> Result<Vec<MaintenanceSnapshot>, FleetRepositoryError>;

    /// Students recorded absent on `date`.
    async fn absent_students(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<AbsentStudent>, FleetRepositoryError>;

    /// Assignments effective on `date`.
    async fn assignments_on(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<RouteAssignment>, FleetRepositoryError>;

    /// The driver currently assigned to `vehicle_id`, if any.
    async fn assigned_driver(
        &self,
        vehicle_id: &VehicleId,
    ) -> Result<Option<UserId>, FleetRepositoryError>;

    /// Record a new status, returning the register entry as it was before the
    /// change. `None` when the vehicle is unknown.
    async fn set_vehicle_status(
        &self,
        vehicle_id: &VehicleId,
        status: ServiceStatus,
    ) -> Result<Option<VehicleRecord>, FleetRepositoryError>;

    /// Record an assignment; `true` when the driver had no assignment to this
    /// route before.
    async fn assign_route(
        &self,
        assignment: &RouteAssignment,
    ) -> Result<bool, FleetRepositoryError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureFleetRepository;

#[async_trait]
impl FleetRepository for FixtureFleetRepository {
    async fn maintenance_snapshots(&self) -> Result<Vec<MaintenanceSnapshot>, FleetRepositoryError> {
        Ok(Vec::new())
    }

    async fn absent_students(
        &self,
        _date: NaiveDate,
    ) -> Result<Vec<AbsentStudent>, FleetRepositoryError> {
        Ok(Vec::new())
    }

    async fn assignments_on(
        &self,
        _date: NaiveDate,
    ) -> Result<Vec<RouteAssignment>, FleetRepositoryError> {
        Ok(Vec::new())
    }

    async fn assigned_driver(
        &self,
        _vehicle_id: &VehicleId,
    ) -> Result<Option<UserId>, FleetRepositoryError> {
        Ok(None)
    }

    async fn set_vehicle_status(
        &self,
        _vehicle_id: &VehicleId,
        _status: ServiceStatus,
    ) -> Result<Option<VehicleRecord>, FleetRepositoryError> {
        Ok(None)
    }

    async fn assign_route(
        &self,
        _assignment: &RouteAssignment,
    ) -> Result<bool, FleetRepositoryError> {
        Ok(true)
    }
}

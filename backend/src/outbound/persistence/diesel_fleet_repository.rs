//! PostgreSQL-backed `FleetRepository` over vehicles, attendance and route
//! assignments.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use diesel_async::AsyncConnection as _;
use diesel_async::RunQueryDsl;
use diesel_async::scoped_futures::ScopedFutureExt as _;
use tracing::warn;

use crate::domain::ports::{FleetRepository, FleetRepositoryError};
use crate::domain::{
    AbsentStudent, MaintenanceSnapshot, RouteAssignment, RouteId, ServiceStatus, UserId,
    VehicleId, VehicleRecord,
};

use super::diesel_basic_error_mapping::basic_error_mappers;
use super::models::{AbsenceRow, AssignmentRow, NewAssignmentRow, VehicleRow};
use super::pool::DbPool;
use super::schema::{route_assignments, student_attendance, vehicles};

#[derive(Clone)]
pub struct DieselFleetRepository {
    pool: DbPool,
}

impl DieselFleetRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

basic_error_mappers!(FleetRepositoryError);

fn invalid(detail: impl std::fmt::Display) -> FleetRepositoryError {
    FleetRepositoryError::query(format!("stored fleet row is invalid: {detail}"))
}

fn row_to_snapshot(row: VehicleRow) -> Result<MaintenanceSnapshot, FleetRepositoryError> {
    Ok(MaintenanceSnapshot {
        vehicle_id: VehicleId::new(row.vehicle_id).map_err(invalid)?,
        model: row.model,
        current_mileage: row.current_mileage,
        last_oil_change: row.last_oil_change,
        last_tire_service: row.last_tire_service,
    })
}

fn row_to_record(row: VehicleRow) -> Result<VehicleRecord, FleetRepositoryError> {
    let status = row.status.parse().unwrap_or_else(|_| {
        warn!(vehicle = row.vehicle_id, value = row.status, "unknown vehicle status");
        ServiceStatus::Inactive
    });
    Ok(VehicleRecord {
        vehicle_id: VehicleId::new(row.vehicle_id).map_err(invalid)?,
        model: row.model,
        status,
    })
}

fn row_to_absence(row: AbsenceRow) -> Result<AbsentStudent, FleetRepositoryError> {
    Ok(AbsentStudent {
        student_id: row.student_id,
        name: row.student_name,
        route_id: row
            .route_id
            .filter(|route| !route.is_empty())
            .map(RouteId::new)
            .transpose()
            .map_err(invalid)?,
        date: row.attendance_date,
    })
}

fn row_to_assignment(row: AssignmentRow) -> Result<RouteAssignment, FleetRepositoryError> {
    Ok(RouteAssignment {
        driver_id: UserId::new(row.driver_id).map_err(invalid)?,
        vehicle_id: VehicleId::new(row.vehicle_id).map_err(invalid)?,
        route_id: RouteId::new(row.route_id).map_err(invalid)?,
        assigned_date: row.assigned_date,
    })
}

#[async_trait]
impl FleetRepository for DieselFleetRepository {
    async fn maintenance_snapshots(&self) -> Result<Vec<MaintenanceSnapshot>, FleetRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<VehicleRow> = vehicles::table
            .filter(vehicles::status.eq(ServiceStatus::Active.as_str()))
            .order(vehicles::vehicle_id)
            .select(VehicleRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(row_to_snapshot).collect()
    }

    async fn absent_students(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<AbsentStudent>, FleetRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<AbsenceRow> = student_attendance::table
            .filter(student_attendance::attendance_date.eq(date))
            .filter(student_attendance::present.eq(false))
            .order(student_attendance::student_id)
            .select(AbsenceRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(row_to_absence).collect()
    }

    async fn assignments_on(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<RouteAssignment>, FleetRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<AssignmentRow> = route_assignments::table
            .filter(route_assignments::assigned_date.eq(date))
            .order((route_assignments::driver_id, route_assignments::id))
            .select(AssignmentRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(row_to_assignment).collect()
    }

    async fn assigned_driver(
        &self,
        vehicle_id: &VehicleId,
    ) -> Result<Option<UserId>, FleetRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let driver: Option<String> = route_assignments::table
            .filter(route_assignments::vehicle_id.eq(vehicle_id.as_str()))
            .order((
                route_assignments::assigned_date.desc(),
                route_assignments::id.desc(),
            ))
            .select(route_assignments::driver_id)
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        driver.map(UserId::new).transpose().map_err(invalid)
    }

    async fn set_vehicle_status(
        &self,
        vehicle_id: &VehicleId,
        status: ServiceStatus,
    ) -> Result<Option<VehicleRecord>, FleetRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let vehicle = vehicle_id.as_str().to_owned();
        let previous: Option<VehicleRow> = conn
            .transaction(|conn| {
                async move {
                    let current: Option<VehicleRow> = vehicles::table
                        .find(&vehicle)
                        .select(VehicleRow::as_select())
                        .for_update()
                        .first(conn)
                        .await
                        .optional()?;
                    if current.is_some() {
                        diesel::update(vehicles::table.find(&vehicle))
                            .set((
                                vehicles::status.eq(status.as_str()),
                                vehicles::updated_at.eq(Utc::now()),
                            ))
                            .execute(conn)
                            .await?;
                    }
                    Ok(current)
                }
                .scope_boxed()
            })
            .await
            .map_err(map_diesel_error)?;
        previous.map(row_to_record).transpose()
    }

    async fn assign_route(
        &self,
        assignment: &RouteAssignment,
    ) -> Result<bool, FleetRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = NewAssignmentRow {
            driver_id: assignment.driver_id.as_str(),
            vehicle_id: assignment.vehicle_id.as_str(),
            route_id: assignment.route_id.as_str(),
            assigned_date: assignment.assigned_date,
        };
        let driver = assignment.driver_id.as_str();
        let route = assignment.route_id.as_str();
        conn.transaction(|conn| {
            async move {
                let existing: i64 = route_assignments::table
                    .filter(route_assignments::driver_id.eq(driver))
                    .filter(route_assignments::route_id.eq(route))
                    .count()
                    .get_result(conn)
                    .await?;
                diesel::insert_into(route_assignments::table)
                    .values(&row)
                    .execute(conn)
                    .await?;
                Ok(existing == 0)
            }
            .scope_boxed()
        })
        .await
        .map_err(map_diesel_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn vehicle(status: &str) -> VehicleRow {
        VehicleRow {
            vehicle_id: "BUS-7".into(),
            model: "Blue Bird Vision".into(),
            status: status.into(),
            current_mileage: 52_000,
            last_oil_change: 47_000,
            last_tire_service: 30_000,
        }
    }

    #[rstest]
    fn vehicle_rows_feed_maintenance_checks() {
        let snapshot = row_to_snapshot(vehicle("active")).expect("valid row");
        assert!(snapshot.oil_change_due());
        assert!(snapshot.tire_service_due());
    }

    #[rstest]
    #[case("maintenance", ServiceStatus::Maintenance)]
    #[case("scrapped", ServiceStatus::Inactive)]
    fn vehicle_status_labels_decode(#[case] label: &str, #[case] expected: ServiceStatus) {
        assert_eq!(row_to_record(vehicle(label)).expect("valid row").status, expected);
    }

    #[rstest]
    fn blank_route_on_attendance_means_unassigned() {
        let absence = row_to_absence(AbsenceRow {
            student_id: "S-1".into(),
            student_name: "Ada".into(),
            route_id: Some(String::new()),
            attendance_date: NaiveDate::from_ymd_opt(2025, 3, 3).expect("valid date"),
        })
        .expect("valid row");
        assert!(absence.route_id.is_none());
    }
}

//! PostgreSQL-backed `PositionRepository` over the `gps_locations` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::warn;

use crate::domain::ports::{PositionRepository, PositionRepositoryError};
use crate::domain::{Position, RouteId, UserId, VehicleId, VehicleStatus};

use super::diesel_basic_error_mapping::basic_error_mappers;
use super::models::{NewPositionRow, PositionRow};
use super::pool::DbPool;
use super::schema::gps_locations;

/// Diesel-backed GPS history.
#[derive(Clone)]
pub struct DieselPositionRepository {
    pool: DbPool,
}

impl DieselPositionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

basic_error_mappers!(PositionRepositoryError);

fn row_to_position(row: PositionRow) -> Result<Position, PositionRepositoryError> {
    let invalid = |err: crate::domain::IdValidationError| {
        PositionRepositoryError::query(format!("stored position is invalid: {err}"))
    };
    let status = row.status.parse().unwrap_or_else(|_| {
        warn!(value = %row.status, "unrecognised vehicle status, defaulting to active");
        VehicleStatus::Active
    });
    Ok(Position {
        vehicle_id: VehicleId::new(row.vehicle_id).map_err(invalid)?,
        latitude: row.latitude,
        longitude: row.longitude,
        speed: row.speed,
        heading: row.heading,
        timestamp: row.timestamp,
        driver_id: UserId::new(row.driver_id).map_err(invalid)?,
        route_id: row.route_id.map(RouteId::new).transpose().map_err(invalid)?,
        status,
    })
}

fn rows_to_positions(rows: Vec<PositionRow>) -> Result<Vec<Position>, PositionRepositoryError> {
    rows.into_iter().map(row_to_position).collect()
}

#[async_trait]
impl PositionRepository for DieselPositionRepository {
    async fn append(&self, position: &Position) -> Result<(), PositionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = NewPositionRow {
            vehicle_id: position.vehicle_id.as_str(),
            latitude: position.latitude,
            longitude: position.longitude,
            speed: position.speed,
            heading: position.heading,
            timestamp: position.timestamp,
            driver_id: position.driver_id.as_str(),
            route_id: position.route_id.as_ref().map(RouteId::as_str),
            status: position.status.as_str(),
        };
        diesel::insert_into(gps_locations::table)
            .values(&row)
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn latest_since(
        &self,
        vehicle_id: &VehicleId,
        since: DateTime<Utc>,
    ) -> Result<Option<Position>, PositionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        gps_locations::table
            .filter(gps_locations::vehicle_id.eq(vehicle_id.as_str()))
            .filter(gps_locations::timestamp.ge(since))
            .order(gps_locations::timestamp.desc())
            .select(PositionRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?
            .map(row_to_position)
            .transpose()
    }

    async fn latest_for(
        &self,
        vehicle_id: &VehicleId,
    ) -> Result<Option<Position>, PositionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        gps_locations::table
            .filter(gps_locations::vehicle_id.eq(vehicle_id.as_str()))
            .order(gps_locations::timestamp.desc())
            .select(PositionRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?
            .map(row_to_position)
            .transpose()
    }

    async fn history(
        &self,
        vehicle_id: &VehicleId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Position>, PositionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows = gps_locations::table
            .filter(gps_locations::vehicle_id.eq(vehicle_id.as_str()))
            .filter(gps_locations::timestamp.between(start, end))
            .order(gps_locations::timestamp.asc())
            .select(PositionRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows_to_positions(rows)
    }

    async fn latest_per_vehicle(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Position>, PositionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows = gps_locations::table
            .filter(gps_locations::timestamp.ge(since))
            .distinct_on(gps_locations::vehicle_id)
            .order((
                gps_locations::vehicle_id.asc(),
                gps_locations::timestamp.desc(),
            ))
            .select(PositionRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows_to_positions(rows)
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, PositionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let deleted = diesel::delete(gps_locations::table.filter(gps_locations::timestamp.lt(cutoff)))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(u64::try_from(deleted).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn row(status: &str, route: Option<&str>) -> PositionRow {
        PositionRow {
            vehicle_id: "BUS-1".into(),
            latitude: 40.0,
            longitude: -74.0,
            speed: 12.5,
            heading: Some(90.0),
            timestamp: Utc::now(),
            driver_id: "driver1".into(),
            route_id: route.map(str::to_owned),
            status: status.into(),
        }
    }

    #[rstest]
    fn rows_convert_to_positions() {
        let position = row_to_position(row("stopped", Some("R1"))).expect("valid row");
        assert_eq!(position.status, VehicleStatus::Stopped);
        assert_eq!(position.route_id.as_ref().map(RouteId::as_str), Some("R1"));
    }

    #[rstest]
    fn unknown_status_defaults_to_active() {
        let position = row_to_position(row("parked", None)).expect("valid row");
        assert_eq!(position.status, VehicleStatus::Active);
    }

    #[rstest]
    fn blank_ids_are_query_errors() {
        let mut bad = row("active", None);
        bad.vehicle_id = String::new();
        assert!(matches!(
            row_to_position(bad),
            Err(PositionRepositoryError::Query { .. })
        ));
    }
}

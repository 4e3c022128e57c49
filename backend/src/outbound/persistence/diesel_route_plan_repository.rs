//! PostgreSQL-backed `RoutePlanRepository`.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::AsyncConnection as _;
use diesel_async::RunQueryDsl;
use diesel_async::scoped_futures::ScopedFutureExt as _;

use crate::domain::ports::{RoutePlanRepository, RoutePlanRepositoryError};
use crate::domain::{GeoPoint, RouteId, RoutePlan, Stop};

use super::diesel_basic_error_mapping::basic_error_mappers;
use super::models::RoutePlanRow;
use super::pool::DbPool;
use super::schema::route_plans;

/// Diesel-backed stop lists keyed by route.
#[derive(Clone)]
pub struct DieselRoutePlanRepository {
    pool: DbPool,
}

impl DieselRoutePlanRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

basic_error_mappers!(RoutePlanRepositoryError);

fn row_to_stop(row: RoutePlanRow) -> Stop {
    Stop {
        stop_number: row.stop_number,
        name: row.stop_name,
        location: GeoPoint::new(row.latitude, row.longitude),
        planned_arrival: row.planned_arrival,
        planned_departure: row.planned_departure,
        stop_duration_s: row.stop_duration_s,
        stop_radius_m: row.stop_radius_m,
    }
}

fn stop_to_row(route_id: &RouteId, stop: &Stop) -> RoutePlanRow {
    RoutePlanRow {
        route_id: route_id.as_str().to_owned(),
        stop_number: stop.stop_number,
        stop_name: stop.name.clone(),
        latitude: stop.location.latitude,
        longitude: stop.location.longitude,
        planned_arrival: stop.planned_arrival.clone(),
        planned_departure: stop.planned_departure.clone(),
        stop_duration_s: stop.stop_duration_s,
        stop_radius_m: stop.stop_radius_m,
    }
}

#[async_trait]
impl RoutePlanRepository for DieselRoutePlanRepository {
    async fn find(
        &self,
        route_id: &RouteId,
    ) -> Result<Option<Vec<Stop>>, RoutePlanRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<RoutePlanRow> = route_plans::table
            .filter(route_plans::route_id.eq(route_id.as_str()))
            .order(route_plans::stop_number.asc())
            .select(RoutePlanRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(rows.into_iter().map(row_to_stop).collect()))
    }

    async fn replace(&self, plan: &RoutePlan) -> Result<(), RoutePlanRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let route = plan.route_id().as_str().to_owned();
        let rows: Vec<RoutePlanRow> = plan
            .stops()
            .iter()
            .map(|stop| stop_to_row(plan.route_id(), stop))
            .collect();

        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            async move {
                diesel::delete(route_plans::table.filter(route_plans::route_id.eq(&route)))
                    .execute(conn)
                    .await?;
                diesel::insert_into(route_plans::table)
                    .values(&rows)
                    .execute(conn)
                    .await?;
                Ok(())
            }
            .scope_boxed()
        })
        .await
        .map_err(map_diesel_error)
    }
}

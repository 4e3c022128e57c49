//! PostgreSQL-backed `DeviationRepository` over `route_deviations`.
//!
//! Coordinates are stored as `{latitude, longitude}` JSONB objects so the
//! dashboard can read them without joins. Aggregates for the statistics
//! endpoint are computed with grouped counts in a single read transaction.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel_async::AsyncConnection as _;
use diesel_async::RunQueryDsl;
use diesel_async::scoped_futures::ScopedFutureExt as _;
use tracing::warn;

use crate::domain::ports::{DeviationRepository, DeviationRepositoryError};
use crate::domain::{
    Deviation, DeviationId, DeviationStats, DeviationType, GeoPoint, RouteId, Severity, UserId,
    VehicleDeviationCount, VehicleId,
};

use super::diesel_basic_error_mapping::basic_error_mappers;
use super::models::{DeviationRow, DeviationUpdate, NewDeviationRow};
use super::pool::DbPool;
use super::schema::route_deviations;

const BREAKDOWN_WINDOW_DAYS: i64 = 7;
const TOP_VEHICLE_WINDOW_DAYS: i64 = 30;

/// Diesel-backed deviation store.
#[derive(Clone)]
pub struct DieselDeviationRepository {
    pool: DbPool,
}

impl DieselDeviationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

basic_error_mappers!(DeviationRepositoryError);

fn point_to_json(point: &GeoPoint) -> Result<serde_json::Value, DeviationRepositoryError> {
    serde_json::to_value(point)
        .map_err(|err| DeviationRepositoryError::query(format!("encode location: {err}")))
}

fn json_to_point(value: serde_json::Value) -> Result<GeoPoint, DeviationRepositoryError> {
    serde_json::from_value(value)
        .map_err(|err| DeviationRepositoryError::query(format!("decode location: {err}")))
}

fn row_to_deviation(row: DeviationRow) -> Result<Deviation, DeviationRepositoryError> {
    let invalid = |detail: String| DeviationRepositoryError::query(detail);
    let metadata = match row.metadata {
        serde_json::Value::Object(map) => map,
        serde_json::Value::Null => serde_json::Map::new(),
        other => {
            return Err(invalid(format!("deviation metadata is not an object: {other}")));
        }
    };
    Ok(Deviation {
        id: Some(row.id),
        vehicle_id: VehicleId::new(row.vehicle_id).map_err(|e| invalid(e.to_string()))?,
        route_id: RouteId::new(row.route_id).map_err(|e| invalid(e.to_string()))?,
        driver_id: UserId::new(row.driver_id).map_err(|e| invalid(e.to_string()))?,
        deviation_type: row
            .deviation_type
            .parse()
            .map_err(|e: crate::domain::Error| invalid(e.message().to_owned()))?,
        severity: row
            .severity
            .parse()
            .map_err(|e: crate::domain::Error| invalid(e.message().to_owned()))?,
        location: json_to_point(row.location)?,
        expected_location: row.expected_location.map(json_to_point).transpose()?,
        distance_m: row.distance,
        duration_ms: row.duration_ms,
        description: row.description,
        metadata,
        auto_resolved: row.auto_resolved,
        created_at: row.created_at,
        resolved_at: row.resolved_at,
    })
}

/// Fold grouped counts into the dashboard aggregate. Unknown labels are
/// logged and skipped.
fn build_stats(
    total_today: i64,
    active: i64,
    by_type: Vec<(String, i64)>,
    by_severity: Vec<(String, i64)>,
    top_vehicles: Vec<(String, i64)>,
) -> DeviationStats {
    let count = |value: i64| u64::try_from(value).unwrap_or(0);

    let mut type_counts = BTreeMap::new();
    for (label, n) in by_type {
        match label.parse::<DeviationType>() {
            Ok(kind) => {
                type_counts.insert(kind, count(n));
            }
            Err(_) => warn!(label, "skipping unknown deviation type in stats"),
        }
    }

    let mut severity_counts = BTreeMap::new();
    for (label, n) in by_severity {
        match label.parse::<Severity>() {
            Ok(level) => {
                severity_counts.insert(level, count(n));
            }
            Err(_) => warn!(label, "skipping unknown severity in stats"),
        }
    }

    let top_vehicles = top_vehicles
        .into_iter()
        .filter_map(|(vehicle, n)| {
            VehicleId::new(vehicle)
                .ok()
                .map(|vehicle_id| VehicleDeviationCount {
                    vehicle_id,
                    count: count(n),
                })
        })
        .take(DeviationStats::TOP_VEHICLES)
        .collect();

    DeviationStats {
        total_today: count(total_today),
        active: count(active),
        by_type: type_counts,
        by_severity: severity_counts,
        top_vehicles,
    }
}

type StatsRows = (
    i64,
    i64,
    Vec<(String, i64)>,
    Vec<(String, i64)>,
    Vec<(String, i64)>,
);

#[async_trait]
impl DeviationRepository for DieselDeviationRepository {
    async fn insert(&self, deviation: &Deviation) -> Result<DeviationId, DeviationRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = NewDeviationRow {
            vehicle_id: deviation.vehicle_id.as_str(),
            route_id: deviation.route_id.as_str(),
            driver_id: deviation.driver_id.as_str(),
            deviation_type: deviation.deviation_type.as_str(),
            severity: deviation.severity.as_str(),
            location: point_to_json(&deviation.location)?,
            expected_location: deviation
                .expected_location
                .as_ref()
                .map(point_to_json)
                .transpose()?,
            distance: deviation.distance_m,
            duration_ms: deviation.duration_ms,
            description: &deviation.description,
            auto_resolved: deviation.auto_resolved,
            resolved_at: deviation.resolved_at,
            created_at: deviation.created_at,
            metadata: serde_json::Value::Object(deviation.metadata.clone()),
        };
        diesel::insert_into(route_deviations::table)
            .values(&row)
            .returning(route_deviations::id)
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)
    }

    async fn update(&self, deviation: &Deviation) -> Result<(), DeviationRepositoryError> {
        let id = deviation.id.ok_or_else(DeviationRepositoryError::missing_id)?;
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let changes = DeviationUpdate {
            severity: deviation.severity.as_str(),
            location: point_to_json(&deviation.location)?,
            expected_location: deviation
                .expected_location
                .as_ref()
                .map(point_to_json)
                .transpose()?,
            distance: deviation.distance_m,
            duration_ms: deviation.duration_ms,
            description: &deviation.description,
            auto_resolved: deviation.auto_resolved,
            resolved_at: deviation.resolved_at,
            metadata: serde_json::Value::Object(deviation.metadata.clone()),
        };
        let updated = diesel::update(route_deviations::table.find(id))
            .set(&changes)
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        if updated == 0 {
            return Err(DeviationRepositoryError::query(format!(
                "deviation {id} does not exist"
            )));
        }
        Ok(())
    }

    async fn find(&self, id: DeviationId) -> Result<Option<Deviation>, DeviationRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        route_deviations::table
            .find(id)
            .select(DeviationRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?
            .map(row_to_deviation)
            .transpose()
    }

    async fn history(
        &self,
        vehicle_id: &VehicleId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Deviation>, DeviationRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<DeviationRow> = route_deviations::table
            .filter(route_deviations::vehicle_id.eq(vehicle_id.as_str()))
            .filter(route_deviations::created_at.ge(since))
            .order(route_deviations::created_at.desc())
            .select(DeviationRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(row_to_deviation).collect()
    }

    async fn stats(&self, now: DateTime<Utc>) -> Result<DeviationStats, DeviationRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let start_of_day = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|midnight| midnight.and_utc())
            .unwrap_or(now);
        let breakdown_since = now - Duration::days(BREAKDOWN_WINDOW_DAYS);
        let top_since = now - Duration::days(TOP_VEHICLE_WINDOW_DAYS);
        let top_limit = i64::try_from(DeviationStats::TOP_VEHICLES).unwrap_or(i64::MAX);

        let rows: StatsRows = conn
            .transaction(|conn| {
                async move {
                    let total_today: i64 = route_deviations::table
                        .filter(route_deviations::created_at.ge(start_of_day))
                        .count()
                        .get_result(conn)
                        .await?;
                    let active: i64 = route_deviations::table
                        .filter(route_deviations::resolved_at.is_null())
                        .count()
                        .get_result(conn)
                        .await?;
                    let by_type: Vec<(String, i64)> = route_deviations::table
                        .filter(route_deviations::created_at.ge(breakdown_since))
                        .group_by(route_deviations::deviation_type)
                        .select((route_deviations::deviation_type, count_star()))
                        .load(conn)
                        .await?;
                    let by_severity: Vec<(String, i64)> = route_deviations::table
                        .filter(route_deviations::created_at.ge(breakdown_since))
                        .group_by(route_deviations::severity)
                        .select((route_deviations::severity, count_star()))
                        .load(conn)
                        .await?;
                    let top: Vec<(String, i64)> = route_deviations::table
                        .filter(route_deviations::created_at.ge(top_since))
                        .group_by(route_deviations::vehicle_id)
                        .select((route_deviations::vehicle_id, count_star()))
                        .order((count_star().desc(), route_deviations::vehicle_id.asc()))
                        .limit(top_limit)
                        .load(conn)
                        .await?;
                    Ok((total_today, active, by_type, by_severity, top))
                }
                .scope_boxed()
            })
            .await
            .map_err(map_diesel_error)?;

        let (total_today, active, by_type, by_severity, top) = rows;
        Ok(build_stats(total_today, active, by_type, by_severity, top))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn row() -> DeviationRow {
        DeviationRow {
            id: 9,
            vehicle_id: "BUS-1".into(),
            route_id: "R1".into(),
            driver_id: "driver1".into(),
            deviation_type: "off_route".into(),
            severity: "high".into(),
            location: json!({"latitude": 40.0, "longitude": -74.0}),
            expected_location: Some(json!({"latitude": 40.01, "longitude": -74.0})),
            distance: 1200.0,
            duration_ms: 0,
            description: "Vehicle is 1200m off route".into(),
            auto_resolved: false,
            resolved_at: None,
            created_at: Utc::now(),
            metadata: json!({"nearest_stop": 2}),
        }
    }

    #[rstest]
    fn rows_decode_into_deviations() {
        let deviation = row_to_deviation(row()).expect("valid row");
        assert_eq!(deviation.id, Some(9));
        assert_eq!(deviation.deviation_type, DeviationType::OffRoute);
        assert_eq!(deviation.severity, Severity::High);
        assert_eq!(deviation.location, GeoPoint::new(40.0, -74.0));
        assert_eq!(deviation.metadata.get("nearest_stop"), Some(&json!(2)));
        assert!(deviation.is_open());
    }

    #[rstest]
    fn malformed_location_is_a_query_error() {
        let mut bad = row();
        bad.location = json!("somewhere");
        assert!(matches!(
            row_to_deviation(bad),
            Err(DeviationRepositoryError::Query { .. })
        ));
    }

    #[rstest]
    fn stats_skip_unknown_labels_and_cap_top_vehicles() {
        let top = (1..=8)
            .map(|n| (format!("BUS-{n}"), 10 - i64::from(n)))
            .collect();
        let stats = build_stats(
            4,
            2,
            vec![("off_route".into(), 3), ("teleport".into(), 1)],
            vec![("high".into(), 2), ("low".into(), 1)],
            top,
        );

        assert_eq!(stats.total_today, 4);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.by_type.get(&DeviationType::OffRoute), Some(&3));
        assert_eq!(stats.by_type.len(), 1);
        assert_eq!(stats.by_severity.get(&Severity::High), Some(&2));
        assert_eq!(stats.top_vehicles.len(), DeviationStats::TOP_VEHICLES);
        assert_eq!(stats.top_vehicles[0].vehicle_id.as_str(), "BUS-1");
    }
}

//! Route monitoring HTTP handlers.
//!
//! ```text
//! POST /api/v1/route-monitoring/start
//! POST /api/v1/route-monitoring/stop
//! GET  /api/v1/route-monitoring/active
//! GET  /api/v1/route-monitoring/stats
//! GET  /api/v1/route-monitoring/settings
//! PUT  /api/v1/route-monitoring/settings
//! POST /api/v1/deviations/{id}/resolve
//! GET  /api/v1/vehicles/{vehicle_id}/deviations?hours=N
//! ```

use actix_web::{get, post, put, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::domain::route_monitor::DEFAULT_HISTORY_HOURS;
use crate::domain::{
    Deviation, DeviationId, DeviationStats, Error, MonitorSettings, SessionSummary,
};
use crate::inbound::http::ApiResult;
use crate::inbound::http::schemas::{
    DeviationSchema, DeviationStatsSchema, ErrorSchema, SessionSummarySchema,
};
use crate::inbound::http::session::SessionContext;
use crate::inbound::http::state::HttpState;
use crate::inbound::http::validation::{
    FieldName, parse_route_id, parse_user_id, parse_vehicle_id, require_text,
};

/// Request payload for starting a monitoring session.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct StartMonitoringRequest {
    #[schema(example = "BUS-001")]
    pub vehicle_id: Option<String>,
    #[schema(example = "R1")]
    pub route_id: Option<String>,
    /// Defaults to the caller.
    pub driver_id: Option<String>,
}

/// Request payload for stopping a monitoring session.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct StopMonitoringRequest {
    #[schema(example = "BUS-001")]
    pub vehicle_id: Option<String>,
}

/// Outcome of a stop request. Stopping an unmonitored vehicle is not an error.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StopMonitoringResponse {
    pub vehicle_id: String,
    pub stopped: bool,
}

/// Runtime thresholds of the route monitor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct MonitorSettingsBody {
    #[schema(example = 200.0)]
    pub deviation_radius_m: f64,
    #[schema(example = 300)]
    pub stop_duration_s: u64,
    #[schema(example = 10)]
    pub check_interval_s: u64,
}

impl From<MonitorSettings> for MonitorSettingsBody {
    fn from(value: MonitorSettings) -> Self {
        Self {
            deviation_radius_m: value.deviation_radius_m,
            stop_duration_s: value.stop_duration.as_secs(),
            check_interval_s: value.check_interval.as_secs(),
        }
    }
}

/// Look-back window for deviation history.
#[derive(Debug, Deserialize, IntoParams)]
pub struct HistoryQuery {
    /// Hours to look back, 1 to 720. Defaults to 24.
    pub hours: Option<String>,
}

fn parse_hours(raw: Option<String>) -> Result<u32, Error> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(DEFAULT_HISTORY_HOURS),
        Some(value) => value.parse::<u32>().map_err(|_| {
            Error::invalid_request("hours must be a positive integer")
                .with_details(json!({ "field": "hours", "value": value }))
        }),
    }
}

fn parse_deviation_id(raw: &str) -> Result<DeviationId, Error> {
    raw.trim()
        .parse::<DeviationId>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| {
            Error::invalid_request("deviation id must be a positive integer")
                .with_details(json!({ "field": "id", "value": raw }))
        })
}

/// Start monitoring a vehicle on a route.
///
/// Managers may start any vehicle; drivers only for themselves.
#[utoipa::path(
    post,
    path = "/api/v1/route-monitoring/start",
    request_body = StartMonitoringRequest,
    responses(
        (status = 200, description = "Monitoring started", body = SessionSummarySchema),
        (status = 400, description = "Invalid request", body = ErrorSchema),
        (status = 401, description = "Unauthorized", body = ErrorSchema),
        (status = 403, description = "Forbidden", body = ErrorSchema),
        (status = 404, description = "Route has no plan", body = ErrorSchema),
        (status = 409, description = "Vehicle already monitored", body = ErrorSchema)
    ),
    tags = ["route-monitoring"],
    operation_id = "startMonitoring",
    security(("SessionCookie" = []))
)]
#[post("/route-monitoring/start")]
pub async fn start_monitoring(
    state: web::Data<HttpState>,
    session: SessionContext,
    payload: web::Json<StartMonitoringRequest>,
) -> ApiResult<web::Json<SessionSummary>> {
    let user = session.require_user()?;
    let StartMonitoringRequest {
        vehicle_id,
        route_id,
        driver_id,
    } = payload.into_inner();
    let vehicle_field = FieldName::new("vehicle_id");
    let route_field = FieldName::new("route_id");
    let vehicle_id = parse_vehicle_id(require_text(vehicle_id, vehicle_field)?, vehicle_field)?;
    let route_id = parse_route_id(require_text(route_id, route_field)?, route_field)?;
    let driver_id = match driver_id.filter(|raw| !raw.trim().is_empty()) {
        Some(raw) => parse_user_id(raw, FieldName::new("driver_id"))?,
        None => user.user_id.clone(),
    };
    if !user.may_act_for(&driver_id) {
        return Err(Error::forbidden(
            "drivers may only start monitoring for themselves",
        ));
    }
    let summary = state.monitor.start(vehicle_id, route_id, driver_id).await?;
    Ok(web::Json(summary))
}

/// Stop monitoring a vehicle and auto-resolve its open deviations.
#[utoipa::path(
    post,
    path = "/api/v1/route-monitoring/stop",
    request_body = StopMonitoringRequest,
    responses(
        (status = 200, description = "Monitoring stopped", body = StopMonitoringResponse),
        (status = 400, description = "Invalid request", body = ErrorSchema),
        (status = 401, description = "Unauthorized", body = ErrorSchema),
        (status = 403, description = "Forbidden", body = ErrorSchema)
    ),
    tags = ["route-monitoring"],
    operation_id = "stopMonitoring",
    security(("SessionCookie" = []))
)]
#[post("/route-monitoring/stop")]
pub async fn stop_monitoring(
    state: web::Data<HttpState>,
    session: SessionContext,
    payload: web::Json<StopMonitoringRequest>,
) -> ApiResult<web::Json<StopMonitoringResponse>> {
    let user = session.require_user()?;
    let field = FieldName::new("vehicle_id");
    let vehicle_id = parse_vehicle_id(require_text(payload.into_inner().vehicle_id, field)?, field)?;
    if !user.is_manager() {
        let owns_session = state
            .monitor
            .active()
            .await
            .iter()
            .any(|summary| summary.vehicle_id == vehicle_id && summary.driver_id == user.user_id);
        if !owns_session {
            return Err(Error::forbidden(
                "drivers may only stop their own monitoring session",
            ));
        }
    }
    let stopped = state.monitor.stop(&vehicle_id).await;
    Ok(web::Json(StopMonitoringResponse {
        vehicle_id: vehicle_id.to_string(),
        stopped,
    }))
}

/// List live monitoring sessions. Drivers see only their own.
#[utoipa::path(
    get,
    path = "/api/v1/route-monitoring/active",
    responses(
        (status = 200, description = "Active sessions", body = [SessionSummarySchema]),
        (status = 401, description = "Unauthorized", body = ErrorSchema)
    ),
    tags = ["route-monitoring"],
    operation_id = "listActiveMonitoring",
    security(("SessionCookie" = []))
)]
#[get("/route-monitoring/active")]
pub async fn active_monitoring(
    state: web::Data<HttpState>,
    session: SessionContext,
) -> ApiResult<web::Json<Vec<SessionSummary>>> {
    let user = session.require_user()?;
    let sessions = state
        .monitor
        .active()
        .await
        .into_iter()
        .filter(|summary| user.may_act_for(&summary.driver_id))
        .collect();
    Ok(web::Json(sessions))
}

/// Aggregate deviation counts.
#[utoipa::path(
    get,
    path = "/api/v1/route-monitoring/stats",
    responses(
        (status = 200, description = "Deviation statistics", body = DeviationStatsSchema),
        (status = 401, description = "Unauthorized", body = ErrorSchema),
        (status = 403, description = "Forbidden", body = ErrorSchema)
    ),
    tags = ["route-monitoring"],
    operation_id = "deviationStats",
    security(("SessionCookie" = []))
)]
#[get("/route-monitoring/stats")]
pub async fn monitoring_stats(
    state: web::Data<HttpState>,
    session: SessionContext,
) -> ApiResult<web::Json<DeviationStats>> {
    session.require_manager()?;
    Ok(web::Json(state.monitor.stats().await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/route-monitoring/settings",
    responses(
        (status = 200, description = "Current thresholds", body = MonitorSettingsBody),
        (status = 401, description = "Unauthorized", body = ErrorSchema)
    ),
    tags = ["route-monitoring"],
    operation_id = "getMonitorSettings",
    security(("SessionCookie" = []))
)]
#[get("/route-monitoring/settings")]
pub async fn get_monitor_settings(
    state: web::Data<HttpState>,
    session: SessionContext,
) -> ApiResult<web::Json<MonitorSettingsBody>> {
    session.require_user()?;
    Ok(web::Json(state.monitor.settings().into()))
}

/// Replace the runtime thresholds. Every value must be positive.
#[utoipa::path(
    put,
    path = "/api/v1/route-monitoring/settings",
    request_body = MonitorSettingsBody,
    responses(
        (status = 200, description = "Thresholds updated", body = MonitorSettingsBody),
        (status = 400, description = "Invalid request", body = ErrorSchema),
        (status = 401, description = "Unauthorized", body = ErrorSchema),
        (status = 403, description = "Forbidden", body = ErrorSchema)
    ),
    tags = ["route-monitoring"],
    operation_id = "updateMonitorSettings",
    security(("SessionCookie" = []))
)]
#[put("/route-monitoring/settings")]
pub async fn update_monitor_settings(
    state: web::Data<HttpState>,
    session: SessionContext,
    payload: web::Json<MonitorSettingsBody>,
) -> ApiResult<web::Json<MonitorSettingsBody>> {
    let manager = session.require_manager()?;
    let body = payload.into_inner();
    let settings = MonitorSettings::try_new(
        body.deviation_radius_m,
        body.stop_duration_s,
        body.check_interval_s,
    )?;
    state.monitor.update_settings(settings);
    info!(user_id = %manager.user_id, "monitor settings changed over HTTP");
    Ok(web::Json(settings.into()))
}

/// Resolve a deviation by hand.
#[utoipa::path(
    post,
    path = "/api/v1/deviations/{id}/resolve",
    params(("id" = i64, Path, description = "Deviation id")),
    responses(
        (status = 200, description = "Deviation resolved", body = DeviationSchema),
        (status = 400, description = "Invalid id", body = ErrorSchema),
        (status = 401, description = "Unauthorized", body = ErrorSchema),
        (status = 403, description = "Forbidden", body = ErrorSchema),
        (status = 404, description = "Unknown deviation", body = ErrorSchema)
    ),
    tags = ["route-monitoring"],
    operation_id = "resolveDeviation",
    security(("SessionCookie" = []))
)]
#[post("/deviations/{id}/resolve")]
pub async fn resolve_deviation(
    state: web::Data<HttpState>,
    session: SessionContext,
    path: web::Path<String>,
) -> ApiResult<web::Json<Deviation>> {
    session.require_manager()?;
    let id = parse_deviation_id(&path.into_inner())?;
    Ok(web::Json(state.monitor.resolve(id).await?))
}

/// Deviations of a vehicle, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/vehicles/{vehicle_id}/deviations",
    params(("vehicle_id" = String, Path, description = "Vehicle id"), HistoryQuery),
    responses(
        (status = 200, description = "Deviation history", body = [DeviationSchema]),
        (status = 400, description = "Invalid request", body = ErrorSchema),
        (status = 401, description = "Unauthorized", body = ErrorSchema)
    ),
    tags = ["route-monitoring"],
    operation_id = "deviationHistory",
    security(("SessionCookie" = []))
)]
#[get("/vehicles/{vehicle_id}/deviations")]
pub async fn deviation_history(
    state: web::Data<HttpState>,
    session: SessionContext,
    path: web::Path<String>,
    query: web::Query<HistoryQuery>,
) -> ApiResult<web::Json<Vec<Deviation>>> {
    let user = session.require_user()?;
    let vehicle_id = parse_vehicle_id(path.into_inner(), FieldName::new("vehicle_id"))?;
    let hours = parse_hours(query.into_inner().hours)?;
    let deviations = state
        .monitor
        .history(&vehicle_id, hours)
        .await?
        .into_iter()
        .filter(|deviation| user.may_act_for(&deviation.driver_id))
        .collect();
    Ok(web::Json(deviations))
}

#[cfg(test)]
#[path = "monitoring_tests.rs"]
mod tests;

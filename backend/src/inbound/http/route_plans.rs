//! Route plan HTTP handlers.
//!
//! ```text
//! GET /api/v1/route-plans/{route_id}
//! PUT /api/v1/route-plans/{route_id}
//! ```

use actix_web::{get, put, web};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::route_plan::{DEFAULT_STOP_DURATION_S, DEFAULT_STOP_RADIUS_M};
use crate::domain::{GeoPoint, RouteId, Stop};
use crate::inbound::http::ApiResult;
use crate::inbound::http::schemas::{ErrorSchema, StopSchema};
use crate::inbound::http::session::SessionContext;
use crate::inbound::http::state::HttpState;
use crate::inbound::http::validation::{FieldName, parse_route_id};

/// One stop in a submitted plan. Dwell time and radius fall back to defaults.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct StopBody {
    pub stop_number: i32,
    #[schema(example = "Maple & 5th")]
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[schema(example = "07:15")]
    pub planned_arrival: Option<String>,
    #[schema(example = "07:16")]
    pub planned_departure: Option<String>,
    pub stop_duration_s: Option<i32>,
    pub stop_radius_m: Option<f64>,
}

impl From<StopBody> for Stop {
    fn from(value: StopBody) -> Self {
        Self {
            stop_number: value.stop_number,
            name: value.name,
            location: GeoPoint::new(value.latitude, value.longitude),
            planned_arrival: value.planned_arrival,
            planned_departure: value.planned_departure,
            stop_duration_s: value.stop_duration_s.unwrap_or(DEFAULT_STOP_DURATION_S),
            stop_radius_m: value.stop_radius_m.unwrap_or(DEFAULT_STOP_RADIUS_M),
        }
    }
}

/// Replacement stop list for a route.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct RoutePlanBody {
    pub stops: Vec<StopBody>,
}

/// Stored plan of a route, sorted by stop number.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RoutePlanResponse {
    pub route_id: String,
    #[schema(value_type = Vec<StopSchema>)]
    pub stops: Vec<Stop>,
}

fn route_path(raw: String) -> Result<RouteId, crate::domain::Error> {
    parse_route_id(raw, FieldName::new("route_id"))
}

#[utoipa::path(
    get,
    path = "/api/v1/route-plans/{route_id}",
    params(("route_id" = String, Path, description = "Route id")),
    responses(
        (status = 200, description = "Route plan", body = RoutePlanResponse),
        (status = 401, description = "Unauthorized", body = ErrorSchema),
        (status = 404, description = "Route has no plan", body = ErrorSchema)
    ),
    tags = ["route-plans"],
    operation_id = "getRoutePlan",
    security(("SessionCookie" = []))
)]
#[get("/route-plans/{route_id}")]
pub async fn get_route_plan(
    state: web::Data<HttpState>,
    session: SessionContext,
    path: web::Path<String>,
) -> ApiResult<web::Json<RoutePlanResponse>> {
    session.require_user()?;
    let route_id = route_path(path.into_inner())?;
    let stops = state.monitor.plan(&route_id).await?;
    Ok(web::Json(RoutePlanResponse {
        route_id: route_id.to_string(),
        stops,
    }))
}

/// Replace a route's stop list.
///
/// The plan needs at least one stop, unique stop numbers, valid coordinates
/// and positive radii. Sessions already running keep their old plan.
#[utoipa::path(
    put,
    path = "/api/v1/route-plans/{route_id}",
    params(("route_id" = String, Path, description = "Route id")),
    request_body = RoutePlanBody,
    responses(
        (status = 200, description = "Plan stored", body = RoutePlanResponse),
        (status = 400, description = "Invalid plan", body = ErrorSchema),
        (status = 401, description = "Unauthorized", body = ErrorSchema),
        (status = 403, description = "Forbidden", body = ErrorSchema)
    ),
    tags = ["route-plans"],
    operation_id = "replaceRoutePlan",
    security(("SessionCookie" = []))
)]
#[put("/route-plans/{route_id}")]
pub async fn replace_route_plan(
    state: web::Data<HttpState>,
    session: SessionContext,
    path: web::Path<String>,
    payload: web::Json<RoutePlanBody>,
) -> ApiResult<web::Json<RoutePlanResponse>> {
    session.require_manager()?;
    let route_id = route_path(path.into_inner())?;
    let stops = payload.into_inner().stops.into_iter().map(Stop::from).collect();
    let plan = state.monitor.replace_plan(route_id, stops).await?;
    Ok(web::Json(RoutePlanResponse {
        route_id: plan.route_id().to_string(),
        stops: plan.stops().to_vec(),
    }))
}

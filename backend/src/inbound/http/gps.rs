//! GPS ingest and location query handlers.
//!
//! ```text
//! POST /api/v1/gps/update
//! GET  /api/v1/gps/status
//! POST /api/v1/gps/toggle
//! GET  /api/v1/gps/vehicles
//! GET  /api/v1/vehicles/{vehicle_id}/location
//! GET  /api/v1/vehicles/{vehicle_id}/locations?start&end
//! ```

use actix_web::{get, post, web};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{Error, Position, PositionDraft, SpeedUnit, VehicleStatus};
use crate::inbound::http::ApiResult;
use crate::inbound::http::schemas::{ErrorSchema, PositionSchema};
use crate::inbound::http::session::SessionContext;
use crate::inbound::http::state::HttpState;
use crate::inbound::http::validation::{
    FieldName, missing_field_error, parse_optional_rfc3339_timestamp, parse_vehicle_id,
    require_text,
};

/// Sample reported by a vehicle. Timestamp and driver are set server-side.
#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct GpsUpdateRequest {
    #[schema(example = "BUS-001")]
    pub vehicle_id: Option<String>,
    #[schema(example = 40.7128)]
    pub latitude: Option<f64>,
    #[schema(example = -74.006)]
    pub longitude: Option<f64>,
    /// Defaults to 0.
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub route_id: Option<String>,
    /// `active`, `stopped` or `offline`; defaults to `active`.
    pub status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    #[schema(example = "success")]
    pub status: String,
}

/// GPS tracking switch.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GpsToggleBody {
    pub enabled: bool,
}

/// Tracking switch plus the unit reported speeds use.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GpsStatusBody {
    pub enabled: bool,
    #[schema(value_type = String, example = "kmh")]
    pub speed_unit: SpeedUnit,
}

/// Optional history window; RFC 3339 bounds.
#[derive(Debug, Deserialize, IntoParams)]
pub struct LocationsQuery {
    /// Defaults to one hour before `end`.
    pub start: Option<String>,
    /// Defaults to now.
    pub end: Option<String>,
}

fn parse_draft(body: GpsUpdateRequest) -> Result<PositionDraft, Error> {
    let vehicle_field = FieldName::new("vehicle_id");
    let vehicle_id = require_text(body.vehicle_id, vehicle_field)?;
    let latitude = body
        .latitude
        .ok_or_else(|| missing_field_error(FieldName::new("latitude")))?;
    let longitude = body
        .longitude
        .ok_or_else(|| missing_field_error(FieldName::new("longitude")))?;
    let status = body
        .status
        .as_deref()
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .map(str::parse::<VehicleStatus>)
        .transpose()?;
    Ok(PositionDraft {
        vehicle_id,
        latitude,
        longitude,
        speed: body.speed.unwrap_or(0.0),
        heading: body.heading,
        timestamp: None,
        route_id: body.route_id,
        status,
    })
}

/// Accept a position sample from the vehicle's driver.
#[utoipa::path(
    post,
    path = "/api/v1/gps/update",
    request_body = GpsUpdateRequest,
    responses(
        (status = 200, description = "Sample accepted", body = StatusResponse),
        (status = 400, description = "Invalid sample", body = ErrorSchema),
        (status = 401, description = "Unauthorized or vehicle assigned elsewhere", body = ErrorSchema)
    ),
    tags = ["gps"],
    operation_id = "updateGps",
    security(("SessionCookie" = []))
)]
#[post("/gps/update")]
pub async fn update_gps(
    state: web::Data<HttpState>,
    session: SessionContext,
    payload: web::Json<GpsUpdateRequest>,
) -> ApiResult<web::Json<StatusResponse>> {
    let user = session.require_user()?;
    let draft = parse_draft(payload.into_inner())?;
    state.gps.ingest(&user, draft).await?;
    Ok(web::Json(StatusResponse {
        status: "success".to_owned(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/gps/status",
    responses(
        (status = 200, description = "Tracking switch", body = GpsStatusBody),
        (status = 401, description = "Unauthorized", body = ErrorSchema)
    ),
    tags = ["gps"],
    operation_id = "gpsStatus",
    security(("SessionCookie" = []))
)]
#[get("/gps/status")]
pub async fn gps_status(
    state: web::Data<HttpState>,
    session: SessionContext,
) -> ApiResult<web::Json<GpsStatusBody>> {
    session.require_user()?;
    let enabled = state.gps.gps_enabled().await?;
    Ok(web::Json(GpsStatusBody {
        enabled,
        speed_unit: state.gps.speed_unit(),
    }))
}

/// Switch live tracking on or off.
#[utoipa::path(
    post,
    path = "/api/v1/gps/toggle",
    request_body = GpsToggleBody,
    responses(
        (status = 200, description = "Tracking switched", body = GpsToggleBody),
        (status = 401, description = "Unauthorized", body = ErrorSchema),
        (status = 403, description = "Forbidden", body = ErrorSchema)
    ),
    tags = ["gps"],
    operation_id = "toggleGps",
    security(("SessionCookie" = []))
)]
#[post("/gps/toggle")]
pub async fn toggle_gps(
    state: web::Data<HttpState>,
    session: SessionContext,
    payload: web::Json<GpsToggleBody>,
) -> ApiResult<web::Json<GpsToggleBody>> {
    session.require_manager()?;
    let enabled = payload.into_inner().enabled;
    state.gps.set_gps_enabled(enabled).await?;
    Ok(web::Json(GpsToggleBody { enabled }))
}

/// Latest position of every vehicle that reported in the last 30 minutes.
#[utoipa::path(
    get,
    path = "/api/v1/gps/vehicles",
    responses(
        (status = 200, description = "Fleet snapshot", body = [PositionSchema]),
        (status = 401, description = "Unauthorized", body = ErrorSchema)
    ),
    tags = ["gps"],
    operation_id = "fleetLocations",
    security(("SessionCookie" = []))
)]
#[get("/gps/vehicles")]
pub async fn fleet_locations(
    state: web::Data<HttpState>,
    session: SessionContext,
) -> ApiResult<web::Json<Vec<Position>>> {
    let user = session.require_user()?;
    Ok(web::Json(state.gps.fleet_snapshot(&user).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/vehicles/{vehicle_id}/location",
    params(("vehicle_id" = String, Path, description = "Vehicle id")),
    responses(
        (status = 200, description = "Latest position", body = PositionSchema),
        (status = 401, description = "Unauthorized", body = ErrorSchema),
        (status = 404, description = "No position recorded", body = ErrorSchema)
    ),
    tags = ["gps"],
    operation_id = "vehicleLocation",
    security(("SessionCookie" = []))
)]
#[get("/vehicles/{vehicle_id}/location")]
pub async fn vehicle_location(
    state: web::Data<HttpState>,
    session: SessionContext,
    path: web::Path<String>,
) -> ApiResult<web::Json<Position>> {
    let user = session.require_user()?;
    let vehicle_id = parse_vehicle_id(path.into_inner(), FieldName::new("vehicle_id"))?;
    let position = state.gps.latest_location(&vehicle_id).await?;
    if !user.may_act_for(&position.driver_id) {
        return Err(Error::forbidden("vehicle is reported by another driver"));
    }
    Ok(web::Json(position))
}

/// Position history of a vehicle, oldest first. The window spans at most
/// seven days.
#[utoipa::path(
    get,
    path = "/api/v1/vehicles/{vehicle_id}/locations",
    params(("vehicle_id" = String, Path, description = "Vehicle id"), LocationsQuery),
    responses(
        (status = 200, description = "Position history", body = [PositionSchema]),
        (status = 400, description = "Invalid window", body = ErrorSchema),
        (status = 401, description = "Unauthorized", body = ErrorSchema)
    ),
    tags = ["gps"],
    operation_id = "vehicleLocations",
    security(("SessionCookie" = []))
)]
#[get("/vehicles/{vehicle_id}/locations")]
pub async fn vehicle_locations(
    state: web::Data<HttpState>,
    session: SessionContext,
    path: web::Path<String>,
    query: web::Query<LocationsQuery>,
) -> ApiResult<web::Json<Vec<Position>>> {
    let user = session.require_user()?;
    let vehicle_id = parse_vehicle_id(path.into_inner(), FieldName::new("vehicle_id"))?;
    let LocationsQuery { start, end } = query.into_inner();
    let start = parse_optional_rfc3339_timestamp(start, FieldName::new("start"))?;
    let end = parse_optional_rfc3339_timestamp(end, FieldName::new("end"))?;
    let mut positions = state.gps.history(&vehicle_id, start, end).await?;
    if !user.is_manager() {
        positions.retain(|position| position.driver_id == user.user_id);
    }
    Ok(web::Json(positions))
}

#[cfg(test)]
#[path = "gps_tests.rs"]
mod tests;

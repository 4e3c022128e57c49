//! Fleet operation handlers that fire notifications.
//!
//! ```text
//! POST /api/v1/emergency
//! POST /api/v1/vehicles/{vehicle_id}/status
//! POST /api/v1/route-assignments
//! POST /api/v1/reports/ready
//! ```

use actix_web::{post, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::domain::{Error, GeoPoint, RouteAssignment, ServiceStatus};
use crate::inbound::http::ApiResult;
use crate::inbound::http::schemas::ErrorSchema;
use crate::inbound::http::session::SessionContext;
use crate::inbound::http::state::HttpState;
use crate::inbound::http::validation::{
    FieldName, parse_route_id, parse_user_id, parse_vehicle_id, require_text,
};

const DEFAULT_EMERGENCY_MESSAGE: &str = "Emergency assistance requested";

/// SOS raised by the caller.
#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct EmergencyRequest {
    pub message: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Identifier of a queued notification.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NotificationAccepted {
    pub notification_id: String,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct VehicleStatusRequest {
    #[schema(example = "maintenance")]
    pub status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VehicleStatusResponse {
    pub vehicle_id: String,
    pub status: String,
    /// Absent when the status did not change.
    pub notification_id: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct RouteAssignmentRequest {
    pub driver_id: Option<String>,
    pub vehicle_id: Option<String>,
    pub route_id: Option<String>,
    /// `YYYY-MM-DD`; defaults to today (UTC).
    #[schema(example = "2025-03-04")]
    pub assigned_date: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ReportReadyRequest {
    #[schema(example = "attendance")]
    pub report_type: Option<String>,
    #[schema(example = "March attendance")]
    pub report_name: Option<String>,
    pub download_url: Option<String>,
}

fn parse_location(latitude: Option<f64>, longitude: Option<f64>) -> Result<Option<GeoPoint>, Error> {
    match (latitude, longitude) {
        (None, None) => Ok(None),
        (Some(latitude), Some(longitude)) => {
            let point = GeoPoint::new(latitude, longitude);
            if point.is_valid() {
                Ok(Some(point))
            } else {
                Err(Error::invalid_request("location is out of range")
                    .with_details(json!({ "field": "latitude" })))
            }
        }
        _ => Err(
            Error::invalid_request("latitude and longitude must be given together")
                .with_details(json!({ "field": "longitude" })),
        ),
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, Error> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        Error::invalid_request("assigned_date must be YYYY-MM-DD")
            .with_details(json!({ "field": "assigned_date", "value": raw }))
    })
}

/// Alert every manager and emergency contact.
#[utoipa::path(
    post,
    path = "/api/v1/emergency",
    request_body = EmergencyRequest,
    responses(
        (status = 200, description = "Alert queued", body = NotificationAccepted),
        (status = 400, description = "Invalid location", body = ErrorSchema),
        (status = 401, description = "Unauthorized", body = ErrorSchema),
        (status = 503, description = "No recipient reachable", body = ErrorSchema)
    ),
    tags = ["fleet"],
    operation_id = "raiseEmergency",
    security(("SessionCookie" = []))
)]
#[post("/emergency")]
pub async fn raise_emergency(
    state: web::Data<HttpState>,
    session: SessionContext,
    payload: web::Json<EmergencyRequest>,
) -> ApiResult<web::Json<NotificationAccepted>> {
    let user = session.require_user()?;
    let EmergencyRequest {
        message,
        latitude,
        longitude,
    } = payload.into_inner();
    let location = parse_location(latitude, longitude)?;
    let message = message
        .filter(|text| !text.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_EMERGENCY_MESSAGE.to_owned());
    let notification = state
        .triggers
        .emergency(&user.user_id, &message, location)
        .await?;
    Ok(web::Json(NotificationAccepted {
        notification_id: notification.id.to_string(),
    }))
}

/// Record a vehicle's service status and announce the change.
#[utoipa::path(
    post,
    path = "/api/v1/vehicles/{vehicle_id}/status",
    params(("vehicle_id" = String, Path, description = "Vehicle id")),
    request_body = VehicleStatusRequest,
    responses(
        (status = 200, description = "Status recorded", body = VehicleStatusResponse),
        (status = 400, description = "Unknown status", body = ErrorSchema),
        (status = 401, description = "Unauthorized", body = ErrorSchema),
        (status = 403, description = "Forbidden", body = ErrorSchema),
        (status = 404, description = "Unknown vehicle", body = ErrorSchema)
    ),
    tags = ["fleet"],
    operation_id = "changeVehicleStatus",
    security(("SessionCookie" = []))
)]
#[post("/vehicles/{vehicle_id}/status")]
pub async fn change_vehicle_status(
    state: web::Data<HttpState>,
    session: SessionContext,
    path: web::Path<String>,
    payload: web::Json<VehicleStatusRequest>,
) -> ApiResult<web::Json<VehicleStatusResponse>> {
    let manager = session.require_manager()?;
    let vehicle_id = parse_vehicle_id(path.into_inner(), FieldName::new("vehicle_id"))?;
    let status: ServiceStatus =
        require_text(payload.into_inner().status, FieldName::new("status"))?
            .trim()
            .parse()?;
    let notification = state
        .triggers
        .change_vehicle_status(&vehicle_id, status, &manager.user_id)
        .await?;
    Ok(web::Json(VehicleStatusResponse {
        vehicle_id: vehicle_id.to_string(),
        status: status.as_str().to_owned(),
        notification_id: notification.map(|n| n.id.to_string()),
    }))
}

/// Record a driver's route assignment and notify the driver.
#[utoipa::path(
    post,
    path = "/api/v1/route-assignments",
    request_body = RouteAssignmentRequest,
    responses(
        (status = 200, description = "Assignment recorded", body = NotificationAccepted),
        (status = 400, description = "Invalid request", body = ErrorSchema),
        (status = 401, description = "Unauthorized", body = ErrorSchema),
        (status = 403, description = "Forbidden", body = ErrorSchema)
    ),
    tags = ["fleet"],
    operation_id = "assignRoute",
    security(("SessionCookie" = []))
)]
#[post("/route-assignments")]
pub async fn assign_route(
    state: web::Data<HttpState>,
    session: SessionContext,
    payload: web::Json<RouteAssignmentRequest>,
) -> ApiResult<web::Json<NotificationAccepted>> {
    session.require_manager()?;
    let body = payload.into_inner();
    let driver_field = FieldName::new("driver_id");
    let vehicle_field = FieldName::new("vehicle_id");
    let route_field = FieldName::new("route_id");
    let assignment = RouteAssignment {
        driver_id: parse_user_id(require_text(body.driver_id, driver_field)?, driver_field)?,
        vehicle_id: parse_vehicle_id(require_text(body.vehicle_id, vehicle_field)?, vehicle_field)?,
        route_id: parse_route_id(require_text(body.route_id, route_field)?, route_field)?,
        assigned_date: match body.assigned_date.as_deref() {
            Some(raw) if !raw.trim().is_empty() => parse_date(raw)?,
            _ => state.clock.utc().date_naive(),
        },
    };
    let notification = state.triggers.assign_route(&assignment).await?;
    Ok(web::Json(NotificationAccepted {
        notification_id: notification.id.to_string(),
    }))
}

/// Tell the caller a generated report is ready.
#[utoipa::path(
    post,
    path = "/api/v1/reports/ready",
    request_body = ReportReadyRequest,
    responses(
        (status = 200, description = "Notice queued", body = NotificationAccepted),
        (status = 400, description = "Invalid request", body = ErrorSchema),
        (status = 401, description = "Unauthorized", body = ErrorSchema)
    ),
    tags = ["fleet"],
    operation_id = "reportReady",
    security(("SessionCookie" = []))
)]
#[post("/reports/ready")]
pub async fn report_ready(
    state: web::Data<HttpState>,
    session: SessionContext,
    payload: web::Json<ReportReadyRequest>,
) -> ApiResult<web::Json<NotificationAccepted>> {
    let user = session.require_user()?;
    let body = payload.into_inner();
    let report_type = require_text(body.report_type, FieldName::new("report_type"))?;
    let report_name = require_text(body.report_name, FieldName::new("report_name"))?;
    let download_url = body.download_url.filter(|url| !url.trim().is_empty());
    let notification = state
        .triggers
        .report_ready(
            &user.user_id,
            report_type.trim(),
            report_name.trim(),
            download_url.as_deref(),
        )
        .await?;
    Ok(web::Json(NotificationAccepted {
        notification_id: notification.id.to_string(),
    }))
}

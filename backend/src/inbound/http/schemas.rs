//! OpenAPI schema definitions for domain types.
//!
//! Domain types remain framework-agnostic by not deriving `ToSchema`. This
//! module provides the schema definitions required for OpenAPI documentation
//! using utoipa's external schema registration.
//!
//! The schema wrappers mirror the JSON produced by their domain counterparts
//! but live in the inbound adapter layer where framework concerns belong.

#![expect(
    dead_code,
    reason = "Schema wrappers are only read by utoipa when generating the document"
)]

use utoipa::ToSchema;

/// OpenAPI schema for [`crate::domain::ErrorCode`].
#[derive(ToSchema)]
#[schema(as = crate::domain::ErrorCode)]
pub enum ErrorCodeSchema {
    #[schema(rename = "invalid_request")]
    InvalidRequest,
    #[schema(rename = "unauthorized")]
    Unauthorized,
    #[schema(rename = "forbidden")]
    Forbidden,
    #[schema(rename = "not_found")]
    NotFound,
    #[schema(rename = "conflict")]
    Conflict,
    #[schema(rename = "service_unavailable")]
    ServiceUnavailable,
    #[schema(rename = "internal_error")]
    InternalError,
}

/// OpenAPI schema for [`crate::domain::Error`].
#[derive(ToSchema)]
#[schema(as = crate::domain::Error)]
pub struct ErrorSchema {
    /// Stable machine-readable error code.
    #[schema(example = "invalid_request")]
    code: ErrorCodeSchema,
    /// Human-readable message returned to clients.
    #[schema(example = "vehicle_id must not be empty")]
    message: String,
    /// Correlation identifier echoed in the `trace-id` header.
    #[schema(example = "3fa85f64-5717-4562-b3fc-2c963f66afa6")]
    trace_id: Option<String>,
    /// Supplementary error details, e.g. the offending field.
    details: Option<serde_json::Value>,
}

/// OpenAPI schema for [`crate::domain::GeoPoint`].
#[derive(ToSchema)]
#[schema(as = crate::domain::GeoPoint)]
pub struct GeoPointSchema {
    #[schema(example = 40.0)]
    latitude: f64,
    #[schema(example = -74.0)]
    longitude: f64,
}

/// OpenAPI schema for [`crate::domain::Position`].
#[derive(ToSchema)]
#[schema(as = crate::domain::Position)]
pub struct PositionSchema {
    #[schema(example = "BUS-001")]
    vehicle_id: String,
    latitude: f64,
    longitude: f64,
    /// Speed in the configured unit.
    speed: f64,
    /// Degrees clockwise from north.
    heading: Option<f64>,
    #[schema(value_type = String, format = DateTime)]
    timestamp: String,
    #[schema(example = "driver1")]
    driver_id: String,
    route_id: Option<String>,
    #[schema(example = "active")]
    status: String,
}

/// OpenAPI schema for [`crate::domain::Deviation`].
#[derive(ToSchema)]
#[schema(as = crate::domain::Deviation)]
pub struct DeviationSchema {
    /// Store-assigned id; absent until persisted.
    id: Option<i64>,
    vehicle_id: String,
    route_id: String,
    driver_id: String,
    #[schema(example = "off_route")]
    deviation_type: String,
    #[schema(example = "low")]
    severity: String,
    location: GeoPointSchema,
    expected_location: Option<GeoPointSchema>,
    distance_m: f64,
    duration_ms: i64,
    description: String,
    metadata: serde_json::Value,
    auto_resolved: bool,
    #[schema(value_type = String, format = DateTime)]
    created_at: String,
    #[schema(value_type = Option<String>, format = DateTime)]
    resolved_at: Option<String>,
}

/// OpenAPI schema for [`crate::domain::Stop`].
#[derive(ToSchema)]
#[schema(as = crate::domain::Stop)]
pub struct StopSchema {
    stop_number: i32,
    name: String,
    location: GeoPointSchema,
    #[schema(example = "07:15")]
    planned_arrival: Option<String>,
    #[schema(example = "07:16")]
    planned_departure: Option<String>,
    stop_duration_s: i32,
    stop_radius_m: f64,
}

/// OpenAPI schema for [`crate::domain::SessionSummary`].
#[derive(ToSchema)]
#[schema(as = crate::domain::SessionSummary)]
pub struct SessionSummarySchema {
    vehicle_id: String,
    route_id: String,
    driver_id: String,
    #[schema(example = "on_route")]
    status: String,
    #[schema(value_type = String, format = DateTime)]
    start_time: String,
    #[schema(value_type = Option<String>, format = DateTime)]
    last_update: Option<String>,
    completed_stops: usize,
    total_stops: usize,
    current_index: usize,
    /// Open deviations of the session.
    deviations: Vec<DeviationSchema>,
}

/// OpenAPI schema for [`crate::domain::DeviationStats`].
#[derive(ToSchema)]
#[schema(as = crate::domain::DeviationStats)]
pub struct DeviationStatsSchema {
    total_today: u64,
    active: u64,
    /// Counts keyed by deviation type over the last 7 days.
    by_type: std::collections::BTreeMap<String, u64>,
    /// Counts keyed by severity over the last 7 days.
    by_severity: std::collections::BTreeMap<String, u64>,
    /// Up to five vehicles with the most deviations over 30 days.
    top_vehicles: Vec<serde_json::Value>,
}

//! Domain primitives, aggregates and services.
//!
//! Purpose: model fleet telemetry, route deviations and notifications without
//! depending on any transport or storage technology. Adapters in `inbound` and
//! `outbound` talk to this module through the traits in [`ports`].
//!
//! Public surface:
//! - Error / ErrorCode: transport-agnostic failure payload.
//! - Identifiers: VehicleId, RouteId, UserId, NotificationId, DeviationId.
//! - Telemetry: Position, PositionDraft and the [`GpsService`].
//! - Route monitoring: RoutePlan, Deviation and the [`RouteMonitor`].
//! - Notifications: drafts, the queue, workers, triggers and the inbox.
//! - [`FanoutBus`]: real-time delivery to stream subscribers.

pub mod auth;
pub mod deviation;
pub mod error;
pub mod fanout;
pub mod fleet;
pub mod geo;
pub mod gps;
pub mod ids;
pub mod notifications;
pub mod ports;
pub mod route_monitor;
pub mod route_plan;
pub mod telemetry;
pub mod trace_id;

pub use self::auth::{AuthUser, Role, UnknownRole};
pub use self::deviation::{
    Deviation, DeviationStats, DeviationType, MonitorSettings, Severity, VehicleDeviationCount,
};
pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::fanout::{BusEvent, FanoutBus, Subscription};
pub use self::fleet::{
    AbsentStudent, MaintenanceSnapshot, RouteAssignment, ServiceStatus, VehicleRecord,
};
pub use self::geo::GeoPoint;
pub use self::gps::GpsService;
pub use self::ids::{DeviationId, IdValidationError, NotificationId, RouteId, UserId, VehicleId};
pub use self::route_monitor::{RouteMonitor, SessionStatus, SessionSummary};
pub use self::route_plan::{RoutePlan, Stop};
pub use self::telemetry::{Position, PositionDraft, SpeedUnit, VehicleStatus};
pub use self::trace_id::{TRACE_ID_HEADER, TraceId};

/// Convenient API result alias.
///
/// # Examples
/// ```
/// use actix_web::HttpResponse;
/// use busfleet::domain::{ApiResult, Error};
///
/// fn handler() -> ApiResult<HttpResponse> {
///     Err(Error::forbidden("nope"))
/// }
/// ```
pub type ApiResult<T> = Result<T, Error>;

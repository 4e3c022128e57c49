//! Internal Diesel row structs for database operations.
//!
//! These types are implementation details of the persistence layer and must
//! never be exposed to the domain. They exist solely to satisfy Diesel's
//! type requirements for queries and mutations.

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;

use super::schema::{
    emergency_contacts, gps_locations, notification_deliveries, notification_inbox,
    notification_preferences, notifications, route_assignments, route_deviations, route_plans,
    student_attendance, system_settings, users, vehicles,
};

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = gps_locations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct PositionRow {
    pub vehicle_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub heading: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub driver_id: String,
    pub route_id: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = gps_locations)]
pub(crate) struct NewPositionRow<'a> {
    pub vehicle_id: &'a str,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub heading: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub driver_id: &'a str,
    pub route_id: Option<&'a str>,
    pub status: &'a str,
}

// ---------------------------------------------------------------------------
// Route plans and deviations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = route_plans)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct RoutePlanRow {
    pub route_id: String,
    pub stop_number: i32,
    pub stop_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub planned_arrival: Option<String>,
    pub planned_departure: Option<String>,
    pub stop_duration_s: i32,
    pub stop_radius_m: f64,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = route_deviations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct DeviationRow {
    pub id: i64,
    pub vehicle_id: String,
    pub route_id: String,
    pub driver_id: String,
    pub deviation_type: String,
    pub severity: String,
    pub location: serde_json::Value,
    pub expected_location: Option<serde_json::Value>,
    pub distance: f64,
    pub duration_ms: i64,
    pub description: String,
    pub auto_resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = route_deviations)]
pub(crate) struct NewDeviationRow<'a> {
    pub vehicle_id: &'a str,
    pub route_id: &'a str,
    pub driver_id: &'a str,
    pub deviation_type: &'a str,
    pub severity: &'a str,
    pub location: serde_json::Value,
    pub expected_location: Option<serde_json::Value>,
    pub distance: f64,
    pub duration_ms: i64,
    pub description: &'a str,
    pub auto_resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

/// Mutable columns of a deviation. `None` clears nullable columns.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = route_deviations)]
#[diesel(treat_none_as_null = true)]
pub(crate) struct DeviationUpdate<'a> {
    pub severity: &'a str,
    pub location: serde_json::Value,
    pub expected_location: Option<serde_json::Value>,
    pub distance: f64,
    pub duration_ms: i64,
    pub description: &'a str,
    pub auto_resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = notifications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct NotificationRow {
    pub id: String,
    pub notification_type: String,
    pub priority: String,
    pub subject: String,
    pub message: String,
    pub data: serde_json::Value,
    pub recipients: serde_json::Value,
    pub channels: serde_json::Value,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = notifications)]
pub(crate) struct NewNotificationRow<'a> {
    pub id: &'a str,
    pub notification_type: &'a str,
    pub priority: &'a str,
    pub subject: &'a str,
    pub message: &'a str,
    pub data: serde_json::Value,
    pub recipients: serde_json::Value,
    pub channels: serde_json::Value,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub status: &'a str,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = notification_deliveries)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct DeliveryRow {
    pub channel: String,
    pub status: String,
    pub delivered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = notification_deliveries)]
pub(crate) struct NewDeliveryRow<'a> {
    pub notification_id: &'a str,
    pub user_id: &'a str,
    pub channel: &'a str,
    pub status: &'a str,
    pub delivered_at: DateTime<Utc>,
    pub error: Option<&'a str>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = notification_inbox)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct InboxRow {
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = notification_inbox)]
pub(crate) struct NewInboxRow<'a> {
    pub notification_id: &'a str,
    pub user_id: &'a str,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = notification_preferences)]
#[diesel(primary_key(user_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub(crate) struct PreferencesRow {
    pub user_id: String,
    pub email_enabled: bool,
    pub sms_enabled: bool,
    pub push_enabled: bool,
    pub quiet_start: Option<String>,
    pub quiet_end: Option<String>,
    pub type_opt_in: serde_json::Value,
    pub timezone: String,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Fleet register
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct UserRow {
    pub username: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = vehicles)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct VehicleRow {
    pub vehicle_id: String,
    pub model: String,
    pub status: String,
    pub current_mileage: i64,
    pub last_oil_change: i64,
    pub last_tire_service: i64,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = route_assignments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct AssignmentRow {
    pub driver_id: String,
    pub vehicle_id: String,
    pub route_id: String,
    pub assigned_date: NaiveDate,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = route_assignments)]
pub(crate) struct NewAssignmentRow<'a> {
    pub driver_id: &'a str,
    pub vehicle_id: &'a str,
    pub route_id: &'a str,
    pub assigned_date: NaiveDate,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = student_attendance)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct AbsenceRow {
    pub student_id: String,
    pub student_name: String,
    pub route_id: Option<String>,
    pub attendance_date: NaiveDate,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = emergency_contacts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct EmergencyContactRow {
    pub contact_id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = system_settings)]
pub(crate) struct SystemSettingRow<'a> {
    pub key: &'a str,
    pub value: &'a str,
    pub updated_at: DateTime<Utc>,
}

//! Events carried by the fan-out bus and their wire encodings.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::notifications::NotificationPayload;
use crate::domain::{AuthUser, Deviation, Position, RouteId, UserId, VehicleId, VehicleStatus};

/// A message delivered to stream subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// First message of every stream; never buffered.
    Connected { client_id: String },
    GpsUpdate(Position),
    Deviation(Box<Deviation>),
    /// In-app notification for a single user.
    Notification {
        user_id: UserId,
        notification: Box<NotificationPayload>,
    },
    Heartbeat { timestamp: DateTime<Utc> },
    /// Terminal message sent while the server shuts down.
    Shutdown,
}

#[derive(Serialize)]
struct ConnectedPayload<'a> {
    message: &'static str,
    client_id: &'a str,
}

#[derive(Serialize)]
struct GpsUpdatePayload<'a> {
    vehicle_id: &'a VehicleId,
    latitude: f64,
    longitude: f64,
    speed: f64,
    heading: Option<f64>,
    timestamp: DateTime<Utc>,
    driver_id: &'a UserId,
    route_id: Option<&'a RouteId>,
    status: VehicleStatus,
}

#[derive(Serialize)]
struct DeviationPayload<'a> {
    deviation: &'a Deviation,
}

#[derive(Serialize)]
struct NotificationEnvelope<'a> {
    notification: &'a NotificationPayload,
}

#[derive(Serialize)]
struct HeartbeatPayload {
    timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
struct MessagePayload {
    message: &'static str,
}

impl BusEvent {
    /// Stream event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::GpsUpdate(_) => "gps_update",
            Self::Deviation(_) => "route_deviation",
            Self::Notification { .. } => "notification",
            Self::Heartbeat { .. } => "heartbeat",
            Self::Shutdown => "shutdown",
        }
    }

    /// Whether a subscriber authenticated as `viewer` may receive the event.
    ///
    /// Managers see every vehicle and deviation; drivers see only their own
    /// positions. Notifications go to their target user alone.
    pub fn is_visible_to(&self, viewer: &AuthUser) -> bool {
        match self {
            Self::GpsUpdate(position) => {
                viewer.is_manager() || viewer.user_id == position.driver_id
            }
            Self::Deviation(_) => viewer.is_manager(),
            Self::Notification { user_id, .. } => &viewer.user_id == user_id,
            Self::Connected { .. } | Self::Heartbeat { .. } | Self::Shutdown => true,
        }
    }

    /// JSON body of the event.
    pub fn data_json(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Connected { client_id } => serde_json::to_string(&ConnectedPayload {
                message: "Connected to GPS stream",
                client_id,
            }),
            Self::GpsUpdate(p) => serde_json::to_string(&GpsUpdatePayload {
                vehicle_id: &p.vehicle_id,
                latitude: p.latitude,
                longitude: p.longitude,
                speed: p.speed,
                heading: p.heading,
                timestamp: p.timestamp,
                driver_id: &p.driver_id,
                route_id: p.route_id.as_ref(),
                status: p.status,
            }),
            Self::Deviation(deviation) => serde_json::to_string(&DeviationPayload { deviation }),
            Self::Notification { notification, .. } => {
                serde_json::to_string(&NotificationEnvelope { notification })
            }
            Self::Heartbeat { timestamp } => serde_json::to_string(&HeartbeatPayload {
                timestamp: *timestamp,
            }),
            Self::Shutdown => serde_json::to_string(&MessagePayload {
                message: "Server shutting down",
            }),
        }
    }

    /// Server-sent events frame: `event: <name>\ndata: <json>\n\n`.
    pub fn to_sse_frame(&self) -> Result<String, serde_json::Error> {
        Ok(format!("event: {}\ndata: {}\n\n", self.name(), self.data_json()?))
    }

    /// WebSocket text frame: `{"event": <name>, "data": <json>}`.
    pub fn to_ws_text(&self) -> Result<String, serde_json::Error> {
        Ok(format!(
            "{{\"event\":\"{}\",\"data\":{}}}",
            self.name(),
            self.data_json()?
        ))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rstest::{fixture, rstest};

    use super::*;
    use crate::domain::Role;

    #[fixture]
    fn position() -> Position {
        Position {
            vehicle_id: VehicleId::new("BUS-1").expect("valid id"),
            latitude: 40.0,
            longitude: -74.0,
            speed: 30.5,
            heading: Some(90.0),
            timestamp: Utc
                .with_ymd_and_hms(2025, 3, 1, 7, 15, 0)
                .single()
                .expect("valid time"),
            driver_id: UserId::new("driver1").expect("valid id"),
            route_id: Some(RouteId::new("R1").expect("valid id")),
            status: VehicleStatus::Active,
        }
    }

    fn viewer(id: &str, role: Role) -> AuthUser {
        AuthUser::new(UserId::new(id).expect("valid id"), role)
    }

    #[rstest]
    fn gps_update_sse_frame(position: Position) {
        let frame = BusEvent::GpsUpdate(position)
            .to_sse_frame()
            .expect("encodes");
        assert!(frame.ends_with("\n\n"));
        insta::assert_snapshot!(frame.trim_end(), @r#"
        event: gps_update
        data: {"vehicle_id":"BUS-1","latitude":40.0,"longitude":-74.0,"speed":30.5,"heading":90.0,"timestamp":"2025-03-01T07:15:00Z","driver_id":"driver1","route_id":"R1","status":"active"}
        "#);
    }

    #[rstest]
    fn connected_and_shutdown_frames() {
        let connected = BusEvent::Connected {
            client_id: "client-1".into(),
        };
        insta::assert_snapshot!(connected.to_sse_frame().expect("encodes").trim_end(), @r#"
        event: connected
        data: {"message":"Connected to GPS stream","client_id":"client-1"}
        "#);
        assert_eq!(
            BusEvent::Shutdown.to_ws_text().expect("encodes"),
            r#"{"event":"shutdown","data":{"message":"Server shutting down"}}"#
        );
    }

    #[rstest]
    #[case(viewer("manager1", Role::Manager), true)]
    #[case(viewer("driver1", Role::Driver), true)]
    #[case(viewer("driver2", Role::Driver), false)]
    fn gps_updates_follow_role_filter(
        position: Position,
        #[case] who: AuthUser,
        #[case] visible: bool,
    ) {
        assert_eq!(BusEvent::GpsUpdate(position).is_visible_to(&who), visible);
    }

    #[rstest]
    fn heartbeat_carries_rfc3339_timestamp() {
        let timestamp = Utc
            .with_ymd_and_hms(2025, 3, 1, 7, 15, 0)
            .single()
            .expect("valid time");
        let json = BusEvent::Heartbeat { timestamp }
            .data_json()
            .expect("encodes");
        assert_eq!(json, r#"{"timestamp":"2025-03-01T07:15:00Z"}"#);
    }
}

//! Deviation predicates over a session and its latest position.
//!
//! Evaluation mutates the session in memory and reports what changed; the
//! caller persists and broadcasts the changes.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use super::session::{RouteSession, SessionStatus};
use crate::domain::deviation::{
    PLANNED_STOP_TOLERANCE_M, STOPPED_SPEED, WRONG_DIRECTION_DEG, WRONG_DIRECTION_MIN_SPEED,
};
use crate::domain::geo::heading_delta_deg;
use crate::domain::{Deviation, DeviationType, GeoPoint, MonitorSettings, Position, Severity};

/// A transition produced by one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviationChange {
    /// First detection; the deviation is now open in the session.
    Opened(Deviation),
    /// An open deviation was refreshed. `escalated` is set when its severity
    /// crossed from medium or below to high or above.
    Updated { deviation: Deviation, escalated: bool },
    /// The predicate cleared and the deviation was closed automatically.
    Resolved(Deviation),
    /// A point-in-time deviation recorded already resolved.
    Recorded(Deviation),
}

impl DeviationChange {
    pub fn deviation(&self) -> &Deviation {
        match self {
            Self::Opened(d) | Self::Resolved(d) | Self::Recorded(d) => d,
            Self::Updated { deviation, .. } => deviation,
        }
    }

    pub fn deviation_mut(&mut self) -> &mut Deviation {
        match self {
            Self::Opened(d) | Self::Resolved(d) | Self::Recorded(d) => d,
            Self::Updated { deviation, .. } => deviation,
        }
    }

    /// Whether the change should be broadcast and, when alerting, notified.
    pub fn is_announcement(&self) -> bool {
        match self {
            Self::Opened(_) | Self::Recorded(_) => true,
            Self::Updated { escalated, .. } => *escalated,
            Self::Resolved(_) => false,
        }
    }
}

struct Observation {
    kind: DeviationType,
    severity: Severity,
    expected: Option<GeoPoint>,
    distance_m: f64,
    description: String,
    metadata: Map<String, Value>,
}

/// Run every predicate for `position` against `session`.
///
/// Samples older than the last evaluated one are ignored. A sample with the
/// same timestamp refreshes open deviations but does not move stop progress.
pub fn evaluate(
    session: &mut RouteSession,
    position: &Position,
    settings: &MonitorSettings,
    now: DateTime<Utc>,
) -> Vec<DeviationChange> {
    let advances = match &session.last_position {
        Some(last) if position.timestamp < last.timestamp => return Vec::new(),
        Some(last) => position.timestamp > last.timestamp,
        None => true,
    };
    let point = position.point();
    let Some((nearest, d_nearest)) = session
        .plan
        .nearest(&point)
        .map(|(stop, d)| (stop.clone(), d))
    else {
        return Vec::new();
    };
    let stopped = position.speed <= STOPPED_SPEED;
    let mut changes = Vec::new();

    if d_nearest > settings.deviation_radius_m {
        let observation = Observation {
            kind: DeviationType::OffRoute,
            severity: Severity::from_distance(d_nearest),
            expected: Some(nearest.location),
            distance_m: d_nearest,
            description: format!("Vehicle is {d_nearest:.0} meters off the planned route"),
            metadata: object(json!({ "nearest_stop": nearest.stop_number })),
        };
        observe(session, observation, point, now, &mut changes);
    } else {
        resolve(session, DeviationType::OffRoute, now, &mut changes);
    }

    if stopped && d_nearest > PLANNED_STOP_TOLERANCE_M {
        let observation = Observation {
            kind: DeviationType::StoppedTooLong,
            severity: stopped_severity(session, settings, now),
            expected: Some(nearest.location),
            distance_m: d_nearest,
            description: "Vehicle stopped at unauthorized location".to_owned(),
            metadata: object(json!({ "speed": position.speed })),
        };
        observe(session, observation, point, now, &mut changes);
    } else if !stopped {
        resolve(session, DeviationType::StoppedTooLong, now, &mut changes);
    }

    if stopped && d_nearest > nearest.stop_radius_m {
        let observation = Observation {
            kind: DeviationType::UnauthorizedStop,
            severity: Severity::Medium,
            expected: Some(nearest.location),
            distance_m: d_nearest,
            description: format!(
                "Unauthorized stop {d_nearest:.0} meters from nearest planned stop"
            ),
            metadata: object(json!({ "nearest_stop": nearest.stop_number })),
        };
        observe(session, observation, point, now, &mut changes);
    } else {
        resolve(session, DeviationType::UnauthorizedStop, now, &mut changes);
    }

    // Without a heading the predicate is left untouched; without a next stop
    // there is no course to be off.
    if let Some(heading) = position.usable_heading() {
        let Some(next) = session.next_stop().cloned() else {
            resolve(session, DeviationType::WrongDirection, now, &mut changes);
            return finish(session, position, advances, stopped, &point, now, changes);
        };
        let expected_bearing = point.bearing_to(&next.location);
        let delta = heading_delta_deg(heading, expected_bearing);
        if position.speed > WRONG_DIRECTION_MIN_SPEED && delta > WRONG_DIRECTION_DEG {
            let observation = Observation {
                kind: DeviationType::WrongDirection,
                severity: Severity::Medium,
                expected: Some(next.location),
                distance_m: next.distance_from(&point),
                description: format!("Vehicle heading wrong direction ({delta:.0}° off course)"),
                metadata: object(json!({
                    "heading": heading,
                    "expected_bearing": expected_bearing,
                    "heading_diff": delta,
                })),
            };
            observe(session, observation, point, now, &mut changes);
        } else {
            resolve(session, DeviationType::WrongDirection, now, &mut changes);
        }
    }

    finish(session, position, advances, stopped, &point, now, changes)
}

fn finish(
    session: &mut RouteSession,
    position: &Position,
    advances: bool,
    stopped: bool,
    point: &GeoPoint,
    now: DateTime<Utc>,
    mut changes: Vec<DeviationChange>,
) -> Vec<DeviationChange> {
    if advances {
        check_skipped_stop(session, point, now, &mut changes);
        check_stop_completion(session, point);
        session.last_position = Some(position.clone());
    }
    session.last_update = Some(now);
    session.status = derive_status(session, stopped);
    changes
}

/// Time-based escalation of an open `stopped_too_long` deviation.
pub fn escalate_stopped(
    session: &mut RouteSession,
    settings: &MonitorSettings,
    now: DateTime<Utc>,
) -> Option<DeviationChange> {
    let severity = stopped_severity(session, settings, now);
    let deviation = session.open.get_mut(&DeviationType::StoppedTooLong)?;
    if severity <= deviation.severity {
        return None;
    }
    let escalated = deviation.severity <= Severity::Medium && severity >= Severity::High;
    deviation.severity = severity;
    deviation.duration_ms = deviation.elapsed_ms(now);
    Some(DeviationChange::Updated {
        deviation: deviation.clone(),
        escalated,
    })
}

fn stopped_severity(
    session: &RouteSession,
    settings: &MonitorSettings,
    now: DateTime<Utc>,
) -> Severity {
    let threshold_ms = i64::try_from(settings.stop_duration.as_millis()).unwrap_or(i64::MAX);
    match session.open.get(&DeviationType::StoppedTooLong) {
        Some(open) if open.elapsed_ms(now) > threshold_ms => open.severity.max(Severity::High),
        Some(open) => open.severity,
        None => Severity::Low,
    }
}

fn observe(
    session: &mut RouteSession,
    observation: Observation,
    location: GeoPoint,
    now: DateTime<Utc>,
    changes: &mut Vec<DeviationChange>,
) {
    match session.open.get_mut(&observation.kind) {
        Some(open) => {
            let escalated =
                open.severity <= Severity::Medium && observation.severity >= Severity::High;
            open.severity = observation.severity;
            open.location = location;
            open.expected_location = observation.expected;
            open.distance_m = observation.distance_m;
            open.description = observation.description;
            open.metadata = observation.metadata;
            open.duration_ms = open.elapsed_ms(now);
            changes.push(DeviationChange::Updated {
                deviation: open.clone(),
                escalated,
            });
        }
        None => {
            let deviation = new_deviation(session, observation, location, now);
            session.open.insert(deviation.deviation_type, deviation.clone());
            changes.push(DeviationChange::Opened(deviation));
        }
    }
}

fn resolve(
    session: &mut RouteSession,
    kind: DeviationType,
    now: DateTime<Utc>,
    changes: &mut Vec<DeviationChange>,
) {
    if let Some(mut deviation) = session.open.remove(&kind) {
        deviation.duration_ms = deviation.elapsed_ms(now);
        deviation.resolve(now, true);
        changes.push(DeviationChange::Resolved(deviation));
    }
}

fn check_skipped_stop(
    session: &mut RouteSession,
    point: &GeoPoint,
    now: DateTime<Utc>,
    changes: &mut Vec<DeviationChange>,
) {
    let (Some(current), Some(next)) = (session.current_stop().cloned(), session.next_stop())
    else {
        return;
    };
    if session.completed.contains(&current.stop_number) {
        return;
    }
    let to_current = current.distance_from(point);
    if next.distance_from(point) >= to_current {
        return;
    }
    let observation = Observation {
        kind: DeviationType::SkippedStop,
        severity: Severity::High,
        expected: Some(current.location),
        distance_m: to_current,
        description: format!("Skipped stop: {}", current.name),
        metadata: object(json!({
            "stop_number": current.stop_number,
            "stop_name": current.name,
        })),
    };
    let mut deviation = new_deviation(session, observation, *point, now);
    deviation.resolve(now, false);
    session.current_index += 1;
    changes.push(DeviationChange::Recorded(deviation));
}

fn check_stop_completion(session: &mut RouteSession, point: &GeoPoint) {
    let Some(current) = session.current_stop() else {
        return;
    };
    if current.distance_from(point) > current.stop_radius_m {
        return;
    }
    let stop_number = current.stop_number;
    session.completed.insert(stop_number);
    if session.current_index + 1 < session.plan.len() {
        session.current_index += 1;
    }
}

pub(super) fn derive_status(session: &RouteSession, stopped: bool) -> SessionStatus {
    if session.all_stops_completed() {
        SessionStatus::Completed
    } else if !session.open.is_empty() {
        SessionStatus::Deviated
    } else if stopped {
        SessionStatus::Stopped
    } else {
        SessionStatus::OnRoute
    }
}

fn new_deviation(
    session: &RouteSession,
    observation: Observation,
    location: GeoPoint,
    now: DateTime<Utc>,
) -> Deviation {
    Deviation {
        id: None,
        vehicle_id: session.vehicle_id.clone(),
        route_id: session.route_id.clone(),
        driver_id: session.driver_id.clone(),
        deviation_type: observation.kind,
        severity: observation.severity,
        location,
        expected_location: observation.expected,
        distance_m: observation.distance_m,
        duration_ms: 0,
        description: observation.description,
        metadata: observation.metadata,
        auto_resolved: false,
        created_at: now,
        resolved_at: None,
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

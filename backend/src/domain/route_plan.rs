//! Planned stop lists for monitored routes.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::Error;
use super::geo::GeoPoint;
use super::ids::RouteId;

/// Default dwell time at a stop, in seconds.
pub const DEFAULT_STOP_DURATION_S: i32 = 60;
/// Default arrival radius around a stop, in meters.
pub const DEFAULT_STOP_RADIUS_M: f64 = 50.0;

/// A planned stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub stop_number: i32,
    pub name: String,
    pub location: GeoPoint,
    /// Local wall-clock time, `HH:MM`.
    pub planned_arrival: Option<String>,
    /// Local wall-clock time, `HH:MM`.
    pub planned_departure: Option<String>,
    pub stop_duration_s: i32,
    pub stop_radius_m: f64,
}

impl Stop {
    /// Stop with default dwell time and radius.
    pub fn new(stop_number: i32, name: impl Into<String>, location: GeoPoint) -> Self {
        Self {
            stop_number,
            name: name.into(),
            location,
            planned_arrival: None,
            planned_departure: None,
            stop_duration_s: DEFAULT_STOP_DURATION_S,
            stop_radius_m: DEFAULT_STOP_RADIUS_M,
        }
    }

    pub fn with_radius(mut self, stop_radius_m: f64) -> Self {
        self.stop_radius_m = stop_radius_m;
        self
    }

    pub fn distance_from(&self, point: &GeoPoint) -> f64 {
        point.distance_to(&self.location)
    }
}

/// Ordered, validated stop list for a route.
///
/// ## Invariants
/// - At least one stop.
/// - Stops are sorted by `stop_number` and the numbers are unique.
/// - Every location is a valid WGS84 coordinate and every radius is positive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutePlan {
    route_id: RouteId,
    stops: Vec<Stop>,
}

impl RoutePlan {
    /// Validate and sort `stops` into a plan.
    ///
    /// # Examples
    /// ```
    /// use busfleet::domain::{GeoPoint, RouteId, RoutePlan, Stop};
    ///
    /// let route = RouteId::new("R1").expect("valid id");
    /// let plan = RoutePlan::new(
    ///     route,
    ///     vec![
    ///         Stop::new(2, "School", GeoPoint::new(40.01, -74.0)),
    ///         Stop::new(1, "Depot", GeoPoint::new(40.0, -74.0)),
    ///     ],
    /// )
    /// .expect("valid plan");
    /// assert_eq!(plan.stops()[0].name, "Depot");
    /// ```
    pub fn new(route_id: RouteId, mut stops: Vec<Stop>) -> Result<Self, Error> {
        if stops.is_empty() {
            return Err(Error::invalid_request(format!(
                "route plan for {route_id} has no stops"
            )));
        }
        let mut seen = HashSet::new();
        for stop in &stops {
            if !seen.insert(stop.stop_number) {
                return Err(Error::invalid_request(format!(
                    "duplicate stop number {}",
                    stop.stop_number
                )));
            }
            if !stop.location.is_valid() {
                return Err(Error::invalid_request(format!(
                    "stop {} has invalid coordinates",
                    stop.stop_number
                )));
            }
            if !stop.stop_radius_m.is_finite() || stop.stop_radius_m <= 0.0 {
                return Err(Error::invalid_request(format!(
                    "stop {} radius must be positive",
                    stop.stop_number
                )));
            }
            if stop.stop_duration_s < 0 {
                return Err(Error::invalid_request(format!(
                    "stop {} duration must not be negative",
                    stop.stop_number
                )));
            }
            for time in [&stop.planned_arrival, &stop.planned_departure]
                .into_iter()
                .flatten()
            {
                if chrono::NaiveTime::parse_from_str(time, "%H:%M").is_err() {
                    return Err(Error::invalid_request(format!(
                        "stop {} time {time} is not HH:MM",
                        stop.stop_number
                    )));
                }
            }
        }
        stops.sort_by_key(|stop| stop.stop_number);
        Ok(Self { route_id, stops })
    }

    pub fn route_id(&self) -> &RouteId {
        &self.route_id
    }

    pub fn stops(&self) -> &[Stop] {
        &self.stops
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Stop> {
        self.stops.get(index)
    }

    /// The closest stop and its distance; ties go to the lowest stop number.
    pub fn nearest(&self, point: &GeoPoint) -> Option<(&Stop, f64)> {
        let mut best: Option<(&Stop, f64)> = None;
        for stop in &self.stops {
            let d = stop.distance_from(point);
            match best {
                // Stops are sorted, so a strict comparison keeps the lower number on ties.
                Some((_, best_d)) if d >= best_d => {}
                _ => best = Some((stop, d)),
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorCode;
    use rstest::{fixture, rstest};

    #[fixture]
    fn route() -> RouteId {
        RouteId::new("R1").expect("valid id")
    }

    #[rstest]
    fn empty_plans_are_rejected(route: RouteId) {
        let err = RoutePlan::new(route, Vec::new()).expect_err("empty plan");
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
    }

    #[rstest]
    fn duplicate_stop_numbers_are_rejected(route: RouteId) {
        let stops = vec![
            Stop::new(1, "A", GeoPoint::new(40.0, -74.0)),
            Stop::new(1, "B", GeoPoint::new(40.1, -74.0)),
        ];
        assert!(RoutePlan::new(route, stops).is_err());
    }

    #[rstest]
    #[case(Stop::new(1, "A", GeoPoint::new(95.0, 0.0)))]
    #[case(Stop::new(1, "A", GeoPoint::new(40.0, -74.0)).with_radius(0.0))]
    fn invalid_stops_are_rejected(route: RouteId, #[case] stop: Stop) {
        assert!(RoutePlan::new(route, vec![stop]).is_err());
    }

    #[rstest]
    fn malformed_times_are_rejected(route: RouteId) {
        let mut stop = Stop::new(1, "A", GeoPoint::new(40.0, -74.0));
        stop.planned_arrival = Some("7am".into());
        assert!(RoutePlan::new(route, vec![stop]).is_err());
    }

    #[rstest]
    fn stops_are_sorted(route: RouteId) {
        let plan = RoutePlan::new(
            route,
            vec![
                Stop::new(3, "C", GeoPoint::new(40.2, -74.0)),
                Stop::new(1, "A", GeoPoint::new(40.0, -74.0)),
                Stop::new(2, "B", GeoPoint::new(40.1, -74.0)),
            ],
        )
        .expect("valid plan");
        let numbers: Vec<_> = plan.stops().iter().map(|s| s.stop_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[rstest]
    fn nearest_breaks_ties_by_lowest_stop_number(route: RouteId) {
        let plan = RoutePlan::new(
            route,
            vec![
                Stop::new(2, "Second bay", GeoPoint::new(40.01, -74.0)),
                Stop::new(1, "First bay", GeoPoint::new(40.01, -74.0)),
            ],
        )
        .expect("valid plan");
        let (stop, _) = plan
            .nearest(&GeoPoint::new(40.0, -74.0))
            .expect("plan has stops");
        assert_eq!(stop.stop_number, 1);
    }
}

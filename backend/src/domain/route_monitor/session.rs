//! Per-vehicle monitoring state.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{
    Deviation, DeviationType, Position, RouteId, RoutePlan, Stop, UserId, VehicleId,
};

/// Coarse state shown on the monitoring dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    OnRoute,
    Deviated,
    Stopped,
    Completed,
}

/// Live state of one monitored vehicle.
///
/// `completed` only grows and `current_index` never decreases for the life of
/// the session.
#[derive(Debug, Clone)]
pub struct RouteSession {
    pub(super) vehicle_id: VehicleId,
    pub(super) route_id: RouteId,
    pub(super) driver_id: UserId,
    pub(super) plan: RoutePlan,
    pub(super) completed: BTreeSet<i32>,
    pub(super) current_index: usize,
    pub(super) start_time: DateTime<Utc>,
    pub(super) last_update: Option<DateTime<Utc>>,
    pub(super) last_position: Option<Position>,
    pub(super) status: SessionStatus,
    pub(super) open: BTreeMap<DeviationType, Deviation>,
}

impl RouteSession {
    pub fn new(
        vehicle_id: VehicleId,
        driver_id: UserId,
        plan: RoutePlan,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            vehicle_id,
            route_id: plan.route_id().clone(),
            driver_id,
            plan,
            completed: BTreeSet::new(),
            current_index: 0,
            start_time,
            last_update: None,
            last_position: None,
            status: SessionStatus::OnRoute,
            open: BTreeMap::new(),
        }
    }

    pub fn vehicle_id(&self) -> &VehicleId {
        &self.vehicle_id
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_completed(&self, stop_number: i32) -> bool {
        self.completed.contains(&stop_number)
    }

    pub fn open_deviation(&self, kind: DeviationType) -> Option<&Deviation> {
        self.open.get(&kind)
    }

    pub(super) fn current_stop(&self) -> Option<&Stop> {
        self.plan.get(self.current_index)
    }

    pub(super) fn next_stop(&self) -> Option<&Stop> {
        self.plan.get(self.current_index + 1)
    }

    pub(super) fn all_stops_completed(&self) -> bool {
        self.plan
            .stops()
            .last()
            .is_some_and(|last| self.completed.contains(&last.stop_number))
    }

    /// Recompute `status` after deviations changed outside an evaluation.
    pub(super) fn refresh_status(&mut self) {
        let stopped = self
            .last_position
            .as_ref()
            .is_some_and(|p| p.speed <= crate::domain::deviation::STOPPED_SPEED);
        self.status = super::evaluator::derive_status(self, stopped);
    }

    /// Serializable view for listings.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            vehicle_id: self.vehicle_id.clone(),
            route_id: self.route_id.clone(),
            driver_id: self.driver_id.clone(),
            status: self.status,
            start_time: self.start_time,
            last_update: self.last_update,
            completed_stops: self.completed.len(),
            total_stops: self.plan.len(),
            current_index: self.current_index,
            deviations: self.open.values().cloned().collect(),
        }
    }
}

/// Snapshot of a session returned by the monitoring endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub vehicle_id: VehicleId,
    pub route_id: RouteId,
    pub driver_id: UserId,
    pub status: SessionStatus,
    pub start_time: DateTime<Utc>,
    pub last_update: Option<DateTime<Utc>>,
    pub completed_stops: usize,
    pub total_stops: usize,
    pub current_index: usize,
    pub deviations: Vec<Deviation>,
}

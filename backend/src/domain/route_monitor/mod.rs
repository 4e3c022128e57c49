//! Route deviation monitoring.
//!
//! [`RouteMonitor`] owns one [`RouteSession`] per monitored vehicle. Each
//! scheduler tick fetches the vehicle's latest position, runs the deviation
//! predicates and persists, broadcasts and alerts on the resulting changes.

mod evaluator;
mod scheduler;
mod session;

pub use evaluator::{DeviationChange, evaluate, escalate_stopped};
pub use scheduler::run_scheduler;
pub use session::{RouteSession, SessionStatus, SessionSummary};

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use futures_util::future::join_all;
use mockable::Clock;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::fanout::{BusEvent, FanoutBus};
use crate::domain::ports::{DeviationRepository, PositionRepository, RoutePlanRepository};
use crate::domain::{
    Deviation, DeviationId, DeviationStats, Error, MonitorSettings, Position, RouteId, RoutePlan,
    Stop, UserId, VehicleId,
};

/// Default look-back for the latest-position fetch.
pub const DEFAULT_POSITION_WINDOW: Duration = Duration::from_secs(300);
/// Default deadline for the latest-position fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_millis(2_000);
/// Default and maximum look-back for deviation history, in hours.
pub const DEFAULT_HISTORY_HOURS: u32 = 24;
pub const MAX_HISTORY_HOURS: u32 = 720;

/// Receiver of alerting deviations (severity high or critical).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviationAlerts: Send + Sync {
    async fn deviation_alert(&self, deviation: &Deviation);
}

/// Alert sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentDeviationAlerts;

#[async_trait]
impl DeviationAlerts for SilentDeviationAlerts {
    async fn deviation_alert(&self, _deviation: &Deviation) {}
}

/// Storage ports used by the monitor.
#[derive(Clone)]
pub struct RouteMonitorPorts {
    pub plans: Arc<dyn RoutePlanRepository>,
    pub deviations: Arc<dyn DeviationRepository>,
    pub positions: Arc<dyn PositionRepository>,
}

/// Timing knobs that are fixed for the life of the process.
#[derive(Debug, Clone, Copy)]
pub struct RouteMonitorTiming {
    pub position_window: Duration,
    pub fetch_timeout: Duration,
}

impl Default for RouteMonitorTiming {
    fn default() -> Self {
        Self {
            position_window: DEFAULT_POSITION_WINDOW,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

type SessionCell = Arc<Mutex<RouteSession>>;

/// Registry of live route sessions.
pub struct RouteMonitor {
    ports: RouteMonitorPorts,
    bus: Arc<FanoutBus>,
    alerts: Arc<dyn DeviationAlerts>,
    clock: Arc<dyn Clock>,
    timing: RouteMonitorTiming,
    settings: RwLock<MonitorSettings>,
    sessions: RwLock<HashMap<VehicleId, SessionCell>>,
}

impl RouteMonitor {
    pub fn new(
        ports: RouteMonitorPorts,
        bus: Arc<FanoutBus>,
        alerts: Arc<dyn DeviationAlerts>,
        clock: Arc<dyn Clock>,
        settings: MonitorSettings,
        timing: RouteMonitorTiming,
    ) -> Self {
        Self {
            ports,
            bus,
            alerts,
            clock,
            timing,
            settings: RwLock::new(settings),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Begin monitoring `vehicle_id` on `route_id`.
    ///
    /// # Errors
    /// `not_found` for an unknown route, `invalid_request` for a route without
    /// stops and `conflict` when the vehicle is already monitored.
    pub async fn start(
        &self,
        vehicle_id: VehicleId,
        route_id: RouteId,
        driver_id: UserId,
    ) -> Result<SessionSummary, Error> {
        if self.cell(&vehicle_id).is_some() {
            return Err(already_monitored(&vehicle_id));
        }
        let stops = self
            .ports
            .plans
            .find(&route_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("route {route_id} has no plan")))?;
        let plan = RoutePlan::new(route_id, stops)?;
        let session = RouteSession::new(vehicle_id.clone(), driver_id, plan, self.clock.utc());
        let summary = session.summary();

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if sessions.contains_key(&vehicle_id) {
            return Err(already_monitored(&vehicle_id));
        }
        sessions.insert(vehicle_id.clone(), Arc::new(Mutex::new(session)));
        info!(
            vehicle_id = %vehicle_id,
            route_id = %summary.route_id,
            driver_id = %summary.driver_id,
            "route monitoring started"
        );
        Ok(summary)
    }

    /// Stop monitoring `vehicle_id`, auto-resolving its open deviations.
    ///
    /// Returns `false` when the vehicle was not monitored.
    pub async fn stop(&self, vehicle_id: &VehicleId) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(vehicle_id);
        let Some(cell) = removed else {
            return false;
        };
        let mut session = cell.lock().await;
        let now = self.clock.utc();
        let open: Vec<Deviation> = std::mem::take(&mut session.open).into_values().collect();
        for mut deviation in open {
            deviation.duration_ms = deviation.elapsed_ms(now);
            deviation.resolve(now, true);
            self.persist_update(&deviation).await;
        }
        info!(vehicle_id = %vehicle_id, "route monitoring stopped");
        true
    }

    pub fn is_monitored(&self, vehicle_id: &VehicleId) -> bool {
        self.cell(vehicle_id).is_some()
    }

    /// Summaries of every live session, ordered by vehicle id.
    pub async fn active(&self) -> Vec<SessionSummary> {
        let mut summaries = Vec::new();
        for cell in self.snapshot() {
            summaries.push(cell.lock().await.summary());
        }
        summaries.sort_by(|a, b| a.vehicle_id.cmp(&b.vehicle_id));
        summaries
    }

    pub fn settings(&self) -> MonitorSettings {
        *self.settings.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the runtime thresholds; the next tick picks them up.
    pub fn update_settings(&self, settings: MonitorSettings) {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
        info!(
            deviation_radius_m = settings.deviation_radius_m,
            stop_duration_s = settings.stop_duration.as_secs(),
            check_interval_s = settings.check_interval.as_secs(),
            "route monitor settings updated"
        );
    }

    /// Evaluate every monitored vehicle once.
    ///
    /// Vehicles run concurrently; a vehicle whose previous evaluation is still
    /// running is skipped.
    pub async fn tick(&self) {
        let cells = self.snapshot();
        join_all(cells.into_iter().map(|cell| self.tick_vehicle(cell))).await;
    }

    async fn tick_vehicle(&self, cell: SessionCell) {
        let Ok(mut session) = cell.try_lock() else {
            debug!("skipping vehicle with evaluation in progress");
            return;
        };
        let vehicle_id = session.vehicle_id().clone();
        let now = self.clock.utc();
        let since = TimeDelta::from_std(self.timing.position_window)
            .ok()
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let fetch = self.ports.positions.latest_since(&vehicle_id, since);
        match tokio::time::timeout(self.timing.fetch_timeout, fetch).await {
            Ok(Ok(Some(position))) => self.apply_position(&mut session, &position).await,
            Ok(Ok(None)) => {}
            Ok(Err(error)) => {
                warn!(vehicle_id = %vehicle_id, error = %error, "latest position fetch failed");
            }
            Err(_) => warn!(vehicle_id = %vehicle_id, "latest position fetch timed out"),
        }
        let now = self.clock.utc();
        if let Some(change) = escalate_stopped(&mut session, &self.settings(), now) {
            self.record_changes(&mut session, vec![change]).await;
        }
    }

    /// Evaluate one position immediately against the vehicle's session.
    ///
    /// Positions for unmonitored vehicles are ignored.
    pub async fn observe(&self, position: &Position) {
        let Some(cell) = self.cell(&position.vehicle_id) else {
            return;
        };
        let mut session = cell.lock().await;
        self.apply_position(&mut session, position).await;
    }

    async fn apply_position(&self, session: &mut RouteSession, position: &Position) {
        let changes = evaluate(session, position, &self.settings(), self.clock.utc());
        self.record_changes(session, changes).await;
    }

    async fn record_changes(&self, session: &mut RouteSession, changes: Vec<DeviationChange>) {
        for mut change in changes {
            match change {
                DeviationChange::Opened(_) | DeviationChange::Recorded(_) => {
                    match self.ports.deviations.insert(change.deviation()).await {
                        Ok(id) => {
                            change.deviation_mut().id = Some(id);
                            if matches!(change, DeviationChange::Opened(_)) {
                                let kind = change.deviation().deviation_type;
                                if let Some(live) = session.open.get_mut(&kind) {
                                    live.id = Some(id);
                                }
                            }
                        }
                        Err(error) => warn!(
                            vehicle_id = %change.deviation().vehicle_id,
                            error = %error,
                            "failed to persist deviation"
                        ),
                    }
                    let d = change.deviation();
                    info!(
                        vehicle_id = %d.vehicle_id,
                        deviation_type = %d.deviation_type,
                        severity = %d.severity,
                        "deviation detected"
                    );
                }
                DeviationChange::Updated { .. } | DeviationChange::Resolved(_) => {
                    self.persist_update(change.deviation()).await;
                }
            }
            if change.is_announcement() {
                self.announce(change.deviation()).await;
            }
        }
    }

    async fn announce(&self, deviation: &Deviation) {
        self.bus
            .publish(&BusEvent::Deviation(Box::new(deviation.clone())));
        if deviation.severity.is_alerting() {
            self.alerts.deviation_alert(deviation).await;
        }
    }

    async fn persist_update(&self, deviation: &Deviation) {
        if deviation.id.is_none() {
            debug!(vehicle_id = %deviation.vehicle_id, "skipping update of unpersisted deviation");
            return;
        }
        if let Err(error) = self.ports.deviations.update(deviation).await {
            warn!(
                vehicle_id = %deviation.vehicle_id,
                error = %error,
                "failed to update deviation"
            );
        }
    }

    /// Manually resolve a deviation, clearing it from its live session.
    pub async fn resolve(&self, id: DeviationId) -> Result<Deviation, Error> {
        let now = self.clock.utc();
        let mut deviation = match self.take_live(id).await {
            Some(live) => live,
            None => self
                .ports
                .deviations
                .find(id)
                .await?
                .ok_or_else(|| Error::not_found(format!("deviation {id} not found")))?,
        };
        if deviation.is_open() {
            deviation.duration_ms = deviation.elapsed_ms(now);
            deviation.resolve(now, false);
            self.ports.deviations.update(&deviation).await?;
            info!(deviation_id = id, vehicle_id = %deviation.vehicle_id, "deviation resolved manually");
        }
        Ok(deviation)
    }

    async fn take_live(&self, id: DeviationId) -> Option<Deviation> {
        for cell in self.snapshot() {
            let mut session = cell.lock().await;
            let kind = session
                .open
                .iter()
                .find(|(_, d)| d.id == Some(id))
                .map(|(kind, _)| *kind);
            if let Some(kind) = kind {
                let taken = session.open.remove(&kind);
                session.refresh_status();
                return taken;
            }
        }
        None
    }

    /// Deviations for `vehicle_id` over the last `hours`, newest first.
    pub async fn history(&self, vehicle_id: &VehicleId, hours: u32) -> Result<Vec<Deviation>, Error> {
        if hours == 0 || hours > MAX_HISTORY_HOURS {
            return Err(Error::invalid_request(format!(
                "hours must be between 1 and {MAX_HISTORY_HOURS}"
            ))
            .with_details(json!({ "field": "hours" })));
        }
        let since = self.clock.utc() - TimeDelta::hours(i64::from(hours));
        Ok(self.ports.deviations.history(vehicle_id, since).await?)
    }

    pub async fn stats(&self) -> Result<DeviationStats, Error> {
        Ok(self.ports.deviations.stats(self.clock.utc()).await?)
    }

    /// Stops of `route_id`; `not_found` when the route has no plan.
    pub async fn plan(&self, route_id: &RouteId) -> Result<Vec<Stop>, Error> {
        self.ports
            .plans
            .find(route_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("route {route_id} has no plan")))
    }

    /// Validate and store a replacement plan. Running sessions keep the plan
    /// they started with.
    pub async fn replace_plan(&self, route_id: RouteId, stops: Vec<Stop>) -> Result<RoutePlan, Error> {
        let plan = RoutePlan::new(route_id, stops)?;
        self.ports.plans.replace(&plan).await?;
        info!(route_id = %plan.route_id(), stops = plan.len(), "route plan replaced");
        Ok(plan)
    }

    fn cell(&self, vehicle_id: &VehicleId) -> Option<SessionCell> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(vehicle_id)
            .cloned()
    }

    fn snapshot(&self) -> Vec<SessionCell> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

fn already_monitored(vehicle_id: &VehicleId) -> Error {
    Error::conflict(format!("vehicle {vehicle_id} is already monitored"))
        .with_details(json!({ "reason": "already_monitored" }))
}

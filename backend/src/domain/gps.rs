//! GPS ingest, lookups and the tracking feature flag.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::fanout::{BusEvent, FanoutBus};
use super::ports::{
    FleetRepository, GPS_ENABLED_KEY, PositionRepository, SystemSettingsRepository,
};
use super::{AuthUser, Error, Position, PositionDraft, SpeedUnit, VehicleId};

/// Look-back for the fleet overview, in minutes.
pub const FLEET_SNAPSHOT_MINUTES: i64 = 30;
/// Default history window when the caller gives no start, in minutes.
pub const DEFAULT_HISTORY_MINUTES: i64 = 60;
/// Longest history window served in one request, in days.
pub const MAX_HISTORY_DAYS: i64 = 7;

const RETENTION_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Storage and fan-out collaborators of the GPS service.
#[derive(Clone)]
pub struct GpsPorts {
    pub positions: Arc<dyn PositionRepository>,
    pub fleet: Arc<dyn FleetRepository>,
    pub settings: Arc<dyn SystemSettingsRepository>,
}

/// Entry point for position samples and location queries.
pub struct GpsService {
    ports: GpsPorts,
    bus: Arc<FanoutBus>,
    clock: Arc<dyn Clock>,
    speed_unit: SpeedUnit,
    latest: RwLock<HashMap<VehicleId, Position>>,
}

impl GpsService {
    pub fn new(ports: GpsPorts, bus: Arc<FanoutBus>, clock: Arc<dyn Clock>) -> Self {
        Self {
            ports,
            bus,
            clock,
            speed_unit: SpeedUnit::default(),
            latest: RwLock::new(HashMap::new()),
        }
    }

    /// Declare the unit reported speeds are expressed in.
    #[must_use]
    pub fn with_speed_unit(mut self, speed_unit: SpeedUnit) -> Self {
        self.speed_unit = speed_unit;
        self
    }

    pub fn speed_unit(&self) -> SpeedUnit {
        self.speed_unit
    }

    /// Validate, store and broadcast a sample reported by `user`.
    ///
    /// Storage failures are logged and never stop the broadcast.
    ///
    /// # Errors
    /// `invalid_request` for a malformed sample and `unauthorized` when the
    /// vehicle is assigned to a different driver.
    pub async fn ingest(&self, user: &AuthUser, draft: PositionDraft) -> Result<Position, Error> {
        let position = draft.validate(user.user_id.clone(), self.clock.utc())?;
        match self.ports.fleet.assigned_driver(&position.vehicle_id).await {
            Ok(Some(assigned)) if assigned != user.user_id => {
                return Err(Error::unauthorized(format!(
                    "vehicle {} is assigned to another driver",
                    position.vehicle_id
                )));
            }
            Ok(_) => {}
            Err(error) => warn!(
                vehicle_id = %position.vehicle_id,
                error = %error,
                "vehicle assignment lookup failed"
            ),
        }

        if let Err(error) = self.ports.positions.append(&position).await {
            warn!(
                vehicle_id = %position.vehicle_id,
                error = %error,
                "failed to persist position"
            );
        }
        self.remember(&position);
        self.bus.publish(&BusEvent::GpsUpdate(position.clone()));
        Ok(position)
    }

    fn remember(&self, position: &Position) {
        let mut latest = self.latest.write().unwrap_or_else(PoisonError::into_inner);
        let newer = latest
            .get(&position.vehicle_id)
            .is_none_or(|known| position.timestamp >= known.timestamp);
        if newer {
            latest.insert(position.vehicle_id.clone(), position.clone());
        }
    }

    /// Most recent position of `vehicle_id`.
    pub async fn latest_location(&self, vehicle_id: &VehicleId) -> Result<Position, Error> {
        let cached = self
            .latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(vehicle_id)
            .cloned();
        if let Some(position) = cached {
            return Ok(position);
        }
        self.ports
            .positions
            .latest_for(vehicle_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("no location recorded for vehicle {vehicle_id}")))
    }

    /// Positions of `vehicle_id` between `start` and `end`, oldest first.
    ///
    /// `end` defaults to now and `start` to one hour before `end`.
    pub async fn history(
        &self,
        vehicle_id: &VehicleId,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Position>, Error> {
        let end = end.unwrap_or_else(|| self.clock.utc());
        let start = start.unwrap_or(end - TimeDelta::minutes(DEFAULT_HISTORY_MINUTES));
        if start > end {
            return Err(Error::invalid_request("start must not be after end")
                .with_details(json!({ "field": "start" })));
        }
        if end - start > TimeDelta::days(MAX_HISTORY_DAYS) {
            return Err(Error::invalid_request(format!(
                "history window must not exceed {MAX_HISTORY_DAYS} days"
            ))
            .with_details(json!({ "field": "end" })));
        }
        Ok(self.ports.positions.history(vehicle_id, start, end).await?)
    }

    /// Latest position of every vehicle reporting recently.
    ///
    /// Drivers only see samples they reported themselves.
    pub async fn fleet_snapshot(&self, viewer: &AuthUser) -> Result<Vec<Position>, Error> {
        let since = self.clock.utc() - TimeDelta::minutes(FLEET_SNAPSHOT_MINUTES);
        let mut positions = self.ports.positions.latest_per_vehicle(since).await?;
        if !viewer.is_manager() {
            positions.retain(|p| p.driver_id == viewer.user_id);
        }
        positions.sort_by(|a, b| a.vehicle_id.cmp(&b.vehicle_id));
        Ok(positions)
    }

    /// Whether live tracking is switched on. Absent settings mean enabled.
    pub async fn gps_enabled(&self) -> Result<bool, Error> {
        let raw = self
            .ports
            .settings
            .get(GPS_ENABLED_KEY)
            .await?;
        Ok(match raw.as_deref().map(str::trim) {
            None | Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            Some(other) => {
                warn!(value = other, "unrecognised gps_enabled setting; treating as enabled");
                true
            }
        })
    }

    pub async fn set_gps_enabled(&self, enabled: bool) -> Result<(), Error> {
        self.ports
            .settings
            .set(GPS_ENABLED_KEY, if enabled { "true" } else { "false" })
            .await?;
        info!(enabled, "gps tracking toggled");
        Ok(())
    }

    /// Refuse the live stream to managers while tracking is disabled.
    pub async fn ensure_stream_allowed(&self, viewer: &AuthUser) -> Result<(), Error> {
        if viewer.is_manager() && !self.gps_enabled().await? {
            return Err(Error::service_unavailable("GPS tracking is disabled"));
        }
        Ok(())
    }

    /// Delete samples older than `retention_days`.
    pub async fn purge_older_than(&self, retention_days: u32) -> Result<u64, Error> {
        let cutoff = self.clock.utc() - TimeDelta::days(i64::from(retention_days));
        let deleted = self.ports.positions.delete_before(cutoff).await?;
        info!(deleted, retention_days, "gps history purged");
        Ok(deleted)
    }
}

/// Purge old GPS history once a day until `cancel` fires.
pub async fn run_retention(service: Arc<GpsService>, retention_days: u32, cancel: CancellationToken) {
    loop {
        if let Err(error) = service.purge_older_than(retention_days).await {
            warn!(error = %error, "gps retention pass failed");
        }
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(RETENTION_INTERVAL) => {}
        }
    }
}

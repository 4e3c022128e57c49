//! Shared HTTP adapter state.
//!
//! HTTP handlers accept this state via `actix_web::web::Data` so they only
//! depend on domain services and remain testable without I/O.

use std::sync::Arc;
use std::time::Duration;

use mockable::Clock;

use crate::domain::notifications::{NotificationCenter, NotificationTriggers};
use crate::domain::{FanoutBus, GpsService, RouteMonitor};

/// Default interval between `heartbeat` events on an open stream.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// Default deadline for writing one frame to a stream client.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Timing of the long-lived stream endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    pub heartbeat_interval: Duration,
    pub write_timeout: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// Parameter object bundling the domain services behind the HTTP surface.
#[derive(Clone)]
pub struct HttpStateServices {
    pub monitor: Arc<RouteMonitor>,
    pub gps: Arc<GpsService>,
    pub notifications: Arc<NotificationCenter>,
    pub triggers: Arc<NotificationTriggers>,
    pub bus: Arc<FanoutBus>,
    pub clock: Arc<dyn Clock>,
}

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub monitor: Arc<RouteMonitor>,
    pub gps: Arc<GpsService>,
    pub notifications: Arc<NotificationCenter>,
    pub triggers: Arc<NotificationTriggers>,
    pub bus: Arc<FanoutBus>,
    pub clock: Arc<dyn Clock>,
    pub stream: StreamSettings,
}

impl HttpState {
    /// Construct state from the wired services and stream timing.
    pub fn new(services: HttpStateServices, stream: StreamSettings) -> Self {
        let HttpStateServices {
            monitor,
            gps,
            notifications,
            triggers,
            bus,
            clock,
        } = services;
        Self {
            monitor,
            gps,
            notifications,
            triggers,
            bus,
            clock,
            stream,
        }
    }
}

//! Periodic driver for [`RouteMonitor::tick`].

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::RouteMonitor;

/// Tick `monitor` until `cancel` fires.
///
/// The interval is re-read from the monitor's settings before every sleep so
/// runtime updates apply from the next tick.
pub async fn run_scheduler(monitor: Arc<RouteMonitor>, cancel: CancellationToken) {
    info!("route monitor scheduler started");
    loop {
        let interval = monitor.settings().check_interval;
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(interval) => monitor.tick().await,
        }
    }
    info!("route monitor scheduler stopped");
}

//! Long-running tasks spawned next to the HTTP server.

use std::sync::Arc;
use std::time::Duration;

use mockable::Clock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use busfleet::domain::gps::run_retention;
use busfleet::domain::notifications::{
    Dispatcher, NotificationQueue, NotificationScheduler, NotificationTriggers, QueueReceiver,
    WorkerPool, run_daily_triggers,
};
use busfleet::domain::route_monitor::run_scheduler;
use busfleet::domain::{FanoutBus, GpsService, RouteMonitor};
use busfleet::settings::FleetSettings;

/// Services the background tasks drive.
pub(crate) struct BackgroundServices {
    pub(crate) monitor: Arc<RouteMonitor>,
    pub(crate) gps: Arc<GpsService>,
    pub(crate) scheduler: Arc<NotificationScheduler>,
    pub(crate) triggers: Arc<NotificationTriggers>,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) receiver: QueueReceiver,
    pub(crate) queue: Arc<NotificationQueue>,
    pub(crate) bus: Arc<FanoutBus>,
    pub(crate) clock: Arc<dyn Clock>,
}

/// Handles of the running schedulers and notification workers.
pub struct BackgroundTasks {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    workers: WorkerPool,
    queue: Arc<NotificationQueue>,
    bus: Arc<FanoutBus>,
    drain_timeout: Duration,
}

impl BackgroundTasks {
    /// Spawn the route monitor, notification scheduler, GPS retention and
    /// daily trigger loops plus the worker pool.
    pub(crate) fn start(services: BackgroundServices, settings: &FleetSettings) -> Self {
        let BackgroundServices {
            monitor,
            gps,
            scheduler,
            triggers,
            dispatcher,
            receiver,
            queue,
            bus,
            clock,
        } = services;
        let cancel = CancellationToken::new();
        let tasks = vec![
            tokio::spawn(run_scheduler(monitor, cancel.clone())),
            tokio::spawn(scheduler.run(settings.scheduler_interval(), cancel.clone())),
            tokio::spawn(run_retention(
                gps,
                settings.gps_retention_days(),
                cancel.clone(),
            )),
            tokio::spawn(run_daily_triggers(triggers, clock, cancel.clone())),
        ];
        let worker_count = settings.nde_workers();
        let workers = WorkerPool::spawn(dispatcher, receiver, worker_count);
        info!(workers = worker_count, "background tasks started");
        Self {
            cancel,
            tasks,
            workers,
            queue,
            bus,
            drain_timeout: settings.drain_timeout(),
        }
    }

    /// Stop the schedulers, drain queued notifications and close the bus.
    ///
    /// Stream subscribers receive the terminal `shutdown` event last, after
    /// the workers had their chance to publish in-app deliveries.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(error) = task.await {
                warn!(error = %error, "background task ended abnormally");
            }
        }
        self.queue.close();
        self.workers.drain(self.drain_timeout).await;
        self.bus.close();
        info!("background tasks stopped");
    }

    #[cfg(test)]
    pub(crate) fn bus(&self) -> Arc<FanoutBus> {
        Arc::clone(&self.bus)
    }
}

//! Fully wired fleet core over in-memory storage and a hand-driven clock.

use std::sync::Arc;

use busfleet::domain::gps::GpsPorts;
use busfleet::domain::notifications::{
    Channel, ChannelTimeouts, Dispatcher, InAppChannel, NotificationCenter,
    NotificationCenterPorts, NotificationQueue, NotificationScheduler, NotificationTriggers,
    QueueReceiver, Recipient,
};
use busfleet::domain::ports::ChannelSender;
use busfleet::domain::route_monitor::{RouteMonitorPorts, RouteMonitorTiming};
use busfleet::domain::{
    AuthUser, FanoutBus, GeoPoint, GpsService, MonitorSettings, PositionDraft, Role, RouteId,
    RouteMonitor, Stop, UserId, VehicleId,
};
use busfleet::test_support::{
    InMemoryDeviationRepository, InMemoryFleetRepository, InMemoryInboxRepository,
    InMemoryNotificationRepository, InMemoryPositionRepository, InMemoryPreferencesRepository,
    InMemoryRecipientDirectory, InMemoryRoutePlanRepository, InMemorySystemSettingsRepository,
    MutableClock, RecordingChannelSender,
};
use chrono::{DateTime, TimeZone, Utc};

pub const VEHICLE: &str = "BUS-1";
pub const ROUTE: &str = "R-NORTH";
pub const DRIVER: &str = "driver1";
pub const MANAGER: &str = "manager1";

/// Monday morning, inside a school run.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 6, 8, 0, 0)
        .single()
        .expect("valid instant")
}

pub fn vehicle() -> VehicleId {
    VehicleId::new(VEHICLE).expect("valid vehicle id")
}

pub fn driver() -> AuthUser {
    AuthUser::new(UserId::new(DRIVER).expect("valid user id"), Role::Driver)
}

pub fn manager() -> AuthUser {
    AuthUser::new(UserId::new(MANAGER).expect("valid user id"), Role::Manager)
}

pub struct Fleet {
    pub clock: Arc<MutableClock>,
    pub plans: Arc<InMemoryRoutePlanRepository>,
    pub deviations: Arc<InMemoryDeviationRepository>,
    pub notifications: Arc<InMemoryNotificationRepository>,
    pub directory: Arc<InMemoryRecipientDirectory>,
    pub email: Arc<RecordingChannelSender>,
    pub bus: Arc<FanoutBus>,
    pub queue: Arc<NotificationQueue>,
    pub receiver: QueueReceiver,
    pub monitor: RouteMonitor,
    pub gps: GpsService,
    pub center: NotificationCenter,
    pub scheduler: NotificationScheduler,
    pub dispatcher: Arc<Dispatcher>,
}

impl Fleet {
    pub fn new() -> Self {
        Self::with_buffer(64)
    }

    pub fn with_buffer(buffer: usize) -> Self {
        let clock = Arc::new(MutableClock::new(t0()));
        let plans = Arc::new(InMemoryRoutePlanRepository::default());
        let deviations = Arc::new(InMemoryDeviationRepository::default());
        let positions = Arc::new(InMemoryPositionRepository::default());
        let notifications = Arc::new(InMemoryNotificationRepository::default());
        let inbox = Arc::new(InMemoryInboxRepository::new(notifications.clone()));
        let directory = Arc::new(InMemoryRecipientDirectory::default());
        let fleet = Arc::new(InMemoryFleetRepository::default());
        let bus = Arc::new(FanoutBus::new(buffer));

        let (queue, receiver) = NotificationQueue::new(notifications.clone(), clock.clone(), 64);
        let queue = Arc::new(queue);
        let triggers = Arc::new(NotificationTriggers::new(
            queue.clone(),
            directory.clone(),
            fleet.clone(),
            clock.clone(),
        ));
        let monitor = RouteMonitor::new(
            RouteMonitorPorts {
                plans: plans.clone(),
                deviations: deviations.clone(),
                positions: positions.clone(),
            },
            bus.clone(),
            triggers,
            clock.clone(),
            MonitorSettings::default(),
            RouteMonitorTiming::default(),
        );
        let gps = GpsService::new(
            GpsPorts {
                positions,
                fleet,
                settings: Arc::new(InMemorySystemSettingsRepository::default()),
            },
            bus.clone(),
            clock.clone(),
        );
        let center = NotificationCenter::new(
            NotificationCenterPorts {
                notifications: notifications.clone(),
                inbox: inbox.clone(),
                preferences: Arc::new(InMemoryPreferencesRepository::default()),
                directory: directory.clone(),
            },
            queue.clone(),
            clock.clone(),
        );
        let scheduler = NotificationScheduler::new(notifications.clone(), queue.clone(), clock.clone(), 10);
        let email = Arc::new(RecordingChannelSender::new(Channel::Email));
        let senders: Vec<Arc<dyn ChannelSender>> = vec![
            email.clone(),
            Arc::new(RecordingChannelSender::new(Channel::Sms)),
            Arc::new(RecordingChannelSender::new(Channel::Push)),
            Arc::new(InAppChannel::new(inbox, bus.clone(), clock.clone())),
        ];
        let dispatcher = Arc::new(Dispatcher::new(
            notifications.clone(),
            senders,
            clock.clone(),
            ChannelTimeouts::default(),
        ));

        directory.add_manager(Recipient {
            email: Some("manager@fleet.example".into()),
            ..Recipient::new(manager().user_id)
        });

        Self {
            clock,
            plans,
            deviations,
            notifications,
            directory,
            email,
            bus,
            queue,
            receiver,
            monitor,
            gps,
            center,
            scheduler,
            dispatcher,
        }
    }

    /// Store a plan for [`ROUTE`] with one stop per coordinate pair.
    pub fn plan(&self, stops: &[(f64, f64)]) {
        let stops = stops
            .iter()
            .zip(1..)
            .map(|((lat, lng), number)| {
                Stop::new(number, format!("Stop {number}"), GeoPoint::new(*lat, *lng))
            })
            .collect();
        self.plans
            .insert(RouteId::new(ROUTE).expect("valid route id"), stops);
    }

    pub async fn start_monitoring(&self) {
        self.monitor
            .start(
                vehicle(),
                RouteId::new(ROUTE).expect("valid route id"),
                driver().user_id,
            )
            .await
            .expect("monitoring starts");
    }

    /// Report a sample from the driver stamped with the current test time.
    pub async fn report(&self, lat: f64, lng: f64, speed: f64, heading: Option<f64>) {
        self.gps
            .ingest(
                &driver(),
                PositionDraft {
                    vehicle_id: VEHICLE.to_owned(),
                    latitude: lat,
                    longitude: lng,
                    speed,
                    heading,
                    timestamp: None,
                    route_id: Some(ROUTE.to_owned()),
                    status: None,
                },
            )
            .await
            .expect("sample accepted");
    }

    /// Report a sample and run one monitor tick over it.
    pub async fn report_and_tick(&self, lat: f64, lng: f64, speed: f64, heading: Option<f64>) {
        self.report(lat, lng, speed, heading).await;
        self.monitor.tick().await;
    }

    /// Pop the next notification handed to the workers, if one is queued.
    pub async fn next_queued(&self) -> Option<busfleet::domain::notifications::Notification> {
        self.receiver.lock().await.try_recv().ok()
    }
}

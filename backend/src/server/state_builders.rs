//! Builders for storage ports, delivery channels and the shared handler state.

use std::sync::Arc;

use actix_web::web;
use mockable::{Clock, DefaultClock};
use tracing::{info, warn};

use busfleet::domain::gps::GpsPorts;
use busfleet::domain::notifications::{
    Channel, ChannelTimeouts, Dispatcher, InAppChannel, NotificationCenter,
    NotificationCenterPorts, NotificationQueue, NotificationScheduler, NotificationTriggers,
};
use busfleet::domain::ports::{
    ChannelSender, DeviationRepository, FixtureDeviationRepository, FixtureFleetRepository,
    FixtureInboxRepository, FixtureNotificationRepository, FixturePositionRepository,
    FixturePreferencesRepository, FixtureRecipientDirectory, FixtureRoutePlanRepository,
    FixtureSystemSettingsRepository, FleetRepository, InboxRepository, NotificationRepository,
    PositionRepository, PreferencesRepository, RecipientDirectory, RoutePlanRepository,
    SystemSettingsRepository,
};
use busfleet::domain::route_monitor::{DeviationAlerts, RouteMonitorPorts};
use busfleet::domain::{FanoutBus, GpsService, RouteMonitor};
use busfleet::inbound::http::state::{HttpState, HttpStateServices};
use busfleet::inbound::ws::state::WsState;
use busfleet::outbound::channels::{DisabledChannel, HttpSmsChannel, PushChannel, SmtpEmailChannel};
use busfleet::outbound::persistence::{
    DbPool, DieselDeviationRepository, DieselFleetRepository, DieselInboxRepository,
    DieselNotificationRepository, DieselPositionRepository, DieselPreferencesRepository,
    DieselRecipientDirectory, DieselRoutePlanRepository, DieselSystemSettingsRepository,
};
use busfleet::settings::FleetSettings;

use super::ServerConfig;
use super::background::{BackgroundServices, BackgroundTasks};

/// Every storage port the services depend on.
#[derive(Clone)]
pub(crate) struct StorePorts {
    pub(crate) plans: Arc<dyn RoutePlanRepository>,
    pub(crate) deviations: Arc<dyn DeviationRepository>,
    pub(crate) positions: Arc<dyn PositionRepository>,
    pub(crate) fleet: Arc<dyn FleetRepository>,
    pub(crate) system_settings: Arc<dyn SystemSettingsRepository>,
    pub(crate) notifications: Arc<dyn NotificationRepository>,
    pub(crate) inbox: Arc<dyn InboxRepository>,
    pub(crate) preferences: Arc<dyn PreferencesRepository>,
    pub(crate) directory: Arc<dyn RecipientDirectory>,
}

impl StorePorts {
    /// Diesel adapters when a pool is available, fixtures otherwise.
    pub(crate) fn build(pool: Option<&DbPool>) -> Self {
        match pool {
            Some(pool) => Self {
                plans: Arc::new(DieselRoutePlanRepository::new(pool.clone())),
                deviations: Arc::new(DieselDeviationRepository::new(pool.clone())),
                positions: Arc::new(DieselPositionRepository::new(pool.clone())),
                fleet: Arc::new(DieselFleetRepository::new(pool.clone())),
                system_settings: Arc::new(DieselSystemSettingsRepository::new(pool.clone())),
                notifications: Arc::new(DieselNotificationRepository::new(pool.clone())),
                inbox: Arc::new(DieselInboxRepository::new(pool.clone())),
                preferences: Arc::new(DieselPreferencesRepository::new(pool.clone())),
                directory: Arc::new(DieselRecipientDirectory::new(pool.clone())),
            },
            None => {
                warn!("no database configured; fleet state will not be persisted");
                Self {
                    plans: Arc::new(FixtureRoutePlanRepository),
                    deviations: Arc::new(FixtureDeviationRepository::default()),
                    positions: Arc::new(FixturePositionRepository),
                    fleet: Arc::new(FixtureFleetRepository),
                    system_settings: Arc::new(FixtureSystemSettingsRepository),
                    notifications: Arc::new(FixtureNotificationRepository),
                    inbox: Arc::new(FixtureInboxRepository),
                    preferences: Arc::new(FixturePreferencesRepository),
                    directory: Arc::new(FixtureRecipientDirectory),
                }
            }
        }
    }
}

fn disabled(channel: Channel, reason: &str) -> Arc<dyn ChannelSender> {
    info!(channel = channel.as_str(), reason, "delivery channel disabled");
    Arc::new(DisabledChannel::new(channel, reason))
}

/// Build one sender per channel.
///
/// Channels without credentials get a [`DisabledChannel`]; credentials that
/// are present but unusable abort startup.
pub(crate) fn build_channels(
    settings: &FleetSettings,
    inbox: Arc<dyn InboxRepository>,
    bus: Arc<FanoutBus>,
    clock: Arc<dyn Clock>,
    timeouts: ChannelTimeouts,
) -> std::io::Result<Vec<Arc<dyn ChannelSender>>> {
    let email: Arc<dyn ChannelSender> = match settings.smtp() {
        Some(config) => Arc::new(SmtpEmailChannel::new(config).map_err(std::io::Error::other)?),
        None => disabled(Channel::Email, "smtp relay not configured"),
    };
    let sms: Arc<dyn ChannelSender> = match settings.sms().map_err(std::io::Error::other)? {
        Some(config) => Arc::new(
            HttpSmsChannel::new(config, timeouts.http).map_err(std::io::Error::other)?,
        ),
        None => disabled(Channel::Sms, "sms provider not configured"),
    };
    let fcm = settings.fcm().map_err(std::io::Error::other)?;
    let apns = settings.apns().map_err(std::io::Error::other)?;
    let push: Arc<dyn ChannelSender> = if fcm.is_none() && apns.is_none() {
        disabled(Channel::Push, "push providers not configured")
    } else {
        Arc::new(PushChannel::new(fcm, apns, timeouts.http).map_err(std::io::Error::other)?)
    };
    let in_app: Arc<dyn ChannelSender> = Arc::new(InAppChannel::new(inbox, bus, clock));
    Ok(vec![email, sms, push, in_app])
}

/// Handler state plus the tasks that must outlive request handling.
pub(crate) struct Wiring {
    pub(crate) http_state: web::Data<HttpState>,
    pub(crate) ws_state: web::Data<WsState>,
    pub(crate) background: BackgroundTasks,
}

/// Construct every service and start the background tasks.
///
/// # Errors
/// Returns [`std::io::Error`] when a setting is malformed or a configured
/// channel cannot be built.
pub(crate) fn build_wiring(config: &ServerConfig) -> std::io::Result<Wiring> {
    let settings = &config.settings;
    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let ports = StorePorts::build(config.db_pool.as_ref());
    let bus = Arc::new(FanoutBus::new(settings.subscriber_buffer()));

    let (queue, receiver) = NotificationQueue::new(
        Arc::clone(&ports.notifications),
        Arc::clone(&clock),
        settings.nde_queue_capacity(),
    );
    let queue = Arc::new(queue);
    let triggers = Arc::new(NotificationTriggers::new(
        Arc::clone(&queue),
        Arc::clone(&ports.directory),
        Arc::clone(&ports.fleet),
        Arc::clone(&clock),
    ));

    let alerts: Arc<dyn DeviationAlerts> = triggers.clone();
    let monitor = Arc::new(RouteMonitor::new(
        RouteMonitorPorts {
            plans: Arc::clone(&ports.plans),
            deviations: Arc::clone(&ports.deviations),
            positions: Arc::clone(&ports.positions),
        },
        Arc::clone(&bus),
        alerts,
        Arc::clone(&clock),
        settings
            .monitor_settings()
            .map_err(std::io::Error::other)?,
        settings.route_monitor_timing(),
    ));
    let gps = Arc::new(
        GpsService::new(
            GpsPorts {
                positions: Arc::clone(&ports.positions),
                fleet: Arc::clone(&ports.fleet),
                settings: Arc::clone(&ports.system_settings),
            },
            Arc::clone(&bus),
            Arc::clone(&clock),
        )
        .with_speed_unit(settings.speed_unit().map_err(std::io::Error::other)?),
    );
    let notifications = Arc::new(NotificationCenter::new(
        NotificationCenterPorts {
            notifications: Arc::clone(&ports.notifications),
            inbox: Arc::clone(&ports.inbox),
            preferences: Arc::clone(&ports.preferences),
            directory: Arc::clone(&ports.directory),
        },
        Arc::clone(&queue),
        Arc::clone(&clock),
    ));

    let timeouts = ChannelTimeouts::default();
    let senders = build_channels(
        settings,
        Arc::clone(&ports.inbox),
        Arc::clone(&bus),
        Arc::clone(&clock),
        timeouts,
    )?;
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&ports.notifications),
        senders,
        Arc::clone(&clock),
        timeouts,
    ));
    let scheduler = Arc::new(NotificationScheduler::new(
        Arc::clone(&ports.notifications),
        Arc::clone(&queue),
        Arc::clone(&clock),
        settings.scheduler_batch(),
    ));

    let http_state = web::Data::new(HttpState::new(
        HttpStateServices {
            monitor: Arc::clone(&monitor),
            gps: Arc::clone(&gps),
            notifications,
            triggers: Arc::clone(&triggers),
            bus: Arc::clone(&bus),
            clock: Arc::clone(&clock),
        },
        settings.stream_settings(),
    ));
    let ws_state = web::Data::new(WsState::new(
        Arc::clone(&bus),
        Arc::clone(&clock),
        settings.allowed_origins(),
        settings.heartbeat_interval(),
    ));
    let background = BackgroundTasks::start(
        BackgroundServices {
            monitor,
            gps,
            scheduler,
            triggers,
            dispatcher,
            receiver,
            queue,
            bus,
            clock,
        },
        settings,
    );

    Ok(Wiring {
        http_state,
        ws_state,
        background,
    })
}

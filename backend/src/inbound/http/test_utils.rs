//! Test helpers for inbound HTTP components.

use std::sync::Arc;

use actix_session::{SessionMiddleware, storage::CookieSessionStore};
use actix_web::cookie::{Cookie, Key};
use actix_web::dev::{Service, ServiceResponse};
use actix_web::{HttpResponse, test, web};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::notifications::{
    NotificationCenter, NotificationCenterPorts, NotificationQueue, NotificationTriggers,
    QueueReceiver,
};
use crate::domain::route_monitor::{RouteMonitorPorts, RouteMonitorTiming};
use crate::domain::{
    AuthUser, Error, FanoutBus, GpsService, MonitorSettings, Role, RouteMonitor, UserId,
    gps::GpsPorts,
};
use crate::inbound::http::session::SessionContext;
use crate::inbound::http::state::{HttpState, HttpStateServices, StreamSettings};
use crate::test_support::{
    InMemoryDeviationRepository, InMemoryFleetRepository, InMemoryInboxRepository,
    InMemoryNotificationRepository, InMemoryPositionRepository, InMemoryPreferencesRepository,
    InMemoryRecipientDirectory, InMemoryRoutePlanRepository, InMemorySystemSettingsRepository,
    MutableClock, RecordingDeviationAlerts,
};

/// Path of the login route registered by [`configure_test_login`].
pub const TEST_LOGIN_PATH: &str = "/test-login";

/// Build a session middleware configured for tests.
///
/// - Generates a fresh signing/encryption key per invocation.
/// - Sets the cookie name to `session` and disables the `Secure` flag for
///   local HTTP tests.
pub fn test_session_middleware() -> SessionMiddleware<CookieSessionStore> {
    SessionMiddleware::builder(CookieSessionStore::default(), Key::generate())
        .cookie_name("session".to_owned())
        .cookie_secure(false)
        .build()
}

#[derive(Debug, Serialize, Deserialize)]
struct TestLogin {
    user_id: String,
    role: String,
}

/// Register a login route that writes the posted identity into the session.
pub fn configure_test_login(cfg: &mut web::ServiceConfig) {
    cfg.route(
        TEST_LOGIN_PATH,
        web::post().to(
            |session: SessionContext, body: web::Json<TestLogin>| async move {
                let TestLogin { user_id, role } = body.into_inner();
                let user_id =
                    UserId::new(user_id).map_err(|err| Error::invalid_request(err.to_string()))?;
                let role = role
                    .parse::<Role>()
                    .map_err(|err| Error::invalid_request(err.to_string()))?;
                session.persist_user(&AuthUser::new(user_id, role))?;
                Ok::<_, Error>(HttpResponse::Ok().finish())
            },
        ),
    );
}

/// Log in through [`TEST_LOGIN_PATH`] and return the session cookie.
pub async fn login_cookie<S>(app: &S, user_id: &str, role: Role) -> Cookie<'static>
where
    S: Service<actix_http::Request, Response = ServiceResponse, Error = actix_web::Error>,
{
    let request = test::TestRequest::post()
        .uri(TEST_LOGIN_PATH)
        .set_json(TestLogin {
            user_id: user_id.to_owned(),
            role: role.as_str().to_owned(),
        })
        .to_request();
    let response = test::call_service(app, request).await;
    assert!(response.status().is_success(), "test login failed");
    response
        .response()
        .cookies()
        .find(|cookie| cookie.name() == "session")
        .expect("session cookie")
        .into_owned()
}

/// In-memory collaborators behind an [`HttpState`], kept for assertions.
pub struct TestFleet {
    pub state: HttpState,
    pub clock: Arc<MutableClock>,
    pub plans: Arc<InMemoryRoutePlanRepository>,
    pub deviations: Arc<InMemoryDeviationRepository>,
    pub positions: Arc<InMemoryPositionRepository>,
    pub fleet: Arc<InMemoryFleetRepository>,
    pub settings: Arc<InMemorySystemSettingsRepository>,
    pub notifications: Arc<InMemoryNotificationRepository>,
    pub inbox: Arc<InMemoryInboxRepository>,
    pub preferences: Arc<InMemoryPreferencesRepository>,
    pub directory: Arc<InMemoryRecipientDirectory>,
    pub alerts: Arc<RecordingDeviationAlerts>,
    /// Held so enqueued notifications are not rejected as closed.
    pub queue_receiver: QueueReceiver,
}

impl TestFleet {
    /// Wire every service over fresh in-memory stores at a fixed instant.
    pub fn new() -> Self {
        let start = Utc
            .with_ymd_and_hms(2025, 3, 3, 8, 0, 0)
            .single()
            .expect("valid instant");
        let clock = Arc::new(MutableClock::new(start));
        let plans = Arc::new(InMemoryRoutePlanRepository::default());
        let deviations = Arc::new(InMemoryDeviationRepository::default());
        let positions = Arc::new(InMemoryPositionRepository::default());
        let fleet = Arc::new(InMemoryFleetRepository::default());
        let settings = Arc::new(InMemorySystemSettingsRepository::default());
        let notifications = Arc::new(InMemoryNotificationRepository::default());
        let inbox = Arc::new(InMemoryInboxRepository::new(notifications.clone()));
        let preferences = Arc::new(InMemoryPreferencesRepository::default());
        let directory = Arc::new(InMemoryRecipientDirectory::default());
        let alerts = Arc::new(RecordingDeviationAlerts::default());

        let bus = Arc::new(FanoutBus::new(16));
        let (queue, queue_receiver) =
            NotificationQueue::new(notifications.clone(), clock.clone(), 64);
        let queue = Arc::new(queue);

        let monitor = Arc::new(RouteMonitor::new(
            RouteMonitorPorts {
                plans: plans.clone(),
                deviations: deviations.clone(),
                positions: positions.clone(),
            },
            bus.clone(),
            alerts.clone(),
            clock.clone(),
            MonitorSettings::default(),
            RouteMonitorTiming::default(),
        ));
        let gps = Arc::new(GpsService::new(
            GpsPorts {
                positions: positions.clone(),
                fleet: fleet.clone(),
                settings: settings.clone(),
            },
            bus.clone(),
            clock.clone(),
        ));
        let center = Arc::new(NotificationCenter::new(
            NotificationCenterPorts {
                notifications: notifications.clone(),
                inbox: inbox.clone(),
                preferences: preferences.clone(),
                directory: directory.clone(),
            },
            queue.clone(),
            clock.clone(),
        ));
        let triggers = Arc::new(NotificationTriggers::new(
            queue,
            directory.clone(),
            fleet.clone(),
            clock.clone(),
        ));

        let state = HttpState::new(
            HttpStateServices {
                monitor,
                gps,
                notifications: center,
                triggers,
                bus,
                clock: clock.clone(),
            },
            StreamSettings::default(),
        );

        Self {
            state,
            clock,
            plans,
            deviations,
            positions,
            fleet,
            settings,
            notifications,
            inbox,
            preferences,
            directory,
            alerts,
            queue_receiver,
        }
    }

    pub fn data(&self) -> web::Data<HttpState> {
        web::Data::new(self.state.clone())
    }
}

impl Default for TestFleet {
    fn default() -> Self {
        Self::new()
    }
}

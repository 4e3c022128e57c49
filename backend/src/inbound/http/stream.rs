//! Server-sent event stream of live fleet activity.
//!
//! ```text
//! GET /api/v1/gps/stream
//! ```
//!
//! Each connection owns a bus subscription and a writer task. The writer
//! relays bus events and periodic heartbeats into a single-slot channel that
//! backs the response body. A client that does not take a frame within the
//! write timeout is dropped, which also removes its subscription.

use std::convert::Infallible;
use std::sync::Arc;

use actix_web::http::header;
use actix_web::web::Bytes;
use actix_web::{HttpResponse, get, web};
use futures_util::stream;
use mockable::Clock;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use crate::domain::{BusEvent, Subscription};
use crate::inbound::http::ApiResult;
use crate::inbound::http::schemas::ErrorSchema;
use crate::inbound::http::session::SessionContext;
use crate::inbound::http::state::{HttpState, StreamSettings};

/// Open the event stream for the caller.
///
/// Frames are `event: <name>\ndata: <json>\n\n`; the first is always
/// `connected` and the last, on shutdown, is `shutdown`.
#[utoipa::path(
    get,
    path = "/api/v1/gps/stream",
    responses(
        (status = 200, description = "Event stream", content_type = "text/event-stream", body = String),
        (status = 401, description = "Unauthorized", body = ErrorSchema),
        (status = 503, description = "GPS tracking disabled", body = ErrorSchema)
    ),
    tags = ["gps"],
    operation_id = "gpsStream",
    security(("SessionCookie" = []))
)]
#[get("/gps/stream")]
pub async fn gps_stream(
    state: web::Data<HttpState>,
    session: SessionContext,
) -> ApiResult<HttpResponse> {
    let user = session.require_user()?;
    state.gps.ensure_stream_allowed(&user).await?;

    let subscription = state.bus.subscribe(user, state.clock.utc());
    debug!(subscriber = subscription.id(), "event stream opened");
    let (sender, receiver) = mpsc::channel::<Bytes>(1);
    actix_web::rt::spawn(pump_events(
        subscription,
        Arc::clone(&state.clock),
        state.stream,
        sender,
    ));

    let body = stream::unfold(receiver, |mut receiver| async move {
        receiver
            .recv()
            .await
            .map(|frame| (Ok::<_, Infallible>(frame), receiver))
    });
    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header((header::CONNECTION, "keep-alive"))
        .streaming(body))
}

enum Outcome {
    Continue,
    Finished,
}

/// Relay bus events and heartbeats to one stream client until either side
/// goes away.
pub(crate) async fn pump_events(
    mut subscription: Subscription,
    clock: Arc<dyn Clock>,
    settings: StreamSettings,
    sink: mpsc::Sender<Bytes>,
) {
    let period = settings.heartbeat_interval;
    let mut heartbeat = time::interval_at(Instant::now() + period, period);
    loop {
        let event = tokio::select! {
            event = subscription.recv() => match event {
                Some(event) => event,
                None => break,
            },
            _ = heartbeat.tick() => BusEvent::Heartbeat { timestamp: clock.utc() },
        };
        let terminal = matches!(event, BusEvent::Shutdown);
        match write_frame(&sink, &event, &settings).await {
            Outcome::Continue if !terminal => {}
            Outcome::Continue | Outcome::Finished => break,
        }
    }
    debug!(subscriber = subscription.id(), "event stream closed");
}

async fn write_frame(sink: &mpsc::Sender<Bytes>, event: &BusEvent, settings: &StreamSettings) -> Outcome {
    let frame = match event.to_sse_frame() {
        Ok(frame) => frame,
        Err(error) => {
            warn!(event = event.name(), error = %error, "failed to encode stream event");
            return Outcome::Continue;
        }
    };
    match time::timeout(settings.write_timeout, sink.send(Bytes::from(frame))).await {
        Ok(Ok(())) => Outcome::Continue,
        Ok(Err(_)) => Outcome::Finished,
        Err(_) => {
            warn!(event = event.name(), "stream client too slow; disconnecting");
            Outcome::Finished
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AuthUser, FanoutBus, Position, Role, UserId, VehicleId, VehicleStatus};
    use crate::inbound::http::test_utils::{
        TestFleet, configure_test_login, login_cookie, test_session_middleware,
    };
    use crate::test_support::MutableClock;
    use actix_web::http::StatusCode;
    use actix_web::{App, test as actix_test};
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn position(driver: &str) -> Position {
        Position {
            vehicle_id: VehicleId::new("BUS-1").expect("valid id"),
            latitude: 40.0,
            longitude: -74.0,
            speed: 20.0,
            heading: None,
            timestamp: Utc
                .with_ymd_and_hms(2025, 3, 3, 8, 0, 0)
                .single()
                .expect("valid instant"),
            driver_id: UserId::new(driver).expect("valid id"),
            route_id: None,
            status: VehicleStatus::Active,
        }
    }

    macro_rules! stream_app {
        ($fleet:expr) => {
            actix_test::init_service(
                App::new()
                    .app_data($fleet.data())
                    .wrap(test_session_middleware())
                    .configure(configure_test_login)
                    .service(web::scope("/api/v1").service(gps_stream)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn anonymous_stream_is_unauthorised() {
        let fleet = TestFleet::new();
        let app = stream_app!(fleet);
        let res = actix_test::call_service(
            &app,
            actix_test::TestRequest::get().uri("/api/v1/gps/stream").to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn managers_are_refused_while_tracking_is_off() {
        let fleet = TestFleet::new();
        fleet.state.gps.set_gps_enabled(false).await.expect("toggle");
        let app = stream_app!(fleet);
        let manager = login_cookie(&app, "manager1", Role::Manager).await;
        let res = actix_test::call_service(
            &app,
            actix_test::TestRequest::get()
                .uri("/api/v1/gps/stream")
                .cookie(manager)
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn stream_relays_visible_events_until_shutdown() {
        let fleet = TestFleet::new();
        let app = stream_app!(fleet);
        let driver = login_cookie(&app, "driver1", Role::Driver).await;
        let res = actix_test::call_service(
            &app,
            actix_test::TestRequest::get()
                .uri("/api/v1/gps/stream")
                .cookie(driver)
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some("text/event-stream")
        );
        assert_eq!(
            res.headers()
                .get(header::CACHE_CONTROL)
                .and_then(|v| v.to_str().ok()),
            Some("no-cache")
        );

        fleet.state.bus.publish(&BusEvent::GpsUpdate(position("driver2")));
        fleet.state.bus.publish(&BusEvent::GpsUpdate(position("driver1")));
        fleet.state.bus.close();

        let body = actix_test::read_body(res).await;
        let text = String::from_utf8(body.to_vec()).expect("utf8 body");
        let events: Vec<&str> = text
            .lines()
            .filter_map(|line| line.strip_prefix("event: "))
            .collect();
        assert_eq!(events, ["connected", "gps_update", "shutdown"]);
        assert!(text.contains("\"driver_id\":\"driver1\""));
        assert!(!text.contains("driver2"));
    }

    #[tokio::test]
    async fn idle_streams_receive_heartbeats() {
        let bus = FanoutBus::new(4);
        let start = Utc
            .with_ymd_and_hms(2025, 3, 3, 8, 0, 0)
            .single()
            .expect("valid instant");
        let clock: Arc<dyn Clock> = Arc::new(MutableClock::new(start));
        let viewer = AuthUser::new(UserId::new("driver1").expect("valid id"), Role::Driver);
        let subscription = bus.subscribe(viewer, start);
        let (sender, mut receiver) = mpsc::channel(1);
        let settings = StreamSettings {
            heartbeat_interval: Duration::from_millis(20),
            write_timeout: Duration::from_secs(1),
        };
        let pump = tokio::spawn(pump_events(subscription, clock, settings, sender));

        let connected = receiver.recv().await.expect("connected frame");
        assert!(connected.starts_with(b"event: connected\n"));
        let heartbeat = receiver.recv().await.expect("heartbeat frame");
        assert!(heartbeat.starts_with(b"event: heartbeat\n"));

        bus.close();
        while receiver.recv().await.is_some() {}
        pump.await.expect("pump finishes");
    }

    #[tokio::test]
    async fn slow_clients_are_disconnected() {
        let bus = FanoutBus::new(4);
        let start = Utc::now();
        let clock: Arc<dyn Clock> = Arc::new(MutableClock::new(start));
        let viewer = AuthUser::new(UserId::new("manager1").expect("valid id"), Role::Manager);
        let subscription = bus.subscribe(viewer, start);
        let (sender, _receiver) = mpsc::channel(1);
        let settings = StreamSettings {
            heartbeat_interval: Duration::from_millis(10),
            write_timeout: Duration::from_millis(20),
        };

        // The connected frame fills the only slot; the first heartbeat times out.
        time::timeout(
            Duration::from_secs(2),
            pump_events(subscription, clock, settings, sender),
        )
        .await
        .expect("pump gives up on the slow client");
        assert_eq!(bus.subscriber_count(), 0);
    }
}

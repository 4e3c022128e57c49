//! Server construction and middleware wiring.

mod background;
mod config;
#[cfg(feature = "metrics")]
mod metrics;
mod state_builders;

pub use background::BackgroundTasks;
pub use config::ServerConfig;

#[cfg(feature = "metrics")]
pub(crate) use metrics::fleet_metrics;
#[cfg(feature = "metrics")]
use metrics::MetricsLayer;
use state_builders::{Wiring, build_wiring};

use actix_session::{
    SessionMiddleware,
    config::{CookieContentSecurity, PersistentSession},
    storage::CookieSessionStore,
};
use actix_web::cookie::{Key, SameSite};
use actix_web::dev::{Server, ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{App, HttpServer, web};
use tracing::{info, warn};

use busfleet::Trace;
#[cfg(debug_assertions)]
use busfleet::doc::ApiDoc;
use busfleet::inbound::http::fleet::{
    assign_route, change_vehicle_status, raise_emergency, report_ready,
};
use busfleet::inbound::http::gps::{
    fleet_locations, gps_status, toggle_gps, update_gps, vehicle_location, vehicle_locations,
};
use busfleet::inbound::http::health::{HealthState, live, ready};
use busfleet::inbound::http::monitoring::{
    active_monitoring, deviation_history, get_monitor_settings, monitoring_stats,
    resolve_deviation, start_monitoring, stop_monitoring, update_monitor_settings,
};
use busfleet::inbound::http::notifications::{
    get_preferences, list_inbox, mark_all_read, mark_read, notification_history, send_test,
    unread_count, update_preferences,
};
use busfleet::inbound::http::route_plans::{get_route_plan, replace_route_plan};
use busfleet::inbound::http::state::HttpState;
use busfleet::inbound::http::stream::gps_stream;
use busfleet::inbound::ws;
use busfleet::inbound::ws::state::WsState;
#[cfg(debug_assertions)]
use utoipa::OpenApi;
#[cfg(debug_assertions)]
use utoipa_swagger_ui::SwaggerUi;

#[derive(Clone)]
struct AppDependencies {
    health_state: web::Data<HealthState>,
    http_state: web::Data<HttpState>,
    ws_state: web::Data<WsState>,
    key: Key,
    cookie_secure: bool,
}

fn build_app(
    deps: AppDependencies,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let AppDependencies {
        health_state,
        http_state,
        ws_state,
        key,
        cookie_secure,
    } = deps;

    let session = SessionMiddleware::builder(CookieSessionStore::default(), key)
        .cookie_name("session".into())
        .cookie_path("/".into())
        .cookie_secure(cookie_secure)
        .cookie_http_only(true)
        .cookie_content_security(CookieContentSecurity::Private)
        .cookie_same_site(SameSite::Lax)
        .session_lifecycle(
            PersistentSession::default().session_ttl(actix_web::cookie::time::Duration::hours(2)),
        )
        .build();

    let api = web::scope("/api/v1")
        .service(start_monitoring)
        .service(stop_monitoring)
        .service(active_monitoring)
        .service(monitoring_stats)
        .service(get_monitor_settings)
        .service(update_monitor_settings)
        .service(resolve_deviation)
        .service(deviation_history)
        .service(get_route_plan)
        .service(replace_route_plan)
        .service(gps_stream)
        .service(update_gps)
        .service(gps_status)
        .service(toggle_gps)
        .service(fleet_locations)
        .service(vehicle_location)
        .service(vehicle_locations)
        .service(list_inbox)
        .service(notification_history)
        .service(unread_count)
        .service(mark_read)
        .service(mark_all_read)
        .service(get_preferences)
        .service(update_preferences)
        .service(send_test)
        .service(raise_emergency)
        .service(change_vehicle_status)
        .service(assign_route)
        .service(report_ready);

    // The WebSocket mirror authenticates with the same cookie, so the session
    // layer wraps the whole app rather than the API scope alone.
    let app = App::new()
        .app_data(health_state)
        .app_data(http_state)
        .app_data(ws_state)
        .wrap(Trace)
        .wrap(session)
        .service(api)
        .service(ws::ws_entry)
        .service(ready)
        .service(live);

    #[cfg(debug_assertions)]
    let app = app.service(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));
    #[cfg(not(debug_assertions))]
    let app = app;

    app
}

/// Running HTTP server plus the background tasks wired alongside it.
pub struct FleetServer {
    server: Server,
    background: BackgroundTasks,
    health_state: web::Data<HealthState>,
}

impl FleetServer {
    /// Serve until SIGINT or SIGTERM, then shut down in order.
    ///
    /// # Errors
    /// Propagates the server's I/O error after shutdown has completed.
    pub async fn run(self) -> std::io::Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Serve until `shutdown` resolves.
    ///
    /// Readiness is withdrawn first. The schedulers then stop, queued
    /// notifications drain and the bus sends its terminal `shutdown` event,
    /// which ends every SSE and WebSocket stream. Only then is the HTTP
    /// server stopped gracefully.
    ///
    /// # Errors
    /// Propagates the server's I/O error after shutdown has completed.
    pub async fn run_until<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let Self {
            server,
            background,
            health_state,
        } = self;
        let handle = server.handle();
        tokio::pin!(server);
        tokio::select! {
            result = &mut server => {
                warn!("http server stopped on its own; shutting down background tasks");
                health_state.mark_not_ready();
                background.shutdown().await;
                return result;
            }
            () = shutdown => {}
        }
        health_state.mark_not_ready();
        info!("shutdown requested; stopping background tasks");
        background.shutdown().await;
        handle.stop(true).await;
        server.await
    }

    #[cfg(test)]
    pub(crate) fn bus(&self) -> std::sync::Arc<busfleet::domain::FanoutBus> {
        self.background.bus()
    }
}

/// Resolves on the first SIGINT or SIGTERM.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                warn!(%error, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => info!("received SIGINT"),
        () = terminate => info!("received SIGTERM"),
    }
}

/// Construct an Actix HTTP server using the provided health state and configuration.
///
/// Builds every port and service, spawns the background tasks and binds the
/// listener. Readiness is signalled once the listener is bound.
///
/// # Errors
/// Propagates [`std::io::Error`] when a setting is malformed, a channel cannot
/// be built or binding the socket fails.
pub fn create_server(
    health_state: web::Data<HealthState>,
    config: ServerConfig,
) -> std::io::Result<FleetServer> {
    let Wiring {
        http_state,
        ws_state,
        background,
    } = build_wiring(&config)?;
    let server_health_state = health_state.clone();
    let ServerConfig {
        key,
        cookie_secure,
        bind_addr,
        settings: _,
        db_pool: _,
        #[cfg(feature = "metrics")]
        prometheus,
    } = config;

    #[cfg(feature = "metrics")]
    let metrics_layer = MetricsLayer::from_option(prometheus);

    let server = HttpServer::new(move || {
        let app = build_app(AppDependencies {
            health_state: server_health_state.clone(),
            http_state: http_state.clone(),
            ws_state: ws_state.clone(),
            key: key.clone(),
            cookie_secure,
        });

        #[cfg(feature = "metrics")]
        let app = app.wrap(metrics_layer.clone());

        app
    })
    // Signals are handled by `FleetServer::run` so the background tasks stop
    // before the listener does.
    .disable_signals()
    .bind(bind_addr)?
    .run();

    info!(%bind_addr, "http server listening");
    health_state.mark_ready();
    Ok(FleetServer {
        server,
        background,
        health_state,
    })
}

//! Fleet server entry-point: loads settings, prepares storage and serves the
//! REST, SSE and WebSocket surfaces until a shutdown signal arrives.

mod server;

use actix_web::web;
use ortho_config::OrthoConfig;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use busfleet::inbound::http::health::HealthState;
use busfleet::inbound::http::session_config::{BuildMode, session_settings};
use busfleet::outbound::persistence::{DbPool, PoolConfig, run_migrations};
use busfleet::settings::FleetSettings;
use server::{ServerConfig, create_server};

/// Connect to PostgreSQL and apply pending migrations.
async fn prepare_database(settings: &FleetSettings) -> std::io::Result<Option<DbPool>> {
    let Some(url) = settings.database_url() else {
        return Ok(None);
    };
    run_migrations(url).await.map_err(std::io::Error::other)?;
    let pool = DbPool::new(PoolConfig::new(url).with_max_size(settings.db_max_connections()))
        .await
        .map_err(std::io::Error::other)?;
    info!(max_connections = settings.db_max_connections(), "database pool ready");
    Ok(Some(pool))
}

/// Application bootstrap.
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let settings = FleetSettings::load_from_iter(std::env::args_os())
        .map_err(|err| std::io::Error::other(err.to_string()))?;
    let bind_addr = settings.bind_addr().map_err(std::io::Error::other)?;
    let session = session_settings(&settings, BuildMode::from_debug_assertions())
        .map_err(std::io::Error::other)?;
    let db_pool = prepare_database(&settings).await?;

    let config = ServerConfig::new(session.key, session.cookie_secure, bind_addr, settings);
    let config = match db_pool {
        Some(pool) => config.with_db_pool(pool),
        None => config,
    };
    #[cfg(feature = "metrics")]
    let config = config.with_metrics(server::fleet_metrics());

    let health_state = web::Data::new(HealthState::new());
    create_server(health_state, config)?.run().await
}

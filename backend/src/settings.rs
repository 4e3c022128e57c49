//! Process configuration loaded via OrthoConfig.
//!
//! Every key can come from a `FLEET_*` environment variable, a CLI flag or a
//! config file. Absent keys fall back to the defaults below; accessors turn
//! the raw values into the types the services are built from.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use url::Url;
use zeroize::Zeroizing;

use crate::domain::route_monitor::RouteMonitorTiming;
use crate::domain::{MonitorSettings, SpeedUnit};
use crate::inbound::http::state::{DEFAULT_WRITE_TIMEOUT, StreamSettings};
use crate::inbound::ws::state::AllowedOrigins;
use crate::outbound::channels::{ApnsConfig, FcmConfig, SmsConfig, SmtpConfig};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_SESSION_KEY_FILE: &str = "/var/run/secrets/session_key";
const DEFAULT_DEVIATION_RADIUS_M: f64 = 200.0;
const DEFAULT_STOP_DURATION_S: u64 = 300;
const DEFAULT_RDM_CHECK_INTERVAL_S: u64 = 10;
const DEFAULT_POSITION_WINDOW_S: u64 = 300;
const DEFAULT_HEARTBEAT_INTERVAL_S: u64 = 30;
const DEFAULT_SUBSCRIBER_BUFFER: usize = 16;
const DEFAULT_NDE_WORKERS: usize = 5;
const DEFAULT_NDE_QUEUE_CAPACITY: usize = 1000;
const DEFAULT_SCHEDULER_INTERVAL_S: u64 = 60;
const DEFAULT_SCHEDULER_BATCH: usize = 10;
const DEFAULT_DRAIN_TIMEOUT_S: u64 = 10;
const DEFAULT_GPS_RETENTION_DAYS: u32 = 30;
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_FCM_ENDPOINT: &str = "https://fcm.googleapis.com/fcm/send";
const DEFAULT_APNS_ENDPOINT: &str = "https://api.push.apple.com";
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000";

/// A configured value that cannot be used.
#[derive(Debug, thiserror::Error)]
#[error("invalid value for {key}='{value}': {reason}")]
pub struct SettingsError {
    key: &'static str,
    value: String,
    reason: String,
}

impl SettingsError {
    fn new(key: &'static str, value: impl ToString, reason: impl ToString) -> Self {
        Self {
            key,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Name of the offending key.
    pub fn key(&self) -> &'static str {
        self.key
    }
}

/// Configuration values for the fleet server.
#[derive(Debug, Clone, Default, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "FLEET")]
pub struct FleetSettings {
    /// HTTP listener address.
    pub bind_addr: Option<String>,
    /// PostgreSQL URL. Without one the server runs on fixture ports.
    pub database_url: Option<String>,
    /// Connection pool size.
    pub db_max_connections: Option<u32>,
    /// File holding the session cookie key material.
    pub session_key_file: Option<PathBuf>,
    /// Allow a generated session key outside debug builds.
    #[ortho_config(default = false)]
    pub session_allow_ephemeral: bool,
    /// Drop the `Secure` flag from session cookies. Debug builds only.
    #[ortho_config(default = false)]
    pub session_cookie_insecure: bool,
    /// Distance from the next stop that raises `off_route`.
    pub deviation_radius_m: Option<f64>,
    /// Seconds stationary before `stopped_too_long` fires.
    pub stop_duration_s: Option<u64>,
    /// Seconds between route monitor ticks.
    pub rdm_check_interval_s: Option<u64>,
    /// Seconds a position stays current for the monitor.
    pub position_window_s: Option<u64>,
    /// Seconds between stream heartbeats.
    pub heartbeat_interval_s: Option<u64>,
    /// Events buffered per stream subscriber before eviction.
    pub subscriber_buffer: Option<usize>,
    /// Notification worker count.
    pub nde_workers: Option<usize>,
    /// Notifications held in memory awaiting a worker.
    pub nde_queue_capacity: Option<usize>,
    /// Seconds between scheduled-notification polls.
    pub scheduler_interval_s: Option<u64>,
    /// Due notifications claimed per poll.
    pub scheduler_batch: Option<usize>,
    /// Seconds allowed for workers to drain at shutdown.
    pub drain_timeout_s: Option<u64>,
    /// Days of GPS history kept.
    pub gps_retention_days: Option<u32>,
    /// `kmh`, `mph` or `mps`.
    pub speed_unit: Option<String>,
    /// SMTP relay host; email is disabled without one.
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    /// Sender mailbox for email notifications.
    pub smtp_from: Option<String>,
    /// SMS provider message endpoint; SMS is disabled without one.
    pub sms_endpoint: Option<String>,
    pub sms_account: Option<String>,
    pub sms_token: Option<String>,
    pub sms_from: Option<String>,
    /// FCM server key; Android push is disabled without one.
    pub fcm_server_key: Option<String>,
    pub fcm_endpoint: Option<String>,
    /// APNS client certificate; iOS push is disabled without one.
    #[ortho_config(cli_short = 'x')]
    pub apns_cert_path: Option<String>,
    pub apns_key_path: Option<String>,
    pub apns_topic: Option<String>,
    #[ortho_config(cli_short = 'y')]
    pub apns_endpoint: Option<String>,
    /// Comma separated origins allowed to open `/ws`.
    pub allowed_origins: Option<String>,
}

fn present(value: Option<&String>) -> Option<&str> {
    value.map(|raw| raw.trim()).filter(|raw| !raw.is_empty())
}

fn parse_url(key: &'static str, raw: &str) -> Result<Url, SettingsError> {
    Url::parse(raw).map_err(|err| SettingsError::new(key, raw, err))
}

fn secs(value: Option<u64>, default: u64) -> Duration {
    Duration::from_secs(value.unwrap_or(default))
}

impl FleetSettings {
    /// Parsed listener address.
    ///
    /// # Errors
    /// When `bind_addr` is not a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, SettingsError> {
        let raw = present(self.bind_addr.as_ref()).unwrap_or(DEFAULT_BIND_ADDR);
        raw.parse()
            .map_err(|err| SettingsError::new("bind_addr", raw, err))
    }

    /// Database URL, when persistence is configured.
    pub fn database_url(&self) -> Option<&str> {
        present(self.database_url.as_ref())
    }

    pub fn db_max_connections(&self) -> u32 {
        self.db_max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .max(1)
    }

    pub fn session_key_file(&self) -> PathBuf {
        self.session_key_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_KEY_FILE))
    }

    /// Session cookies are `Secure` unless explicitly opted out.
    pub fn session_cookie_secure(&self) -> bool {
        !self.session_cookie_insecure
    }

    /// Initial deviation thresholds for the route monitor.
    ///
    /// # Errors
    /// When a threshold is zero or negative.
    pub fn monitor_settings(&self) -> Result<MonitorSettings, SettingsError> {
        let radius = self.deviation_radius_m.unwrap_or(DEFAULT_DEVIATION_RADIUS_M);
        let stop = self.stop_duration_s.unwrap_or(DEFAULT_STOP_DURATION_S);
        let interval = self
            .rdm_check_interval_s
            .unwrap_or(DEFAULT_RDM_CHECK_INTERVAL_S);
        MonitorSettings::try_new(radius, stop, interval).map_err(|err| {
            SettingsError::new(
                "deviation_radius_m/stop_duration_s/rdm_check_interval_s",
                format!("{radius}/{stop}/{interval}"),
                err.message(),
            )
        })
    }

    pub fn route_monitor_timing(&self) -> RouteMonitorTiming {
        RouteMonitorTiming {
            position_window: secs(self.position_window_s, DEFAULT_POSITION_WINDOW_S),
            ..RouteMonitorTiming::default()
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        secs(self.heartbeat_interval_s, DEFAULT_HEARTBEAT_INTERVAL_S).max(Duration::from_secs(1))
    }

    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            heartbeat_interval: self.heartbeat_interval(),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    pub fn subscriber_buffer(&self) -> usize {
        self.subscriber_buffer
            .unwrap_or(DEFAULT_SUBSCRIBER_BUFFER)
            .max(1)
    }

    pub fn nde_workers(&self) -> usize {
        self.nde_workers.unwrap_or(DEFAULT_NDE_WORKERS).max(1)
    }

    pub fn nde_queue_capacity(&self) -> usize {
        self.nde_queue_capacity
            .unwrap_or(DEFAULT_NDE_QUEUE_CAPACITY)
            .max(1)
    }

    pub fn scheduler_interval(&self) -> Duration {
        secs(self.scheduler_interval_s, DEFAULT_SCHEDULER_INTERVAL_S).max(Duration::from_secs(1))
    }

    pub fn scheduler_batch(&self) -> usize {
        self.scheduler_batch.unwrap_or(DEFAULT_SCHEDULER_BATCH).max(1)
    }

    pub fn drain_timeout(&self) -> Duration {
        secs(self.drain_timeout_s, DEFAULT_DRAIN_TIMEOUT_S)
    }

    pub fn gps_retention_days(&self) -> u32 {
        self.gps_retention_days
            .unwrap_or(DEFAULT_GPS_RETENTION_DAYS)
            .max(1)
    }

    /// # Errors
    /// When `speed_unit` names an unknown unit.
    pub fn speed_unit(&self) -> Result<SpeedUnit, SettingsError> {
        match present(self.speed_unit.as_ref()) {
            None => Ok(SpeedUnit::default()),
            Some(raw) => raw
                .parse()
                .map_err(|err: crate::domain::Error| {
                    SettingsError::new("speed_unit", raw, err.message())
                }),
        }
    }

    pub fn allowed_origins(&self) -> AllowedOrigins {
        AllowedOrigins::parse(
            present(self.allowed_origins.as_ref()).unwrap_or(DEFAULT_ALLOWED_ORIGINS),
        )
    }

    /// SMTP relay settings; `None` when host or sender is missing.
    pub fn smtp(&self) -> Option<SmtpConfig> {
        let host = present(self.smtp_host.as_ref())?;
        let from = present(self.smtp_from.as_ref())?;
        Some(SmtpConfig {
            host: host.to_owned(),
            port: self.smtp_port.unwrap_or(DEFAULT_SMTP_PORT),
            username: present(self.smtp_username.as_ref()).map(str::to_owned),
            password: present(self.smtp_password.as_ref())
                .map(|password| Zeroizing::new(password.to_owned())),
            from: from.to_owned(),
        })
    }

    /// SMS provider settings; `None` when any credential is missing.
    ///
    /// # Errors
    /// When `sms_endpoint` is not a URL.
    pub fn sms(&self) -> Result<Option<SmsConfig>, SettingsError> {
        let (Some(endpoint), Some(account), Some(token), Some(from)) = (
            present(self.sms_endpoint.as_ref()),
            present(self.sms_account.as_ref()),
            present(self.sms_token.as_ref()),
            present(self.sms_from.as_ref()),
        ) else {
            return Ok(None);
        };
        Ok(Some(SmsConfig {
            endpoint: parse_url("sms_endpoint", endpoint)?,
            account: account.to_owned(),
            token: Zeroizing::new(token.to_owned()),
            from: from.to_owned(),
        }))
    }

    /// # Errors
    /// When `fcm_endpoint` is not a URL.
    pub fn fcm(&self) -> Result<Option<FcmConfig>, SettingsError> {
        let Some(server_key) = present(self.fcm_server_key.as_ref()) else {
            return Ok(None);
        };
        let endpoint = present(self.fcm_endpoint.as_ref()).unwrap_or(DEFAULT_FCM_ENDPOINT);
        Ok(Some(FcmConfig {
            endpoint: parse_url("fcm_endpoint", endpoint)?,
            server_key: Zeroizing::new(server_key.to_owned()),
        }))
    }

    /// # Errors
    /// When `apns_endpoint` is not a URL.
    pub fn apns(&self) -> Result<Option<ApnsConfig>, SettingsError> {
        let (Some(cert_path), Some(key_path), Some(topic)) = (
            present(self.apns_cert_path.as_ref()),
            present(self.apns_key_path.as_ref()),
            present(self.apns_topic.as_ref()),
        ) else {
            return Ok(None);
        };
        let endpoint = present(self.apns_endpoint.as_ref()).unwrap_or(DEFAULT_APNS_ENDPOINT);
        Ok(Some(ApnsConfig {
            endpoint: parse_url("apns_endpoint", endpoint)?,
            cert_path: cert_path.to_owned(),
            key_path: key_path.to_owned(),
            topic: topic.to_owned(),
        }))
    }
}

//! Session cookie configuration.
//!
//! Resolves the cookie signing key from the configured key file and applies
//! the build-mode rules: release builds need at least 64 bytes of key
//! material and may only fall back to a generated key when explicitly allowed.
//! Debug builds still need the 32 bytes key derivation requires.

use actix_web::cookie::Key;
use std::path::PathBuf;
use tracing::{info, warn};
use zeroize::Zeroize;

use crate::settings::FleetSettings;

pub mod fingerprint;

use fingerprint::key_fingerprint;

const SESSION_KEY_MIN_LEN: usize = 64;
const DERIVE_MIN_LEN: usize = 32;

/// Build mode for session configuration validation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BuildMode {
    /// Debug builds tolerate a missing key file.
    Debug,
    /// Release builds require real key material.
    Release,
}

impl BuildMode {
    /// Determine the build mode from `cfg!(debug_assertions)`.
    #[must_use]
    pub fn from_debug_assertions() -> Self {
        if cfg!(debug_assertions) {
            Self::Debug
        } else {
            Self::Release
        }
    }

    fn is_debug(self) -> bool {
        matches!(self, Self::Debug)
    }

    fn min_key_len(self) -> usize {
        match self {
            Self::Debug => DERIVE_MIN_LEN,
            Self::Release => SESSION_KEY_MIN_LEN,
        }
    }
}

/// Session settings derived from configuration.
pub struct SessionSettings {
    /// Signing and encryption key for cookie sessions.
    pub key: Key,
    /// Whether session cookies are marked `Secure`.
    pub cookie_secure: bool,
}

/// Errors raised while resolving the session key.
#[derive(thiserror::Error, Debug)]
pub enum SessionConfigError {
    /// Reading the session key file failed.
    #[error("failed to read session key at {path}: {source}")]
    KeyRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The session key file exists but is too short for the build mode.
    #[error("session key at {path} too short: need >= {min_len} bytes, got {length}")]
    KeyTooShort {
        path: PathBuf,
        length: usize,
        min_len: usize,
    },
}

/// Resolve cookie session settings.
///
/// # Examples
///
/// ```rust
/// use busfleet::inbound::http::session_config::{BuildMode, session_settings};
/// use busfleet::settings::FleetSettings;
///
/// let settings = FleetSettings {
///     session_key_file: Some("/nonexistent/session_key".into()),
///     ..FleetSettings::default()
/// };
/// let session = session_settings(&settings, BuildMode::Debug).expect("ephemeral key");
/// assert!(session.cookie_secure);
/// ```
///
/// # Errors
/// [`SessionConfigError`] when a release build has no usable key.
pub fn session_settings(
    settings: &FleetSettings,
    mode: BuildMode,
) -> Result<SessionSettings, SessionConfigError> {
    let cookie_secure = settings.session_cookie_secure();
    if !cookie_secure && !mode.is_debug() {
        warn!("session cookies are not marked Secure");
    }
    let key = session_key(settings.session_key_file(), settings.session_allow_ephemeral, mode)?;
    info!(fingerprint = %key_fingerprint(&key), "session key loaded");
    Ok(SessionSettings { key, cookie_secure })
}

fn session_key(
    path: PathBuf,
    allow_ephemeral: bool,
    mode: BuildMode,
) -> Result<Key, SessionConfigError> {
    match std::fs::read(&path) {
        Ok(mut bytes) => {
            let length = bytes.len();
            let min_len = mode.min_key_len();
            if length < min_len {
                bytes.zeroize();
                return Err(SessionConfigError::KeyTooShort {
                    path,
                    length,
                    min_len,
                });
            }
            let key = Key::derive_from(&bytes);
            bytes.zeroize();
            Ok(key)
        }
        Err(error) => {
            if mode.is_debug() || allow_ephemeral {
                warn!(
                    path = %path.display(),
                    error = %error,
                    "using temporary session key (dev only)"
                );
                Ok(Key::generate())
            } else {
                Err(SessionConfigError::KeyRead {
                    path,
                    source: error,
                })
            }
        }
    }
}

//! Loggable identity of the session key.
//!
//! Operators compare fingerprints across replicas to confirm they share one
//! key; the key material itself never reaches the logs.

use actix_web::cookie::Key;
use sha2::{Digest, Sha256};

/// Bytes of the SHA-256 digest kept in the fingerprint.
const FINGERPRINT_BYTES: usize = 8;

/// Lowercase hex of the first 8 bytes of SHA-256 over the signing half of `key`.
///
/// ```rust
/// use actix_web::cookie::Key;
/// use busfleet::inbound::http::session_config::fingerprint::key_fingerprint;
///
/// let fp = key_fingerprint(&Key::derive_from(&[7; 64]));
/// assert_eq!(fp.len(), 16);
/// ```
#[must_use]
pub fn key_fingerprint(key: &Key) -> String {
    let digest = Sha256::digest(key.signing());
    hex::encode(&digest[..FINGERPRINT_BYTES])
}

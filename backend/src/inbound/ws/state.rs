//! Shared WebSocket adapter state.

use std::sync::Arc;
use std::time::Duration;

use mockable::Clock;
use url::Url;

use crate::domain::FanoutBus;

/// Origins allowed to open the WebSocket mirror.
///
/// Entries are compared on scheme, host and port; paths are ignored.
#[derive(Debug, Clone, Default)]
pub struct AllowedOrigins(Arc<[Url]>);

impl AllowedOrigins {
    /// Parse a comma separated list, skipping blank or malformed entries.
    ///
    /// # Examples
    /// ```
    /// use busfleet::inbound::ws::state::AllowedOrigins;
    /// use url::Url;
    ///
    /// let origins = AllowedOrigins::parse("http://localhost:3000, https://fleet.example.org");
    /// assert!(origins.allows(&Url::parse("https://fleet.example.org").unwrap()));
    /// assert!(!origins.allows(&Url::parse("https://evil.example").unwrap()));
    /// ```
    pub fn parse(raw: &str) -> Self {
        let origins: Vec<Url> = raw
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .filter_map(|entry| match Url::parse(entry) {
                Ok(url) => Some(url),
                Err(error) => {
                    tracing::warn!(origin = entry, error = %error, "ignoring malformed origin");
                    None
                }
            })
            .collect();
        Self(origins.into())
    }

    pub fn allows(&self, origin: &Url) -> bool {
        self.0.iter().any(|allowed| {
            allowed.scheme() == origin.scheme()
                && allowed.host_str() == origin.host_str()
                && allowed.port_or_known_default() == origin.port_or_known_default()
        })
    }
}

/// Dependency bundle for the WebSocket entry point.
#[derive(Clone)]
pub struct WsState {
    pub bus: Arc<FanoutBus>,
    pub clock: Arc<dyn Clock>,
    pub origins: AllowedOrigins,
    pub heartbeat_interval: Duration,
}

impl WsState {
    pub fn new(
        bus: Arc<FanoutBus>,
        clock: Arc<dyn Clock>,
        origins: AllowedOrigins,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            bus,
            clock,
            origins,
            heartbeat_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("http://localhost:3000", true)]
    #[case("http://localhost:4000", false)]
    #[case("https://fleet.example.org", true)]
    #[case("https://fleet.example.org:443", true)]
    #[case("http://fleet.example.org", false)]
    #[case("https://fleet.example.org.evil.com", false)]
    fn matches_scheme_host_and_port(#[case] origin: &str, #[case] expected: bool) {
        let origins = AllowedOrigins::parse("http://localhost:3000,https://fleet.example.org/");
        let origin = Url::parse(origin).expect("url should parse");
        assert_eq!(origins.allows(&origin), expected);
    }

    #[rstest]
    fn malformed_entries_are_skipped() {
        let origins = AllowedOrigins::parse("not a url, ,http://localhost:3000");
        assert!(origins.allows(&Url::parse("http://localhost:3000").expect("url")));
    }
}

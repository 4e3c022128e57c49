//! Zones of the backend and what each may not reach.

use camino::Utf8Path;

use crate::paths::Target;

/// Region of `backend/src` a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    /// `domain/**`: fleet logic and ports.
    Domain,
    /// `inbound/http/**`: REST and SSE handlers.
    Http,
    /// `inbound/ws/**`: the WebSocket mirror.
    Ws,
    /// `inbound/mod.rs`.
    InboundRoot,
    /// `outbound/persistence/**`: Diesel repositories.
    Persistence,
    /// `outbound/channels/**`: SMTP, SMS and push senders.
    Channels,
    /// `outbound/mod.rs`.
    OutboundRoot,
}

impl Zone {
    /// Zone of a path relative to `backend/src`.
    pub fn of(file: &Utf8Path) -> Option<Self> {
        let mut parts = file.components().map(|part| part.as_str());
        let zone = match (parts.next()?, parts.next()?) {
            ("domain", _) => Self::Domain,
            ("inbound", "http") => Self::Http,
            ("inbound", "ws") => Self::Ws,
            ("inbound", "mod.rs") => Self::InboundRoot,
            ("outbound", "persistence") => Self::Persistence,
            ("outbound", "channels") => Self::Channels,
            ("outbound", "mod.rs") => Self::OutboundRoot,
            _ => return None,
        };
        Some(zone)
    }

    const fn is_inbound(self) -> bool {
        matches!(self, Self::Http | Self::Ws | Self::InboundRoot)
    }

    const fn is_outbound(self) -> bool {
        matches!(self, Self::Persistence | Self::Channels | Self::OutboundRoot)
    }
}

const WEB_CRATES: &[&str] = &[
    "actix",
    "actix_service",
    "actix_session",
    "actix_web",
    "actix_ws",
    "awc",
    "utoipa",
    "utoipa_swagger_ui",
];
const STORAGE_CRATES: &[&str] = &["diesel", "diesel_async", "diesel_migrations"];
const DELIVERY_CRATES: &[&str] = &["lettre", "reqwest"];

#[derive(Debug, Clone, Copy)]
enum Forbidden {
    /// `crate::` module prefixes, written with `::`.
    Modules(&'static [&'static str]),
    /// External crate roots.
    Crates(&'static [&'static str]),
}

/// One boundary rule.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub id: &'static str,
    pub reason: &'static str,
    scope: fn(Zone) -> bool,
    forbidden: Forbidden,
}

impl Rule {
    /// Whether files in `zone` are held to this rule.
    pub fn covers(&self, zone: Zone) -> bool {
        (self.scope)(zone)
    }

    /// The forbidden module prefix or crate `target` reaches, if any.
    pub(crate) fn breached_by(&self, target: &Target) -> Option<String> {
        match (self.forbidden, target) {
            (Forbidden::Modules(prefixes), Target::Internal(segments)) => prefixes
                .iter()
                .find(|prefix| starts_with(segments, prefix))
                .map(|prefix| format!("crate::{prefix}")),
            (Forbidden::Crates(crates), Target::External(name)) => crates
                .iter()
                .find(|forbidden| **forbidden == name.as_str())
                .map(|forbidden| (*forbidden).to_owned()),
            _ => None,
        }
    }
}

fn starts_with(segments: &[String], prefix: &str) -> bool {
    let mut segments = segments.iter();
    prefix
        .split("::")
        .all(|part| segments.next().is_some_and(|segment| segment == part))
}

/// Every rule the lint enforces.
pub const RULES: &[Rule] = &[
    Rule {
        id: "domain-adapters",
        reason: "the domain reaches adapters only through its ports",
        scope: |zone| matches!(zone, Zone::Domain),
        forbidden: Forbidden::Modules(&["inbound", "outbound", "middleware", "settings"]),
    },
    Rule {
        id: "domain-web",
        reason: "HTTP and OpenAPI types stay in inbound adapters",
        scope: |zone| matches!(zone, Zone::Domain),
        forbidden: Forbidden::Crates(WEB_CRATES),
    },
    Rule {
        id: "domain-storage",
        reason: "storage goes through repository ports",
        scope: |zone| matches!(zone, Zone::Domain),
        forbidden: Forbidden::Crates(STORAGE_CRATES),
    },
    Rule {
        id: "domain-delivery",
        reason: "delivery goes through the ChannelSender port",
        scope: |zone| matches!(zone, Zone::Domain),
        forbidden: Forbidden::Crates(DELIVERY_CRATES),
    },
    Rule {
        id: "inbound-outbound",
        reason: "handlers receive adapters as ports from the server wiring",
        scope: Zone::is_inbound,
        forbidden: Forbidden::Modules(&["outbound"]),
    },
    Rule {
        id: "inbound-infrastructure",
        reason: "handlers neither query the database nor send messages",
        scope: Zone::is_inbound,
        forbidden: Forbidden::Crates(&[
            "diesel",
            "diesel_async",
            "diesel_migrations",
            "lettre",
            "reqwest",
        ]),
    },
    Rule {
        id: "http-ws",
        reason: "the WebSocket mirror builds on HTTP sessions, not the reverse",
        scope: |zone| matches!(zone, Zone::Http),
        forbidden: Forbidden::Modules(&["inbound::ws"]),
    },
    Rule {
        id: "outbound-inbound",
        reason: "adapters do not call back into handlers",
        scope: Zone::is_outbound,
        forbidden: Forbidden::Modules(&["inbound", "middleware"]),
    },
    Rule {
        id: "outbound-web",
        reason: "adapters are independent of the web framework",
        scope: Zone::is_outbound,
        forbidden: Forbidden::Crates(WEB_CRATES),
    },
    Rule {
        id: "persistence-channels",
        reason: "repositories store deliveries; they do not send them",
        scope: |zone| matches!(zone, Zone::Persistence),
        forbidden: Forbidden::Modules(&["outbound::channels"]),
    },
    Rule {
        id: "persistence-delivery",
        reason: "repositories store deliveries; they do not send them",
        scope: |zone| matches!(zone, Zone::Persistence),
        forbidden: Forbidden::Crates(DELIVERY_CRATES),
    },
    Rule {
        id: "channels-persistence",
        reason: "senders record outcomes through the notification repository port",
        scope: |zone| matches!(zone, Zone::Channels),
        forbidden: Forbidden::Modules(&["outbound::persistence"]),
    },
    Rule {
        id: "channels-storage",
        reason: "senders record outcomes through the notification repository port",
        scope: |zone| matches!(zone, Zone::Channels),
        forbidden: Forbidden::Crates(STORAGE_CRATES),
    },
];

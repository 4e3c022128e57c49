//! Inbound adapters that translate external requests into domain service
//! calls while keeping framework details at the edge.
//!
//! REST endpoints and the server-sent event stream live under [`http`]; the
//! WebSocket mirror of the fan-out bus lives under [`ws`].

pub mod http;
pub mod ws;

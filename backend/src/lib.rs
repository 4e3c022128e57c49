//! Fleet telemetry, route deviation and notification core.
//!
//! The crate is split along hexagonal lines: [`domain`] holds the services
//! and ports, [`inbound`] the HTTP, SSE and WebSocket adapters, and
//! [`outbound`] the Diesel repositories and delivery channels.

pub mod doc;
pub mod domain;
pub mod inbound;
pub mod middleware;
pub mod outbound;
pub mod settings;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

/// Public OpenAPI surface used by Swagger UI and tooling.
pub use doc::ApiDoc;
pub use middleware::Trace;

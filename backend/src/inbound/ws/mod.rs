//! WebSocket inbound adapter mirroring the live event stream.
//!
//! Responsibilities:
//! - validate upgrade requests (origin allow-list, session)
//! - hand each connection a bus subscription and relay its events
//! - keep WebSocket-specific concerns at the edge of the system

use actix_web::web::{self, Payload};
use actix_web::{
    HttpRequest, HttpResponse, get,
    http::header::{HeaderValue, ORIGIN},
};
use tracing::{debug, error, warn};
use url::Url;

use crate::inbound::http::session::SessionContext;

mod session;

pub mod state;

/// Handle WebSocket upgrade for the `/ws` endpoint.
///
/// The origin is checked before the session so cross-site probes learn
/// nothing about authentication state.
#[get("/ws")]
pub async fn ws_entry(
    state: web::Data<state::WsState>,
    session: SessionContext,
    req: HttpRequest,
    stream: Payload,
) -> actix_web::Result<HttpResponse> {
    let mut origin_iter = req.headers().get_all(ORIGIN);
    let origin_header = origin_iter.next().ok_or_else(|| {
        error!("Missing Origin header on WebSocket upgrade");
        actix_web::error::ErrorForbidden("Origin not allowed")
    })?;
    if origin_iter.next().is_some() {
        error!("Multiple Origin headers on WebSocket upgrade");
        return Err(actix_web::error::ErrorBadRequest("Invalid Origin header"));
    }

    validate_origin(&state.origins, origin_header)?;
    let viewer = session.require_user()?;

    let (response, ws_session, messages) = actix_ws::handle(&req, stream).map_err(|error| {
        warn!(error = %error, "WebSocket handshake rejected");
        actix_web::error::ErrorBadRequest("WebSocket upgrade required")
    })?;
    let subscription = state.bus.subscribe(viewer, state.clock.utc());
    debug!(subscriber = subscription.id(), "websocket mirror opened");
    actix_web::rt::spawn(session::handle_ws_session(
        subscription,
        state.heartbeat_interval,
        ws_session,
        messages,
    ));
    Ok(response)
}

fn validate_origin(
    allowed: &state::AllowedOrigins,
    origin_header: &HeaderValue,
) -> actix_web::Result<()> {
    let origin_value = match origin_header.to_str() {
        Ok(value) => value,
        Err(error) => {
            error!(error = %error, "Failed to parse Origin header as string");
            return Err(actix_web::error::ErrorBadRequest("Invalid Origin header"));
        }
    };

    let origin = Url::parse(origin_value).map_err(|error| {
        error!(error = %error, "Failed to parse Origin header as URL");
        actix_web::error::ErrorBadRequest("Invalid Origin header")
    })?;

    if allowed.allows(&origin) {
        Ok(())
    } else {
        warn!(
            origin = origin_value,
            "Rejected WS upgrade due to disallowed Origin"
        );
        Err(actix_web::error::ErrorForbidden("Origin not allowed"))
    }
}

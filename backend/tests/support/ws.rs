//! WebSocket-focused test helpers.
//!
//! Integration tests under `backend/tests/` compile as separate crates, so
//! the session and upgrade plumbing lives here instead of being copied.

use std::sync::Arc;
use std::time::Duration;

use actix_session::SessionMiddleware;
use actix_session::storage::CookieSessionStore;
use actix_web::cookie::{Cookie, Key};
use actix_web::test::TestRequest;
use actix_web::{HttpResponse, http::header, web};
use busfleet::domain::{AuthUser, FanoutBus, Role, UserId};
use busfleet::inbound::http::session::SessionContext;
use busfleet::inbound::ws::state::{AllowedOrigins, WsState};
use busfleet::test_support::MutableClock;
use chrono::Utc;

// Example Sec-WebSocket-Key from RFC 6455 section 1.3.
const RFC6455_SAMPLE_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

pub const ALLOWED_ORIGINS: &str = "http://localhost:3000,https://fleet.example.org";

/// Build a `WsState` over a fresh bus with the test allow-list.
pub fn ws_state(bus: Arc<FanoutBus>) -> WsState {
    WsState::new(
        bus,
        Arc::new(MutableClock::new(Utc::now())),
        AllowedOrigins::parse(ALLOWED_ORIGINS),
        Duration::from_secs(30),
    )
}

pub fn session_middleware(key: Key) -> SessionMiddleware<CookieSessionStore> {
    SessionMiddleware::builder(CookieSessionStore::default(), key)
        .cookie_name("session".to_owned())
        .cookie_secure(false)
        .build()
}

/// `POST /test-login/{role}/{user_id}` writes the session cookie.
pub fn configure_login(cfg: &mut web::ServiceConfig) {
    cfg.route(
        "/test-login/{role}/{user_id}",
        web::post().to(
            |session: SessionContext, path: web::Path<(String, String)>| async move {
                let (role, user_id) = path.into_inner();
                let role: Role = role.parse().map_err(actix_web::error::ErrorBadRequest)?;
                let user_id = UserId::new(user_id).map_err(actix_web::error::ErrorBadRequest)?;
                session.persist_user(&AuthUser::new(user_id, role))?;
                Ok::<_, actix_web::Error>(HttpResponse::NoContent().finish())
            },
        ),
    );
}

pub fn login_request(user_id: &str, role: &str) -> TestRequest {
    TestRequest::post().uri(&format!("/test-login/{role}/{user_id}"))
}

/// The session cookie set by a login response.
pub fn session_cookie<B>(response: &actix_web::dev::ServiceResponse<B>) -> Cookie<'static> {
    response
        .response()
        .cookies()
        .find(|cookie| cookie.name() == "session")
        .map(Cookie::into_owned)
        .expect("login sets the session cookie")
}

pub fn handshake_request() -> TestRequest {
    TestRequest::get()
        .uri("/ws")
        .insert_header((header::UPGRADE, "websocket"))
        .insert_header((header::CONNECTION, "Upgrade"))
        .insert_header((header::SEC_WEBSOCKET_VERSION, "13"))
        .insert_header((header::SEC_WEBSOCKET_KEY, RFC6455_SAMPLE_KEY))
}

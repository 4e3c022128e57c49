//! Session helpers to keep HTTP handlers free of framework-specific logic.
//!
//! Provides a thin wrapper around Actix sessions so handlers only deal with
//! domain-friendly operations such as resolving the authenticated caller.
//! The login flow that writes these keys lives in the surrounding platform.

use actix_session::Session;
use actix_web::{FromRequest, HttpRequest, dev::Payload};
use futures_util::future::LocalBoxFuture;
use tracing::warn;

use crate::domain::{AuthUser, Error, Role, UserId};

pub(crate) const USER_ID_KEY: &str = "user_id";
pub(crate) const ROLE_KEY: &str = "role";

/// Newtype wrapper that exposes higher-level session operations.
#[derive(Clone)]
pub struct SessionContext(Session);

impl SessionContext {
    /// Construct a new wrapper from the underlying Actix session.
    pub fn new(session: Session) -> Self {
        Self(session)
    }

    /// Persist the caller's id and role in the session cookie.
    pub fn persist_user(&self, user: &AuthUser) -> Result<(), Error> {
        self.0
            .insert(USER_ID_KEY, user.user_id.as_str())
            .and_then(|()| self.0.insert(ROLE_KEY, user.role.as_str()))
            .map_err(|error| Error::internal(format!("failed to persist session: {error}")))
    }

    /// Resolve the caller from the session, if present and well formed.
    ///
    /// A tampered id or role is logged and treated as an anonymous session.
    pub fn auth_user(&self) -> Result<Option<AuthUser>, Error> {
        let read = |key: &str| {
            self.0
                .get::<String>(key)
                .map_err(|error| Error::internal(format!("failed to read session: {error}")))
        };
        let (Some(raw_id), Some(raw_role)) = (read(USER_ID_KEY)?, read(ROLE_KEY)?) else {
            return Ok(None);
        };
        let user_id = match UserId::new(raw_id) {
            Ok(id) => id,
            Err(error) => {
                warn!("invalid user id in session cookie: {error}");
                return Ok(None);
            }
        };
        match raw_role.parse::<Role>() {
            Ok(role) => Ok(Some(AuthUser::new(user_id, role))),
            Err(error) => {
                warn!(user_id = %user_id, "invalid role in session cookie: {error}");
                Ok(None)
            }
        }
    }

    /// Require an authenticated caller or return `401 Unauthorized`.
    pub fn require_user(&self) -> Result<AuthUser, Error> {
        self.auth_user()?
            .ok_or_else(|| Error::unauthorized("login required"))
    }

    /// Require a manager or return `403 Forbidden` (`401` when anonymous).
    pub fn require_manager(&self) -> Result<AuthUser, Error> {
        let user = self.require_user()?;
        if user.is_manager() {
            Ok(user)
        } else {
            Err(Error::forbidden("manager role required"))
        }
    }
}

impl FromRequest for SessionContext {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let fut = Session::from_request(req, payload);
        Box::pin(async move { fut.await.map(SessionContext::new) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_session::Session;
    use actix_web::http::StatusCode;
    use actix_web::{App, HttpResponse, test, web};

    use crate::inbound::http::test_utils::{login_cookie, test_session_middleware};

    fn session_test_app() -> App<
        impl actix_web::dev::ServiceFactory<
            actix_web::dev::ServiceRequest,
            Config = (),
            Response = actix_web::dev::ServiceResponse,
            Error = actix_web::Error,
            InitError = (),
        >,
    > {
        App::new()
            .wrap(test_session_middleware())
            .configure(crate::inbound::http::test_utils::configure_test_login)
            .route(
                "/whoami",
                web::get().to(|session: SessionContext| async move {
                    let user = session.require_user()?;
                    Ok::<_, Error>(HttpResponse::Ok().body(format!("{}:{}", user.user_id, user.role)))
                }),
            )
            .route(
                "/manage",
                web::get().to(|session: SessionContext| async move {
                    session.require_manager()?;
                    Ok::<_, Error>(HttpResponse::Ok())
                }),
            )
    }

    #[actix_web::test]
    async fn round_trips_user_and_role() {
        let app = test::init_service(session_test_app()).await;
        let cookie = login_cookie(&app, "driver1", Role::Driver).await;

        let res = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/whoami")
                .cookie(cookie)
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = test::read_body(res).await;
        assert_eq!(body, "driver1:driver");
    }

    #[actix_web::test]
    async fn anonymous_callers_are_unauthorised() {
        let app = test::init_service(session_test_app()).await;
        let res =
            test::call_service(&app, test::TestRequest::get().uri("/whoami").to_request()).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn drivers_are_forbidden_from_manager_routes() {
        let app = test::init_service(session_test_app()).await;
        let driver = login_cookie(&app, "driver1", Role::Driver).await;
        let manager = login_cookie(&app, "manager1", Role::Manager).await;

        let denied = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/manage")
                .cookie(driver)
                .to_request(),
        )
        .await;
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);

        let allowed = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/manage")
                .cookie(manager)
                .to_request(),
        )
        .await;
        assert_eq!(allowed.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn tampered_role_is_unauthorised() {
        let app = test::init_service(session_test_app().route(
            "/set-invalid",
            web::get().to(|session: Session| async move {
                session
                    .insert(USER_ID_KEY, "driver1")
                    .expect("set user id");
                session.insert(ROLE_KEY, "admin").expect("set role");
                HttpResponse::Ok()
            }),
        ))
        .await;

        let set_res = test::call_service(
            &app,
            test::TestRequest::get().uri("/set-invalid").to_request(),
        )
        .await;
        let cookie = set_res
            .response()
            .cookies()
            .find(|cookie| cookie.name() == "session")
            .expect("session cookie set")
            .into_owned();

        let res = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/whoami")
                .cookie(cookie)
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}

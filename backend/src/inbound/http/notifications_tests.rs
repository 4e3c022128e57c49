//! Tests for notification HTTP handlers.

use super::*;
use crate::domain::notifications::{Notification, NotificationDraft, Recipient};
use crate::domain::ports::{InboxRepository as _, NotificationRepository as _};
use crate::domain::{Role, UserId};
use crate::inbound::http::test_utils::{
    TestFleet, configure_test_login, login_cookie, test_session_middleware,
};
use actix_web::cookie::Cookie;
use actix_web::http::StatusCode;
use actix_web::{App, test as actix_test};
use mockable::Clock as _;
use rstest::rstest;
use serde_json::Value;

fn test_app(
    data: web::Data<HttpState>,
) -> App<
    impl actix_web::dev::ServiceFactory<
        actix_web::dev::ServiceRequest,
        Config = (),
        Response = actix_web::dev::ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    App::new()
        .app_data(data)
        .wrap(test_session_middleware())
        .configure(configure_test_login)
        .service(
            web::scope("/api/v1")
                .service(notification_history)
                .service(unread_count)
                .service(mark_all_read)
                .service(get_preferences)
                .service(update_preferences)
                .service(send_test)
                .service(mark_read)
                .service(list_inbox),
        )
}

async fn seed_inbox(fleet: &TestFleet, user: &str, subjects: &[&str]) -> Vec<Notification> {
    let user_id = UserId::new(user).expect("valid id");
    let mut stored = Vec::new();
    for subject in subjects {
        let notification = NotificationDraft::new(NotificationType::SystemAlert, *subject, "body")
            .recipients(vec![Recipient::new(user_id.clone())])
            .into_notification(fleet.clock.utc())
            .expect("valid draft");
        fleet
            .notifications
            .insert(&notification)
            .await
            .expect("insert");
        fleet
            .inbox
            .add(&notification.id, &user_id, fleet.clock.utc())
            .await
            .expect("add");
        fleet.clock.advance_seconds(1);
        stored.push(notification);
    }
    stored
}

fn get(cookie: &Cookie<'static>, uri: &str) -> actix_http::Request {
    actix_test::TestRequest::get()
        .uri(uri)
        .cookie(cookie.clone())
        .to_request()
}

fn post(cookie: &Cookie<'static>, uri: &str) -> actix_http::Request {
    actix_test::TestRequest::post()
        .uri(uri)
        .cookie(cookie.clone())
        .to_request()
}

#[rstest]
#[case("", 10)]
#[case("?limit=3", 3)]
#[case("?limit=0", 10)]
#[case("?limit=51", 10)]
#[case("?limit=many", 10)]
#[actix_web::test]
async fn inbox_limit_falls_back_to_default(#[case] query: &str, #[case] expected: usize) {
    let fleet = TestFleet::new();
    let subjects: Vec<String> = (0..12).map(|i| format!("alert {i}")).collect();
    let subjects: Vec<&str> = subjects.iter().map(String::as_str).collect();
    seed_inbox(&fleet, "driver1", &subjects).await;
    let app = actix_test::init_service(test_app(fleet.data())).await;
    let cookie = login_cookie(&app, "driver1", Role::Driver).await;

    let res = actix_test::call_service(&app, get(&cookie, &format!("/api/v1/notifications{query}"))).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = actix_test::read_body_json(res).await;
    let items = body.as_array().expect("array");
    assert_eq!(items.len(), expected);
    assert_eq!(items[0]["subject"], "alert 11");
    assert_eq!(items[0]["read"], false);
}

#[actix_web::test]
async fn reading_entries_updates_the_unread_count() {
    let fleet = TestFleet::new();
    let stored = seed_inbox(&fleet, "driver1", &["one", "two", "three"]).await;
    let app = actix_test::init_service(test_app(fleet.data())).await;
    let cookie = login_cookie(&app, "driver1", Role::Driver).await;
    let count = |body: Value| body["count"].as_u64();

    let res = actix_test::call_service(&app, get(&cookie, "/api/v1/notifications/unread-count")).await;
    assert_eq!(count(actix_test::read_body_json(res).await), Some(3));

    let res = actix_test::call_service(
        &app,
        post(&cookie, &format!("/api/v1/notifications/{}/read", stored[0].id)),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = actix_test::call_service(&app, get(&cookie, "/api/v1/notifications/unread-count")).await;
    assert_eq!(count(actix_test::read_body_json(res).await), Some(2));

    let res = actix_test::call_service(&app, post(&cookie, "/api/v1/notifications/read-all")).await;
    let body: Value = actix_test::read_body_json(res).await;
    assert_eq!(body["updated"], 2);

    let res = actix_test::call_service(&app, get(&cookie, "/api/v1/notifications/unread-count")).await;
    assert_eq!(count(actix_test::read_body_json(res).await), Some(0));
}

#[actix_web::test]
async fn other_users_entries_are_not_found() {
    let fleet = TestFleet::new();
    let stored = seed_inbox(&fleet, "driver1", &["private"]).await;
    let app = actix_test::init_service(test_app(fleet.data())).await;
    let cookie = login_cookie(&app, "driver2", Role::Driver).await;
    let res = actix_test::call_service(
        &app,
        post(&cookie, &format!("/api/v1/notifications/{}/read", stored[0].id)),
    )
    .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn preferences_default_then_round_trip() {
    let fleet = TestFleet::new();
    let app = actix_test::init_service(test_app(fleet.data())).await;
    let cookie = login_cookie(&app, "driver1", Role::Driver).await;

    let res = actix_test::call_service(&app, get(&cookie, "/api/v1/notifications/preferences")).await;
    let defaults: Value = actix_test::read_body_json(res).await;
    assert_eq!(defaults["email"], true);
    assert_eq!(defaults["timezone"], "UTC");
    assert!(defaults["quiet_hours"].is_null());

    let update = serde_json::json!({
        "email": true,
        "sms": false,
        "push": true,
        "quiet_hours": {"start": "22:00", "end": "07:00"},
        "types": {"schedule_reminder": false},
        "timezone": "America/New_York"
    });
    let res = actix_test::call_service(
        &app,
        actix_test::TestRequest::put()
            .uri("/api/v1/notifications/preferences")
            .cookie(cookie.clone())
            .set_json(&update)
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = actix_test::call_service(&app, get(&cookie, "/api/v1/notifications/preferences")).await;
    let stored: Value = actix_test::read_body_json(res).await;
    assert_eq!(stored, update);
}

#[rstest]
#[case(serde_json::json!({"start": "25:00", "end": "07:00"}), "UTC", "quiet_hours")]
#[case(serde_json::json!({"start": "22:00", "end": "7pm"}), "UTC", "quiet_hours")]
#[case(Value::Null, "Mars/Olympus", "timezone")]
#[actix_web::test]
async fn invalid_preferences_name_the_field(
    #[case] quiet_hours: Value,
    #[case] timezone: &str,
    #[case] field: &str,
) {
    let fleet = TestFleet::new();
    let app = actix_test::init_service(test_app(fleet.data())).await;
    let cookie = login_cookie(&app, "driver1", Role::Driver).await;
    let res = actix_test::call_service(
        &app,
        actix_test::TestRequest::put()
            .uri("/api/v1/notifications/preferences")
            .cookie(cookie)
            .set_json(serde_json::json!({
                "email": true,
                "sms": true,
                "push": true,
                "quiet_hours": quiet_hours,
                "timezone": timezone
            }))
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = actix_test::read_body_json(res).await;
    assert_eq!(body["details"]["field"], field);
}

#[actix_web::test]
async fn test_send_uses_enabled_channels_only() {
    let fleet = TestFleet::new();
    let app = actix_test::init_service(test_app(fleet.data())).await;
    let cookie = login_cookie(&app, "driver1", Role::Driver).await;
    let res = actix_test::call_service(
        &app,
        actix_test::TestRequest::put()
            .uri("/api/v1/notifications/preferences")
            .cookie(cookie.clone())
            .set_json(serde_json::json!({"email": false, "sms": false, "push": true}))
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = actix_test::call_service(&app, post(&cookie, "/api/v1/notifications/test")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = actix_test::read_body_json(res).await;
    let channels = body["channels"].as_array().expect("channels");
    assert!(channels.contains(&Value::from("push")));
    assert!(channels.contains(&Value::from("in_app")));
    assert!(!channels.contains(&Value::from("email")));
    assert_eq!(fleet.notifications.notifications().len(), 1);
}

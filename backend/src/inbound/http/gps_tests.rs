//! Tests for GPS HTTP handlers.

use super::*;
use crate::domain::{Role, UserId, VehicleId};
use crate::inbound::http::test_utils::{
    TestFleet, configure_test_login, login_cookie, test_session_middleware,
};
use actix_web::cookie::Cookie;
use actix_web::http::StatusCode;
use actix_web::{App, test as actix_test};
use rstest::rstest;
use serde_json::{Value, json};

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
                .service(update_gps)
                .service(gps_status)
                .service(toggle_gps)
                .service(fleet_locations)
                .service(vehicle_location)
                .service(vehicle_locations),
        )
}

fn update(cookie: &Cookie<'static>, body: Value) -> actix_http::Request {
    actix_test::TestRequest::post()
        .uri("/api/v1/gps/update")
        .cookie(cookie.clone())
        .set_json(body)
        .to_request()
}

fn get(cookie: &Cookie<'static>, uri: &str) -> actix_http::Request {
    actix_test::TestRequest::get()
        .uri(uri)
        .cookie(cookie.clone())
        .to_request()
}

#[actix_web::test]
async fn ingest_stores_and_caches_the_sample() {
    let fleet = TestFleet::new();
    let app = actix_test::init_service(test_app(fleet.data())).await;
    let driver = login_cookie(&app, "driver1", Role::Driver).await;

    let res = actix_test::call_service(
        &app,
        update(
            &driver,
            json!({
                "vehicle_id": "BUS-1",
                "latitude": 40.0,
                "longitude": -74.0,
                "speed": 25.0,
                "heading": 90.0,
                "route_id": "R1"
            }),
        ),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = actix_test::read_body_json(res).await;
    assert_eq!(body, json!({"status": "success"}));
    assert_eq!(fleet.positions.all().len(), 1);

    let res = actix_test::call_service(&app, get(&driver, "/api/v1/vehicles/BUS-1/location")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = actix_test::read_body_json(res).await;
    assert_eq!(body["driver_id"], "driver1");
    assert_eq!(body["status"], "active");
    assert_eq!(body["timestamp"], "2025-03-03T08:00:00Z");
}

#[rstest]
#[case(json!({"latitude": 40.0, "longitude": -74.0}))]
#[case(json!({"vehicle_id": "  ", "latitude": 40.0, "longitude": -74.0}))]
#[case(json!({"vehicle_id": "BUS-1", "longitude": -74.0}))]
#[case(json!({"vehicle_id": "BUS-1", "latitude": 95.0, "longitude": -74.0}))]
#[case(json!({"vehicle_id": "BUS-1", "latitude": 40.0, "longitude": -74.0, "status": "flying"}))]
#[actix_web::test]
async fn malformed_samples_are_rejected(#[case] body: Value) {
    let fleet = TestFleet::new();
    let app = actix_test::init_service(test_app(fleet.data())).await;
    let driver = login_cookie(&app, "driver1", Role::Driver).await;
    let res = actix_test::call_service(&app, update(&driver, body)).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(fleet.positions.all().is_empty());
}

#[actix_web::test]
async fn vehicles_assigned_elsewhere_are_refused() {
    let fleet = TestFleet::new();
    fleet.fleet.assign_driver(
        VehicleId::new("BUS-1").expect("valid id"),
        UserId::new("driver2").expect("valid id"),
    );
    let app = actix_test::init_service(test_app(fleet.data())).await;
    let driver = login_cookie(&app, "driver1", Role::Driver).await;
    let res = actix_test::call_service(
        &app,
        update(
            &driver,
            json!({"vehicle_id": "BUS-1", "latitude": 40.0, "longitude": -74.0}),
        ),
    )
    .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn toggle_is_manager_only_and_persists() {
    let fleet = TestFleet::new();
    let app = actix_test::init_service(test_app(fleet.data())).await;
    let driver = login_cookie(&app, "driver1", Role::Driver).await;
    let manager = login_cookie(&app, "manager1", Role::Manager).await;
    let toggle = |cookie: &Cookie<'static>| {
        actix_test::TestRequest::post()
            .uri("/api/v1/gps/toggle")
            .cookie(cookie.clone())
            .set_json(json!({"enabled": false}))
            .to_request()
    };

    let res = actix_test::call_service(&app, toggle(&driver)).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = actix_test::call_service(&app, get(&manager, "/api/v1/gps/status")).await;
    let body: Value = actix_test::read_body_json(res).await;
    assert_eq!(body["enabled"], true);
    assert_eq!(body["speed_unit"], "kmh");

    let res = actix_test::call_service(&app, toggle(&manager)).await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = actix_test::call_service(&app, get(&manager, "/api/v1/gps/status")).await;
    let body: Value = actix_test::read_body_json(res).await;
    assert_eq!(body["enabled"], false);
}

#[actix_web::test]
async fn drivers_see_only_their_own_vehicles() {
    let fleet = TestFleet::new();
    let app = actix_test::init_service(test_app(fleet.data())).await;
    let driver1 = login_cookie(&app, "driver1", Role::Driver).await;
    let driver2 = login_cookie(&app, "driver2", Role::Driver).await;
    let manager = login_cookie(&app, "manager1", Role::Manager).await;
    for (cookie, vehicle) in [(&driver1, "BUS-1"), (&driver2, "BUS-2")] {
        let res = actix_test::call_service(
            &app,
            update(
                cookie,
                json!({"vehicle_id": vehicle, "latitude": 40.0, "longitude": -74.0}),
            ),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    let res = actix_test::call_service(&app, get(&driver1, "/api/v1/gps/vehicles")).await;
    let body: Value = actix_test::read_body_json(res).await;
    assert_eq!(body.as_array().map(Vec::len), Some(1));
    assert_eq!(body[0]["vehicle_id"], "BUS-1");

    let res = actix_test::call_service(&app, get(&manager, "/api/v1/gps/vehicles")).await;
    let body: Value = actix_test::read_body_json(res).await;
    assert_eq!(body.as_array().map(Vec::len), Some(2));

    let res = actix_test::call_service(&app, get(&driver1, "/api/v1/vehicles/BUS-2/location")).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[rstest]
#[case("", StatusCode::OK)]
#[case("?start=2025-03-03T07:30:00Z&end=2025-03-03T08:30:00Z", StatusCode::OK)]
#[case("?start=yesterday", StatusCode::BAD_REQUEST)]
#[case("?start=2025-03-03T09:00:00Z&end=2025-03-03T08:00:00Z", StatusCode::BAD_REQUEST)]
#[case("?start=2025-02-01T00:00:00Z&end=2025-03-03T08:00:00Z", StatusCode::BAD_REQUEST)]
#[actix_web::test]
async fn history_windows_are_validated(#[case] query: &str, #[case] expected: StatusCode) {
    let fleet = TestFleet::new();
    let app = actix_test::init_service(test_app(fleet.data())).await;
    let manager = login_cookie(&app, "manager1", Role::Manager).await;
    let res = actix_test::call_service(
        &app,
        get(&manager, &format!("/api/v1/vehicles/BUS-1/locations{query}")),
    )
    .await;
    assert_eq!(res.status(), expected);
}

#[actix_web::test]
async fn unknown_vehicle_location_is_not_found() {
    let fleet = TestFleet::new();
    let app = actix_test::init_service(test_app(fleet.data())).await;
    let manager = login_cookie(&app, "manager1", Role::Manager).await;
    let res = actix_test::call_service(&app, get(&manager, "/api/v1/vehicles/BUS-9/location")).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

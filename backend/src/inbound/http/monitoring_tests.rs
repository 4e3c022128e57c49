//! Tests for route monitoring HTTP handlers.

use super::*;
use crate::domain::ports::DeviationRepository as _;
use crate::domain::{DeviationType, GeoPoint, Role, RouteId, Severity, Stop, UserId, VehicleId};
use crate::inbound::http::test_utils::{
    TestFleet, configure_test_login, login_cookie, test_session_middleware,
};
use actix_web::http::StatusCode;
use actix_web::{App, test as actix_test};
use mockable::Clock as _;
use rstest::{fixture, rstest};
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
                .service(start_monitoring)
                .service(stop_monitoring)
                .service(active_monitoring)
                .service(monitoring_stats)
                .service(get_monitor_settings)
                .service(update_monitor_settings)
                .service(resolve_deviation)
                .service(deviation_history),
        )
}

#[fixture]
fn fleet() -> TestFleet {
    let fleet = TestFleet::new();
    fleet.plans.insert(
        RouteId::new("R1").expect("valid id"),
        vec![
            Stop::new(1, "Depot", GeoPoint::new(40.0, -74.0)),
            Stop::new(2, "School", GeoPoint::new(40.05, -74.0)),
        ],
    );
    fleet
}

fn deviation(fleet: &TestFleet, driver: &str) -> Deviation {
    Deviation {
        id: None,
        vehicle_id: VehicleId::new("BUS-1").expect("valid id"),
        route_id: RouteId::new("R1").expect("valid id"),
        driver_id: UserId::new(driver).expect("valid id"),
        deviation_type: DeviationType::OffRoute,
        severity: Severity::Low,
        location: GeoPoint::new(40.003, -74.0),
        expected_location: Some(GeoPoint::new(40.0, -74.0)),
        distance_m: 333.0,
        duration_ms: 0,
        description: "Vehicle is 333m off route".into(),
        metadata: serde_json::Map::new(),
        auto_resolved: false,
        created_at: fleet.clock.utc(),
        resolved_at: None,
    }
}

#[rstest]
#[actix_web::test]
async fn driver_starts_own_session_and_sees_it(fleet: TestFleet) {
    let app = actix_test::init_service(test_app(fleet.data())).await;
    let cookie = login_cookie(&app, "driver1", Role::Driver).await;

    let res = actix_test::call_service(
        &app,
        actix_test::TestRequest::post()
            .uri("/api/v1/route-monitoring/start")
            .cookie(cookie.clone())
            .set_json(serde_json::json!({"vehicle_id": "BUS-1", "route_id": "R1"}))
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = actix_test::read_body_json(res).await;
    assert_eq!(body["driver_id"], "driver1");
    assert_eq!(body["status"], "on_route");
    assert_eq!(body["total_stops"], 2);

    let res = actix_test::call_service(
        &app,
        actix_test::TestRequest::get()
            .uri("/api/v1/route-monitoring/active")
            .cookie(cookie)
            .to_request(),
    )
    .await;
    let body: Value = actix_test::read_body_json(res).await;
    assert_eq!(body.as_array().map(Vec::len), Some(1));
}

#[rstest]
#[actix_web::test]
async fn drivers_cannot_start_for_someone_else(fleet: TestFleet) {
    let app = actix_test::init_service(test_app(fleet.data())).await;
    let cookie = login_cookie(&app, "driver1", Role::Driver).await;

    let res = actix_test::call_service(
        &app,
        actix_test::TestRequest::post()
            .uri("/api/v1/route-monitoring/start")
            .cookie(cookie)
            .set_json(serde_json::json!({
                "vehicle_id": "BUS-1",
                "route_id": "R1",
                "driver_id": "driver2"
            }))
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[rstest]
#[actix_web::test]
async fn second_start_conflicts_and_stop_is_idempotent(fleet: TestFleet) {
    let app = actix_test::init_service(test_app(fleet.data())).await;
    let cookie = login_cookie(&app, "manager1", Role::Manager).await;
    let start = || {
        actix_test::TestRequest::post()
            .uri("/api/v1/route-monitoring/start")
            .cookie(cookie.clone())
            .set_json(serde_json::json!({
                "vehicle_id": "BUS-1",
                "route_id": "R1",
                "driver_id": "driver1"
            }))
            .to_request()
    };
    assert_eq!(
        actix_test::call_service(&app, start()).await.status(),
        StatusCode::OK
    );
    assert_eq!(
        actix_test::call_service(&app, start()).await.status(),
        StatusCode::CONFLICT
    );

    for expected in [true, false] {
        let res = actix_test::call_service(
            &app,
            actix_test::TestRequest::post()
                .uri("/api/v1/route-monitoring/stop")
                .cookie(cookie.clone())
                .set_json(serde_json::json!({"vehicle_id": "BUS-1"}))
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = actix_test::read_body_json(res).await;
        assert_eq!(body["stopped"], expected);
    }
}

#[rstest]
#[actix_web::test]
async fn unknown_route_is_not_found(fleet: TestFleet) {
    let app = actix_test::init_service(test_app(fleet.data())).await;
    let cookie = login_cookie(&app, "manager1", Role::Manager).await;
    let res = actix_test::call_service(
        &app,
        actix_test::TestRequest::post()
            .uri("/api/v1/route-monitoring/start")
            .cookie(cookie)
            .set_json(serde_json::json!({"vehicle_id": "BUS-1", "route_id": "R9"}))
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[rstest]
#[actix_web::test]
async fn settings_updates_are_validated(fleet: TestFleet) {
    let app = actix_test::init_service(test_app(fleet.data())).await;
    let manager = login_cookie(&app, "manager1", Role::Manager).await;
    let driver = login_cookie(&app, "driver1", Role::Driver).await;
    let put = |cookie: &actix_web::cookie::Cookie<'static>, body: Value| {
        actix_test::TestRequest::put()
            .uri("/api/v1/route-monitoring/settings")
            .cookie(cookie.clone())
            .set_json(body)
            .to_request()
    };
    let valid = serde_json::json!({
        "deviation_radius_m": 150.0,
        "stop_duration_s": 120,
        "check_interval_s": 5
    });

    let res = actix_test::call_service(&app, put(&driver, valid.clone())).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = actix_test::call_service(
        &app,
        put(
            &manager,
            serde_json::json!({
                "deviation_radius_m": 0.0,
                "stop_duration_s": 120,
                "check_interval_s": 5
            }),
        ),
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = actix_test::call_service(&app, put(&manager, valid)).await;
    assert_eq!(res.status(), StatusCode::OK);
    let settings = fleet.state.monitor.settings();
    assert!((settings.deviation_radius_m - 150.0).abs() < f64::EPSILON);
    assert_eq!(settings.check_interval.as_secs(), 5);
}

#[rstest]
#[actix_web::test]
async fn managers_resolve_stored_deviations(fleet: TestFleet) {
    let id = fleet
        .deviations
        .insert(&deviation(&fleet, "driver1"))
        .await
        .expect("insert");
    let app = actix_test::init_service(test_app(fleet.data())).await;
    let cookie = login_cookie(&app, "manager1", Role::Manager).await;

    let res = actix_test::call_service(
        &app,
        actix_test::TestRequest::post()
            .uri(&format!("/api/v1/deviations/{id}/resolve"))
            .cookie(cookie.clone())
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = actix_test::read_body_json(res).await;
    assert_eq!(body["auto_resolved"], false);
    assert!(body["resolved_at"].is_string());

    let res = actix_test::call_service(
        &app,
        actix_test::TestRequest::post()
            .uri("/api/v1/deviations/abc/resolve")
            .cookie(cookie)
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[rstest]
#[case("hours=0", StatusCode::BAD_REQUEST)]
#[case("hours=721", StatusCode::BAD_REQUEST)]
#[case("hours=soon", StatusCode::BAD_REQUEST)]
#[case("hours=720", StatusCode::OK)]
#[case("", StatusCode::OK)]
#[actix_web::test]
async fn history_hours_are_bounded(
    fleet: TestFleet,
    #[case] query: &str,
    #[case] expected: StatusCode,
) {
    fleet
        .deviations
        .insert(&deviation(&fleet, "driver1"))
        .await
        .expect("insert");
    let app = actix_test::init_service(test_app(fleet.data())).await;
    let cookie = login_cookie(&app, "manager1", Role::Manager).await;
    let res = actix_test::call_service(
        &app,
        actix_test::TestRequest::get()
            .uri(&format!("/api/v1/vehicles/BUS-1/deviations?{query}"))
            .cookie(cookie)
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), expected);
    if expected == StatusCode::OK {
        let body: Value = actix_test::read_body_json(res).await;
        assert_eq!(body.as_array().map(Vec::len), Some(1));
    }
}

#[rstest]
#[actix_web::test]
async fn stats_require_a_manager(fleet: TestFleet) {
    let app = actix_test::init_service(test_app(fleet.data())).await;
    let driver = login_cookie(&app, "driver1", Role::Driver).await;
    let res = actix_test::call_service(
        &app,
        actix_test::TestRequest::get()
            .uri("/api/v1/route-monitoring/stats")
            .cookie(driver)
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = actix_test::call_service(
        &app,
        actix_test::TestRequest::get()
            .uri("/api/v1/route-monitoring/stats")
            .to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

//! Regression coverage for the fan-out bus.

use chrono::{TimeZone, Utc};
use rstest::{fixture, rstest};

use super::*;
use crate::domain::{Position, Role, UserId, VehicleId, VehicleStatus};

#[fixture]
fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 7, 0, 0)
        .single()
        .expect("valid time")
}

fn user(id: &str, role: Role) -> AuthUser {
    AuthUser::new(UserId::new(id).expect("valid id"), role)
}

fn gps(driver: &str, speed: f64) -> BusEvent {
    BusEvent::GpsUpdate(Position {
        vehicle_id: VehicleId::new("BUS-1").expect("valid id"),
        latitude: 40.0,
        longitude: -74.0,
        speed,
        heading: None,
        timestamp: Utc
            .with_ymd_and_hms(2025, 3, 1, 7, 0, 0)
            .single()
            .expect("valid time"),
        driver_id: UserId::new(driver).expect("valid id"),
        route_id: None,
        status: VehicleStatus::Active,
    })
}

fn speed_of(event: &BusEvent) -> Option<f64> {
    match event {
        BusEvent::GpsUpdate(position) => Some(position.speed),
        _ => None,
    }
}

#[rstest]
#[tokio::test]
async fn connected_comes_first_and_ignores_capacity(now: DateTime<Utc>) {
    let bus = FanoutBus::new(1);
    let mut sub = bus.subscribe(user("manager1", Role::Manager), now);
    bus.publish(&gps("driver1", 1.0));

    let first = sub.recv().await.expect("connected");
    assert_eq!(first.name(), "connected");
    let second = sub.recv().await.expect("gps update");
    assert_eq!(speed_of(&second), Some(1.0));
    assert_eq!(bus.subscriber_count(), 1);
}

#[rstest]
#[tokio::test]
async fn drivers_only_receive_their_own_positions(now: DateTime<Utc>) {
    let bus = FanoutBus::default();
    let mut own = bus.subscribe(user("driver1", Role::Driver), now);
    let mut other = bus.subscribe(user("driver2", Role::Driver), now);

    bus.publish(&gps("driver1", 12.0));
    bus.close();

    let mut own_names = Vec::new();
    while let Some(event) = own.recv().await {
        own_names.push(event.name());
    }
    let mut other_names = Vec::new();
    while let Some(event) = other.recv().await {
        other_names.push(event.name());
    }
    assert_eq!(own_names, ["connected", "gps_update", "shutdown"]);
    assert_eq!(other_names, ["connected", "shutdown"]);
}

#[rstest]
#[tokio::test]
async fn subscriber_sees_publishes_in_order(now: DateTime<Utc>) {
    let bus = FanoutBus::new(8);
    let mut sub = bus.subscribe(user("manager1", Role::Manager), now);
    for speed in [1.0, 2.0, 3.0] {
        bus.publish(&gps("driver1", speed));
    }
    let _connected = sub.recv().await;
    let mut speeds = Vec::new();
    for _ in 0..3 {
        speeds.push(speed_of(&sub.recv().await.expect("event")).expect("gps"));
    }
    assert_eq!(speeds, [1.0, 2.0, 3.0]);
}

#[rstest]
#[tokio::test]
async fn full_buffer_evicts_only_the_slow_subscriber(now: DateTime<Utc>) {
    let bus = FanoutBus::new(2);
    let mut slow = bus.subscribe(user("manager1", Role::Manager), now);
    let mut fast = bus.subscribe(user("manager2", Role::Manager), now);
    let _ = fast.recv().await;

    for speed in [1.0, 2.0] {
        bus.publish(&gps("driver1", speed));
        let _ = fast.recv().await;
    }
    assert_eq!(bus.subscriber_count(), 2);
    bus.publish(&gps("driver1", 3.0));
    assert_eq!(bus.subscriber_count(), 1);
    assert!(bus.registered_at(fast.id()).is_some());

    let mut names = Vec::new();
    while let Some(event) = slow.recv().await {
        names.push(speed_of(&event));
    }
    // Buffered events drain, then the stream ends without the third update.
    assert_eq!(names, [None, Some(1.0), Some(2.0)]);
    assert_eq!(speed_of(&fast.recv().await.expect("fast keeps up")), Some(3.0));
}

#[rstest]
fn unsubscribe_is_idempotent(now: DateTime<Utc>) {
    let bus = FanoutBus::default();
    let sub = bus.subscribe(user("manager1", Role::Manager), now);
    let id = sub.id();
    bus.unsubscribe(id);
    bus.unsubscribe(id);
    assert_eq!(bus.subscriber_count(), 0);
    drop(sub);
    assert_eq!(bus.subscriber_count(), 0);
}

#[rstest]
fn dropping_a_subscription_unregisters_it(now: DateTime<Utc>) {
    let bus = FanoutBus::default();
    let sub = bus.subscribe(user("manager1", Role::Manager), now);
    assert_eq!(bus.subscriber_count(), 1);
    drop(sub);
    assert_eq!(bus.subscriber_count(), 0);
}

#[rstest]
#[tokio::test]
async fn subscribing_after_close_yields_shutdown(now: DateTime<Utc>) {
    let bus = FanoutBus::default();
    bus.close();
    let mut sub = bus.subscribe(user("driver1", Role::Driver), now);
    assert_eq!(sub.recv().await.map(|e| e.name()), Some("connected"));
    assert_eq!(sub.recv().await.map(|e| e.name()), Some("shutdown"));
    assert_eq!(sub.recv().await, None);
    assert_eq!(bus.subscriber_count(), 0);
}

#[rstest]
#[tokio::test]
async fn closing_with_a_full_subscriber_still_ends_its_stream(now: DateTime<Utc>) {
    let bus = FanoutBus::new(1);
    let mut full = bus.subscribe(user("manager1", Role::Manager), now);
    bus.publish(&gps("driver1", 3.0));

    bus.close();

    assert_eq!(bus.subscriber_count(), 0);
    let mut names = Vec::new();
    while let Some(event) = full.recv().await {
        names.push(event.name());
    }
    assert_eq!(names, ["connected", "gps_update"]);
}

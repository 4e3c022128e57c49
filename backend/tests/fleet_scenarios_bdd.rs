//! Behaviour tests across GPS ingest, route monitoring, the fan-out bus and
//! notification delivery, run against in-memory storage and a hand-driven
//! clock.

use std::cell::{Cell, OnceCell, RefCell};
use std::time::Duration;

use busfleet::domain::notifications::{
    Channel, DeliveryStatus, NotificationDraft, NotificationPreferences, NotificationType,
    Priority, QuietHours, Recipient, WorkerPool,
};
use busfleet::domain::{
    BusEvent, Deviation, DeviationType, NotificationId, Severity, SessionStatus, Subscription,
    UserId,
};
use chrono::{TimeDelta, TimeZone, Utc};
use mockable::Clock;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::json;
use tokio::runtime::Runtime;

#[path = "fleet_scenarios/harness.rs"]
mod harness;

use harness::{Fleet, manager};

struct FleetWorld {
    fleet: OnceCell<Fleet>,
    viewer: RefCell<Option<Subscription>>,
    parent: RefCell<Option<Recipient>>,
    sent: RefCell<Vec<NotificationId>>,
    workers: RefCell<Option<WorkerPool>>,
    reported: Cell<u32>,
    runtime: Runtime,
}

impl FleetWorld {
    fn new() -> Self {
        Self {
            fleet: OnceCell::new(),
            viewer: RefCell::new(None),
            parent: RefCell::new(None),
            sent: RefCell::new(Vec::new()),
            workers: RefCell::new(None),
            reported: Cell::new(0),
            runtime: Runtime::new().expect("tokio runtime should initialize"),
        }
    }

    /// The fleet under test, built with default buffers on first use.
    fn fleet(&self) -> &Fleet {
        self.fleet.get_or_init(|| {
            let _guard = self.runtime.enter();
            Fleet::new()
        })
    }

    fn report_and_tick(&self, lat: f64, lng: f64, speed: f64, heading: Option<f64>) {
        let fleet = self.fleet();
        self.runtime
            .block_on(fleet.report_and_tick(lat, lng, speed, heading));
    }

    fn deviations_of(&self, kind: DeviationType) -> Vec<Deviation> {
        self.fleet()
            .deviations
            .all()
            .into_iter()
            .filter(|deviation| deviation.deviation_type == kind)
            .collect()
    }

    /// Drain the manager's stream and keep the deviation events.
    fn seen_deviations(&self) -> Vec<Deviation> {
        let mut viewer = self.viewer.borrow_mut();
        let subscription = viewer.as_mut().expect("a manager is watching");
        std::iter::from_fn(|| subscription.try_recv())
            .filter_map(|event| match event {
                BusEvent::Deviation(deviation) => Some(*deviation),
                _ => None,
            })
            .collect()
    }

    fn only_deviation(&self, kind: DeviationType) -> Deviation {
        let mut found = self.deviations_of(kind);
        assert_eq!(found.len(), 1, "one {kind} record expected: {found:?}");
        found.remove(0)
    }
}

#[fixture]
fn world() -> FleetWorld {
    FleetWorld::new()
}

#[given("a monitored route with a single stop")]
fn route_with_single_stop(world: &FleetWorld) {
    let fleet = world.fleet();
    fleet.plan(&[(40.0, -74.0)]);
    world.runtime.block_on(fleet.start_monitoring());
}

#[given("a monitored route with two stops")]
fn route_with_two_stops(world: &FleetWorld) {
    let fleet = world.fleet();
    fleet.plan(&[(40.0, -74.0), (40.1, -74.0)]);
    world.runtime.block_on(fleet.start_monitoring());
}

#[given("subscriber buffers that hold {buffer} events")]
fn subscriber_buffers(world: &FleetWorld, buffer: usize) {
    let _guard = world.runtime.enter();
    assert!(
        world.fleet.set(Fleet::with_buffer(buffer)).is_ok(),
        "buffers are chosen before the fleet is used"
    );
}

#[given("a manager watching the live stream")]
fn manager_watching(world: &FleetWorld) {
    let fleet = world.fleet();
    let subscription = fleet.bus.subscribe(manager(), fleet.clock.utc());
    *world.viewer.borrow_mut() = Some(subscription);
}

#[given("it is 23:30 in New York")]
fn late_evening_in_new_york(world: &FleetWorld) {
    world.fleet().clock.set(
        Utc.with_ymd_and_hms(2025, 1, 7, 4, 30, 0)
            .single()
            .expect("valid instant"),
    );
}

#[given("a parent in New York with quiet hours from {start} to {end}")]
fn parent_with_quiet_hours(world: &FleetWorld, start: String, end: String) {
    let parent = Recipient {
        email: Some("parent@fleet.example".into()),
        preferences: NotificationPreferences {
            quiet_hours: QuietHours::parse(&start, &end).expect("valid window"),
            timezone: "America/New_York".parse().expect("known zone"),
            ..NotificationPreferences::default()
        },
        ..Recipient::new(UserId::new("parent1").expect("valid id"))
    };
    *world.parent.borrow_mut() = Some(parent);
}

#[given("one notification worker is running")]
fn one_worker_running(world: &FleetWorld) {
    let fleet = world.fleet();
    let _guard = world.runtime.enter();
    let workers = WorkerPool::spawn(fleet.dispatcher.clone(), fleet.receiver.clone(), 1);
    *world.workers.borrow_mut() = Some(workers);
}

#[when("the bus reports from 333 metres north of the stop")]
fn bus_reports_off_route(world: &FleetWorld) {
    world.report_and_tick(40.003, -74.0, 10.0, None);
}

#[when("the bus is back at the stop {seconds} seconds later")]
fn bus_back_at_stop(world: &FleetWorld, seconds: i64) {
    world.fleet().clock.advance_seconds(seconds);
    world.report_and_tick(40.0001, -74.0, 10.0, Some(180.0));
}

#[when("the bus stands still near the stop for {minutes} minutes")]
fn bus_stands_still(world: &FleetWorld, minutes: i64) {
    world.report_and_tick(40.0012, -74.0, 0.0, None);
    for _ in 0..minutes * 6 {
        world.fleet().clock.advance_seconds(10);
        world.report_and_tick(40.0012, -74.0, 0.0, None);
    }
}

#[when("the bus moves off {seconds} seconds later")]
fn bus_moves_off(world: &FleetWorld, seconds: i64) {
    world.fleet().clock.advance_seconds(seconds);
    world.report_and_tick(40.0012, -74.0, 10.0, None);
}

#[when("the bus reports halfway between the stops")]
fn bus_reports_halfway(world: &FleetWorld) {
    world.report_and_tick(40.05, -74.0, 15.0, None);
}

#[when("the bus reports past the next stop a minute later")]
fn bus_reports_past_next_stop(world: &FleetWorld) {
    world.fleet().clock.advance_seconds(60);
    world.report_and_tick(40.08, -74.0, 15.0, None);
}

#[when("the bus reports {count} positions")]
fn bus_reports_positions(world: &FleetWorld, count: u32) {
    let fleet = world.fleet();
    for _ in 0..count {
        let step = world.reported.get();
        world.reported.set(step + 1);
        let lat = 40.0 + f64::from(step) * 0.001;
        world
            .runtime
            .block_on(fleet.report(lat, -74.0, 10.0, None));
    }
}

#[when("a low and a high priority email alert are sent to the parent")]
fn alerts_sent_to_parent(world: &FleetWorld) {
    let fleet = world.fleet();
    let parent = world
        .parent
        .borrow()
        .clone()
        .expect("a parent is configured");
    for priority in [Priority::Low, Priority::High] {
        let notification = world
            .runtime
            .block_on(
                fleet.queue.send(
                    NotificationDraft::new(NotificationType::SystemAlert, "Heads up", "Bus is late")
                        .priority(priority)
                        .channels([Channel::Email])
                        .recipients(vec![parent.clone()]),
                ),
            )
            .expect("accepted");
        world.runtime.block_on(fleet.dispatcher.dispatch(&notification));
        world.sent.borrow_mut().push(notification.id);
    }
}

#[when("reminders are scheduled {first} and {second} minutes ahead")]
fn reminders_scheduled(world: &FleetWorld, first: i64, second: i64) {
    let fleet = world.fleet();
    let now = fleet.clock.utc();
    for minutes in [first, second] {
        let notification = world
            .runtime
            .block_on(
                fleet.queue.send(
                    NotificationDraft::new(
                        NotificationType::ScheduleReminder,
                        "Reminder",
                        "Pickup soon",
                    )
                    .channels([Channel::Email])
                    .recipients(vec![Recipient {
                        email: Some("driver@fleet.example".into()),
                        ..Recipient::new(UserId::new("driver1").expect("valid id"))
                    }])
                    .scheduled_at(now + TimeDelta::minutes(minutes)),
                ),
            )
            .expect("accepted");
        world.sent.borrow_mut().push(notification.id);
    }
}

#[when("{minutes} minutes pass")]
fn minutes_pass(world: &FleetWorld, minutes: i64) {
    world.fleet().clock.advance_seconds(minutes * 60);
}

#[then("one {kind} deviation is open with {severity} severity")]
fn one_deviation_open(world: &FleetWorld, kind: DeviationType, severity: Severity) {
    let deviation = world.only_deviation(kind);
    assert!(deviation.is_open());
    assert_eq!(deviation.severity, severity);
    if kind == DeviationType::OffRoute {
        assert!((deviation.distance_m - 333.0).abs() < 2.0);
    }
}

#[then("the manager has seen {count} deviation events")]
fn manager_has_seen(world: &FleetWorld, count: usize) {
    assert_eq!(world.seen_deviations().len(), count);
}

#[then("the manager saw {kind} rise from {from} to {to}")]
fn manager_saw_escalation(world: &FleetWorld, kind: DeviationType, from: Severity, to: Severity) {
    let severities: Vec<Severity> = world
        .seen_deviations()
        .into_iter()
        .filter(|deviation| deviation.deviation_type == kind)
        .map(|deviation| deviation.severity)
        .collect();
    assert_eq!(severities, vec![from, to]);
}

#[then("the {kind} deviation has resolved automatically")]
fn deviation_resolved(world: &FleetWorld, kind: DeviationType) {
    let deviation = world.only_deviation(kind);
    assert!(deviation.auto_resolved);
    assert!(!deviation.is_open());
}

#[then("no manager alert is queued")]
fn no_alert_queued(world: &FleetWorld) {
    let fleet = world.fleet();
    assert!(
        world.runtime.block_on(fleet.next_queued()).is_none(),
        "low severity raises no alert"
    );
}

#[then("a high priority route deviation alert reaches the manager's inbox")]
fn alert_reaches_inbox(world: &FleetWorld) {
    let fleet = world.fleet();
    let alert = world
        .runtime
        .block_on(fleet.next_queued())
        .expect("manager alert queued");
    assert_eq!(alert.notification_type, NotificationType::RouteDeviation);
    assert_eq!(alert.priority, Priority::High);
    assert_eq!(
        alert.data["deviation"]["deviation_type"],
        json!("stopped_too_long")
    );

    world.runtime.block_on(fleet.dispatcher.dispatch(&alert));
    let inbox = world
        .runtime
        .block_on(fleet.center.inbox(&manager().user_id, None))
        .expect("inbox lists");
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].notification_id, alert.id);
}

#[then("no {kind} deviation is recorded")]
fn no_deviation_recorded(world: &FleetWorld, kind: DeviationType) {
    assert!(world.deviations_of(kind).is_empty());
}

#[then("a closed {kind} deviation is recorded")]
fn closed_deviation_recorded(world: &FleetWorld, kind: DeviationType) {
    let deviation = world.only_deviation(kind);
    assert!(!deviation.is_open(), "point-in-time records close at once");
}

#[then("the session has moved on to stop index {index}")]
fn session_moved_on(world: &FleetWorld, index: usize) {
    let fleet = world.fleet();
    let summary = world
        .runtime
        .block_on(fleet.monitor.active())
        .into_iter()
        .next()
        .expect("session is live");
    assert_eq!(summary.current_index, index);
    assert_ne!(summary.status, SessionStatus::Completed);
}

#[then("the low priority email is skipped for quiet hours")]
fn low_priority_skipped(world: &FleetWorld) {
    let sent = world.sent.borrow();
    let deliveries = world.fleet().notifications.deliveries_for(&sent[0]);
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].status, DeliveryStatus::Skipped);
    assert_eq!(deliveries[0].metadata["reason"], json!("quiet_hours"));
}

#[then("the high priority email is sent")]
fn high_priority_sent(world: &FleetWorld) {
    let sent = world.sent.borrow();
    let fleet = world.fleet();
    let deliveries = fleet.notifications.deliveries_for(&sent[1]);
    assert_eq!(deliveries[0].status, DeliveryStatus::Sent);
    assert_eq!(fleet.email.sent().len(), 1);
}

#[then("{count} live subscribers remain")]
fn live_subscribers_remain(world: &FleetWorld, count: usize) {
    assert_eq!(world.fleet().bus.subscriber_count(), count);
}

#[then("the manager's stream ended after {names}")]
fn stream_ended_after(world: &FleetWorld, names: String) {
    let mut subscription = world
        .viewer
        .borrow_mut()
        .take()
        .expect("a manager is watching");
    let received = world.runtime.block_on(async {
        let mut received = Vec::new();
        while let Some(event) = subscription.recv().await {
            received.push(event.name());
        }
        received
    });
    let expected: Vec<&str> = names.split(", ").collect();
    assert_eq!(received, expected);
}

#[then("the scheduler releases {count} notifications")]
fn scheduler_releases(world: &FleetWorld, count: usize) {
    let fleet = world.fleet();
    assert_eq!(world.runtime.block_on(fleet.scheduler.tick()), count);
}

#[then("nothing has been delivered")]
fn nothing_delivered(world: &FleetWorld) {
    world
        .runtime
        .block_on(async { tokio::time::sleep(Duration::from_millis(20)).await });
    assert!(world.fleet().notifications.deliveries().is_empty());
}

#[then("the reminders are emailed earliest first")]
fn reminders_emailed_in_order(world: &FleetWorld) {
    let fleet = world.fleet();
    fleet.queue.close();
    let workers = world
        .workers
        .borrow_mut()
        .take()
        .expect("workers are running");
    world.runtime.block_on(workers.drain(Duration::from_secs(2)));

    let sent: Vec<NotificationId> = fleet.email.sent().into_iter().map(|(id, _)| id).collect();
    let scheduled = world.sent.borrow();
    assert_eq!(sent, vec![scheduled[1].clone(), scheduled[0].clone()]);
}

#[scenario(
    path = "tests/features/fleet_scenarios.feature",
    name = "A bus drifting off route is flagged and cleared"
)]
fn off_route_is_flagged_and_cleared(world: FleetWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/fleet_scenarios.feature",
    name = "A bus stopped for six minutes escalates and alerts managers"
)]
fn stopped_bus_escalates(world: FleetWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/fleet_scenarios.feature",
    name = "Passing the next stop records a skipped stop"
)]
fn passing_next_stop_is_skipped(world: FleetWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/fleet_scenarios.feature",
    name = "Urgent notifications bypass quiet hours"
)]
fn urgent_notifications_bypass_quiet_hours(world: FleetWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/fleet_scenarios.feature",
    name = "A slow subscriber is evicted on the third publish"
)]
fn slow_subscriber_is_evicted(world: FleetWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/fleet_scenarios.feature",
    name = "Scheduled notifications wait and release in schedule order"
)]
fn scheduled_notifications_release_in_order(world: FleetWorld) {
    drop(world);
}

//! In-memory implementations of the storage ports.
//!
//! They follow the same contracts as the Diesel adapters closely enough for
//! end-to-end tests of the monitor and the notification pipeline.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};

use crate::domain::notifications::{
    DeliveryRecord, HistoryEntry, InboxItem, Notification, NotificationPreferences,
    NotificationStatus, Recipient,
};
use crate::domain::ports::{
    DeviationRepository, DeviationRepositoryError, FleetRepository, FleetRepositoryError,
    InboxRepository, InboxRepositoryError, NotificationRepository, NotificationRepositoryError,
    PositionRepository, PositionRepositoryError, PreferencesRepository,
    PreferencesRepositoryError, RecipientDirectory, RecipientDirectoryError, RoutePlanRepository,
    RoutePlanRepositoryError, SystemSettingsRepository, SystemSettingsRepositoryError,
};
use crate::domain::{
    AbsentStudent, Deviation, DeviationId, DeviationStats, MaintenanceSnapshot, NotificationId,
    Position, RouteAssignment, RouteId, RoutePlan, ServiceStatus, Stop, UserId, VehicleDeviationCount,
    VehicleId, VehicleRecord,
};

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(_) => panic!("in-memory store mutex poisoned"),
    }
}

/// GPS history held in a vector.
#[derive(Default)]
pub struct InMemoryPositionRepository {
    rows: Mutex<Vec<Position>>,
}

impl InMemoryPositionRepository {
    pub fn all(&self) -> Vec<Position> {
        guard(&self.rows).clone()
    }
}

#[async_trait]
impl PositionRepository for InMemoryPositionRepository {
    async fn append(&self, position: &Position) -> Result<(), PositionRepositoryError> {
        guard(&self.rows).push(position.clone());
        Ok(())
    }

    async fn latest_since(
        &self,
        vehicle_id: &VehicleId,
        since: DateTime<Utc>,
    ) -> Result<Option<Position>, PositionRepositoryError> {
        Ok(guard(&self.rows)
            .iter()
            .filter(|p| &p.vehicle_id == vehicle_id && p.timestamp >= since)
            .max_by_key(|p| p.timestamp)
            .cloned())
    }

    async fn latest_for(
        &self,
        vehicle_id: &VehicleId,
    ) -> Result<Option<Position>, PositionRepositoryError> {
        Ok(guard(&self.rows)
            .iter()
            .filter(|p| &p.vehicle_id == vehicle_id)
            .max_by_key(|p| p.timestamp)
            .cloned())
    }

    async fn history(
        &self,
        vehicle_id: &VehicleId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Position>, PositionRepositoryError> {
        let mut rows: Vec<Position> = guard(&self.rows)
            .iter()
            .filter(|p| &p.vehicle_id == vehicle_id && p.timestamp >= start && p.timestamp <= end)
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.timestamp);
        Ok(rows)
    }

    async fn latest_per_vehicle(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Position>, PositionRepositoryError> {
        let mut latest: BTreeMap<VehicleId, Position> = BTreeMap::new();
        for position in guard(&self.rows).iter().filter(|p| p.timestamp >= since) {
            let newer = latest
                .get(&position.vehicle_id)
                .is_none_or(|current| position.timestamp >= current.timestamp);
            if newer {
                latest.insert(position.vehicle_id.clone(), position.clone());
            }
        }
        Ok(latest.into_values().collect())
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, PositionRepositoryError> {
        let mut rows = guard(&self.rows);
        let before = rows.len();
        rows.retain(|p| p.timestamp >= cutoff);
        Ok(u64::try_from(before - rows.len()).unwrap_or(u64::MAX))
    }
}

/// Route plans keyed by route id.
#[derive(Default)]
pub struct InMemoryRoutePlanRepository {
    plans: Mutex<HashMap<RouteId, Vec<Stop>>>,
}

impl InMemoryRoutePlanRepository {
    /// Register `stops` for `route_id`; an empty list models a route without
    /// planned stops.
    pub fn insert(&self, route_id: RouteId, stops: Vec<Stop>) {
        guard(&self.plans).insert(route_id, stops);
    }
}

#[async_trait]
impl RoutePlanRepository for InMemoryRoutePlanRepository {
    async fn find(&self, route_id: &RouteId) -> Result<Option<Vec<Stop>>, RoutePlanRepositoryError> {
        Ok(guard(&self.plans).get(route_id).cloned())
    }

    async fn replace(&self, plan: &RoutePlan) -> Result<(), RoutePlanRepositoryError> {
        guard(&self.plans).insert(plan.route_id().clone(), plan.stops().to_vec());
        Ok(())
    }
}

/// Deviation records with sequential ids.
#[derive(Default)]
pub struct InMemoryDeviationRepository {
    rows: Mutex<Vec<Deviation>>,
    next_id: AtomicI64,
}

impl InMemoryDeviationRepository {
    pub fn all(&self) -> Vec<Deviation> {
        guard(&self.rows).clone()
    }
}

#[async_trait]
impl DeviationRepository for InMemoryDeviationRepository {
    async fn insert(&self, deviation: &Deviation) -> Result<DeviationId, DeviationRepositoryError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut stored = deviation.clone();
        stored.id = Some(id);
        guard(&self.rows).push(stored);
        Ok(id)
    }

    async fn update(&self, deviation: &Deviation) -> Result<(), DeviationRepositoryError> {
        let id = deviation.id.ok_or_else(DeviationRepositoryError::missing_id)?;
        let mut rows = guard(&self.rows);
        let row = rows
            .iter_mut()
            .find(|row| row.id == Some(id))
            .ok_or_else(|| DeviationRepositoryError::query(format!("no deviation {id}")))?;
        *row = deviation.clone();
        Ok(())
    }

    async fn find(&self, id: DeviationId) -> Result<Option<Deviation>, DeviationRepositoryError> {
        Ok(guard(&self.rows).iter().find(|row| row.id == Some(id)).cloned())
    }

    async fn history(
        &self,
        vehicle_id: &VehicleId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Deviation>, DeviationRepositoryError> {
        let mut rows: Vec<Deviation> = guard(&self.rows)
            .iter()
            .filter(|row| &row.vehicle_id == vehicle_id && row.created_at >= since)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn stats(&self, now: DateTime<Utc>) -> Result<DeviationStats, DeviationRepositoryError> {
        let rows = guard(&self.rows);
        let week = now - TimeDelta::days(7);
        let month = now - TimeDelta::days(30);
        let mut stats = DeviationStats {
            total_today: count(rows.iter().filter(|r| r.created_at.date_naive() == now.date_naive())),
            active: count(rows.iter().filter(|r| r.is_open())),
            ..DeviationStats::default()
        };
        for row in rows.iter().filter(|r| r.created_at >= week) {
            *stats.by_type.entry(row.deviation_type).or_default() += 1;
            *stats.by_severity.entry(row.severity).or_default() += 1;
        }
        let mut per_vehicle: BTreeMap<VehicleId, u64> = BTreeMap::new();
        for row in rows.iter().filter(|r| r.created_at >= month) {
            *per_vehicle.entry(row.vehicle_id.clone()).or_default() += 1;
        }
        let mut top: Vec<VehicleDeviationCount> = per_vehicle
            .into_iter()
            .map(|(vehicle_id, count)| VehicleDeviationCount { vehicle_id, count })
            .collect();
        top.sort_by(|a, b| b.count.cmp(&a.count).then(a.vehicle_id.cmp(&b.vehicle_id)));
        top.truncate(DeviationStats::TOP_VEHICLES);
        stats.top_vehicles = top;
        Ok(stats)
    }
}

fn count<I: Iterator>(iter: I) -> u64 {
    u64::try_from(iter.count()).unwrap_or(u64::MAX)
}

struct StoredNotification {
    notification: Notification,
    claimed: bool,
}

/// Notifications and their delivery log.
#[derive(Default)]
pub struct InMemoryNotificationRepository {
    notifications: Mutex<BTreeMap<NotificationId, StoredNotification>>,
    deliveries: Mutex<Vec<DeliveryRecord>>,
}

impl InMemoryNotificationRepository {
    pub fn deliveries(&self) -> Vec<DeliveryRecord> {
        guard(&self.deliveries).clone()
    }

    pub fn deliveries_for(&self, id: &NotificationId) -> Vec<DeliveryRecord> {
        guard(&self.deliveries)
            .iter()
            .filter(|record| &record.notification_id == id)
            .cloned()
            .collect()
    }

    pub fn notification(&self, id: &NotificationId) -> Option<Notification> {
        guard(&self.notifications)
            .get(id)
            .map(|stored| stored.notification.clone())
    }

    pub fn notifications(&self) -> Vec<Notification> {
        guard(&self.notifications)
            .values()
            .map(|stored| stored.notification.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn insert(&self, notification: &Notification) -> Result<(), NotificationRepositoryError> {
        guard(&self.notifications).insert(
            notification.id.clone(),
            StoredNotification {
                notification: notification.clone(),
                claimed: false,
            },
        );
        Ok(())
    }

    async fn find(
        &self,
        id: &NotificationId,
    ) -> Result<Option<Notification>, NotificationRepositoryError> {
        Ok(self.notification(id))
    }

    async fn mark_status(
        &self,
        id: &NotificationId,
        status: NotificationStatus,
        _at: DateTime<Utc>,
    ) -> Result<(), NotificationRepositoryError> {
        if let Some(stored) = guard(&self.notifications).get_mut(id) {
            stored.notification.status = status;
            stored.claimed = false;
        }
        Ok(())
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Notification>, NotificationRepositoryError> {
        let mut notifications = guard(&self.notifications);
        let mut due: Vec<&mut StoredNotification> = notifications
            .values_mut()
            .filter(|stored| {
                !stored.claimed
                    && stored.notification.status == NotificationStatus::Pending
                    && stored.notification.scheduled_at.is_some_and(|at| at <= now)
            })
            .collect();
        due.sort_by_key(|stored| {
            (
                stored.notification.scheduled_at,
                stored.notification.created_at,
            )
        });
        Ok(due
            .into_iter()
            .take(limit)
            .map(|stored| {
                stored.claimed = true;
                stored.notification.clone()
            })
            .collect())
    }

    async fn release_claim(&self, id: &NotificationId) -> Result<(), NotificationRepositoryError> {
        if let Some(stored) = guard(&self.notifications).get_mut(id) {
            stored.claimed = false;
        }
        Ok(())
    }

    async fn record_delivery(
        &self,
        record: &DeliveryRecord,
    ) -> Result<(), NotificationRepositoryError> {
        guard(&self.deliveries).push(record.clone());
        Ok(())
    }

    async fn recent_history(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, NotificationRepositoryError> {
        let notifications = guard(&self.notifications);
        let mut entries: Vec<HistoryEntry> = guard(&self.deliveries)
            .iter()
            .filter(|record| &record.user_id == user_id)
            .filter_map(|record| {
                let stored = notifications.get(&record.notification_id)?;
                let n = &stored.notification;
                Some(HistoryEntry {
                    notification_id: n.id.clone(),
                    notification_type: n.notification_type,
                    priority: n.priority,
                    subject: n.subject.clone(),
                    message: n.message.clone(),
                    created_at: n.created_at,
                    channel: record.channel,
                    status: record.status,
                    delivered_at: record.delivered_at,
                })
            })
            .collect();
        entries.reverse();
        entries.sort_by(|a, b| b.delivered_at.cmp(&a.delivered_at));
        entries.truncate(limit);
        Ok(entries)
    }
}

struct InboxRow {
    notification_id: NotificationId,
    user_id: UserId,
    created_at: DateTime<Utc>,
    read_at: Option<DateTime<Utc>>,
}

/// Inbox entries joined against an in-memory notification store.
pub struct InMemoryInboxRepository {
    notifications: Arc<InMemoryNotificationRepository>,
    rows: Mutex<Vec<InboxRow>>,
}

impl InMemoryInboxRepository {
    pub fn new(notifications: Arc<InMemoryNotificationRepository>) -> Self {
        Self {
            notifications,
            rows: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl InboxRepository for InMemoryInboxRepository {
    async fn add(
        &self,
        notification_id: &NotificationId,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> Result<(), InboxRepositoryError> {
        let mut rows = guard(&self.rows);
        let exists = rows
            .iter()
            .any(|r| &r.notification_id == notification_id && &r.user_id == user_id);
        if !exists {
            rows.push(InboxRow {
                notification_id: notification_id.clone(),
                user_id: user_id.clone(),
                created_at: at,
                read_at: None,
            });
        }
        Ok(())
    }

    async fn list(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<InboxItem>, InboxRepositoryError> {
        let rows = guard(&self.rows);
        let mut items: Vec<InboxItem> = rows
            .iter()
            .rev()
            .filter(|r| &r.user_id == user_id)
            .filter_map(|r| {
                let n = self.notifications.notification(&r.notification_id)?;
                Some(InboxItem {
                    notification_id: n.id,
                    notification_type: n.notification_type,
                    priority: n.priority,
                    subject: n.subject,
                    message: n.message,
                    created_at: r.created_at,
                    read_at: r.read_at,
                })
            })
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items.truncate(limit);
        Ok(items)
    }

    async fn unread_count(&self, user_id: &UserId) -> Result<u64, InboxRepositoryError> {
        Ok(count(
            guard(&self.rows)
                .iter()
                .filter(|r| &r.user_id == user_id && r.read_at.is_none()),
        ))
    }

    async fn mark_read(
        &self,
        user_id: &UserId,
        notification_id: &NotificationId,
        at: DateTime<Utc>,
    ) -> Result<bool, InboxRepositoryError> {
        let mut rows = guard(&self.rows);
        let Some(row) = rows
            .iter_mut()
            .find(|r| &r.user_id == user_id && &r.notification_id == notification_id)
        else {
            return Ok(false);
        };
        row.read_at.get_or_insert(at);
        Ok(true)
    }

    async fn mark_all_read(
        &self,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> Result<u64, InboxRepositoryError> {
        let mut changed = 0;
        for row in guard(&self.rows)
            .iter_mut()
            .filter(|r| &r.user_id == user_id && r.read_at.is_none())
        {
            row.read_at = Some(at);
            changed += 1;
        }
        Ok(changed)
    }
}

/// Preferences keyed by user.
#[derive(Default)]
pub struct InMemoryPreferencesRepository {
    rows: Mutex<HashMap<UserId, NotificationPreferences>>,
}

#[async_trait]
impl PreferencesRepository for InMemoryPreferencesRepository {
    async fn find(
        &self,
        user_id: &UserId,
    ) -> Result<Option<NotificationPreferences>, PreferencesRepositoryError> {
        Ok(guard(&self.rows).get(user_id).cloned())
    }

    async fn save(
        &self,
        user_id: &UserId,
        preferences: &NotificationPreferences,
    ) -> Result<(), PreferencesRepositoryError> {
        guard(&self.rows).insert(user_id.clone(), preferences.clone());
        Ok(())
    }
}

/// User register with role lists.
#[derive(Default)]
pub struct InMemoryRecipientDirectory {
    managers: Mutex<Vec<Recipient>>,
    users: Mutex<HashMap<UserId, Recipient>>,
    vehicle_drivers: Mutex<HashMap<VehicleId, Vec<Recipient>>>,
    emergency_contacts: Mutex<Vec<Recipient>>,
}

impl InMemoryRecipientDirectory {
    pub fn add_manager(&self, recipient: Recipient) {
        self.add_user(recipient.clone());
        guard(&self.managers).push(recipient);
    }

    pub fn add_user(&self, recipient: Recipient) {
        guard(&self.users).insert(recipient.user_id.clone(), recipient);
    }

    pub fn add_vehicle_driver(&self, vehicle_id: VehicleId, recipient: Recipient) {
        self.add_user(recipient.clone());
        guard(&self.vehicle_drivers)
            .entry(vehicle_id)
            .or_default()
            .push(recipient);
    }

    pub fn add_emergency_contact(&self, recipient: Recipient) {
        guard(&self.emergency_contacts).push(recipient);
    }
}

#[async_trait]
impl RecipientDirectory for InMemoryRecipientDirectory {
    async fn managers(&self) -> Result<Vec<Recipient>, RecipientDirectoryError> {
        Ok(guard(&self.managers).clone())
    }

    async fn user(&self, user_id: &UserId) -> Result<Option<Recipient>, RecipientDirectoryError> {
        Ok(guard(&self.users).get(user_id).cloned())
    }

    async fn drivers_for_vehicle(
        &self,
        vehicle_id: &VehicleId,
    ) -> Result<Vec<Recipient>, RecipientDirectoryError> {
        Ok(guard(&self.vehicle_drivers)
            .get(vehicle_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn emergency_contacts(&self) -> Result<Vec<Recipient>, RecipientDirectoryError> {
        Ok(guard(&self.emergency_contacts).clone())
    }
}

/// Fleet register for trigger tests.
#[derive(Default)]
pub struct InMemoryFleetRepository {
    vehicles: Mutex<HashMap<VehicleId, VehicleRecord>>,
    snapshots: Mutex<Vec<MaintenanceSnapshot>>,
    absences: Mutex<Vec<AbsentStudent>>,
    assignments: Mutex<Vec<RouteAssignment>>,
    drivers: Mutex<HashMap<VehicleId, UserId>>,
}

impl InMemoryFleetRepository {
    pub fn add_vehicle(&self, record: VehicleRecord) {
        guard(&self.vehicles).insert(record.vehicle_id.clone(), record);
    }

    pub fn add_snapshot(&self, snapshot: MaintenanceSnapshot) {
        guard(&self.snapshots).push(snapshot);
    }

    pub fn add_absence(&self, absence: AbsentStudent) {
        guard(&self.absences).push(absence);
    }

    pub fn assign_driver(&self, vehicle_id: VehicleId, driver_id: UserId) {
        guard(&self.drivers).insert(vehicle_id, driver_id);
    }

    pub fn vehicle(&self, vehicle_id: &VehicleId) -> Option<VehicleRecord> {
        guard(&self.vehicles).get(vehicle_id).cloned()
    }
}

#[async_trait]
impl FleetRepository for InMemoryFleetRepository {
    async fn maintenance_snapshots(&self) -> Result<Vec<MaintenanceSnapshot>, FleetRepositoryError> {
        Ok(guard(&self.snapshots).clone())
    }

    async fn absent_students(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<AbsentStudent>, FleetRepositoryError> {
        Ok(guard(&self.absences)
            .iter()
            .filter(|a| a.date == date)
            .cloned()
            .collect())
    }

    async fn assignments_on(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<RouteAssignment>, FleetRepositoryError> {
        Ok(guard(&self.assignments)
            .iter()
            .filter(|a| a.assigned_date == date)
            .cloned()
            .collect())
    }

    async fn assigned_driver(
        &self,
        vehicle_id: &VehicleId,
    ) -> Result<Option<UserId>, FleetRepositoryError> {
        Ok(guard(&self.drivers).get(vehicle_id).cloned())
    }

    async fn set_vehicle_status(
        &self,
        vehicle_id: &VehicleId,
        status: ServiceStatus,
    ) -> Result<Option<VehicleRecord>, FleetRepositoryError> {
        let mut vehicles = guard(&self.vehicles);
        let Some(record) = vehicles.get_mut(vehicle_id) else {
            return Ok(None);
        };
        let previous = record.clone();
        record.status = status;
        Ok(Some(previous))
    }

    async fn assign_route(
        &self,
        assignment: &RouteAssignment,
    ) -> Result<bool, FleetRepositoryError> {
        let mut assignments = guard(&self.assignments);
        let is_new = !assignments
            .iter()
            .any(|a| a.driver_id == assignment.driver_id && a.route_id == assignment.route_id);
        assignments.push(assignment.clone());
        guard(&self.drivers).insert(assignment.vehicle_id.clone(), assignment.driver_id.clone());
        Ok(is_new)
    }
}

/// Key/value settings.
#[derive(Default)]
pub struct InMemorySystemSettingsRepository {
    values: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl SystemSettingsRepository for InMemorySystemSettingsRepository {
    async fn get(&self, key: &str) -> Result<Option<String>, SystemSettingsRepositoryError> {
        Ok(guard(&self.values).get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), SystemSettingsRepositoryError> {
        guard(&self.values).insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

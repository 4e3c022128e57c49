//! Producers that turn fleet events and daily checks into notifications.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use mockable::Clock;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::model::{Channel, Notification, NotificationDraft, NotificationType, Priority, Recipient};
use super::queue::NotificationQueue;
use crate::domain::ports::{FleetRepository, RecipientDirectory};
use crate::domain::route_monitor::DeviationAlerts;
use crate::domain::{
    Deviation, Error, GeoPoint, RouteAssignment, ServiceStatus, UserId, VehicleId, VehicleRecord,
};

const ALL_BUT_SMS: [Channel; 3] = [Channel::Email, Channel::Push, Channel::InApp];

/// The recurring checks and their daily UTC firing times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DailyCheck {
    Maintenance,
    Attendance,
    Reminders,
}

impl DailyCheck {
    pub const ALL: [Self; 3] = [Self::Maintenance, Self::Attendance, Self::Reminders];

    pub fn fires_at(self) -> NaiveTime {
        let hour = match self {
            Self::Maintenance => 8,
            Self::Attendance => 10,
            Self::Reminders => 18,
        };
        NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN)
    }
}

/// Next daily check strictly after `now`, with its firing instant.
pub fn next_daily_check(now: DateTime<Utc>) -> (DailyCheck, DateTime<Utc>) {
    let today = now.date_naive();
    for check in DailyCheck::ALL {
        let at = today.and_time(check.fires_at()).and_utc();
        if at > now {
            return (check, at);
        }
    }
    let first = DailyCheck::Maintenance;
    let tomorrow = today.succ_opt().unwrap_or(today);
    (first, tomorrow.and_time(first.fires_at()).and_utc())
}

/// Event and schedule driven notification producers.
pub struct NotificationTriggers {
    queue: Arc<NotificationQueue>,
    directory: Arc<dyn RecipientDirectory>,
    fleet: Arc<dyn FleetRepository>,
    clock: Arc<dyn Clock>,
}

impl NotificationTriggers {
    pub fn new(
        queue: Arc<NotificationQueue>,
        directory: Arc<dyn RecipientDirectory>,
        fleet: Arc<dyn FleetRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            queue,
            directory,
            fleet,
            clock,
        }
    }

    /// Notify about every active vehicle past an oil or tire threshold.
    ///
    /// Oil notices also reach the vehicle's drivers. Returns how many
    /// notifications were accepted.
    pub async fn maintenance_due(&self) -> Result<usize, Error> {
        let snapshots = self.fleet.maintenance_snapshots().await?;
        let managers = self.directory.managers().await?;
        let mut accepted = 0;
        for snapshot in snapshots {
            if snapshot.oil_change_due() {
                let drivers = self
                    .directory
                    .drivers_for_vehicle(&snapshot.vehicle_id)
                    .await
                    .unwrap_or_else(|error| {
                        warn!(vehicle_id = %snapshot.vehicle_id, error = %error, "driver lookup failed");
                        Vec::new()
                    });
                let message = format!(
                    "Vehicle {} is due for an oil change. Current mileage: {}, Last oil change: {} miles",
                    snapshot.vehicle_id, snapshot.current_mileage, snapshot.last_oil_change
                );
                let draft = maintenance_draft(&snapshot.vehicle_id, snapshot.label(), message)
                    .data("mileage", snapshot.current_mileage)
                    .data("service", "oil_change")
                    .recipients(merge_recipients([managers.clone(), drivers]));
                accepted += self.submit(draft).await;
            }
            if snapshot.tire_service_due() {
                let message = format!(
                    "Vehicle {} is due for tire service. Current mileage: {}, Last tire service: {} miles",
                    snapshot.vehicle_id, snapshot.current_mileage, snapshot.last_tire_service
                );
                let draft = maintenance_draft(&snapshot.vehicle_id, snapshot.label(), message)
                    .data("mileage", snapshot.current_mileage)
                    .data("service", "tire_service")
                    .recipients(managers.clone());
                accepted += self.submit(draft).await;
            }
        }
        Ok(accepted)
    }

    /// One notice per student marked absent today.
    pub async fn attendance_issues(&self) -> Result<usize, Error> {
        let today = self.clock.utc().date_naive();
        let absences = self.fleet.absent_students(today).await?;
        if absences.is_empty() {
            return Ok(0);
        }
        let managers = self.directory.managers().await?;
        let mut accepted = 0;
        for student in absences {
            let route = student
                .route_id
                .as_ref()
                .map_or_else(|| "assigned".to_owned(), ToString::to_string);
            let draft = NotificationDraft::new(
                NotificationType::AttendanceIssue,
                format!("Student Absence Alert: {}", student.name),
                format!(
                    "Student {} was marked absent from the {route} route today",
                    student.name
                ),
            )
            .channels([Channel::Email, Channel::InApp])
            .data("student_id", student.student_id.clone())
            .data(
                "route_id",
                student
                    .route_id
                    .as_ref()
                    .map_or(Value::Null, |r| Value::from(r.as_str())),
            )
            .data("date", student.date.to_string())
            .recipients(managers.clone());
            accepted += self.submit(draft).await;
        }
        Ok(accepted)
    }

    /// Tell a driver about a new or changed assignment.
    pub async fn route_assignment(
        &self,
        assignment: &RouteAssignment,
        is_new: bool,
    ) -> Result<Notification, Error> {
        let verb = if is_new { "assigned to" } else { "reassigned to" };
        let recipient = self.user_or_bare(&assignment.driver_id).await;
        let draft = NotificationDraft::new(
            NotificationType::RouteChange,
            "Route Assignment Update",
            format!(
                "Driver {} has been {verb} route {} with bus {}",
                assignment.driver_id, assignment.route_id, assignment.vehicle_id
            ),
        )
        .channels(ALL_BUT_SMS)
        .data("driver", assignment.driver_id.as_str())
        .data("bus_id", assignment.vehicle_id.as_str())
        .data("route_id", assignment.route_id.as_str())
        .data("is_new", is_new)
        .recipients(vec![recipient]);
        self.queue.send(draft).await
    }

    /// Record an assignment and notify the driver.
    pub async fn assign_route(&self, assignment: &RouteAssignment) -> Result<Notification, Error> {
        let is_new = self.fleet.assign_route(assignment).await?;
        self.route_assignment(assignment, is_new).await
    }

    /// Announce a status change; `None` when nothing changed.
    pub async fn vehicle_status_changed(
        &self,
        before: &VehicleRecord,
        new_status: ServiceStatus,
        changed_by: &UserId,
    ) -> Result<Option<Notification>, Error> {
        if before.status == new_status {
            return Ok(None);
        }
        let priority = match new_status {
            ServiceStatus::OutOfService => Priority::High,
            ServiceStatus::Maintenance => Priority::Medium,
            ServiceStatus::Active | ServiceStatus::Inactive => Priority::Low,
        };
        let mut groups = vec![self.directory.managers().await?];
        if new_status == ServiceStatus::OutOfService {
            match self.directory.drivers_for_vehicle(&before.vehicle_id).await {
                Ok(drivers) => groups.push(drivers),
                Err(error) => {
                    warn!(vehicle_id = %before.vehicle_id, error = %error, "driver lookup failed");
                }
            }
        }
        let draft = NotificationDraft::new(
            NotificationType::VehicleIssue,
            format!("Vehicle Status Changed: {}", before.model),
            format!(
                "Vehicle {} ({}) status changed from {} to {} by {}",
                before.vehicle_id, before.model, before.status, new_status, changed_by
            ),
        )
        .priority(priority)
        .channels(ALL_BUT_SMS)
        .data("vehicle_id", before.vehicle_id.as_str())
        .data("old_status", before.status.as_str())
        .data("new_status", new_status.as_str())
        .data("changed_by", changed_by.as_str())
        .data("timestamp", self.clock.utc().to_rfc3339())
        .recipients(merge_recipients(groups));
        self.queue.send(draft).await.map(Some)
    }

    /// Record a vehicle's new status and announce the change.
    ///
    /// # Errors
    /// `not_found` when the vehicle is not in the register.
    pub async fn change_vehicle_status(
        &self,
        vehicle_id: &VehicleId,
        status: ServiceStatus,
        changed_by: &UserId,
    ) -> Result<Option<Notification>, Error> {
        let before = self
            .fleet
            .set_vehicle_status(vehicle_id, status)
            .await?
            .ok_or_else(|| Error::not_found(format!("vehicle {vehicle_id} not found")))?;
        self.vehicle_status_changed(&before, status, changed_by)
            .await
    }

    /// Remind each driver assigned for tomorrow, 12 hours before the day
    /// starts.
    pub async fn daily_reminders(&self) -> Result<usize, Error> {
        let today = self.clock.utc().date_naive();
        let Some(tomorrow) = today.succ_opt() else {
            return Ok(0);
        };
        let send_at = tomorrow.and_time(NaiveTime::MIN).and_utc() - TimeDelta::hours(12);
        let mut accepted = 0;
        for assignment in self.fleet.assignments_on(tomorrow).await? {
            let recipient = self.user_or_bare(&assignment.driver_id).await;
            let draft = NotificationDraft::new(
                NotificationType::ScheduleReminder,
                "Tomorrow's Route Reminder",
                format!(
                    "Reminder: You are scheduled to drive route {} with bus {} tomorrow",
                    assignment.route_id, assignment.vehicle_id
                ),
            )
            .priority(Priority::Low)
            .channels([Channel::Email, Channel::Push])
            .data("date", tomorrow.to_string())
            .data("route_id", assignment.route_id.as_str())
            .data("bus_id", assignment.vehicle_id.as_str())
            .scheduled_at(send_at)
            .recipients(vec![recipient]);
            accepted += self.submit(draft).await;
        }
        Ok(accepted)
    }

    /// Raise an SOS from `driver` to every manager and emergency contact.
    ///
    /// A failed lookup for one group still notifies the other.
    ///
    /// # Errors
    /// `service_unavailable` when no recipient could be resolved.
    pub async fn emergency(
        &self,
        driver: &UserId,
        message: &str,
        location: Option<GeoPoint>,
    ) -> Result<Notification, Error> {
        let managers = self.directory.managers().await.unwrap_or_else(|error| {
            warn!(error = %error, "manager lookup failed during emergency");
            Vec::new()
        });
        let contacts = self
            .directory
            .emergency_contacts()
            .await
            .unwrap_or_else(|error| {
                warn!(error = %error, "emergency contact lookup failed");
                Vec::new()
            });
        let recipients = merge_recipients([managers, contacts]);
        if recipients.is_empty() {
            return Err(Error::service_unavailable(
                "no emergency recipients could be resolved",
            ));
        }
        let mut draft = NotificationDraft::new(
            NotificationType::Emergency,
            "Emergency Alert",
            format!("Driver {driver}: {message}"),
        )
        .priority(Priority::Critical)
        .channels(Channel::ALL)
        .data("driver", driver.as_str())
        .data("time", self.clock.utc().to_rfc3339())
        .recipients(recipients);
        if let Some(point) = location {
            draft = draft.data(
                "location",
                json!({ "lat": point.latitude, "lng": point.longitude }),
            );
        }
        let notification = self.queue.send(draft).await?;
        warn!(driver = %driver, notification_id = %notification.id, "emergency alert raised");
        Ok(notification)
    }

    /// Tell `requested_by` that a report is ready to download.
    pub async fn report_ready(
        &self,
        requested_by: &UserId,
        report_type: &str,
        report_name: &str,
        download_url: Option<&str>,
    ) -> Result<Notification, Error> {
        let recipient = self.user_or_bare(requested_by).await;
        let draft = NotificationDraft::new(
            NotificationType::ReportReady,
            format!("Report Ready: {report_name}"),
            format!(
                "Your {report_type} report '{report_name}' has been generated and is ready for download"
            ),
        )
        .priority(Priority::Low)
        .channels([Channel::Email, Channel::InApp])
        .data("report_type", report_type)
        .data("report_name", report_name)
        .data("download_url", download_url.map_or(Value::Null, Value::from))
        .data("generated_at", self.clock.utc().to_rfc3339())
        .recipients(vec![recipient]);
        self.queue.send(draft).await
    }

    /// Run one daily check, logging rather than returning its failure.
    pub async fn run_check(&self, check: DailyCheck) {
        let outcome = match check {
            DailyCheck::Maintenance => self.maintenance_due().await,
            DailyCheck::Attendance => self.attendance_issues().await,
            DailyCheck::Reminders => self.daily_reminders().await,
        };
        match outcome {
            Ok(sent) => info!(check = ?check, sent, "daily notification check finished"),
            Err(error) => warn!(check = ?check, error = %error, "daily notification check failed"),
        }
    }

    async fn user_or_bare(&self, user_id: &UserId) -> Recipient {
        match self.directory.user(user_id).await {
            Ok(Some(recipient)) => recipient,
            Ok(None) => Recipient::new(user_id.clone()),
            Err(error) => {
                warn!(user_id = %user_id, error = %error, "recipient lookup failed");
                Recipient::new(user_id.clone())
            }
        }
    }

    async fn submit(&self, draft: NotificationDraft) -> usize {
        match self.queue.send(draft).await {
            Ok(_) => 1,
            Err(error) => {
                warn!(error = %error, "notification not accepted");
                0
            }
        }
    }
}

#[async_trait]
impl DeviationAlerts for NotificationTriggers {
    async fn deviation_alert(&self, deviation: &Deviation) {
        let managers = match self.directory.managers().await {
            Ok(managers) if !managers.is_empty() => managers,
            Ok(_) => {
                warn!(vehicle_id = %deviation.vehicle_id, "no managers to alert");
                return;
            }
            Err(error) => {
                warn!(error = %error, "manager lookup failed for deviation alert");
                return;
            }
        };
        let payload = serde_json::to_value(deviation).unwrap_or(Value::Null);
        let draft = NotificationDraft::new(
            NotificationType::RouteDeviation,
            format!("Route Deviation: {}", deviation.vehicle_id),
            deviation.description.clone(),
        )
        .priority(deviation.severity.into())
        .channels([Channel::InApp, Channel::Push])
        .data("deviation", payload)
        .recipients(managers);
        self.submit(draft).await;
    }
}

/// Fire the daily checks at their UTC times until `cancel` fires.
pub async fn run_daily_triggers(
    triggers: Arc<NotificationTriggers>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
) {
    info!("daily notification triggers started");
    loop {
        let now = clock.utc();
        let (check, at) = next_daily_check(now);
        let wait = (at - now).to_std().unwrap_or_default();
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(wait) => triggers.run_check(check).await,
        }
    }
    info!("daily notification triggers stopped");
}

fn maintenance_draft(vehicle_id: &VehicleId, label: &str, message: String) -> NotificationDraft {
    NotificationDraft::new(
        NotificationType::MaintenanceDue,
        format!("Maintenance Due: {label}"),
        message,
    )
    .channels(ALL_BUT_SMS)
    .data("vehicle_id", vehicle_id.as_str())
}

/// Concatenate recipient groups, keeping the first entry per user.
fn merge_recipients(groups: impl IntoIterator<Item = Vec<Recipient>>) -> Vec<Recipient> {
    let mut seen = HashSet::new();
    groups
        .into_iter()
        .flatten()
        .filter(|r| seen.insert(r.user_id.clone()))
        .collect()
}

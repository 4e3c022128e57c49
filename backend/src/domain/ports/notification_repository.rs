//! Port for durable notification records and their delivery log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::notifications::{
    DeliveryRecord, HistoryEntry, Notification, NotificationStatus,
};
use crate::domain::{Error, NotificationId, UserId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by notification repository adapters.
    pub enum NotificationRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "notification repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "notification repository query failed: {message}",
    }
}

impl From<NotificationRepositoryError> for Error {
    fn from(error: NotificationRepositoryError) -> Self {
        match error {
            NotificationRepositoryError::Connection { message } => {
                Self::service_unavailable(format!("notification store unavailable: {message}"))
            }
            NotificationRepositoryError::Query { message } => {
                Self::internal(format!("notification store error: {message}"))
            }
        }
    }
}

/// Port for notification persistence and scheduled claims.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert(&self, notification: &Notification) -> Result<(), NotificationRepositoryError>;

    async fn find(
        &self,
        id: &NotificationId,
    ) -> Result<Option<Notification>, NotificationRepositoryError>;

    async fn mark_status(
        &self,
        id: &NotificationId,
        status: NotificationStatus,
        at: DateTime<Utc>,
    ) -> Result<(), NotificationRepositoryError>;

    /// Atomically claim up to `limit` pending notifications whose
    /// `scheduled_at` is at or before `now`, ordered by `scheduled_at` then
    /// `created_at`. Claimed rows are invisible to other claimers until
    /// released or marked sent.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Notification>, NotificationRepositoryError>;

    /// Return a claimed notification to the due set.
    async fn release_claim(&self, id: &NotificationId) -> Result<(), NotificationRepositoryError>;

    /// Append one delivery attempt.
    async fn record_delivery(
        &self,
        record: &DeliveryRecord,
    ) -> Result<(), NotificationRepositoryError>;

    /// Latest delivery attempts for `user_id`, newest first.
    async fn recent_history(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, NotificationRepositoryError>;
}

/// Fixture implementation for deployments without a database.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureNotificationRepository;

#[async_trait]
impl NotificationRepository for FixtureNotificationRepository {
    async fn insert(
        &self,
        _notification: &Notification,
    ) -> Result<(), NotificationRepositoryError> {
        Ok(())
    }

    async fn find(
        &self,
        _id: &NotificationId,
    ) -> Result<Option<Notification>, NotificationRepositoryError> {
        Ok(None)
    }

    async fn mark_status(
        &self,
        _id: &NotificationId,
        _status: NotificationStatus,
        _at: DateTime<Utc>,
    ) -> Result<(), NotificationRepositoryError> {
        Ok(())
    }

    async fn claim_due(
        &self,
        _now: DateTime<Utc>,
        _limit: usize,
    ) -> Result<Vec<Notification>, NotificationRepositoryError> {
        Ok(Vec::new())
    }

    async fn release_claim(&self, _id: &NotificationId) -> Result<(), NotificationRepositoryError> {
        Ok(())
    }

    async fn record_delivery(
        &self,
        _record: &DeliveryRecord,
    ) -> Result<(), NotificationRepositoryError> {
        Ok(())
    }

    async fn recent_history(
        &self,
        _user_id: &UserId,
        _limit: usize,
    ) -> Result<Vec<HistoryEntry>, NotificationRepositoryError> {
        Ok(Vec::new())
    }
}

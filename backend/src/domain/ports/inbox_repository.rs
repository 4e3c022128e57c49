//! Port for per-user in-app inbox entries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::notifications::InboxItem;
use crate::domain::{Error, NotificationId, UserId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by inbox repository adapters.
    pub enum InboxRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "inbox repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "inbox repository query failed: {message}",
    }
}

impl From<InboxRepositoryError> for Error {
    fn from(error: InboxRepositoryError) -> Self {
        match error {
            InboxRepositoryError::Connection { message } => {
                Self::service_unavailable(format!("inbox store unavailable: {message}"))
            }
            InboxRepositoryError::Query { message } => {
                Self::internal(format!("inbox store error: {message}"))
            }
        }
    }
}

/// Port for inbox visibility and read state.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InboxRepository: Send + Sync {
    /// Make a stored notification visible to `user_id`. Adding the same pair
    /// twice is a no-op.
    async fn add(
        &self,
        notification_id: &NotificationId,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> Result<(), InboxRepositoryError>;

    /// Newest entries first.
    async fn list(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<InboxItem>, InboxRepositoryError>;

    async fn unread_count(&self, user_id: &UserId) -> Result<u64, InboxRepositoryError>;

    /// Mark one entry read; `false` when the user has no such entry.
    async fn mark_read(
        &self,
        user_id: &UserId,
        notification_id: &NotificationId,
        at: DateTime<Utc>,
    ) -> Result<bool, InboxRepositoryError>;

    /// Mark every unread entry read, returning how many changed.
    async fn mark_all_read(
        &self,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> Result<u64, InboxRepositoryError>;
}

/// Fixture implementation for deployments without a database.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureInboxRepository;

#[async_trait]
impl InboxRepository for FixtureInboxRepository {
    async fn add(
        &self,
        _notification_id: &NotificationId,
        _user_id: &UserId,
        _at: DateTime<Utc>,
    ) -> Result<(), InboxRepositoryError> {
        Ok(())
    }

    async fn list(
        &self,
        _user_id: &UserId,
        _limit: usize,
    ) -> Result<Vec<InboxItem>, InboxRepositoryError> {
        Ok(Vec::new())
    }

    async fn unread_count(&self, _user_id: &UserId) -> Result<u64, InboxRepositoryError> {
        Ok(0)
    }

    async fn mark_read(
        &self,
        _user_id: &UserId,
        _notification_id: &NotificationId,
        _at: DateTime<Utc>,
    ) -> Result<bool, InboxRepositoryError> {
        Ok(false)
    }

    async fn mark_all_read(
        &self,
        _user_id: &UserId,
        _at: DateTime<Utc>,
    ) -> Result<u64, InboxRepositoryError> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[tokio::test]
    async fn fixture_has_no_entries() {
        let repo = FixtureInboxRepository;
        let user = UserId::new("driver1").expect("valid id");
        assert_eq!(repo.unread_count(&user).await.expect("count"), 0);
        let id = NotificationId::generate();
        assert!(!repo.mark_read(&user, &id, Utc::now()).await.expect("mark"));
    }
}

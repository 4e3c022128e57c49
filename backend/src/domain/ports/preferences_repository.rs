//! Port for stored notification preferences.

use async_trait::async_trait;

use crate::domain::notifications::NotificationPreferences;
use crate::domain::{Error, UserId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by preferences repository adapters.
    pub enum PreferencesRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "preferences repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "preferences repository query failed: {message}",
    }
}

impl From<PreferencesRepositoryError> for Error {
    fn from(error: PreferencesRepositoryError) -> Self {
        match error {
            PreferencesRepositoryError::Connection { message } => {
                Self::service_unavailable(format!("preferences store unavailable: {message}"))
            }
            PreferencesRepositoryError::Query { message } => {
                Self::internal(format!("preferences store error: {message}"))
            }
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PreferencesRepository: Send + Sync {
    /// Stored preferences, or `None` when the user never saved any.
    async fn find(
        &self,
        user_id: &UserId,
    ) -> Result<Option<NotificationPreferences>, PreferencesRepositoryError>;

    /// Insert or replace the user's preferences.
    async fn save(
        &self,
        user_id: &UserId,
        preferences: &NotificationPreferences,
    ) -> Result<(), PreferencesRepositoryError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FixturePreferencesRepository;

#[async_trait]
impl PreferencesRepository for FixturePreferencesRepository {
    async fn find(
        &self,
        _user_id: &UserId,
    ) -> Result<Option<NotificationPreferences>, PreferencesRepositoryError> {
        Ok(None)
    }

    async fn save(
        &self,
        _user_id: &UserId,
        _preferences: &NotificationPreferences,
    ) -> Result<(), PreferencesRepositoryError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[tokio::test]
    async fn fixture_find_returns_none() {
        let repo = FixturePreferencesRepository;
        let user = UserId::new("manager1").expect("valid id");
        assert!(repo.find(&user).await.expect("fixture lookup").is_none());
    }
}

//! Port for the key/value system settings table.

use async_trait::async_trait;

use crate::domain::Error;

use super::define_port_error;

/// Key of the GPS tracking feature flag.
pub const GPS_ENABLED_KEY: &str = "gps_enabled";

define_port_error! {
    /// Errors raised by system settings adapters.
    pub enum SystemSettingsRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "system settings connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "system settings query failed: {message}",
    }
}

impl From<SystemSettingsRepositoryError> for Error {
    fn from(error: SystemSettingsRepositoryError) -> Self {
        match error {
            SystemSettingsRepositoryError::Connection { message } => {
                Self::service_unavailable(format!("settings store unavailable: {message}"))
            }
            SystemSettingsRepositoryError::Query { message } => {
                Self::internal(format!("settings store error: {message}"))
            }
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SystemSettingsRepository: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, SystemSettingsRepositoryError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), SystemSettingsRepositoryError>;
}

/// Fixture store where every key is unset.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureSystemSettingsRepository;

#[async_trait]
impl SystemSettingsRepository for FixtureSystemSettingsRepository {
    async fn get(&self, _key: &str) -> Result<Option<String>, SystemSettingsRepositoryError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), SystemSettingsRepositoryError> {
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
    async fn fixture_keys_are_unset() {
        let repo = FixtureSystemSettingsRepository;
        assert!(repo.get(GPS_ENABLED_KEY).await.expect("get").is_none());
    }
}

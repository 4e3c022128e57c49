//! Port for resolving notification recipients from the user register.

use async_trait::async_trait;

use crate::domain::notifications::Recipient;
use crate::domain::{Error, UserId, VehicleId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by recipient directory adapters.
    pub enum RecipientDirectoryError {
        /// Directory connection could not be established.
        Connection { message: String } =>
            "recipient directory connection failed: {message}",
        /// Lookup failed during execution.
        Query { message: String } =>
            "recipient directory query failed: {message}",
    }
}

impl From<RecipientDirectoryError> for Error {
    fn from(error: RecipientDirectoryError) -> Self {
        match error {
            RecipientDirectoryError::Connection { message } => {
                Self::service_unavailable(format!("user directory unavailable: {message}"))
            }
            RecipientDirectoryError::Query { message } => {
                Self::internal(format!("user directory error: {message}"))
            }
        }
    }
}

/// Port returning contact snapshots, each carrying the user's stored
/// preferences (or defaults).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    /// Every active manager.
    async fn managers(&self) -> Result<Vec<Recipient>, RecipientDirectoryError>;

    async fn user(&self, user_id: &UserId) -> Result<Option<Recipient>, RecipientDirectoryError>;

    /// Active drivers assigned to `vehicle_id`.
    async fn drivers_for_vehicle(
        &self,
        vehicle_id: &VehicleId,
    ) -> Result<Vec<Recipient>, RecipientDirectoryError>;

    /// Active emergency contacts.
    async fn emergency_contacts(&self) -> Result<Vec<Recipient>, RecipientDirectoryError>;
}

/// Fixture directory with nobody in it.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureRecipientDirectory;

#[async_trait]
impl RecipientDirectory for FixtureRecipientDirectory {
    async fn managers(&self) -> Result<Vec<Recipient>, RecipientDirectoryError> {
        Ok(Vec::new())
    }

    async fn user(&self, _user_id: &UserId) -> Result<Option<Recipient>, RecipientDirectoryError> {
        Ok(None)
    }

    async fn drivers_for_vehicle(
        &self,
        _vehicle_id: &VehicleId,
    ) -> Result<Vec<Recipient>, RecipientDirectoryError> {
        Ok(Vec::new())
    }

    async fn emergency_contacts(&self) -> Result<Vec<Recipient>, RecipientDirectoryError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[tokio::test]
    async fn fixture_directory_is_empty() {
        let directory = FixtureRecipientDirectory;
        assert!(directory.managers().await.expect("managers").is_empty());
        assert!(
            directory
                .emergency_contacts()
                .await
                .expect("contacts")
                .is_empty()
        );
    }
}

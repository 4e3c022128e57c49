//! Port for the append-only GPS position history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Error, Position, VehicleId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by position repository adapters.
    pub enum PositionRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "position repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "position repository query failed: {message}",
    }
}

impl From<PositionRepositoryError> for Error {
    fn from(error: PositionRepositoryError) -> Self {
        match error {
            PositionRepositoryError::Connection { message } => {
                Self::service_unavailable(format!("position store unavailable: {message}"))
            }
            PositionRepositoryError::Query { message } => {
                Self::internal(format!("position store error: {message}"))
            }
        }
    }
}

/// Port for reading and writing GPS samples.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PositionRepository: Send + Sync {
    /// Append a sample. Samples are never rewritten.
    async fn append(&self, position: &Position) -> Result<(), PositionRepositoryError>;

    /// Newest sample for `vehicle_id` taken at or after `since`.
    async fn latest_since(
        &self,
        vehicle_id: &VehicleId,
        since: DateTime<Utc>,
    ) -> Result<Option<Position>, PositionRepositoryError>;

    /// Newest sample for `vehicle_id` regardless of age.
    async fn latest_for(
        &self,
        vehicle_id: &VehicleId,
    ) -> Result<Option<Position>, PositionRepositoryError>;

    /// Samples inside `[start, end]`, oldest first.
    async fn history(
        &self,
        vehicle_id: &VehicleId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Position>, PositionRepositoryError>;

    /// Newest sample of every vehicle that reported at or after `since`.
    async fn latest_per_vehicle(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Position>, PositionRepositoryError>;

    /// Delete samples older than `cutoff`, returning the number removed.
    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, PositionRepositoryError>;
}

/// Fixture implementation for deployments without a database.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixturePositionRepository;

#[async_trait]
impl PositionRepository for FixturePositionRepository {
    async fn append(&self, _position: &Position) -> Result<(), PositionRepositoryError> {
        Ok(())
    }

    async fn latest_since(
        &self,
        _vehicle_id: &VehicleId,
        _since: DateTime<Utc>,
    ) -> Result<Option<Position>, PositionRepositoryError> {
        Ok(None)
    }

    async fn latest_for(
        &self,
        _vehicle_id: &VehicleId,
    ) -> Result<Option<Position>, PositionRepositoryError> {
        Ok(None)
    }

    async fn history(
        &self,
        _vehicle_id: &VehicleId,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<Position>, PositionRepositoryError> {
        Ok(Vec::new())
    }

    async fn latest_per_vehicle(
        &self,
        _since: DateTime<Utc>,
    ) -> Result<Vec<Position>, PositionRepositoryError> {
        Ok(Vec::new())
    }

    async fn delete_before(&self, _cutoff: DateTime<Utc>) -> Result<u64, PositionRepositoryError> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.

    use rstest::rstest;

    use super::*;
    use crate::domain::ErrorCode;

    #[rstest]
    #[tokio::test]
    async fn fixture_reads_are_empty() {
        let repo = FixturePositionRepository;
        let vehicle = VehicleId::new("BUS-1").expect("valid id");
        assert!(
            repo.latest_for(&vehicle)
                .await
                .expect("fixture lookup succeeds")
                .is_none()
        );
        assert!(
            repo.latest_per_vehicle(Utc::now())
                .await
                .expect("fixture list succeeds")
                .is_empty()
        );
        assert_eq!(
            repo.delete_before(Utc::now()).await.expect("fixture delete"),
            0
        );
    }

    #[rstest]
    #[case(PositionRepositoryError::connection("refused"), ErrorCode::ServiceUnavailable)]
    #[case(PositionRepositoryError::query("bad sql"), ErrorCode::InternalError)]
    fn maps_to_domain_error(#[case] error: PositionRepositoryError, #[case] code: ErrorCode) {
        assert_eq!(Error::from(error).code(), code);
    }
}

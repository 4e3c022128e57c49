//! Port for deviation records and dashboard aggregates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Deviation, DeviationId, DeviationStats, Error, VehicleId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by deviation repository adapters.
    pub enum DeviationRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "deviation repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "deviation repository query failed: {message}",
        /// An update referenced a record that was never persisted.
        MissingId =>
            "deviation has not been persisted",
    }
}

impl From<DeviationRepositoryError> for Error {
    fn from(error: DeviationRepositoryError) -> Self {
        match error {
            DeviationRepositoryError::Connection { message } => {
                Self::service_unavailable(format!("deviation store unavailable: {message}"))
            }
            other => Self::internal(format!("deviation store error: {other}")),
        }
    }
}

/// Port for persisting deviations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviationRepository: Send + Sync {
    /// Persist a new deviation and return its assigned id.
    async fn insert(&self, deviation: &Deviation) -> Result<DeviationId, DeviationRepositoryError>;

    /// Overwrite the mutable fields of a persisted deviation.
    async fn update(&self, deviation: &Deviation) -> Result<(), DeviationRepositoryError>;

    async fn find(&self, id: DeviationId) -> Result<Option<Deviation>, DeviationRepositoryError>;

    /// Deviations for `vehicle_id` created at or after `since`, newest first.
    async fn history(
        &self,
        vehicle_id: &VehicleId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Deviation>, DeviationRepositoryError>;

    /// Dashboard counters relative to `now`.
    async fn stats(&self, now: DateTime<Utc>) -> Result<DeviationStats, DeviationRepositoryError>;
}

/// Fixture implementation that hands out increasing ids and stores nothing.
#[derive(Debug, Default)]
pub struct FixtureDeviationRepository {
    next_id: std::sync::atomic::AtomicI64,
}

#[async_trait]
impl DeviationRepository for FixtureDeviationRepository {
    async fn insert(&self, _deviation: &Deviation) -> Result<DeviationId, DeviationRepositoryError> {
        Ok(self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            + 1)
    }

    async fn update(&self, deviation: &Deviation) -> Result<(), DeviationRepositoryError> {
        deviation
            .id
            .map(|_| ())
            .ok_or_else(DeviationRepositoryError::missing_id)
    }

    async fn find(&self, _id: DeviationId) -> Result<Option<Deviation>, DeviationRepositoryError> {
        Ok(None)
    }

    async fn history(
        &self,
        _vehicle_id: &VehicleId,
        _since: DateTime<Utc>,
    ) -> Result<Vec<Deviation>, DeviationRepositoryError> {
        Ok(Vec::new())
    }

    async fn stats(&self, _now: DateTime<Utc>) -> Result<DeviationStats, DeviationRepositoryError> {
        Ok(DeviationStats::default())
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.

    use rstest::rstest;

    use super::*;
    use crate::domain::{DeviationType, GeoPoint, RouteId, Severity, UserId};

    fn deviation(id: Option<DeviationId>) -> Deviation {
        Deviation {
            id,
            vehicle_id: VehicleId::new("BUS-1").expect("valid id"),
            route_id: RouteId::new("R1").expect("valid id"),
            driver_id: UserId::new("driver1").expect("valid id"),
            deviation_type: DeviationType::OffRoute,
            severity: Severity::Low,
            location: GeoPoint::new(40.0, -74.0),
            expected_location: None,
            distance_m: 250.0,
            duration_ms: 0,
            description: "off".into(),
            metadata: serde_json::Map::new(),
            auto_resolved: false,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    #[rstest]
    #[tokio::test]
    async fn fixture_assigns_increasing_ids() {
        let repo = FixtureDeviationRepository::default();
        let first = repo.insert(&deviation(None)).await.expect("insert");
        let second = repo.insert(&deviation(None)).await.expect("insert");
        assert!(second > first);
    }

    #[rstest]
    #[tokio::test]
    async fn fixture_update_requires_id() {
        let repo = FixtureDeviationRepository::default();
        let err = repo
            .update(&deviation(None))
            .await
            .expect_err("unpersisted update fails");
        assert_eq!(err, DeviationRepositoryError::MissingId);
        repo.update(&deviation(Some(7))).await.expect("update succeeds");
    }
}

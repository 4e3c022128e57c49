//! Port for planned stop lists.

use async_trait::async_trait;

use crate::domain::{Error, RouteId, RoutePlan, Stop};

use super::define_port_error;

define_port_error! {
    /// Errors raised by route plan repository adapters.
    pub enum RoutePlanRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "route plan repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "route plan repository query failed: {message}",
    }
}

impl From<RoutePlanRepositoryError> for Error {
    fn from(error: RoutePlanRepositoryError) -> Self {
        match error {
            RoutePlanRepositoryError::Connection { message } => {
                Self::service_unavailable(format!("route plan store unavailable: {message}"))
            }
            RoutePlanRepositoryError::Query { message } => {
                Self::internal(format!("route plan store error: {message}"))
            }
        }
    }
}

/// Port for loading and replacing route plans.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoutePlanRepository: Send + Sync {
    /// Stored stops for `route_id` in stop order.
    ///
    /// `None` when the route is unknown; an empty list when the route exists
    /// but has no planned stops.
    async fn find(&self, route_id: &RouteId) -> Result<Option<Vec<Stop>>, RoutePlanRepositoryError>;

    /// Replace every stop of the plan's route atomically.
    async fn replace(&self, plan: &RoutePlan) -> Result<(), RoutePlanRepositoryError>;
}

/// Fixture implementation for deployments without a database.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureRoutePlanRepository;

#[async_trait]
impl RoutePlanRepository for FixtureRoutePlanRepository {
    async fn find(
        &self,
        _route_id: &RouteId,
    ) -> Result<Option<Vec<Stop>>, RoutePlanRepositoryError> {
        Ok(None)
    }

    async fn replace(&self, _plan: &RoutePlan) -> Result<(), RoutePlanRepositoryError> {
        Ok(())
    }
}

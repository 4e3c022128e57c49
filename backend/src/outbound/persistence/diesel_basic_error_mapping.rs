//! Shared Diesel error mapping for repositories with connection/query errors.
//!
//! Every port error enum in this crate exposes `connection(..)` and
//! `query(..)` constructors; [`basic_error_mappers!`] generates the two
//! `map_pool_error` / `map_diesel_error` functions a repository needs from
//! them.

use tracing::debug;

use super::pool::PoolError;

/// Map pool errors into a repository-specific connection error constructor.
pub fn map_basic_pool_error<E, C>(error: PoolError, connection: C) -> E
where
    C: FnOnce(String) -> E,
{
    let message = match error {
        PoolError::Checkout { message }
        | PoolError::Build { message }
        | PoolError::Migration { message } => message,
    };
    connection(message)
}

/// Map Diesel errors into query/connection constructors.
///
/// Driver details are logged at debug level and never surface in the
/// returned message.
pub fn map_basic_diesel_error<E, Q, C>(error: diesel::result::Error, query: Q, connection: C) -> E
where
    Q: Fn(&'static str) -> E,
    C: Fn(&'static str) -> E,
{
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), "diesel operation failed");
        }
        _ => debug!(error = %error, "diesel operation failed"),
    }

    match error {
        DieselError::NotFound => query("record not found"),
        DieselError::QueryBuilderError(_) => query("database query error"),
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _) => {
            connection("database connection error")
        }
        DieselError::DeserializationError(_) => query("stored row could not be decoded"),
        _ => query("database error"),
    }
}

/// Generate `map_pool_error` and `map_diesel_error` for a port error type.
macro_rules! basic_error_mappers {
    ($error:ty) => {
        fn map_pool_error(error: $crate::outbound::persistence::PoolError) -> $error {
            $crate::outbound::persistence::diesel_basic_error_mapping::map_basic_pool_error(
                error,
                <$error>::connection,
            )
        }

        fn map_diesel_error(error: diesel::result::Error) -> $error {
            $crate::outbound::persistence::diesel_basic_error_mapping::map_basic_diesel_error(
                error,
                <$error>::query,
                <$error>::connection,
            )
        }
    };
}

pub(crate) use basic_error_mappers;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::NotificationRepositoryError;
    use rstest::rstest;

    #[rstest]
    fn pool_errors_become_connection_errors() {
        let err: NotificationRepositoryError =
            map_basic_pool_error(PoolError::checkout("timed out"), |m| {
                NotificationRepositoryError::connection(m)
            });
        assert_eq!(err, NotificationRepositoryError::connection("timed out"));
    }

    #[rstest]
    fn not_found_is_a_query_error() {
        let err: NotificationRepositoryError = map_basic_diesel_error(
            diesel::result::Error::NotFound,
            NotificationRepositoryError::query,
            NotificationRepositoryError::connection,
        );
        assert_eq!(err, NotificationRepositoryError::query("record not found"));
    }
}

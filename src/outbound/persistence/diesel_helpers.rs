//! Shared helpers for the Diesel-backed Store adapter: error mapping from
//! pool/Diesel errors to [`EntityStoreError`], and the derived-column SQL
//! fragments the Maintainer contract (§4.2) relies on.

use tracing::debug;

use crate::domain::ports::EntityStoreError;

use super::pool::PoolError;

/// Map pool errors to domain store errors.
pub fn map_pool_error(error: PoolError) -> EntityStoreError {
    match error {
        PoolError::Checkout { message } | PoolError::Build { message } => {
            EntityStoreError::connection(message)
        }
    }
}

/// Map Diesel errors to domain store errors.
pub fn map_diesel_error(error: diesel::result::Error) -> EntityStoreError {
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), "diesel operation failed");
        }
        _ => debug!(
            error_type = %std::any::type_name_of_val(&error),
            "diesel operation failed"
        ),
    }

    match error {
        DieselError::NotFound => EntityStoreError::not_found("record not found"),
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            EntityStoreError::conflict(info.message().to_owned())
        }
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _) => {
            EntityStoreError::connection("database connection lost")
        }
        other => EntityStoreError::query(other.to_string()),
    }
}

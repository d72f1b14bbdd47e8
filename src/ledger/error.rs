//! Ledger error types
//!
//! Two layers: [`StoreError`] is what a backend reports for a single statement
//! or transaction primitive; [`LedgerError`] is what a unit of work returns to
//! its caller.

use thiserror::Error;

/// Request rejected before any persistence call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Amount must be greater than zero (got {0})")]
    InvalidAmount(i64),

    #[error("Account ID must be positive (got {0})")]
    InvalidAccountId(i64),

    #[error("Source and target account cannot be the same ({0})")]
    SameAccount(i64),

    #[error("Opening balance cannot be negative (got {0})")]
    NegativeOpeningBalance(i64),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

/// Backend-level failure of one statement or transaction primitive
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Lock wait timeout on account {0}")]
    LockTimeout(i64),

    #[error("Injected fault at {0}")]
    Injected(&'static str),

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl StoreError {
    /// Map a sqlx error raised while touching row `entity`/`id`
    pub fn from_sqlx(e: sqlx::Error, entity: &'static str, id: i64) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound { entity, id },
            other => StoreError::from(other),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        // SQLSTATE class 23: integrity constraint violation
        let constraint = e
            .as_database_error()
            .and_then(|db| db.code())
            .is_some_and(|code| code.starts_with("23"));

        if constraint {
            StoreError::Constraint(e.to_string())
        } else {
            StoreError::Database(e)
        }
    }
}

/// Failure of a ledger unit of work
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Transaction error: {0}")]
    Transaction(#[source] StoreError),

    #[error("Persistence error: {0}")]
    Persistence(#[source] StoreError),

    /// The unit of work failed and the rollback failed too. Both are kept.
    #[error("tx error: {cause}, rb err: {rollback}")]
    Rollback {
        cause: Box<LedgerError>,
        #[source]
        rollback: StoreError,
    },

    #[error("Transfer cancelled")]
    Cancelled,
}

impl LedgerError {
    /// Error code for API responses and log fields
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "VALIDATION_ERROR",
            LedgerError::NotFound { .. } => "NOT_FOUND",
            LedgerError::Transaction(_) => "TRANSACTION_ERROR",
            LedgerError::Persistence(_) => "PERSISTENCE_ERROR",
            LedgerError::Rollback { .. } => "ROLLBACK_ERROR",
            LedgerError::Cancelled => "CANCELLED",
        }
    }

    /// The failure that triggered the rollback, looking through `Rollback`
    pub fn root_cause(&self) -> &LedgerError {
        match self {
            LedgerError::Rollback { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { entity, id } => LedgerError::NotFound { entity, id },
            other => LedgerError::Persistence(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            LedgerError::from(ValidationError::InvalidAmount(0)).code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(LedgerError::Cancelled.code(), "CANCELLED");
        assert_eq!(
            LedgerError::Transaction(StoreError::Injected("begin")).code(),
            "TRANSACTION_ERROR"
        );
    }

    #[test]
    fn test_store_not_found_maps_to_not_found() {
        let err = LedgerError::from(StoreError::NotFound {
            entity: "account",
            id: 42,
        });
        assert!(matches!(
            err,
            LedgerError::NotFound {
                entity: "account",
                id: 42
            }
        ));
        assert_eq!(err.to_string(), "account 42 not found");
    }

    #[test]
    fn test_other_store_errors_map_to_persistence() {
        let err = LedgerError::from(StoreError::Constraint("fk".into()));
        assert_eq!(err.code(), "PERSISTENCE_ERROR");

        let err = LedgerError::from(StoreError::LockTimeout(3));
        assert_eq!(err.code(), "PERSISTENCE_ERROR");
    }

    #[test]
    fn test_row_not_found_carries_entity() {
        let err = StoreError::from_sqlx(sqlx::Error::RowNotFound, "entry", 9);
        assert!(matches!(
            err,
            StoreError::NotFound {
                entity: "entry",
                id: 9
            }
        ));
    }

    #[test]
    fn test_rollback_keeps_both_causes() {
        let err = LedgerError::Rollback {
            cause: Box::new(LedgerError::from(StoreError::Injected("create_entry"))),
            rollback: StoreError::Injected("rollback"),
        };

        assert_eq!(
            err.to_string(),
            "tx error: Persistence error: Injected fault at create_entry, rb err: Injected fault at rollback"
        );
        assert_eq!(err.root_cause().code(), "PERSISTENCE_ERROR");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_validation_display() {
        let err = LedgerError::from(ValidationError::SameAccount(5));
        assert_eq!(
            err.to_string(),
            "Source and target account cannot be the same (5)"
        );
    }
}

/// Persistence error type
///
/// Every gateway operation returns `StoreResult<T>`. Constraint violations are
/// classified so callers can turn them into field-level conflicts instead of
/// treating them as internal faults.

use thiserror::Error;

/// Result alias for gateway operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the persistence gateway
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint rejected the write (duplicate email, task name, role name)
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    /// A foreign key rejected the write (unknown role, role still in use, ...)
    #[error("Foreign key constraint violated: {constraint}")]
    ForeignKeyViolation { constraint: String },

    /// Failure injected by the in-memory gateway
    #[error("Injected failure: {0}")]
    Injected(String),

    /// Any other database failure
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl StoreError {
    /// Returns the violated constraint name for constraint errors
    pub fn constraint(&self) -> Option<&str> {
        match self {
            StoreError::UniqueViolation { constraint }
            | StoreError::ForeignKeyViolation { constraint } => Some(constraint),
            _ => None,
        }
    }

    /// True for a unique violation on the given constraint
    pub fn is_unique_violation_of(&self, name: &str) -> bool {
        matches!(self, StoreError::UniqueViolation { constraint } if constraint == name)
    }
}

/// Classify sqlx errors by Postgres SQLSTATE
///
/// - `23505` unique_violation
/// - `23503` foreign_key_violation
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let constraint = db_err.constraint().unwrap_or_default().to_string();
            match db_err.code().as_deref() {
                Some("23505") => return StoreError::UniqueViolation { constraint },
                Some("23503") => return StoreError::ForeignKeyViolation { constraint },
                _ => {}
            }
        }

        StoreError::Database(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_accessor() {
        let err = StoreError::UniqueViolation {
            constraint: "users_email_key".to_string(),
        };
        assert_eq!(err.constraint(), Some("users_email_key"));
        assert!(err.is_unique_violation_of("users_email_key"));
        assert!(!err.is_unique_violation_of("roles_name_key"));

        let err = StoreError::Injected("boom".to_string());
        assert_eq!(err.constraint(), None);
    }

    #[test]
    fn test_non_database_sqlx_error_is_wrapped() {
        let err: StoreError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, StoreError::Database(sqlx::Error::RowNotFound)));
    }

    #[test]
    fn test_error_display() {
        let err = StoreError::ForeignKeyViolation {
            constraint: "users_role_id_fkey".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Foreign key constraint violated: users_role_id_fkey"
        );
    }
}

//! Error types for querykit

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for querykit operations
pub type DbResult<T> = Result<T, DbError>;

/// Integrity constraint that rejected a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    NotNull,
    ForeignKey,
    Unique,
    Check,
}

impl ConstraintKind {
    /// Map an integrity-violation SQLSTATE (class 23) to its kind.
    pub fn from_sqlstate(code: &str) -> Option<Self> {
        match code {
            "23502" => Some(Self::NotNull),
            "23503" => Some(Self::ForeignKey),
            "23505" => Some(Self::Unique),
            "23514" => Some(Self::Check),
            _ => None,
        }
    }
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotNull => "not-null",
            Self::ForeignKey => "foreign key",
            Self::Unique => "unique",
            Self::Check => "check",
        })
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    /// Raised before any statement is sent: bad operator, OR-group arity,
    /// order field/direction, isolation level token, dialect mismatch.
    #[error("invalid query: {0}")]
    Validation(String),

    /// The database URL or connection setup was rejected.
    #[error("connection error: {0}")]
    Connection(String),

    #[cfg(feature = "pool")]
    #[error("pool error: {0}")]
    Pool(String),

    #[error("{kind} constraint `{constraint}` violated: {message}")]
    Constraint {
        kind: ConstraintKind,
        constraint: String,
        message: String,
    },

    /// Any other failure reported by the driver, passed through unchanged.
    #[error("statement failed: {0}")]
    Execution(#[from] tokio_postgres::Error),

    /// The transaction's unit of work did not settle before its deadline.
    /// The transaction has been rolled back when the caller sees this.
    #[error("transaction '{label}' timed out after {timeout:?}")]
    TransactionTimeout { label: String, timeout: Duration },

    #[error("{0}")]
    Other(String),
}

impl DbError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TransactionTimeout { .. })
    }

    /// The violated constraint's kind, if this is a constraint error.
    pub fn constraint_kind(&self) -> Option<ConstraintKind> {
        match self {
            Self::Constraint { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Classify a driver error; integrity violations become
    /// [`DbError::Constraint`], everything else [`DbError::Execution`].
    pub fn from_db_error(err: tokio_postgres::Error) -> Self {
        let classified = err.as_db_error().and_then(|db| {
            ConstraintKind::from_sqlstate(db.code().code()).map(|kind| Self::Constraint {
                kind,
                constraint: db.constraint().unwrap_or("unknown").to_string(),
                message: db.message().to_string(),
            })
        });
        classified.unwrap_or(Self::Execution(err))
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for DbError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}

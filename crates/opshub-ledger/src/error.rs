use thiserror::Error;

/// Ledger errors
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    /// A row with the same key already exists
    #[error("ledger conflict: {0}")]
    Conflict(String),

    /// The database rejected the statement or is unreachable
    #[error("ledger db error: {0}")]
    Db(String),

    /// A stored row does not decode into a record
    #[error("ledger corruption: {0}")]
    Corrupt(String),

    /// The blocking worker running the statement failed
    #[error("ledger task failed: {0}")]
    Task(String),
}

impl LedgerError {
    /// Returns true if the error is a uniqueness conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::Conflict(err.to_string())
            }
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::IntegralValueOutOfRange(..)
            | rusqlite::Error::InvalidColumnType(..) => Self::Corrupt(err.to_string()),
            other => Self::Db(other.to_string()),
        }
    }
}

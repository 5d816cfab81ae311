use crate::error::{Classify, ErrorKind};
use std::time::Duration;
use thiserror::Error;

/// Storage failures, shared by every backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("duplicate {field}")]
    Duplicate { field: &'static str },

    #[error("version conflict on {key}")]
    VersionConflict { key: String },

    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("{op} did not finish within {limit:?}")]
    Timeout { op: &'static str, limit: Duration },

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("blocking task failed: {0}")]
    Task(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Failures a retry may clear
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Timeout { .. } | StoreError::Pool(_) | StoreError::Unavailable(_) => true,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::Task(err.to_string())
    }
}

impl Classify for StoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::Duplicate { .. }
            | StoreError::VersionConflict { .. }
            | StoreError::Constraint(_) => ErrorKind::Conflict,
            StoreError::Timeout { .. } => ErrorKind::Timeout,
            _ => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        let timeout = StoreError::Timeout {
            op: "add_member",
            limit: Duration::from_secs(5),
        };
        assert!(timeout.is_transient());
        assert_eq!(timeout.kind(), ErrorKind::Timeout);
        assert!(!StoreError::NotFound { entity: "account" }.is_transient());
        assert!(!StoreError::Constraint("owner".into()).is_transient());
    }

    #[test]
    fn test_busy_database_is_transient() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(StoreError::from(busy).is_transient());
    }
}

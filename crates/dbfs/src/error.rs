//! dbfs error types.

use std::io;
use thiserror::Error;

/// dbfs error type.
#[derive(Debug, Error)]
pub enum DbfsError {
    /// No metadata row for the path.
    #[error("file does not exist: {0}")]
    NotExist(String),

    /// Exclusive create, or rename onto, a path that already has a row.
    #[error("file already exists: {0}")]
    Exist(String),

    /// Bad seek target or an operation the handle was not opened for.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Anything the row store reports, passed through untouched.
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
}

impl DbfsError {
    /// Create a NotExist error.
    pub fn not_exist(path: impl Into<String>) -> Self {
        Self::NotExist(path.into())
    }

    /// Create an Exist error.
    pub fn exist(path: impl Into<String>) -> Self {
        Self::Exist(path.into())
    }

    /// Create an InvalidArgument error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// The store error an interrupted operation fails with.
    ///
    /// Same code SQLite reports when its own interrupt aborts a statement.
    pub fn interrupted() -> Self {
        Self::Store(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_INTERRUPT),
            Some("interrupted".to_string()),
        ))
    }

    /// True for [`DbfsError::NotExist`].
    pub fn is_not_exist(&self) -> bool {
        matches!(self, Self::NotExist(_))
    }

    /// True for [`DbfsError::Exist`].
    pub fn is_exist(&self) -> bool {
        matches!(self, Self::Exist(_))
    }

    /// True when the operation was stopped by [`crate::Dbfs::interrupt`].
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self,
            Self::Store(e) if e.sqlite_error_code() == Some(rusqlite::ErrorCode::OperationInterrupted)
        )
    }
}

/// Convert DbfsError to std::io::Error so handles work with `std::io` consumers.
impl From<DbfsError> for io::Error {
    fn from(e: DbfsError) -> Self {
        match e {
            DbfsError::NotExist(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            DbfsError::Exist(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            DbfsError::InvalidArgument(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            DbfsError::Store(e) => io::Error::other(e),
        }
    }
}

/// dbfs result type.
pub type DbfsResult<T> = Result<T, DbfsError>;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqliteSessionError {
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    /// An operation was invoked without its precondition (no transaction,
    /// transaction already marked successful, nested transaction, closed database).
    #[error("IllegalStateException {0}")]
    IllegalState(String),

    #[error("IllegalArgumentException {0}")]
    IllegalArgument(String),

    /// The statement type cannot run through a single-statement transaction.
    #[error("{0} statement not supported.")]
    Unsupported(String),

    /// A frame ended unsuccessfully without a statement error of its own.
    #[error("Transaction rolled back: {0}")]
    Rollback(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Other database error: {0}")]
    Other(String),
}

impl SqliteSessionError {
    /// Whether this error reports a violated precondition rather than a failed statement.
    #[must_use]
    pub fn is_illegal_state(&self) -> bool {
        matches!(self, Self::IllegalState(_))
    }
}

impl From<serde_json::Error> for SqliteSessionError {
    fn from(err: serde_json::Error) -> Self {
        SqliteSessionError::ConfigError(format!("invalid database configuration: {err}"))
    }
}

impl From<tokio::task::JoinError> for SqliteSessionError {
    fn from(err: tokio::task::JoinError) -> Self {
        SqliteSessionError::ConnectionError(format!("SQLite blocking task failed: {err}"))
    }
}

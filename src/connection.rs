use async_trait::async_trait;

use crate::error::SqliteSessionError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// Asynchronous connection that runs one statement per transaction.
///
/// Every call is its own transaction: it either commits and yields the
/// statement's [`ResultSet`] or rolls back and yields the error. Sessions never
/// close a connection; whoever created it owns its lifetime.
///
/// ```rust
/// use async_trait::async_trait;
/// use sqlite_session::prelude::*;
///
/// struct Echo;
///
/// #[async_trait]
/// impl Connection for Echo {
///     async fn execute_sql(
///         &self,
///         _sql: &str,
///         params: &[RowValues],
///     ) -> Result<ResultSet, SqliteSessionError> {
///         Ok(ResultSet::from_changes(params.len(), None))
///     }
/// }
/// ```
#[async_trait]
pub trait Connection: Send + Sync {
    /// Run `sql` with `params` inside a fresh transaction.
    ///
    /// # Errors
    ///
    /// Returns the statement's failure; the transaction has been rolled back.
    async fn execute_sql(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, SqliteSessionError>;
}

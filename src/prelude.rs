//! Convenient imports for common functionality.
//!
//! This module re-exports the types most callers need to drive sessions,
//! queues and databases.

pub use crate::config::{
    CounterScope, DatabaseConfiguration, DatabaseConfigurationBuilder, OpenMode,
};
pub use crate::connection::Connection;
pub use crate::cursor::ExecCursor;
pub use crate::database::Database;
pub use crate::error::SqliteSessionError;
pub use crate::event::{
    DatabaseListener, EventData, EventId, EventSource, ExecutionOutcome, QueueListener,
    SqliteEvent,
};
pub use crate::queue::{Command, CommandKind, CommandQueue, QueuedStatement, TransactionQueue};
pub use crate::registry::{DatabaseRegistry, SharedDatabase};
pub use crate::results::{ResultSet, Row};
pub use crate::session::{
    Session, SessionState, SqliteTransactionAdapter, SqliteTransactionListener,
    TransactionAdapter, TransactionCounter, TransactionListener,
};
pub use crate::sql_builder::{
    ConflictAlgorithm, ContentValues, DeleteRequest, InsertRequest, UpdateRequest,
};
pub use crate::types::RowValues;

#[cfg(feature = "sqlite")]
pub use crate::sqlite::SqliteConnection;

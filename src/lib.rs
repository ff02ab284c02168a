//! Nested transactions, serialized command queues and listener events on top
//! of an asynchronous connection that runs one statement per transaction.
//!
//! A [`Session`] presents a transaction stack over such a connection:
//! transactions begun while another is active nest inside it, end innermost
//! first, and a failed child keeps its parent from committing.
//! [`TransactionQueue`] runs a batch of statements strictly in order, and
//! [`CommandQueue`] drains staged inserts, updates, deletes and raw statements
//! one at a time, reporting each through events.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sqlite_session::prelude::*;
//!
//! # async fn demo() -> Result<(), SqliteSessionError> {
//! let connection = Arc::new(SqliteConnection::open_in_memory()?);
//! let mut session = Session::new(connection)?;
//!
//! session.begin_transaction("CREATE TABLE t(id INTEGER)", vec![], None);
//! session.begin_transaction(
//!     "INSERT INTO t VALUES (?1)",
//!     vec![RowValues::Int(1)],
//!     Some(
//!         SqliteTransactionListener::new()
//!             .on_commit(|_session, rs| {
//!                 println!("inserted row {:?}", rs.insert_id);
//!                 Ok(())
//!             })
//!             .boxed(),
//!     ),
//! );
//! session.run_until_idle().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod cursor;
pub mod database;
pub mod error;
pub mod event;
pub mod prelude;
pub mod queue;
pub mod registry;
pub mod results;
pub mod session;
pub mod sql_builder;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod types;

pub use config::{CounterScope, DatabaseConfiguration, DatabaseConfigurationBuilder, OpenMode};
pub use connection::Connection;
pub use cursor::ExecCursor;
pub use database::Database;
pub use error::SqliteSessionError;
pub use event::{
    DatabaseListener, EventBus, EventData, EventId, EventSource, ExecutionData, ExecutionOutcome,
    QueueListener, SqliteEvent,
};
pub use queue::{Command, CommandKind, CommandQueue, QueueItem, QueuedStatement, TransactionQueue};
pub use registry::{DatabaseRegistry, SharedDatabase};
pub use results::{ResultSet, Row};
pub use session::{
    Session, SessionState, SqliteTransactionAdapter, SqliteTransactionListener, Transaction,
    TransactionAdapter, TransactionCounter, TransactionListener, TransactionMode, TransactionPool,
};
pub use sql_builder::{
    BoundStatement, ConflictAlgorithm, ContentValues, DeleteRequest, InsertRequest, UpdateRequest,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteConnection;
pub use types::{RowValues, StatementType};

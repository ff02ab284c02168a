use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::connection::Connection;
use crate::error::SqliteSessionError;
use crate::results::ResultSet;
use crate::types::RowValues;

pub(crate) struct StatementRequest {
    pub(crate) id: u64,
    pub(crate) sql: String,
    pub(crate) params: Vec<RowValues>,
}

/// Outcome of one statement, routed back to the frame that submitted it.
pub(crate) struct Completion {
    pub(crate) id: u64,
    pub(crate) outcome: Result<ResultSet, SqliteSessionError>,
}

/// Task that owns a session's side of the connection and runs submitted
/// statements one at a time, in submission order.
pub(crate) struct StatementWorker {
    sender: UnboundedSender<StatementRequest>,
}

impl StatementWorker {
    /// Spawn the worker on the current tokio runtime.
    ///
    /// # Errors
    /// Returns [`SqliteSessionError::ConnectionError`] when called outside a runtime.
    pub(crate) fn spawn(
        connection: Arc<dyn Connection>,
    ) -> Result<(Self, UnboundedReceiver<Completion>), SqliteSessionError> {
        let handle = Handle::try_current().map_err(|err| {
            SqliteSessionError::ConnectionError(format!(
                "a tokio runtime is required to drive a session: {err}"
            ))
        })?;
        let (sender, receiver) = mpsc::unbounded_channel::<StatementRequest>();
        let (completions, completed) = mpsc::unbounded_channel::<Completion>();
        handle.spawn(run_statement_worker(connection, receiver, completions));
        Ok((Self { sender }, completed))
    }

    /// # Errors
    /// Returns [`SqliteSessionError::ConnectionError`] if the worker has stopped.
    pub(crate) fn submit(&self, request: StatementRequest) -> Result<(), SqliteSessionError> {
        self.sender
            .send(request)
            .map_err(|_| SqliteSessionError::ConnectionError("statement worker closed".into()))
    }
}

impl fmt::Debug for StatementWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatementWorker")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

async fn run_statement_worker(
    connection: Arc<dyn Connection>,
    mut receiver: UnboundedReceiver<StatementRequest>,
    completions: UnboundedSender<Completion>,
) {
    while let Some(StatementRequest { id, sql, params }) = receiver.recv().await {
        tracing::trace!(id, %sql, "dispatching statement");
        let outcome = connection.execute_sql(&sql, &params).await;
        if completions.send(Completion { id, outcome }).is_err() {
            // Session dropped; nobody is waiting for results anymore.
            break;
        }
    }
}

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::SqliteSessionError;
use crate::event::{EventData, EventId, EventSource, SqliteEvent};
use crate::results::ResultSet;
use crate::session::{Session, TransactionListener};
use crate::types::RowValues;

/// One statement of a bootstrap script.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedStatement {
    pub statement: String,
    pub bind_args: Vec<RowValues>,
}

impl QueuedStatement {
    #[must_use]
    pub fn new(statement: impl Into<String>, bind_args: Vec<RowValues>) -> Self {
        Self {
            statement: statement.into(),
            bind_args,
        }
    }
}

impl From<&str> for QueuedStatement {
    fn from(statement: &str) -> Self {
        Self::new(statement, Vec::new())
    }
}

impl From<String> for QueuedStatement {
    fn from(statement: String) -> Self {
        Self::new(statement, Vec::new())
    }
}

type CompleteFn = Box<dyn FnOnce(&mut Session) -> Result<(), SqliteSessionError> + Send>;

#[derive(Default)]
struct QueueState {
    pending: Vec<QueuedStatement>,
    /// `Some` once begun; frozen against `offer` until it drains.
    drain: Option<VecDeque<QueuedStatement>>,
    complete: Option<CompleteFn>,
}

impl QueueState {
    /// Whether statements may be appended; a drained batch goes back to pending.
    fn accepts_offers(&mut self) -> bool {
        let Some(drain) = self.drain.as_ref() else {
            return true;
        };
        if !drain.is_empty() {
            return false;
        }
        self.drain = None;
        true
    }
}

/// Ordered runner for a batch of statements, each in its own session
/// transaction, one at a time.
///
/// Every step emits BEGIN, then COMMIT or ROLLBACK, on the session's event bus.
/// A rolled-back step does not stop the batch. The completion callback fires
/// once, when a step commits and no statements remain.
///
/// ```rust,no_run
/// use sqlite_session::prelude::*;
///
/// # async fn bootstrap(session: &mut Session) -> Result<(), SqliteSessionError> {
/// let queue = TransactionQueue::new();
/// queue.offer("CREATE TABLE a(id INTEGER)");
/// queue.offer("CREATE TABLE b(id INTEGER)");
/// queue.on_complete(|_session| {
///     println!("schema ready");
///     Ok(())
/// });
/// queue.begin(session);
/// session.run_until_idle().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct TransactionQueue {
    state: Arc<Mutex<QueueState>>,
}

impl TransactionQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the callback fired after the last statement commits.
    pub fn on_complete<F>(&self, complete: F)
    where
        F: FnOnce(&mut Session) -> Result<(), SqliteSessionError> + Send + 'static,
    {
        self.lock().complete = Some(Box::new(complete));
    }

    /// Append a statement; `false` while a begun batch is still draining.
    pub fn offer(&self, statement: impl Into<QueuedStatement>) -> bool {
        let mut state = self.lock();
        if !state.accepts_offers() {
            return false;
        }
        state.pending.push(statement.into());
        true
    }

    pub fn add(&self, statement: impl Into<QueuedStatement>) -> bool {
        self.offer(statement)
    }

    /// Append every statement; `false`, with nothing appended, while the
    /// batch is draining.
    pub fn add_all<I>(&self, statements: I) -> bool
    where
        I: IntoIterator,
        I::Item: Into<QueuedStatement>,
    {
        let mut state = self.lock();
        if !state.accepts_offers() {
            return false;
        }
        state.pending.extend(statements.into_iter().map(Into::into));
        true
    }

    /// Freeze the offered statements and dispatch the first one.
    pub fn begin(&self, session: &mut Session) -> bool {
        {
            let mut state = self.lock();
            let batch: VecDeque<QueuedStatement> = state.pending.drain(..).collect();
            tracing::debug!(statements = batch.len(), "transaction queue begun");
            state.drain = Some(batch);
        }
        self.next(session)
    }

    /// Dispatch the next statement; `false` when none is left.
    pub fn next(&self, session: &mut Session) -> bool {
        let Some(statement) = self.poll() else {
            return false;
        };
        let listener = QueueStep {
            queue: self.clone(),
        };
        session.begin_transaction(
            statement.statement,
            statement.bind_args,
            Some(Box::new(listener)),
        );
        true
    }

    #[must_use]
    pub fn peek(&self) -> Option<QueuedStatement> {
        let state = self.lock();
        match state.drain.as_ref() {
            Some(drain) => drain.front().cloned(),
            None => state.pending.first().cloned(),
        }
    }

    /// Take the next statement of a begun batch.
    pub fn poll(&self) -> Option<QueuedStatement> {
        self.lock().drain.as_mut().and_then(VecDeque::pop_front)
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.pending.clear();
        if let Some(drain) = state.drain.as_mut() {
            drain.clear();
        }
    }

    #[must_use]
    pub fn contains(&self, statement: &QueuedStatement) -> bool {
        let state = self.lock();
        match state.drain.as_ref() {
            Some(drain) => drain.contains(statement),
            None => state.pending.contains(statement),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        let state = self.lock();
        match state.drain.as_ref() {
            Some(drain) => drain.len(),
            None => state.pending.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_begun(&self) -> bool {
        self.lock().drain.is_some()
    }

    fn take_complete(&self) -> Option<CompleteFn> {
        self.lock().complete.take()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl fmt::Debug for TransactionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionQueue")
            .field("len", &self.len())
            .field("begun", &self.is_begun())
            .finish()
    }
}

struct QueueStep {
    queue: TransactionQueue,
}

impl TransactionListener for QueueStep {
    fn on_begin(&mut self, session: &mut Session) -> Result<(), SqliteSessionError> {
        session.notify_listeners(&SqliteEvent::without_data(
            EventSource::TransactionQueue,
            EventId::Begin,
        ));
        Ok(())
    }

    fn on_commit(
        &mut self,
        session: &mut Session,
        result: &ResultSet,
    ) -> Result<(), SqliteSessionError> {
        session.notify_listeners(&SqliteEvent::new(
            EventSource::TransactionQueue,
            EventId::Commit,
            EventData::ResultSet(result),
        ));
        if !self.queue.next(session) {
            if let Some(complete) = self.queue.take_complete() {
                tracing::debug!("transaction queue drained");
                return complete(session);
            }
        }
        Ok(())
    }

    fn on_rollback(
        &mut self,
        session: &mut Session,
        error: &SqliteSessionError,
    ) -> Result<(), SqliteSessionError> {
        session.notify_listeners(&SqliteEvent::new(
            EventSource::TransactionQueue,
            EventId::Rollback,
            EventData::Error(error),
        ));
        // Keep draining; completion only follows a commit.
        self.queue.next(session);
        Ok(())
    }
}

//! Nested transactions over a connection that runs one statement per transaction.
//!
//! A [`Session`] keeps a stack of [`Transaction`] frames. Beginning a transaction
//! only queues the request; the session's event loop ([`Session::step`] /
//! [`Session::run_until_idle`]) grants queued requests, hands their statements to
//! a single statement worker and resolves frames as completions come back:
//! success marks the frame successful and ends it, failure ends it as a rollback.
//! Frames always end innermost first. A completion for a frame that is not on top
//! waits until its frame is.

mod counter;
mod listener;
mod ops;
mod transaction;
mod worker;

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::connection::Connection;
use crate::error::SqliteSessionError;
use crate::event::{EventBus, EventData, EventId, EventSource, SqliteEvent};
use crate::results::ResultSet;
use crate::types::{RowValues, StatementType};

pub use counter::TransactionCounter;
pub use listener::{
    SqliteTransactionAdapter, SqliteTransactionListener, TransactionAdapter, TransactionListener,
};
pub use transaction::{Transaction, TransactionMode, TransactionPool};

use worker::{Completion, StatementRequest, StatementWorker};

type StatementOutcome = Result<ResultSet, SqliteSessionError>;

/// Observable state of a session's stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    InTransaction { depth: usize },
}

struct PendingBegin {
    /// `None` opens a frame that only ends through explicit commit/rollback.
    sql: Option<String>,
    statement: String,
    params: Vec<RowValues>,
    listener: Option<Box<dyn TransactionListener>>,
}

pub struct Session {
    connection: Arc<dyn Connection>,
    worker: StatementWorker,
    completions: UnboundedReceiver<Completion>,
    counter: TransactionCounter,
    num_transaction: u64,
    pool: TransactionPool,
    top: Option<usize>,
    pending: VecDeque<PendingBegin>,
    in_flight: usize,
    parked: HashMap<u64, StatementOutcome>,
    resolving: Option<usize>,
    events: EventBus,
    label: String,
}

impl Session {
    /// Create a session over `connection` with its own counter and listener list.
    ///
    /// # Errors
    /// Returns [`SqliteSessionError::ConnectionError`] if no tokio runtime is running.
    pub fn new(connection: Arc<dyn Connection>) -> Result<Self, SqliteSessionError> {
        Self::with_context(
            connection,
            TransactionCounter::new(),
            EventBus::new(),
            "session",
        )
    }

    /// Create a session that draws ids from `counter` and broadcasts on `events`.
    ///
    /// # Errors
    /// Returns [`SqliteSessionError::ConnectionError`] if no tokio runtime is running.
    pub fn with_context(
        connection: Arc<dyn Connection>,
        counter: TransactionCounter,
        events: EventBus,
        label: impl Into<String>,
    ) -> Result<Self, SqliteSessionError> {
        let (worker, completions) = StatementWorker::spawn(Arc::clone(&connection))?;
        Ok(Self {
            connection,
            worker,
            completions,
            counter,
            num_transaction: 0,
            pool: TransactionPool::new(),
            top: None,
            pending: VecDeque::new(),
            in_flight: 0,
            parked: HashMap::new(),
            resolving: None,
            events,
            label: label.into(),
        })
    }

    /// Ask the connection for a transaction that runs `sql` with `params`.
    ///
    /// Returns immediately. When the request is granted, `listener.on_begin`
    /// runs and a frame is pushed; when the statement completes the frame is
    /// committed or rolled back.
    pub fn begin_transaction(
        &mut self,
        sql: impl Into<String>,
        params: Vec<RowValues>,
        listener: Option<Box<dyn TransactionListener>>,
    ) {
        let sql = sql.into();
        tracing::debug!(%sql, queued = self.pending.len() + 1, "transaction requested");
        self.pending.push_back(PendingBegin {
            statement: sql.clone(),
            sql: Some(sql),
            params,
            listener,
        });
    }

    /// Mark the innermost frame successful and end it.
    ///
    /// # Errors
    /// [`SqliteSessionError::IllegalState`] if there is no transaction or the
    /// innermost one is already marked successful; otherwise any listener error.
    pub fn set_transaction_successful(
        &mut self,
        result: ResultSet,
    ) -> Result<(), SqliteSessionError> {
        self.throw_if_no_transaction()?;
        self.throw_if_transaction_marked_successful()?;
        self.throw_if_ending()?;
        let top = self.top_slot()?;
        self.pool.get_mut(top).marked_successful = true;
        self.end_transaction(Ok(result))
    }

    /// End the innermost frame; it commits only if it was marked successful,
    /// none of its children failed and `result` is `Ok`.
    ///
    /// # Errors
    /// [`SqliteSessionError::IllegalState`] if there is no transaction, or the
    /// error the frame's listener returned (after the frame has been popped).
    pub fn end_transaction(&mut self, result: StatementOutcome) -> Result<(), SqliteSessionError> {
        self.throw_if_no_transaction()?;
        self.throw_if_ending()?;
        self.end_transaction_unchecked(result)
    }

    /// Route BEGIN, COMMIT/END and ROLLBACK text to the matching control
    /// operation instead of executing it. Returns whether `sql` was one of them.
    ///
    /// # Errors
    /// Errors of [`set_transaction_successful`](Self::set_transaction_successful)
    /// or [`end_transaction`](Self::end_transaction).
    pub fn execute_special(
        &mut self,
        sql: &str,
        listener: Option<Box<dyn TransactionListener>>,
        result: ResultSet,
    ) -> Result<bool, SqliteSessionError> {
        let kind = StatementType::classify(sql);
        if !kind.is_transaction_control() {
            return Ok(false);
        }
        match kind {
            StatementType::Begin => {
                tracing::debug!(%sql, "explicit transaction requested");
                self.pending.push_back(PendingBegin {
                    sql: None,
                    statement: sql.trim().to_owned(),
                    params: Vec::new(),
                    listener,
                });
                Ok(true)
            }
            StatementType::Commit => {
                self.set_transaction_successful(result)?;
                Ok(true)
            }
            StatementType::Abort => {
                self.end_transaction(Ok(result))?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Run one turn of the event loop: grant a queued begin, or resolve a
    /// waiting completion, or wait for the next one. `Ok(false)` means idle.
    ///
    /// # Errors
    /// A listener error raised while ending a frame, or
    /// [`SqliteSessionError::ConnectionError`] if the statement worker stopped.
    pub async fn step(&mut self) -> Result<bool, SqliteSessionError> {
        if let Some(request) = self.pending.pop_front() {
            self.enter_transaction(request);
            return Ok(true);
        }
        if let Some(outcome) = self.top_id().and_then(|id| self.parked.remove(&id)) {
            self.apply_outcome(outcome)?;
            return Ok(true);
        }
        if self.in_flight == 0 {
            return Ok(false);
        }
        let completion = self.completions.recv().await.ok_or_else(|| {
            SqliteSessionError::ConnectionError("statement worker stopped".into())
        })?;
        self.in_flight -= 1;
        self.accept_completion(completion)?;
        Ok(true)
    }

    /// Drive the event loop until nothing is queued or in flight.
    ///
    /// Frames opened with an explicit BEGIN stay on the stack.
    ///
    /// # Errors
    /// The first error [`step`](Self::step) returns.
    pub async fn run_until_idle(&mut self) -> Result<(), SqliteSessionError> {
        while self.step().await? {}
        Ok(())
    }

    pub fn notify_listeners(&self, event: &SqliteEvent<'_>) {
        self.events.notify(event);
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    #[must_use]
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Id given to the most recently granted transaction.
    #[must_use]
    pub fn num_transaction(&self) -> u64 {
        self.num_transaction
    }

    #[must_use]
    pub fn counter(&self) -> &TransactionCounter {
        &self.counter
    }

    #[must_use]
    pub fn has_transaction(&self) -> bool {
        self.top.is_some()
    }

    #[must_use]
    pub fn has_nested_transaction(&self) -> bool {
        self.top
            .is_some_and(|slot| self.pool.get(slot).parent.is_some())
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames().count()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        match self.depth() {
            0 => SessionState::Idle,
            depth => SessionState::InTransaction { depth },
        }
    }

    /// Innermost active frame.
    #[must_use]
    pub fn current_transaction(&self) -> Option<&Transaction> {
        self.top.map(|slot| self.pool.get(slot))
    }

    /// Active frames from innermost to outermost.
    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> + '_ {
        self.frames().map(|slot| self.pool.get(slot))
    }

    /// Begin requests not yet granted.
    #[must_use]
    pub fn pending_transactions(&self) -> usize {
        self.pending.len()
    }

    /// Statements submitted whose completion has not been received.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.in_flight == 0 && self.parked.is_empty()
    }

    /// Transaction records ever allocated by this session.
    #[must_use]
    pub fn allocated_transactions(&self) -> usize {
        self.pool.allocated()
    }

    /// Transaction records waiting for reuse.
    #[must_use]
    pub fn pooled_transactions(&self) -> usize {
        self.pool.available()
    }

    /// # Errors
    /// [`SqliteSessionError::IllegalState`] when more than one frame is active.
    pub fn throw_if_nested_transaction(&self) -> Result<(), SqliteSessionError> {
        if self.has_nested_transaction() {
            return Err(SqliteSessionError::IllegalState(
                "Cannot perform this operation because a nested transaction is in progress."
                    .into(),
            ));
        }
        Ok(())
    }

    /// # Errors
    /// [`SqliteSessionError::IllegalState`] when no frame is active.
    pub fn throw_if_no_transaction(&self) -> Result<(), SqliteSessionError> {
        if self.top.is_none() {
            return Err(SqliteSessionError::IllegalState(
                "Cannot perform this operation because there is no current transaction.".into(),
            ));
        }
        Ok(())
    }

    /// # Errors
    /// [`SqliteSessionError::IllegalState`] when the innermost frame is already marked successful.
    pub fn throw_if_transaction_marked_successful(&self) -> Result<(), SqliteSessionError> {
        if self
            .current_transaction()
            .is_some_and(Transaction::is_marked_successful)
        {
            return Err(SqliteSessionError::IllegalState(
                "Cannot perform this operation because the transaction has already been marked \
                 successful.  The only thing you can do now is call endTransaction()."
                    .into(),
            ));
        }
        Ok(())
    }

    fn throw_if_ending(&self) -> Result<(), SqliteSessionError> {
        if self.resolving.is_some() && self.resolving == self.top {
            return Err(SqliteSessionError::IllegalState(
                "Cannot perform this operation because the transaction is already ending.".into(),
            ));
        }
        Ok(())
    }

    fn top_slot(&self) -> Result<usize, SqliteSessionError> {
        self.top.ok_or_else(|| {
            SqliteSessionError::IllegalState(
                "Cannot perform this operation because there is no current transaction.".into(),
            )
        })
    }

    fn top_id(&self) -> Option<u64> {
        self.current_transaction().map(Transaction::id)
    }

    fn frames(&self) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(self.top, |&slot| self.pool.get(slot).parent)
    }

    fn is_live(&self, id: u64) -> bool {
        self.transactions().any(|t| t.id == id)
    }

    fn enter_transaction(&mut self, request: PendingBegin) {
        let PendingBegin {
            sql,
            statement,
            params,
            mut listener,
        } = request;
        let id = self.counter.advance();
        self.num_transaction = id;

        if let Err(err) = self.start_frame(id, sql, params, listener.as_deref_mut()) {
            tracing::warn!(id, error = %err, "failed to enter transaction; discarding stack");
            self.discard_stack();
            let event = SqliteEvent::new(EventSource::Session, EventId::Error, EventData::Error(&err));
            self.notify_listeners(&event);
            return;
        }

        let slot = self.pool.obtain(listener);
        let frame = self.pool.get_mut(slot);
        frame.id = id;
        frame.statement = statement;
        frame.parent = self.top;
        self.top = Some(slot);
        tracing::debug!(id, depth = self.depth(), "transaction frame pushed");
    }

    fn start_frame(
        &mut self,
        id: u64,
        sql: Option<String>,
        params: Vec<RowValues>,
        listener: Option<&mut (dyn TransactionListener + 'static)>,
    ) -> Result<(), SqliteSessionError> {
        if let Some(listener) = listener {
            listener.on_begin(self)?;
        }
        if let Some(sql) = sql {
            self.worker.submit(StatementRequest { id, sql, params })?;
            self.in_flight += 1;
        }
        Ok(())
    }

    fn discard_stack(&mut self) {
        let slots: Vec<usize> = self.frames().collect();
        for slot in slots {
            self.pool.recycle(slot);
        }
        self.top = None;
        self.parked.clear();
    }

    fn accept_completion(&mut self, completion: Completion) -> Result<(), SqliteSessionError> {
        let Completion { id, outcome } = completion;
        if self.top_id() == Some(id) {
            self.apply_outcome(outcome)
        } else if self.is_live(id) {
            tracing::debug!(id, "completion parked until its frame is innermost");
            self.parked.insert(id, outcome);
            Ok(())
        } else {
            tracing::debug!(id, "completion discarded; transaction already ended");
            Ok(())
        }
    }

    fn apply_outcome(&mut self, outcome: StatementOutcome) -> Result<(), SqliteSessionError> {
        match outcome {
            Ok(result) => self.set_transaction_successful(result),
            Err(err) => self.end_transaction(Err(err)),
        }
    }

    fn end_transaction_unchecked(
        &mut self,
        result: StatementOutcome,
    ) -> Result<(), SqliteSessionError> {
        let slot = self.top_slot()?;
        let (id, marked, child_failed, listener) = {
            let frame = self.pool.get_mut(slot);
            (
                frame.id,
                frame.marked_successful,
                frame.child_failed,
                frame.listener.take(),
            )
        };
        let mut successful = marked && !child_failed && result.is_ok();

        let mut listener_error = None;
        if let Some(mut listener) = listener {
            let previous = self.resolving.replace(slot);
            let outcome = match (successful, result) {
                (true, Ok(rs)) => listener.on_commit(self, &rs),
                (_, Err(err)) => listener.on_rollback(self, &err),
                (false, Ok(_)) => {
                    let reason = if child_failed {
                        "a nested transaction failed"
                    } else {
                        "the transaction was not marked successful"
                    };
                    listener.on_rollback(self, &SqliteSessionError::Rollback(reason.into()))
                }
            };
            self.resolving = previous;
            if let Err(err) = outcome {
                tracing::warn!(id, error = %err, "transaction listener failed");
                successful = false;
                listener_error = Some(err);
            }
        }

        self.top = self.pool.get(slot).parent;
        self.pool.recycle(slot);
        self.parked.remove(&id);

        match self.top {
            Some(parent) => {
                if !successful {
                    self.pool.get_mut(parent).child_failed = true;
                }
                tracing::debug!(id, successful, depth = self.depth(), "nested transaction ended");
            }
            // The outermost outcome reaches only its listener; nothing is broadcast.
            None => tracing::debug!(id, successful, "transaction ended"),
        }

        match listener_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("label", &self.label)
            .field("depth", &self.depth())
            .field("num_transaction", &self.num_transaction)
            .field("pending", &self.pending.len())
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

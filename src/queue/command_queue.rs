use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::cursor::ExecCursor;
use crate::error::SqliteSessionError;
use crate::event::{
    EventData, EventId, EventSource, ExecutionData, ExecutionOutcome, QueueListener, SqliteEvent,
};
use crate::session::{Session, TransactionAdapter};
use crate::sql_builder::{DeleteRequest, InsertRequest, UpdateRequest};
use crate::types::RowValues;

use super::CommandKind;

/// A staged data operation and everything it needs to run.
#[derive(Debug, Clone)]
pub enum Command {
    Insert(InsertRequest),
    Replace(InsertRequest),
    Update(UpdateRequest),
    Delete {
        request: DeleteRequest,
        /// When false a failed delete is broadcast as ERROR and the drain stops.
        catch_error: bool,
    },
    Drop {
        table: String,
    },
    Exec {
        sql: String,
        bind_args: Vec<RowValues>,
    },
}

impl Command {
    #[must_use]
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Insert(_) => CommandKind::Insert,
            Command::Replace(_) => CommandKind::Replace,
            Command::Update(_) => CommandKind::Update,
            Command::Delete { .. } => CommandKind::Delete,
            Command::Drop { .. } => CommandKind::Drop,
            Command::Exec { .. } => CommandKind::Exec,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueItem {
    name: Option<String>,
    index: usize,
    command: Command,
}

impl QueueItem {
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Position in insertion order, starting at 0.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn command(&self) -> &Command {
        &self.command
    }

    #[must_use]
    pub fn kind(&self) -> CommandKind {
        self.command.kind()
    }
}

#[derive(Default)]
struct ItemState {
    items: VecDeque<QueueItem>,
    next_index: usize,
    busy: bool,
}

/// Named FIFO of data operations drained one at a time through a session.
///
/// [`execute`](Self::execute) dispatches the head item; when its transaction
/// resolves the next item is dispatched, so at most one item is in flight.
/// Each item reports BEGIN when granted, then COMMIT (or ROLLBACK) if another
/// item followed it, or READY if it was the last.
#[derive(Clone)]
pub struct CommandQueue {
    name: Arc<str>,
    state: Arc<Mutex<ItemState>>,
}

impl CommandQueue {
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            state: Arc::default(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stage `command`; returns the item's index.
    pub fn offer(&self, name: Option<&str>, command: Command) -> usize {
        let mut state = self.lock();
        let index = state.next_index;
        state.next_index += 1;
        tracing::trace!(queue = %self.name, index, command = %command.kind(), "item staged");
        state.items.push_back(QueueItem {
            name: name.map(str::to_owned),
            index,
            command,
        });
        index
    }

    pub fn insert(&self, name: Option<&str>, request: InsertRequest) -> usize {
        self.offer(name, Command::Insert(request))
    }

    pub fn replace(&self, name: Option<&str>, request: InsertRequest) -> usize {
        self.offer(name, Command::Replace(request))
    }

    pub fn update(&self, name: Option<&str>, request: UpdateRequest) -> usize {
        self.offer(name, Command::Update(request))
    }

    /// Stage a delete. With `catch_error` false a failure is broadcast as an
    /// ERROR event instead of reaching the queue's listener, and the drain stops.
    pub fn delete(&self, name: Option<&str>, request: DeleteRequest, catch_error: bool) -> usize {
        self.offer(
            name,
            Command::Delete {
                request,
                catch_error,
            },
        )
    }

    pub fn drop_table(&self, name: Option<&str>, table: impl Into<String>) -> usize {
        self.offer(
            name,
            Command::Drop {
                table: table.into(),
            },
        )
    }

    pub fn exec(&self, name: Option<&str>, sql: impl Into<String>, bind_args: Vec<RowValues>) -> usize {
        self.offer(
            name,
            Command::Exec {
                sql: sql.into(),
                bind_args,
            },
        )
    }

    /// Dispatch the head item through `session`.
    ///
    /// Events go to `listener`, or to the session's event bus when it is `None`.
    /// Returns `Ok(false)` when the queue is empty or an item is already in flight.
    ///
    /// # Errors
    /// A synchronous failure of the item's operation, such as an update without values.
    pub fn execute(
        &self,
        session: &mut Session,
        listener: Option<Arc<dyn QueueListener>>,
    ) -> Result<bool, SqliteSessionError> {
        let item = {
            let mut state = self.lock();
            if state.busy {
                return Ok(false);
            }
            let Some(item) = state.items.pop_front() else {
                return Ok(false);
            };
            state.busy = true;
            item
        };
        let QueueItem {
            name,
            index,
            command,
        } = item;
        tracing::debug!(queue = %self.name, index, command = %command.kind(), "dispatching item");

        let adapter = QueueItemAdapter {
            queue: self.clone(),
            listener,
            name,
            index,
            kind: command.kind(),
            table: None,
            catch_error: true,
        };
        let adapter: Option<Box<dyn TransactionAdapter>> = Some(Box::new(adapter));

        let dispatched = match command {
            Command::Insert(request) => session.insert_query(request, adapter),
            Command::Replace(request) => session.replace_query(request, adapter),
            Command::Update(request) => session.update_query(request, adapter),
            Command::Delete {
                request,
                catch_error,
            } => session.delete_query(request, catch_error, adapter),
            Command::Drop { table } => session.drop_table(&table, adapter),
            Command::Exec { sql, bind_args } => session.exec_sql(&sql, bind_args, adapter),
        };
        if let Err(err) = dispatched {
            self.release();
            return Err(err);
        }
        Ok(true)
    }

    pub fn peek(&self) -> Option<QueueItem> {
        self.lock().items.front().cloned()
    }

    /// Remove the head item without running it.
    pub fn poll(&self) -> Option<QueueItem> {
        self.lock().items.pop_front()
    }

    /// Drop staged items and forget an unresolved dispatch, such as a delete
    /// whose uncaught failure stopped the drain.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.items.clear();
        state.busy = false;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Whether an item's transaction is still unresolved.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.lock().busy
    }

    fn release(&self) {
        self.lock().busy = false;
    }

    fn lock(&self) -> MutexGuard<'_, ItemState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandQueue")
            .field("name", &self.name)
            .field("len", &self.len())
            .field("busy", &self.is_busy())
            .finish()
    }
}

/// Adapter attached to a dispatched item: reports its progress and chains
/// the next dispatch once it resolves.
struct QueueItemAdapter {
    queue: CommandQueue,
    listener: Option<Arc<dyn QueueListener>>,
    name: Option<String>,
    index: usize,
    kind: CommandKind,
    table: Option<String>,
    catch_error: bool,
}

impl QueueItemAdapter {
    fn emit(&self, session: &Session, id: EventId, outcome: ExecutionOutcome<'_>) {
        let event = SqliteEvent::new(
            EventSource::CommandQueue(self.queue.name().to_owned()),
            id,
            EventData::Execution(ExecutionData {
                session,
                name: self.name.as_deref(),
                index: self.index,
                command: self.kind,
                outcome,
            }),
        );
        match self.listener.as_ref() {
            Some(listener) => listener.handle_execution(&event),
            None => session.notify_listeners(&event),
        }
    }

    fn dispatch_next(&self, session: &mut Session) -> Result<bool, SqliteSessionError> {
        self.queue.release();
        self.queue.execute(session, self.listener.clone())
    }
}

impl TransactionAdapter for QueueItemAdapter {
    fn begin(&mut self, session: &mut Session) -> Result<(), SqliteSessionError> {
        self.emit(session, EventId::Begin, ExecutionOutcome::Started);
        Ok(())
    }

    fn commit(&mut self, session: &mut Session, cursor: ExecCursor) -> Result<(), SqliteSessionError> {
        // A next item that fails synchronously leaves the queue undrained: no event.
        let id = if self.dispatch_next(session)? {
            EventId::Commit
        } else {
            EventId::Ready
        };
        self.emit(session, id, ExecutionOutcome::Cursor(&cursor));
        Ok(())
    }

    fn rollback(
        &mut self,
        session: &mut Session,
        error: &SqliteSessionError,
    ) -> Result<(), SqliteSessionError> {
        let id = if self.dispatch_next(session)? {
            EventId::Rollback
        } else {
            EventId::Ready
        };
        self.emit(session, id, ExecutionOutcome::Error(error));
        Ok(())
    }

    fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    fn set_table(&mut self, table: Option<String>) {
        self.table = table;
    }

    fn can_catch_error(&self) -> bool {
        self.catch_error
    }

    fn set_catch_error(&mut self, catch_error: bool) {
        self.catch_error = catch_error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql_builder::ContentValues;

    #[test]
    fn indices_follow_insertion_order() {
        let queue = CommandQueue::new("jobs");
        let first = queue.insert(
            Some("add"),
            InsertRequest::new("t").values(ContentValues::new().with("a", 1_i64)),
        );
        let second = queue.delete(None, DeleteRequest::new("t"), false);
        let third = queue.exec(None, "VACUUM", Vec::new());
        assert_eq!((first, second, third), (0, 1, 2));

        let head = queue.poll().unwrap();
        assert_eq!(head.name(), Some("add"));
        assert_eq!(head.kind(), CommandKind::Insert);

        let fourth = queue.drop_table(None, "t");
        assert_eq!(fourth, 3);
        assert_eq!(queue.len(), 3);
        assert!(matches!(
            queue.peek().map(|item| item.command().clone()),
            Some(Command::Delete {
                catch_error: false,
                ..
            })
        ));
    }
}

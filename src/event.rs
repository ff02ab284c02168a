//! Process-wide notifications emitted by sessions, queues and the database facade.

use std::fmt;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::cursor::ExecCursor;
use crate::error::SqliteSessionError;
use crate::queue::CommandKind;
use crate::results::ResultSet;
use crate::session::Session;

/// Event identifiers; the numeric codes start after [`EventId::FIRST`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventId {
    Execute,
    Program,
    Ready,
    Create,
    Configure,
    Upgrade,
    Downgrade,
    Open,
    Close,
    Error,
    Change,
    Begin,
    Commit,
    Rollback,
}

impl EventId {
    pub const FIRST: u32 = 700;

    #[must_use]
    pub fn code(self) -> u32 {
        let offset = match self {
            EventId::Execute => 1,
            EventId::Program => 2,
            EventId::Ready => 3,
            EventId::Create => 4,
            EventId::Configure => 5,
            EventId::Upgrade => 6,
            EventId::Downgrade => 7,
            EventId::Open => 8,
            EventId::Close => 9,
            EventId::Error => 10,
            EventId::Change => 11,
            EventId::Begin => 12,
            EventId::Commit => 13,
            EventId::Rollback => 14,
        };
        Self::FIRST + offset
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            EventId::Execute => "EXECUTE",
            EventId::Program => "PROGRAM",
            EventId::Ready => "READY",
            EventId::Create => "CREATE",
            EventId::Configure => "CONFIGURE",
            EventId::Upgrade => "UPGRADE",
            EventId::Downgrade => "DOWNGRADE",
            EventId::Open => "OPEN",
            EventId::Close => "CLOSE",
            EventId::Error => "ERROR",
            EventId::Change => "CHANGE",
            EventId::Begin => "BEGIN",
            EventId::Commit => "COMMIT",
            EventId::Rollback => "ROLLBACK",
        }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Who emitted an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventSource {
    Database(String),
    Session,
    TransactionQueue,
    CommandQueue(String),
}

/// What a queue item reports when its transaction moves.
#[derive(Debug)]
pub enum ExecutionOutcome<'a> {
    Started,
    Cursor(&'a ExecCursor),
    Error(&'a SqliteSessionError),
}

/// Payload of events emitted while a command queue drains.
#[derive(Debug)]
pub struct ExecutionData<'a> {
    pub session: &'a Session,
    pub name: Option<&'a str>,
    pub index: usize,
    pub command: CommandKind,
    pub outcome: ExecutionOutcome<'a>,
}

#[derive(Debug)]
pub enum EventData<'a> {
    None,
    ResultSet(&'a ResultSet),
    Error(&'a SqliteSessionError),
    Execution(ExecutionData<'a>),
}

/// Event delivered to [`DatabaseListener`]s and [`QueueListener`]s.
///
/// Payloads are borrowed: listeners see them only for the duration of the call.
#[derive(Debug)]
pub struct SqliteEvent<'a> {
    pub source: EventSource,
    pub id: EventId,
    pub data: EventData<'a>,
    pub when: DateTime<Utc>,
}

impl<'a> SqliteEvent<'a> {
    #[must_use]
    pub fn new(source: EventSource, id: EventId, data: EventData<'a>) -> Self {
        Self {
            source,
            id,
            data,
            when: Utc::now(),
        }
    }

    #[must_use]
    pub fn without_data(source: EventSource, id: EventId) -> Self {
        Self::new(source, id, EventData::None)
    }

    #[must_use]
    pub fn error(&self) -> Option<&SqliteSessionError> {
        match &self.data {
            EventData::Error(err) => Some(err),
            EventData::Execution(ExecutionData {
                outcome: ExecutionOutcome::Error(err),
                ..
            }) => Some(err),
            _ => None,
        }
    }

    #[must_use]
    pub fn execution(&self) -> Option<&ExecutionData<'a>> {
        match &self.data {
            EventData::Execution(data) => Some(data),
            _ => None,
        }
    }
}

impl fmt::Display for SqliteEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, when={}, source={:?}",
            self.id,
            self.when.timestamp_millis(),
            self.source
        )?;
        match &self.data {
            EventData::None => Ok(()),
            EventData::ResultSet(rs) => write!(f, ", rows={}", rs.len()),
            EventData::Error(err) => write!(f, ", error={err}"),
            EventData::Execution(data) => write!(
                f,
                ", item={}#{} {:?}",
                data.name.unwrap_or("-"),
                data.index,
                data.command
            ),
        }
    }
}

/// Receives every event broadcast by a database.
pub trait DatabaseListener: Send + Sync {
    fn on_handle_event(&self, event: &SqliteEvent<'_>);
}

impl<F> DatabaseListener for F
where
    F: Fn(&SqliteEvent<'_>) + Send + Sync,
{
    fn on_handle_event(&self, event: &SqliteEvent<'_>) {
        self(event);
    }
}

/// Receives the per-item events of a command queue drain.
pub trait QueueListener: Send + Sync {
    fn handle_execution(&self, event: &SqliteEvent<'_>);
}

impl<F> QueueListener for F
where
    F: Fn(&SqliteEvent<'_>) + Send + Sync,
{
    fn handle_execution(&self, event: &SqliteEvent<'_>) {
        self(event);
    }
}

/// Shared listener list of one database; sessions hold a clone to broadcast.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<RwLock<Vec<Arc<dyn DatabaseListener>>>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn DatabaseListener>) {
        let mut guard = match self.listeners.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push(listener);
    }

    /// Remove a listener previously added; returns whether it was registered.
    pub fn remove(&self, listener: &Arc<dyn DatabaseListener>) -> bool {
        let mut guard = match self.listeners.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let target = Arc::as_ptr(listener).cast::<()>();
        let before = guard.len();
        guard.retain(|l| Arc::as_ptr(l).cast::<()>() != target);
        guard.len() != before
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every listener registered at the time of the call.
    pub fn notify(&self, event: &SqliteEvent<'_>) {
        if event.id == EventId::Error {
            tracing::warn!(%event, "broadcasting error event");
        } else {
            tracing::debug!(%event, "broadcasting event");
        }
        // Listeners may add or remove listeners; call them without holding the lock.
        for listener in self.snapshot() {
            listener.on_handle_event(event);
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn DatabaseListener>> {
        match self.listeners.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.len())
            .finish()
    }
}

//! Database facade: configuration, open/close lifecycle, listeners, and the
//! session that runs its statements.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::config::{CounterScope, DatabaseConfiguration, OpenMode};
use crate::connection::Connection;
use crate::error::SqliteSessionError;
use crate::event::{
    DatabaseListener, EventBus, EventData, EventId, EventSource, QueueListener, SqliteEvent,
};
use crate::queue::{CommandQueue, TransactionQueue};
use crate::results::ResultSet;
use crate::session::{Session, TransactionAdapter, TransactionCounter, TransactionListener};
use crate::sql_builder::{ConflictAlgorithm, DeleteRequest, InsertRequest, UpdateRequest};
use crate::types::RowValues;

/// Called with `1` once a version change committed, `-1` if it rolled back.
pub type VersionCallback = Box<dyn FnOnce(i32) + Send>;

type Reconnect = fn(&DatabaseConfiguration) -> Result<Arc<dyn Connection>, SqliteSessionError>;

/// A configured database over one connection.
///
/// Opening it creates the session every operation goes through. All
/// operations except the accessors fail with
/// [`SqliteSessionError::IllegalState`] while it is closed. Statements only
/// make progress while the session's event loop is driven, see
/// [`run_until_idle`](Self::run_until_idle).
pub struct Database {
    config: DatabaseConfiguration,
    connection: Arc<dyn Connection>,
    counter: TransactionCounter,
    events: EventBus,
    session: Option<Session>,
    created: bool,
    version: Arc<AtomicU32>,
    reconnect: Option<Reconnect>,
}

impl Database {
    #[must_use]
    pub fn new(config: DatabaseConfiguration, connection: Arc<dyn Connection>) -> Self {
        Self {
            version: Arc::new(AtomicU32::new(config.version)),
            config,
            connection,
            counter: TransactionCounter::new(),
            events: EventBus::new(),
            session: None,
            created: false,
            reconnect: None,
        }
    }

    /// Draw transaction ids from `counter` when the configuration selects
    /// [`CounterScope::Global`].
    #[must_use]
    pub fn with_counter(mut self, counter: TransactionCounter) -> Self {
        self.counter = counter;
        self
    }

    /// Build a database over a rusqlite connection chosen by `config`'s path and mode.
    ///
    /// # Errors
    /// Returns [`SqliteSessionError::SqliteError`] if the file cannot be opened.
    #[cfg(feature = "sqlite")]
    pub fn sqlite(config: DatabaseConfiguration) -> Result<Self, SqliteSessionError> {
        let connection = sqlite_connection(&config)?;
        let mut database = Self::new(config, connection);
        database.reconnect = Some(sqlite_connection);
        Ok(database)
    }

    /// Open the database.
    ///
    /// The first open runs the configured create model through a
    /// [`TransactionQueue`] and emits CREATE once it has drained; later opens
    /// emit OPEN. Opening an open database does nothing.
    ///
    /// # Errors
    /// [`SqliteSessionError::ConnectionError`] outside a tokio runtime; an
    /// ERROR event is emitted as well.
    pub fn open(&mut self) -> Result<(), SqliteSessionError> {
        if self.session.is_some() {
            return Ok(());
        }
        let mut session = match self.new_session() {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!(database = %self.label(), error = %err, "failed to open database");
                let event = SqliteEvent::new(self.source(), EventId::Error, EventData::Error(&err));
                self.events.notify(&event);
                return Err(err);
            }
        };
        tracing::debug!(database = %self.label(), created = self.created, "database opened");

        if self.created {
            self.notify_listeners(&SqliteEvent::without_data(self.source(), EventId::Open));
        } else {
            self.created = true;
            if self.config.create_model.is_empty() {
                self.notify_listeners(&SqliteEvent::without_data(self.source(), EventId::Create));
            } else {
                let queue = TransactionQueue::new();
                queue.add_all(self.config.create_model.iter().cloned());
                let source = self.source();
                queue.on_complete(move |session| {
                    session.notify_listeners(&SqliteEvent::without_data(source, EventId::Create));
                    Ok(())
                });
                queue.begin(&mut session);
            }
        }
        self.session = Some(session);
        Ok(())
    }

    /// Close the database and drop its session. The connection stays usable
    /// by anyone else holding it.
    ///
    /// # Errors
    /// [`SqliteSessionError::IllegalState`] if the database is not open.
    pub fn close(&mut self) -> Result<(), SqliteSessionError> {
        self.throw_if_not_open()?;
        self.session = None;
        tracing::debug!(database = %self.label(), "database closed");
        self.notify_listeners(&SqliteEvent::without_data(self.source(), EventId::Close));
        Ok(())
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.config.is_read_only()
    }

    #[must_use]
    pub fn is_in_memory_database(&self) -> bool {
        self.config.is_in_memory_db()
    }

    #[must_use]
    pub fn needs_upgrade(&self, new_version: u32) -> bool {
        new_version > self.version()
    }

    #[must_use]
    pub fn config(&self) -> &DatabaseConfiguration {
        &self.config
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    #[must_use]
    pub fn label(&self) -> &str {
        self.config.label()
    }

    /// Schema version: the configured one until [`set_version`](Self::set_version)
    /// commits a newer one.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }

    /// Move the schema version forward to `new_version`.
    ///
    /// Does nothing and returns `Ok(false)` unless `new_version` is newer. The
    /// change runs as a `PRAGMA user_version` transaction; its outcome goes to
    /// `on_change` (`1` committed, `-1` rolled back) or, without one, is
    /// broadcast as CHANGE or ERROR.
    ///
    /// # Errors
    /// [`SqliteSessionError::IllegalState`] if the database is not open.
    pub fn set_version(
        &mut self,
        new_version: u32,
        on_change: Option<VersionCallback>,
    ) -> Result<bool, SqliteSessionError> {
        self.throw_if_not_open()?;
        if !self.needs_upgrade(new_version) {
            return Ok(false);
        }
        tracing::debug!(database = %self.label(), from = self.version(), to = new_version, "changing version");
        let listener = VersionChange {
            version: Arc::clone(&self.version),
            new_version,
            source: self.source(),
            on_change,
        };
        self.session_mut()?.begin_transaction(
            format!("PRAGMA user_version = {new_version}"),
            Vec::new(),
            Some(Box::new(listener)),
        );
        Ok(true)
    }

    /// Reopen a read-only database for writing. A writable database is left as is.
    ///
    /// Databases built with [`Database::sqlite`] get a new read-write
    /// connection; others keep theirs.
    ///
    /// # Errors
    /// Errors of reconnecting or of [`open`](Self::open).
    pub fn reopen_read_write(&mut self) -> Result<(), SqliteSessionError> {
        if !self.is_read_only() {
            return Ok(());
        }
        if self.is_open() {
            self.close()?;
        }
        self.config.mode = OpenMode::ReadWrite;
        if let Some(reconnect) = self.reconnect {
            self.connection = reconnect(&self.config)?;
        }
        self.open()
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn add_listener(&self, listener: Arc<dyn DatabaseListener>) {
        self.events.add(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn DatabaseListener>) -> bool {
        self.events.remove(listener)
    }

    pub fn notify_listeners(&self, event: &SqliteEvent<'_>) {
        self.events.notify(event);
    }

    /// # Errors
    /// [`SqliteSessionError::IllegalState`] if the database is not open.
    pub fn session(&self) -> Result<&Session, SqliteSessionError> {
        match self.session.as_ref() {
            Some(session) => Ok(session),
            None => Err(not_open(&self.config)),
        }
    }

    /// # Errors
    /// [`SqliteSessionError::IllegalState`] if the database is not open.
    pub fn session_mut(&mut self) -> Result<&mut Session, SqliteSessionError> {
        match self.session.as_mut() {
            Some(session) => Ok(session),
            None => Err(not_open(&self.config)),
        }
    }

    /// A fresh session over this database's connection, sharing its listeners.
    ///
    /// # Errors
    /// [`SqliteSessionError::IllegalState`] if the database is not open.
    pub fn create_session(&self) -> Result<Session, SqliteSessionError> {
        self.throw_if_not_open()?;
        self.new_session()
    }

    /// # Errors
    /// [`SqliteSessionError::IllegalState`] if the database is not open.
    pub fn in_transaction(&self) -> Result<bool, SqliteSessionError> {
        Ok(self.session()?.has_transaction())
    }

    /// # Errors
    /// [`SqliteSessionError::IllegalState`] if the database is not open.
    pub fn begin_transaction(
        &mut self,
        sql: impl Into<String>,
        params: Vec<RowValues>,
        listener: Option<Box<dyn TransactionListener>>,
    ) -> Result<(), SqliteSessionError> {
        self.session_mut()?.begin_transaction(sql, params, listener);
        Ok(())
    }

    /// # Errors
    /// See [`Session::set_transaction_successful`].
    pub fn set_transaction_successful(
        &mut self,
        result: ResultSet,
    ) -> Result<(), SqliteSessionError> {
        self.session_mut()?.set_transaction_successful(result)
    }

    /// # Errors
    /// See [`Session::end_transaction`].
    pub fn end_transaction(
        &mut self,
        result: Result<ResultSet, SqliteSessionError>,
    ) -> Result<(), SqliteSessionError> {
        self.session_mut()?.end_transaction(result)
    }

    /// # Errors
    /// See [`Session::execute_special`].
    pub fn execute_special(
        &mut self,
        sql: &str,
        listener: Option<Box<dyn TransactionListener>>,
        result: ResultSet,
    ) -> Result<bool, SqliteSessionError> {
        self.session_mut()?.execute_special(sql, listener, result)
    }

    /// Start draining `queue` through this database's session.
    ///
    /// # Errors
    /// [`SqliteSessionError::IllegalState`] if the database is not open.
    pub fn enqueue_transaction(
        &mut self,
        queue: &TransactionQueue,
    ) -> Result<bool, SqliteSessionError> {
        Ok(queue.begin(self.session_mut()?))
    }

    /// A new, empty command queue named `name`.
    #[must_use]
    pub fn queue(&self, name: impl Into<Arc<str>>) -> CommandQueue {
        CommandQueue::new(name)
    }

    /// # Errors
    /// [`SqliteSessionError::IllegalState`] if the database is not open, or
    /// the error of [`CommandQueue::execute`].
    pub fn execute_queue(
        &mut self,
        queue: &CommandQueue,
        listener: Option<Arc<dyn QueueListener>>,
    ) -> Result<bool, SqliteSessionError> {
        queue.execute(self.session_mut()?, listener)
    }

    /// Run a script one statement per line through a command queue named
    /// `name`, whose items are named `exec-0`, `exec-1`, ... Blank lines are
    /// skipped. Returns the queue, already executing.
    ///
    /// # Errors
    /// [`SqliteSessionError::IllegalState`] if the database is not open.
    pub fn exec_script(
        &mut self,
        name: &str,
        script: &str,
        listener: Option<Arc<dyn QueueListener>>,
    ) -> Result<CommandQueue, SqliteSessionError> {
        self.throw_if_not_open()?;
        let queue = self.queue(name);
        let lines = script.lines().map(str::trim).filter(|line| !line.is_empty());
        for (idx, line) in lines.enumerate() {
            queue.exec(Some(&format!("exec-{idx}")), line, Vec::new());
        }
        self.execute_queue(&queue, listener)?;
        Ok(queue)
    }

    /// # Errors
    /// See [`Session::exec_sql`].
    pub fn exec_sql(
        &mut self,
        sql: &str,
        params: Vec<RowValues>,
        adapter: Option<Box<dyn TransactionAdapter>>,
    ) -> Result<(), SqliteSessionError> {
        self.session_mut()?.exec_sql(sql, params, adapter)
    }

    /// # Errors
    /// See [`Session::insert_query`].
    pub fn insert_query(
        &mut self,
        request: InsertRequest,
        adapter: Option<Box<dyn TransactionAdapter>>,
    ) -> Result<(), SqliteSessionError> {
        self.session_mut()?.insert_query(request, adapter)
    }

    /// # Errors
    /// See [`Session::insert_query_or_throw`].
    pub fn insert_query_or_throw(
        &mut self,
        request: InsertRequest,
        adapter: Option<Box<dyn TransactionAdapter>>,
    ) -> Result<(), SqliteSessionError> {
        self.session_mut()?.insert_query_or_throw(request, adapter)
    }

    /// # Errors
    /// See [`Session::insert_with_on_conflict`].
    pub fn insert_with_on_conflict(
        &mut self,
        request: InsertRequest,
        conflict: ConflictAlgorithm,
        catch_error: bool,
        adapter: Option<Box<dyn TransactionAdapter>>,
    ) -> Result<(), SqliteSessionError> {
        self.session_mut()?
            .insert_with_on_conflict(request, conflict, catch_error, adapter)
    }

    /// # Errors
    /// See [`Session::replace_query`].
    pub fn replace_query(
        &mut self,
        request: InsertRequest,
        adapter: Option<Box<dyn TransactionAdapter>>,
    ) -> Result<(), SqliteSessionError> {
        self.session_mut()?.replace_query(request, adapter)
    }

    /// # Errors
    /// See [`Session::replace_query_or_throw`].
    pub fn replace_query_or_throw(
        &mut self,
        request: InsertRequest,
        adapter: Option<Box<dyn TransactionAdapter>>,
    ) -> Result<(), SqliteSessionError> {
        self.session_mut()?.replace_query_or_throw(request, adapter)
    }

    /// # Errors
    /// See [`Session::update_query`].
    pub fn update_query(
        &mut self,
        request: UpdateRequest,
        adapter: Option<Box<dyn TransactionAdapter>>,
    ) -> Result<(), SqliteSessionError> {
        self.session_mut()?.update_query(request, adapter)
    }

    /// # Errors
    /// See [`Session::update_with_on_conflict`].
    pub fn update_with_on_conflict(
        &mut self,
        request: UpdateRequest,
        conflict: ConflictAlgorithm,
        catch_error: bool,
        adapter: Option<Box<dyn TransactionAdapter>>,
    ) -> Result<(), SqliteSessionError> {
        self.session_mut()?
            .update_with_on_conflict(request, conflict, catch_error, adapter)
    }

    /// # Errors
    /// See [`Session::delete_query`].
    pub fn delete_query(
        &mut self,
        request: DeleteRequest,
        catch_error: bool,
        adapter: Option<Box<dyn TransactionAdapter>>,
    ) -> Result<(), SqliteSessionError> {
        self.session_mut()?.delete_query(request, catch_error, adapter)
    }

    /// # Errors
    /// See [`Session::drop_table`].
    pub fn drop_table(
        &mut self,
        table: &str,
        adapter: Option<Box<dyn TransactionAdapter>>,
    ) -> Result<(), SqliteSessionError> {
        self.session_mut()?.drop_table(table, adapter)
    }

    /// # Errors
    /// See [`Session::add_column`].
    pub fn add_column(
        &mut self,
        table: &str,
        column_def: &str,
        adapter: Option<Box<dyn TransactionAdapter>>,
    ) -> Result<(), SqliteSessionError> {
        self.session_mut()?.add_column(table, column_def, adapter)
    }

    /// # Errors
    /// See [`Session::rename_table`].
    pub fn rename_table(
        &mut self,
        table: &str,
        new_table: &str,
        adapter: Option<Box<dyn TransactionAdapter>>,
    ) -> Result<(), SqliteSessionError> {
        self.session_mut()?.rename_table(table, new_table, adapter)
    }

    /// Drive the session until every queued and running statement has resolved.
    ///
    /// # Errors
    /// [`SqliteSessionError::IllegalState`] if the database is not open, or the
    /// error of [`Session::run_until_idle`].
    pub async fn run_until_idle(&mut self) -> Result<(), SqliteSessionError> {
        self.session_mut()?.run_until_idle().await
    }

    /// # Errors
    /// [`SqliteSessionError::IllegalState`] if the database is not open.
    pub fn throw_if_not_open(&self) -> Result<(), SqliteSessionError> {
        if self.session.is_none() {
            return Err(not_open(&self.config));
        }
        Ok(())
    }

    fn source(&self) -> EventSource {
        EventSource::Database(self.label().to_owned())
    }

    fn new_session(&self) -> Result<Session, SqliteSessionError> {
        let counter = match self.config.counter_scope {
            CounterScope::Global => self.counter.clone(),
            CounterScope::PerSession => TransactionCounter::new(),
        };
        Session::with_context(
            Arc::clone(&self.connection),
            counter,
            self.events.clone(),
            self.label(),
        )
    }
}

#[cfg(feature = "sqlite")]
fn sqlite_connection(
    config: &DatabaseConfiguration,
) -> Result<Arc<dyn Connection>, SqliteSessionError> {
    use crate::sqlite::SqliteConnection;

    let connection = if config.is_in_memory_db() {
        SqliteConnection::open_in_memory()?
    } else if config.is_read_only() {
        SqliteConnection::open_read_only(config.file_path())?
    } else {
        SqliteConnection::open(config.file_path())?
    };
    Ok(Arc::new(connection))
}

/// Applies a committed version change and reports its outcome.
struct VersionChange {
    version: Arc<AtomicU32>,
    new_version: u32,
    source: EventSource,
    on_change: Option<VersionCallback>,
}

impl TransactionListener for VersionChange {
    fn on_commit(&mut self, session: &mut Session, _result: &ResultSet) -> Result<(), SqliteSessionError> {
        self.version.store(self.new_version, Ordering::SeqCst);
        match self.on_change.take() {
            Some(on_change) => on_change(1),
            None => session.notify_listeners(&SqliteEvent::without_data(
                self.source.clone(),
                EventId::Change,
            )),
        }
        Ok(())
    }

    fn on_rollback(
        &mut self,
        session: &mut Session,
        error: &SqliteSessionError,
    ) -> Result<(), SqliteSessionError> {
        tracing::warn!(version = self.new_version, %error, "version change rolled back");
        match self.on_change.take() {
            Some(on_change) => on_change(-1),
            None => session.notify_listeners(&SqliteEvent::new(
                self.source.clone(),
                EventId::Error,
                EventData::Error(error),
            )),
        }
        Ok(())
    }
}

fn not_open(config: &DatabaseConfiguration) -> SqliteSessionError {
    SqliteSessionError::IllegalState(format!("The database '{}' is not open.", config.label()))
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.config.name)
            .field("open", &self.is_open())
            .field("created", &self.created)
            .field("version", &self.version())
            .field("listeners", &self.events.len())
            .finish_non_exhaustive()
    }
}

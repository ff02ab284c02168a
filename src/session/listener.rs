use crate::cursor::ExecCursor;
use crate::error::SqliteSessionError;
use crate::results::ResultSet;

use super::Session;

/// Callbacks for one transaction frame.
///
/// `on_begin` runs when the connection grants the transaction; exactly one of
/// `on_commit` / `on_rollback` runs when the frame ends. An error returned from
/// a callback turns the frame's outcome into a failure and is handed back to
/// whoever ended the frame once the stack has been unwound.
pub trait TransactionListener: Send {
    /// # Errors
    /// Any error aborts entering the transaction.
    fn on_begin(&mut self, _session: &mut Session) -> Result<(), SqliteSessionError> {
        Ok(())
    }

    /// # Errors
    /// Any error marks the frame failed.
    fn on_commit(
        &mut self,
        _session: &mut Session,
        _result: &ResultSet,
    ) -> Result<(), SqliteSessionError> {
        Ok(())
    }

    /// # Errors
    /// Any error is reported to whoever ended the frame.
    fn on_rollback(
        &mut self,
        _session: &mut Session,
        _error: &SqliteSessionError,
    ) -> Result<(), SqliteSessionError> {
        Ok(())
    }
}

type BeginFn = Box<dyn FnMut(&mut Session) -> Result<(), SqliteSessionError> + Send>;
type CommitFn =
    Box<dyn FnMut(&mut Session, &ResultSet) -> Result<(), SqliteSessionError> + Send>;
type RollbackFn =
    Box<dyn FnMut(&mut Session, &SqliteSessionError) -> Result<(), SqliteSessionError> + Send>;
type CursorFn = Box<dyn FnMut(&mut Session, ExecCursor) -> Result<(), SqliteSessionError> + Send>;

/// Closure-backed [`TransactionListener`]; unset callbacks do nothing.
///
/// ```rust
/// use sqlite_session::prelude::*;
///
/// let listener = SqliteTransactionListener::new()
///     .on_commit(|_session, rs| {
///         println!("{} rows", rs.rows_affected);
///         Ok(())
///     });
/// # let _ = listener;
/// ```
#[derive(Default)]
pub struct SqliteTransactionListener {
    begin: Option<BeginFn>,
    commit: Option<CommitFn>,
    rollback: Option<RollbackFn>,
}

impl SqliteTransactionListener {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_begin<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut Session) -> Result<(), SqliteSessionError> + Send + 'static,
    {
        self.begin = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_commit<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut Session, &ResultSet) -> Result<(), SqliteSessionError> + Send + 'static,
    {
        self.commit = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_rollback<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut Session, &SqliteSessionError) -> Result<(), SqliteSessionError>
            + Send
            + 'static,
    {
        self.rollback = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn boxed(self) -> Box<dyn TransactionListener> {
        Box::new(self)
    }
}

impl TransactionListener for SqliteTransactionListener {
    fn on_begin(&mut self, session: &mut Session) -> Result<(), SqliteSessionError> {
        match self.begin.as_mut() {
            Some(f) => f(session),
            None => Ok(()),
        }
    }

    fn on_commit(
        &mut self,
        session: &mut Session,
        result: &ResultSet,
    ) -> Result<(), SqliteSessionError> {
        match self.commit.as_mut() {
            Some(f) => f(session, result),
            None => Ok(()),
        }
    }

    fn on_rollback(
        &mut self,
        session: &mut Session,
        error: &SqliteSessionError,
    ) -> Result<(), SqliteSessionError> {
        match self.rollback.as_mut() {
            Some(f) => f(session, error),
            None => Ok(()),
        }
    }
}

/// Caller-side receiver of a data operation's outcome.
///
/// Unlike a [`TransactionListener`], an adapter sees committed results as an
/// [`ExecCursor`] tagged with the table it targeted, and it only sees failures
/// when [`can_catch_error`](Self::can_catch_error) is true; otherwise failures
/// are broadcast as ERROR events.
pub trait TransactionAdapter: Send {
    /// # Errors
    /// Any error aborts entering the transaction.
    fn begin(&mut self, _session: &mut Session) -> Result<(), SqliteSessionError> {
        Ok(())
    }

    /// # Errors
    /// Any error marks the frame failed.
    fn commit(
        &mut self,
        _session: &mut Session,
        _cursor: ExecCursor,
    ) -> Result<(), SqliteSessionError> {
        Ok(())
    }

    /// # Errors
    /// Any error is reported to whoever ended the frame.
    fn rollback(
        &mut self,
        _session: &mut Session,
        _error: &SqliteSessionError,
    ) -> Result<(), SqliteSessionError> {
        Ok(())
    }

    fn table(&self) -> Option<&str>;

    fn set_table(&mut self, table: Option<String>);

    fn can_catch_error(&self) -> bool;

    fn set_catch_error(&mut self, catch_error: bool);
}

/// Closure-backed [`TransactionAdapter`].
#[derive(Default)]
pub struct SqliteTransactionAdapter {
    begin: Option<BeginFn>,
    commit: Option<CursorFn>,
    rollback: Option<RollbackFn>,
    table: Option<String>,
    catch_error: bool,
}

impl SqliteTransactionAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_begin<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut Session) -> Result<(), SqliteSessionError> + Send + 'static,
    {
        self.begin = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_commit<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut Session, ExecCursor) -> Result<(), SqliteSessionError> + Send + 'static,
    {
        self.commit = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_rollback<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut Session, &SqliteSessionError) -> Result<(), SqliteSessionError>
            + Send
            + 'static,
    {
        self.rollback = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    #[must_use]
    pub fn catching_errors(mut self, catch_error: bool) -> Self {
        self.catch_error = catch_error;
        self
    }

    #[must_use]
    pub fn boxed(self) -> Box<dyn TransactionAdapter> {
        Box::new(self)
    }
}

impl TransactionAdapter for SqliteTransactionAdapter {
    fn begin(&mut self, session: &mut Session) -> Result<(), SqliteSessionError> {
        match self.begin.as_mut() {
            Some(f) => f(session),
            None => Ok(()),
        }
    }

    fn commit(&mut self, session: &mut Session, cursor: ExecCursor) -> Result<(), SqliteSessionError> {
        match self.commit.as_mut() {
            Some(f) => f(session, cursor),
            None => Ok(()),
        }
    }

    fn rollback(
        &mut self,
        session: &mut Session,
        error: &SqliteSessionError,
    ) -> Result<(), SqliteSessionError> {
        match self.rollback.as_mut() {
            Some(f) => f(session, error),
            None => Ok(()),
        }
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

use crate::cursor::ExecCursor;
use crate::error::SqliteSessionError;
use crate::event::{EventData, EventId, EventSource, SqliteEvent};
use crate::results::ResultSet;
use crate::sql_builder::{BoundStatement, ConflictAlgorithm, DeleteRequest, InsertRequest, UpdateRequest};
use crate::types::{RowValues, StatementType};

use super::{Session, TransactionAdapter, TransactionListener};

/// Forwards a frame's callbacks to a caller's adapter, or to the event bus
/// when there is none.
struct AdapterBridge {
    adapter: Option<Box<dyn TransactionAdapter>>,
    source: EventSource,
}

impl TransactionListener for AdapterBridge {
    fn on_begin(&mut self, session: &mut Session) -> Result<(), SqliteSessionError> {
        match self.adapter.as_mut() {
            Some(adapter) => adapter.begin(session),
            None => Ok(()),
        }
    }

    fn on_commit(
        &mut self,
        session: &mut Session,
        result: &ResultSet,
    ) -> Result<(), SqliteSessionError> {
        match self.adapter.as_mut() {
            Some(adapter) => {
                let cursor = ExecCursor::new(adapter.table().map(str::to_owned), result.clone());
                adapter.commit(session, cursor)
            }
            None => {
                let event = SqliteEvent::new(
                    self.source.clone(),
                    EventId::Execute,
                    EventData::ResultSet(result),
                );
                session.notify_listeners(&event);
                Ok(())
            }
        }
    }

    fn on_rollback(
        &mut self,
        session: &mut Session,
        error: &SqliteSessionError,
    ) -> Result<(), SqliteSessionError> {
        match self.adapter.as_mut() {
            Some(adapter) if adapter.can_catch_error() => adapter.rollback(session, error),
            _ => {
                let event =
                    SqliteEvent::new(self.source.clone(), EventId::Error, EventData::Error(error));
                session.notify_listeners(&event);
                Ok(())
            }
        }
    }
}

impl Session {
    /// Run a single statement that returns no data the caller asked for.
    ///
    /// Statements that cannot live inside a single-statement transaction
    /// (ATTACH, BEGIN, COMMIT/END, ROLLBACK, PRAGMA, ANALYZE/DETACH) are refused
    /// with [`SqliteSessionError::Unsupported`], delivered to `adapter.rollback`
    /// when it catches errors and broadcast as an ERROR event otherwise.
    ///
    /// # Errors
    /// Only the error a catching adapter returns from `rollback` for a refused statement.
    pub fn exec_sql(
        &mut self,
        sql: &str,
        params: Vec<RowValues>,
        adapter: Option<Box<dyn TransactionAdapter>>,
    ) -> Result<(), SqliteSessionError> {
        if StatementType::classify(sql).is_rejected_by_exec() {
            let err = SqliteSessionError::Unsupported(sql.to_owned());
            tracing::debug!(%sql, "refusing statement");
            return match adapter {
                Some(mut adapter) if adapter.can_catch_error() => adapter.rollback(self, &err),
                _ => {
                    let event =
                        SqliteEvent::new(self.event_source(), EventId::Error, EventData::Error(&err));
                    self.notify_listeners(&event);
                    Ok(())
                }
            };
        }
        self.begin_with_adapter(sql.to_owned(), params, adapter);
        Ok(())
    }

    /// Insert a row, reporting failures to a catching adapter.
    ///
    /// # Errors
    /// Never fails synchronously today; kept fallible like the other data operations.
    pub fn insert_query(
        &mut self,
        request: InsertRequest,
        adapter: Option<Box<dyn TransactionAdapter>>,
    ) -> Result<(), SqliteSessionError> {
        let conflict = request.conflict;
        self.insert_with_on_conflict(request, conflict, true, adapter)
    }

    /// Insert a row; failures are broadcast as ERROR events instead of reaching the adapter.
    ///
    /// # Errors
    /// See [`insert_query`](Self::insert_query).
    pub fn insert_query_or_throw(
        &mut self,
        request: InsertRequest,
        adapter: Option<Box<dyn TransactionAdapter>>,
    ) -> Result<(), SqliteSessionError> {
        let conflict = request.conflict;
        self.insert_with_on_conflict(request, conflict, false, adapter)
    }

    /// # Errors
    /// See [`insert_query`](Self::insert_query).
    pub fn insert_with_on_conflict(
        &mut self,
        request: InsertRequest,
        conflict: ConflictAlgorithm,
        catch_error: bool,
        adapter: Option<Box<dyn TransactionAdapter>>,
    ) -> Result<(), SqliteSessionError> {
        let request = request.conflict(conflict);
        let statement = request.build();
        self.run_table_statement(statement, &request.table, catch_error, adapter);
        Ok(())
    }

    /// INSERT OR REPLACE a row, reporting failures to a catching adapter.
    ///
    /// # Errors
    /// See [`insert_query`](Self::insert_query).
    pub fn replace_query(
        &mut self,
        request: InsertRequest,
        adapter: Option<Box<dyn TransactionAdapter>>,
    ) -> Result<(), SqliteSessionError> {
        self.insert_with_on_conflict(request, ConflictAlgorithm::Replace, true, adapter)
    }

    /// # Errors
    /// See [`insert_query`](Self::insert_query).
    pub fn replace_query_or_throw(
        &mut self,
        request: InsertRequest,
        adapter: Option<Box<dyn TransactionAdapter>>,
    ) -> Result<(), SqliteSessionError> {
        self.insert_with_on_conflict(request, ConflictAlgorithm::Replace, false, adapter)
    }

    /// # Errors
    /// [`SqliteSessionError::IllegalArgument`] when `request` sets no columns.
    pub fn update_query(
        &mut self,
        request: UpdateRequest,
        adapter: Option<Box<dyn TransactionAdapter>>,
    ) -> Result<(), SqliteSessionError> {
        let conflict = request.conflict;
        self.update_with_on_conflict(request, conflict, true, adapter)
    }

    /// # Errors
    /// [`SqliteSessionError::IllegalArgument`] when `request` sets no columns.
    pub fn update_with_on_conflict(
        &mut self,
        request: UpdateRequest,
        conflict: ConflictAlgorithm,
        catch_error: bool,
        adapter: Option<Box<dyn TransactionAdapter>>,
    ) -> Result<(), SqliteSessionError> {
        let request = request.conflict(conflict);
        let statement = request.build()?;
        self.run_table_statement(statement, &request.table, catch_error, adapter);
        Ok(())
    }

    /// # Errors
    /// See [`insert_query`](Self::insert_query).
    pub fn delete_query(
        &mut self,
        request: DeleteRequest,
        catch_error: bool,
        adapter: Option<Box<dyn TransactionAdapter>>,
    ) -> Result<(), SqliteSessionError> {
        let statement = request.build();
        self.run_table_statement(statement, &request.table, catch_error, adapter);
        Ok(())
    }

    /// # Errors
    /// See [`exec_sql`](Self::exec_sql).
    pub fn drop_table(
        &mut self,
        table: &str,
        adapter: Option<Box<dyn TransactionAdapter>>,
    ) -> Result<(), SqliteSessionError> {
        self.exec_sql(&format!("DROP TABLE IF EXISTS {table}"), Vec::new(), adapter)
    }

    /// # Errors
    /// See [`exec_sql`](Self::exec_sql).
    pub fn add_column(
        &mut self,
        table: &str,
        column_def: &str,
        adapter: Option<Box<dyn TransactionAdapter>>,
    ) -> Result<(), SqliteSessionError> {
        self.exec_sql(
            &format!("ALTER TABLE {table} ADD COLUMN {column_def}"),
            Vec::new(),
            adapter,
        )
    }

    /// # Errors
    /// See [`exec_sql`](Self::exec_sql).
    pub fn rename_table(
        &mut self,
        table: &str,
        new_table: &str,
        adapter: Option<Box<dyn TransactionAdapter>>,
    ) -> Result<(), SqliteSessionError> {
        self.exec_sql(
            &format!("ALTER TABLE {table} RENAME TO {new_table}"),
            Vec::new(),
            adapter,
        )
    }

    fn run_table_statement(
        &mut self,
        statement: BoundStatement,
        table: &str,
        catch_error: bool,
        mut adapter: Option<Box<dyn TransactionAdapter>>,
    ) {
        if let Some(adapter) = adapter.as_mut() {
            adapter.set_table(Some(table.to_owned()));
            adapter.set_catch_error(catch_error);
        }
        let BoundStatement { sql, args } = statement;
        self.begin_with_adapter(sql, args, adapter);
    }

    fn begin_with_adapter(
        &mut self,
        sql: String,
        params: Vec<RowValues>,
        adapter: Option<Box<dyn TransactionAdapter>>,
    ) {
        let bridge = AdapterBridge {
            adapter,
            source: self.event_source(),
        };
        self.begin_transaction(sql, params, Some(Box::new(bridge)));
    }

    fn event_source(&self) -> EventSource {
        EventSource::Database(self.label().to_owned())
    }
}

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqlite_session::prelude::*;

/// Connection that never touches a database.
///
/// Statements containing `FAIL` (or a marker added with [`fail_when`]) fail,
/// statements containing `HANG` never complete, everything else succeeds with
/// one changed row.
///
/// [`fail_when`]: ScriptedConnection::fail_when
#[derive(Default)]
pub struct ScriptedConnection {
    executed: Mutex<Vec<String>>,
    failing: Mutex<Vec<String>>,
}

impl ScriptedConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn fail_when(&self, marker: &str) {
        self.failing.lock().unwrap().push(marker.to_owned());
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn execute_sql(
        &self,
        sql: &str,
        _params: &[RowValues],
    ) -> Result<ResultSet, SqliteSessionError> {
        self.executed.lock().unwrap().push(sql.to_owned());
        if sql.contains("HANG") {
            std::future::pending::<()>().await;
        }
        let scripted_failure = self
            .failing
            .lock()
            .unwrap()
            .iter()
            .any(|marker| sql.contains(marker.as_str()));
        if sql.contains("FAIL") || scripted_failure {
            return Err(SqliteSessionError::ExecutionError(format!(
                "scripted failure: {sql}"
            )));
        }
        Ok(ResultSet::from_changes(1, None))
    }
}

/// What a transaction listener saw, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum Seen {
    Begin(&'static str),
    Commit(&'static str),
    Rollback(&'static str, String),
}

pub type Journal = Arc<Mutex<Vec<Seen>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(journal: &Journal) -> Vec<Seen> {
    journal.lock().unwrap().clone()
}

/// Listener that writes every callback for frame `tag` to `journal`.
pub fn recording(tag: &'static str, journal: &Journal) -> Box<dyn TransactionListener> {
    let on_begin = Arc::clone(journal);
    let on_commit = Arc::clone(journal);
    let on_rollback = Arc::clone(journal);
    SqliteTransactionListener::new()
        .on_begin(move |_session| {
            on_begin.lock().unwrap().push(Seen::Begin(tag));
            Ok(())
        })
        .on_commit(move |_session, _rs| {
            on_commit.lock().unwrap().push(Seen::Commit(tag));
            Ok(())
        })
        .on_rollback(move |_session, err| {
            on_rollback
                .lock()
                .unwrap()
                .push(Seen::Rollback(tag, err.to_string()));
            Ok(())
        })
        .boxed()
}

/// An event as recorded by [`event_log`].
#[derive(Debug, Clone, PartialEq)]
pub struct Logged {
    pub id: EventId,
    pub source: EventSource,
    pub name: Option<String>,
    pub index: Option<usize>,
    pub command: Option<CommandKind>,
    pub error: Option<String>,
}

pub type EventLog = Arc<Mutex<Vec<Logged>>>;

fn log_event(log: &EventLog, event: &SqliteEvent<'_>) {
    let execution = event.execution();
    log.lock().unwrap().push(Logged {
        id: event.id,
        source: event.source.clone(),
        name: execution.and_then(|data| data.name.map(str::to_owned)),
        index: execution.map(|data| data.index),
        command: execution.map(|data| data.command),
        error: event.error().map(ToString::to_string),
    });
}

pub fn event_log() -> (Arc<dyn DatabaseListener>, EventLog) {
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let listener: Arc<dyn DatabaseListener> =
        Arc::new(move |event: &SqliteEvent<'_>| log_event(&sink, event));
    (listener, log)
}

pub fn queue_log() -> (Arc<dyn QueueListener>, EventLog) {
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let listener: Arc<dyn QueueListener> =
        Arc::new(move |event: &SqliteEvent<'_>| log_event(&sink, event));
    (listener, log)
}

pub fn ids(log: &EventLog) -> Vec<EventId> {
    log.lock().unwrap().iter().map(|e| e.id).collect()
}

pub fn logged(log: &EventLog) -> Vec<Logged> {
    log.lock().unwrap().clone()
}

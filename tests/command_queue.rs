mod common;

use common::{Logged, ScriptedConnection, event_log, logged, queue_log};
use sqlite_session::prelude::*;

fn item(log: &[Logged], at: usize) -> (EventId, Option<usize>, Option<CommandKind>) {
    (log[at].id, log[at].index, log[at].command)
}

#[tokio::test]
async fn drains_fifo_and_ends_with_ready() -> Result<(), SqliteSessionError> {
    let conn = ScriptedConnection::new();
    let mut session = Session::new(conn.clone())?;
    let (listener, log) = queue_log();

    let queue = CommandQueue::new("jobs");
    queue.insert(
        Some("add"),
        InsertRequest::new("t").values(ContentValues::new().with("a", 1_i64)),
    );
    queue.update(
        None,
        UpdateRequest::new("t", ContentValues::new().with("a", 2_i64))
            .filter("id = ?", vec![RowValues::Int(1)]),
    );
    queue.delete(
        None,
        DeleteRequest::new("t").filter("id = ?", vec![RowValues::Int(1)]),
        true,
    );
    assert_eq!(queue.len(), 3);

    assert!(queue.execute(&mut session, Some(listener.clone()))?);
    assert!(queue.is_busy());
    assert!(!queue.execute(&mut session, Some(listener))?);
    session.run_until_idle().await?;

    assert_eq!(
        conn.executed(),
        vec![
            "INSERT INTO t(a) VALUES (?)",
            "UPDATE t SET a=? WHERE id = ?",
            "DELETE FROM t WHERE id = ?",
        ]
    );
    let log = logged(&log);
    assert_eq!(
        (0..log.len()).map(|i| item(&log, i)).collect::<Vec<_>>(),
        vec![
            (EventId::Begin, Some(0), Some(CommandKind::Insert)),
            (EventId::Commit, Some(0), Some(CommandKind::Insert)),
            (EventId::Begin, Some(1), Some(CommandKind::Update)),
            (EventId::Commit, Some(1), Some(CommandKind::Update)),
            (EventId::Begin, Some(2), Some(CommandKind::Delete)),
            (EventId::Ready, Some(2), Some(CommandKind::Delete)),
        ]
    );
    assert!(
        log.iter()
            .all(|e| e.source == EventSource::CommandQueue("jobs".into()))
    );
    assert!(queue.is_empty());
    assert!(!queue.is_busy());
    Ok(())
}

#[tokio::test]
async fn refused_statement_reaches_rollback_and_drain_continues() -> Result<(), SqliteSessionError> {
    let conn = ScriptedConnection::new();
    let mut session = Session::new(conn.clone())?;
    let (listener, log) = queue_log();

    let queue = CommandQueue::new("maintenance");
    queue.exec(Some("pragma"), "PRAGMA user_version = 2", vec![]);
    queue.drop_table(Some("drop"), "old");

    assert!(queue.execute(&mut session, Some(listener))?);
    session.run_until_idle().await?;

    assert_eq!(conn.executed(), vec!["DROP TABLE IF EXISTS old"]);
    let log = logged(&log);
    assert_eq!(item(&log, 0), (EventId::Rollback, Some(0), Some(CommandKind::Exec)));
    assert_eq!(
        log[0].error.as_deref(),
        Some("PRAGMA user_version = 2 statement not supported.")
    );
    assert_eq!(item(&log, 1), (EventId::Begin, Some(1), Some(CommandKind::Drop)));
    assert_eq!(item(&log, 2), (EventId::Ready, Some(1), Some(CommandKind::Drop)));
    assert_eq!(log.len(), 3);
    Ok(())
}

#[tokio::test]
async fn failed_item_reports_error_and_last_item_reports_ready() -> Result<(), SqliteSessionError> {
    let conn = ScriptedConnection::new();
    let mut session = Session::new(conn.clone())?;
    let (listener, log) = queue_log();

    let queue = CommandQueue::new("q");
    queue.replace(
        None,
        InsertRequest::new("FAIL").values(ContentValues::new().with("id", 1_i64)),
    );
    queue.exec(None, "UPDATE t SET n = n + 1", vec![]);

    queue.execute(&mut session, Some(listener))?;
    session.run_until_idle().await?;

    let log = logged(&log);
    assert_eq!(item(&log, 1), (EventId::Rollback, Some(0), Some(CommandKind::Replace)));
    assert!(log[1].error.as_deref().unwrap().contains("scripted failure"));
    assert_eq!(item(&log, 3), (EventId::Ready, Some(1), Some(CommandKind::Exec)));
    assert_eq!(
        conn.executed()[0],
        "INSERT OR REPLACE INTO FAIL(id) VALUES (?)"
    );
    Ok(())
}

#[tokio::test]
async fn events_go_to_the_session_bus_without_a_listener() -> Result<(), SqliteSessionError> {
    let mut session = Session::new(ScriptedConnection::new())?;
    let (listener, log) = event_log();
    session.events().add(listener);

    let queue = CommandQueue::new("bus");
    queue.exec(None, "DELETE FROM t", vec![]);
    queue.execute(&mut session, None)?;
    session.run_until_idle().await?;

    let log = logged(&log);
    assert_eq!(log.len(), 2);
    assert_eq!(item(&log, 0), (EventId::Begin, Some(0), Some(CommandKind::Exec)));
    assert_eq!(item(&log, 1), (EventId::Ready, Some(0), Some(CommandKind::Exec)));
    Ok(())
}

#[tokio::test]
async fn uncaught_delete_failure_stops_the_drain() -> Result<(), SqliteSessionError> {
    let conn = ScriptedConnection::new();
    let mut session = Session::new(conn.clone())?;
    let (bus_listener, bus) = event_log();
    session.events().add(bus_listener);
    let (listener, log) = queue_log();

    let queue = CommandQueue::new("strict");
    queue.delete(None, DeleteRequest::new("FAIL"), false);
    queue.exec(None, "DELETE FROM t", vec![]);
    queue.execute(&mut session, Some(listener))?;
    session.run_until_idle().await?;

    assert_eq!(conn.executed(), vec!["DELETE FROM FAIL"]);
    assert_eq!(common::ids(&log), vec![EventId::Begin]);
    assert_eq!(common::ids(&bus), vec![EventId::Error]);
    assert_eq!(queue.len(), 1);
    assert!(queue.is_busy());

    queue.clear();
    assert!(!queue.is_busy());
    Ok(())
}

#[tokio::test]
async fn empty_update_is_rejected_synchronously() -> Result<(), SqliteSessionError> {
    let mut session = Session::new(ScriptedConnection::new())?;
    let queue = CommandQueue::new("q");
    queue.update(None, UpdateRequest::new("t", ContentValues::new()));

    let err = queue.execute(&mut session, None).unwrap_err();
    assert!(matches!(err, SqliteSessionError::IllegalArgument(_)));
    assert!(!queue.is_busy());
    assert!(!queue.execute(&mut session, None)?);
    Ok(())
}

#[tokio::test]
async fn synchronous_failure_of_the_next_item_is_not_reported_as_ready() -> Result<(), SqliteSessionError> {
    let conn = ScriptedConnection::new();
    let mut session = Session::new(conn.clone())?;
    let (listener, log) = queue_log();

    let queue = CommandQueue::new("mixed");
    queue.exec(None, "DELETE FROM a", vec![]);
    queue.update(None, UpdateRequest::new("t", ContentValues::new()));
    queue.exec(None, "DELETE FROM b", vec![]);

    assert!(queue.execute(&mut session, Some(listener.clone()))?);
    let err = session.run_until_idle().await.unwrap_err();
    assert!(matches!(err, SqliteSessionError::IllegalArgument(_)));

    assert_eq!(conn.executed(), vec!["DELETE FROM a"]);
    assert_eq!(common::ids(&log), vec![EventId::Begin]);
    assert_eq!(queue.len(), 1);
    assert!(!queue.is_busy());

    // The remaining item still runs once the queue is executed again.
    assert!(queue.execute(&mut session, Some(listener))?);
    session.run_until_idle().await?;
    assert_eq!(conn.executed(), vec!["DELETE FROM a", "DELETE FROM b"]);
    let log = logged(&log);
    assert_eq!(item(&log, 1), (EventId::Begin, Some(2), Some(CommandKind::Exec)));
    assert_eq!(item(&log, 2), (EventId::Ready, Some(2), Some(CommandKind::Exec)));
    Ok(())
}

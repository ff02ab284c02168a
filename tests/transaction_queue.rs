mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{ScriptedConnection, event_log, ids, logged};
use sqlite_session::prelude::*;

fn counting_completion(queue: &TransactionQueue) -> Arc<AtomicUsize> {
    let fired = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&fired);
    queue.on_complete(move |_session| {
        sink.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    fired
}

#[tokio::test]
async fn runs_statements_in_order_and_completes_once() -> Result<(), SqliteSessionError> {
    let conn = ScriptedConnection::new();
    let mut session = Session::new(conn.clone())?;
    let (listener, log) = event_log();
    session.events().add(listener);

    let queue = TransactionQueue::new();
    assert!(queue.offer("CREATE TABLE a(id INTEGER)"));
    assert!(queue.offer(QueuedStatement::new(
        "CREATE TABLE b(id INTEGER)",
        vec![]
    )));
    let fired = counting_completion(&queue);

    assert!(queue.begin(&mut session));
    assert!(!queue.offer("CREATE TABLE c(id INTEGER)"));
    session.run_until_idle().await?;

    assert_eq!(
        conn.executed(),
        vec!["CREATE TABLE a(id INTEGER)", "CREATE TABLE b(id INTEGER)"]
    );
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(
        ids(&log),
        vec![EventId::Begin, EventId::Commit, EventId::Begin, EventId::Commit]
    );
    assert!(
        logged(&log)
            .iter()
            .all(|e| e.source == EventSource::TransactionQueue)
    );
    assert!(queue.is_empty());
    // Each statement ran as a top-level transaction.
    assert_eq!(session.allocated_transactions(), 1);
    Ok(())
}

#[tokio::test]
async fn rollback_continues_without_firing_completion() -> Result<(), SqliteSessionError> {
    let conn = ScriptedConnection::new();
    let mut session = Session::new(conn.clone())?;
    let (listener, log) = event_log();
    session.events().add(listener);

    let queue = TransactionQueue::new();
    queue.add_all(["CREATE TABLE a(id)", "CREATE TABLE FAIL(id)"]);
    let fired = counting_completion(&queue);
    queue.begin(&mut session);
    session.run_until_idle().await?;

    assert_eq!(conn.executed().len(), 2);
    assert_eq!(
        ids(&log),
        vec![
            EventId::Begin,
            EventId::Commit,
            EventId::Begin,
            EventId::Rollback
        ]
    );
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn statements_after_a_rollback_still_run() -> Result<(), SqliteSessionError> {
    let conn = ScriptedConnection::new();
    let mut session = Session::new(conn.clone())?;

    let queue = TransactionQueue::new();
    queue.add_all(["CREATE TABLE FAIL(id)", "CREATE TABLE b(id)"]);
    let fired = counting_completion(&queue);
    queue.begin(&mut session);
    session.run_until_idle().await?;

    assert_eq!(
        conn.executed(),
        vec!["CREATE TABLE FAIL(id)", "CREATE TABLE b(id)"]
    );
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn empty_batch_dispatches_nothing() -> Result<(), SqliteSessionError> {
    let conn = ScriptedConnection::new();
    let mut session = Session::new(conn.clone())?;
    let queue = TransactionQueue::new();
    let fired = counting_completion(&queue);

    assert!(!queue.begin(&mut session));
    session.run_until_idle().await?;
    assert!(conn.executed().is_empty());
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert!(queue.offer("CREATE TABLE late(id)"));
    Ok(())
}

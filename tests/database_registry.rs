mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use common::{ScriptedConnection, event_log, ids, logged, queue_log};
use sqlite_session::prelude::*;

fn config(name: &str) -> DatabaseConfiguration {
    DatabaseConfiguration::builder(name)
        .display_name(format!("{name} db"))
        .create_model(["CREATE TABLE a(id INTEGER)", "CREATE TABLE b(id INTEGER)"])
        .finish()
}

#[tokio::test]
async fn first_open_runs_create_model_then_reopen_emits_open() -> Result<(), SqliteSessionError> {
    let conn = ScriptedConnection::new();
    let mut db = Database::new(config("app"), conn.clone());
    let (listener, log) = event_log();
    db.add_listener(listener);

    db.open()?;
    db.run_until_idle().await?;
    assert_eq!(
        conn.executed(),
        vec!["CREATE TABLE a(id INTEGER)", "CREATE TABLE b(id INTEGER)"]
    );
    let events = logged(&log);
    let last = events.last().unwrap();
    assert_eq!(last.id, EventId::Create);
    assert_eq!(last.source, EventSource::Database("app db".into()));

    db.close()?;
    assert!(!db.is_open());
    db.open()?;
    db.run_until_idle().await?;
    assert_eq!(conn.executed().len(), 2);
    assert_eq!(
        ids(&log)[events.len()..].to_vec(),
        vec![EventId::Close, EventId::Open]
    );
    Ok(())
}

#[tokio::test]
async fn closed_database_refuses_operations() {
    let mut db = Database::new(config("shut"), ScriptedConnection::new());
    let err = db.exec_sql("DELETE FROM a", vec![], None).unwrap_err();
    assert_eq!(
        err.to_string(),
        "IllegalStateException The database 'shut db' is not open."
    );
    assert!(db.in_transaction().is_err());
    assert!(db.create_session().is_err());
    assert!(db.close().unwrap_err().is_illegal_state());
    assert!(db.begin_transaction("SELECT 1", vec![], None).is_err());
}

#[tokio::test]
async fn facade_forwards_to_its_session() -> Result<(), SqliteSessionError> {
    let conn = ScriptedConnection::new();
    let mut db = Database::new(
        DatabaseConfiguration::builder("plain").version(2).finish(),
        conn.clone(),
    );
    let (listener, log) = event_log();
    db.add_listener(listener.clone());
    db.open()?;
    assert!(db.needs_upgrade(3));
    assert!(!db.needs_upgrade(2));

    db.insert_query(
        InsertRequest::new("t").values(ContentValues::new().with("a", "x")),
        None,
    )?;
    db.exec_sql("ATTACH DATABASE 'x' AS y", vec![], None)?;
    assert!(!db.in_transaction()?);
    db.run_until_idle().await?;

    assert_eq!(conn.executed(), vec!["INSERT INTO t(a) VALUES (?)"]);
    // CREATE for the empty model, ERROR for the refused ATTACH, EXECUTE for the insert.
    assert_eq!(
        ids(&log),
        vec![EventId::Create, EventId::Error, EventId::Execute]
    );
    assert!(db.remove_listener(&listener));
    Ok(())
}

#[tokio::test]
async fn registry_returns_one_database_per_name() -> Result<(), SqliteSessionError> {
    let registry = DatabaseRegistry::new();
    let conn = ScriptedConnection::new();

    let first = registry.open_or_create(config("main"), conn.clone()).await?;
    let again = registry.create(config("main"), conn.clone())?;
    assert!(Arc::ptr_eq(&first, &again));
    registry.create(DatabaseConfiguration::new("aux"), conn.clone())?;
    assert_eq!(registry.names(), vec!["aux".to_owned(), "main".to_owned()]);

    assert!(registry.delete_database("main").await?);
    assert!(!first.lock().await.is_open());
    assert!(registry.get("main").is_none());
    assert!(!registry.delete_database("main").await?);
    assert!(matches!(
        registry.delete_database("").await,
        Err(SqliteSessionError::IllegalArgument(_))
    ));
    assert!(matches!(
        registry.create(DatabaseConfiguration::default(), conn),
        Err(SqliteSessionError::IllegalArgument(_))
    ));
    assert_eq!(registry.len(), 1);
    Ok(())
}

#[tokio::test]
async fn counter_scope_selects_the_id_sequence() -> Result<(), SqliteSessionError> {
    let registry = DatabaseRegistry::new();
    let conn = ScriptedConnection::new();

    let global = registry.open_or_create(DatabaseConfiguration::new("g1"), conn.clone()).await?;
    let other = registry.open_or_create(DatabaseConfiguration::new("g2"), conn.clone()).await?;
    let private = registry
        .open_or_create(
            DatabaseConfiguration::builder("p")
                .counter_scope(CounterScope::PerSession)
                .finish(),
            conn.clone(),
        )
        .await?;

    for db in [&global, &other, &private] {
        let mut db = db.lock().await;
        db.exec_sql("DELETE FROM t", vec![], None)?;
        db.run_until_idle().await?;
    }
    assert_eq!(global.lock().await.session()?.num_transaction(), 0);
    assert_eq!(other.lock().await.session()?.num_transaction(), 1);
    assert_eq!(private.lock().await.session()?.num_transaction(), 0);
    assert_eq!(registry.counter().peek(), 2);

    let extra = global.lock().await.create_session()?;
    assert!(extra.counter().shares_sequence_with(registry.counter()));
    Ok(())
}

#[tokio::test]
async fn enqueued_transactions_and_named_queues_use_the_session() -> Result<(), SqliteSessionError> {
    let conn = ScriptedConnection::new();
    let mut db = Database::new(DatabaseConfiguration::new("q"), conn.clone());
    db.open()?;

    let bootstrap = TransactionQueue::new();
    bootstrap.add_all(["CREATE TABLE x(id)", "CREATE TABLE y(id)"]);
    assert!(db.enqueue_transaction(&bootstrap)?);
    db.run_until_idle().await?;

    let queue = db.queue("later");
    assert_eq!(queue.name(), "later");
    queue.drop_table(None, "x");
    assert!(db.execute_queue(&queue, None)?);
    db.run_until_idle().await?;

    assert_eq!(
        conn.executed(),
        vec![
            "CREATE TABLE x(id)",
            "CREATE TABLE y(id)",
            "DROP TABLE IF EXISTS x"
        ]
    );
    Ok(())
}

#[tokio::test]
async fn set_version_moves_forward_and_reports_the_change() -> Result<(), SqliteSessionError> {
    let conn = ScriptedConnection::new();
    let mut db = Database::new(DatabaseConfiguration::new("versioned"), conn.clone());
    let (listener, log) = event_log();
    db.add_listener(listener);
    db.open()?;
    assert_eq!(db.version(), 1);

    assert!(!db.set_version(1, None)?);
    assert!(db.set_version(2, None)?);
    db.run_until_idle().await?;
    assert_eq!(db.version(), 2);
    assert!(!db.needs_upgrade(2));
    assert_eq!(conn.executed(), vec!["PRAGMA user_version = 2"]);
    assert_eq!(ids(&log), vec![EventId::Create, EventId::Change]);

    let outcome = Arc::new(AtomicI32::new(0));
    let sink = Arc::clone(&outcome);
    db.set_version(3, Some(Box::new(move |code: i32| sink.store(code, Ordering::SeqCst))))?;
    db.run_until_idle().await?;
    assert_eq!(outcome.load(Ordering::SeqCst), 1);
    assert_eq!(db.version(), 3);
    // The callback replaces the CHANGE broadcast.
    assert_eq!(ids(&log).len(), 2);

    db.close()?;
    assert!(db.set_version(9, None).unwrap_err().is_illegal_state());
    Ok(())
}

#[tokio::test]
async fn failed_version_change_keeps_the_version() -> Result<(), SqliteSessionError> {
    let conn = ScriptedConnection::new();
    conn.fail_when("user_version = 5");
    let mut db = Database::new(DatabaseConfiguration::new("stuck"), conn.clone());
    let (listener, log) = event_log();
    db.add_listener(listener);
    db.open()?;

    db.set_version(5, None)?;
    db.run_until_idle().await?;
    assert_eq!(db.version(), 1);
    let events = logged(&log);
    assert_eq!(events.last().map(|e| e.id), Some(EventId::Error));
    assert_eq!(events.last().map(|e| e.source.clone()), Some(EventSource::Database("stuck".into())));

    let outcome = Arc::new(AtomicI32::new(0));
    let sink = Arc::clone(&outcome);
    db.set_version(5, Some(Box::new(move |code: i32| sink.store(code, Ordering::SeqCst))))?;
    db.run_until_idle().await?;
    assert_eq!(outcome.load(Ordering::SeqCst), -1);
    assert!(db.needs_upgrade(5));
    Ok(())
}

#[tokio::test]
async fn reopen_read_write_cycles_a_read_only_database() -> Result<(), SqliteSessionError> {
    let mut db = Database::new(
        DatabaseConfiguration::builder("ro").mode(OpenMode::ReadOnly).finish(),
        ScriptedConnection::new(),
    );
    let (listener, log) = event_log();
    db.add_listener(listener);
    db.open()?;
    assert!(db.is_read_only());

    db.reopen_read_write()?;
    assert!(!db.is_read_only());
    assert!(db.is_open());
    assert_eq!(ids(&log), vec![EventId::Create, EventId::Close, EventId::Open]);

    db.reopen_read_write()?;
    assert_eq!(ids(&log).len(), 3);
    Ok(())
}

#[tokio::test]
async fn exec_script_queues_one_item_per_line() -> Result<(), SqliteSessionError> {
    let conn = ScriptedConnection::new();
    let mut db = Database::new(DatabaseConfiguration::new("scripted"), conn.clone());
    assert!(db.exec_script("boot.sql", "SELECT 1", None).is_err());
    db.open()?;

    let (listener, log) = queue_log();
    let script = "CREATE TABLE s(id)\n\n  INSERT INTO s VALUES (1)  \nUPDATE s SET id = 2\n";
    let queue = db.exec_script("boot.sql", script, Some(listener))?;
    db.run_until_idle().await?;

    assert_eq!(queue.name(), "boot.sql");
    assert!(queue.is_empty());
    assert_eq!(
        conn.executed(),
        vec![
            "CREATE TABLE s(id)",
            "INSERT INTO s VALUES (1)",
            "UPDATE s SET id = 2"
        ]
    );
    let events = logged(&log);
    let summary: Vec<_> = events
        .iter()
        .map(|e| (e.id, e.name.clone()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (EventId::Begin, Some("exec-0".to_owned())),
            (EventId::Commit, Some("exec-0".to_owned())),
            (EventId::Begin, Some("exec-1".to_owned())),
            (EventId::Commit, Some("exec-1".to_owned())),
            (EventId::Begin, Some("exec-2".to_owned())),
            (EventId::Ready, Some("exec-2".to_owned())),
        ]
    );
    Ok(())
}

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{OpenFlags, ToSql};
use tokio::sync::Mutex;

use crate::connection::Connection;
use crate::error::SqliteSessionError;
use crate::results::ResultSet;
use crate::types::RowValues;

use super::params::Params;
use super::query::build_result_set;

type SharedSqliteConnection = Arc<Mutex<rusqlite::Connection>>;

/// [`Connection`] backed by a single rusqlite handle.
///
/// Statements run on tokio's blocking pool; the mutex serializes them, so clones
/// of one `SqliteConnection` never execute concurrently.
#[derive(Clone)]
pub struct SqliteConnection {
    conn: SharedSqliteConnection,
    label: Arc<str>,
}

impl SqliteConnection {
    /// Open (or create) a database file.
    ///
    /// # Errors
    /// Returns [`SqliteSessionError::SqliteError`] if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SqliteSessionError> {
        let path = path.as_ref();
        let conn = rusqlite::Connection::open(path)?;
        Ok(Self::from_rusqlite(conn, &path.display().to_string()))
    }

    /// Open a database file without write access.
    ///
    /// # Errors
    /// Returns [`SqliteSessionError::SqliteError`] if the file does not exist or cannot be opened.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, SqliteSessionError> {
        let path = path.as_ref();
        let conn = rusqlite::Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI,
        )?;
        Ok(Self::from_rusqlite(conn, &path.display().to_string()))
    }

    /// # Errors
    /// Returns [`SqliteSessionError::SqliteError`] if `SQLite` cannot allocate the database.
    pub fn open_in_memory() -> Result<Self, SqliteSessionError> {
        let conn = rusqlite::Connection::open_in_memory()?;
        Ok(Self::from_rusqlite(conn, ":memory:"))
    }

    #[must_use]
    pub fn from_rusqlite(conn: rusqlite::Connection, label: &str) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            label: Arc::from(label),
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("label", &self.label)
            .finish()
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    async fn execute_sql(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, SqliteSessionError> {
        let sql = sql.to_owned();
        let params = Params::convert(params);
        run_blocking(Arc::clone(&self.conn), move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            if stmt.column_count() > 0 {
                return build_result_set(&mut stmt, params.as_values());
            }
            let refs: Vec<&dyn ToSql> = params.0.iter().map(|v| v as &dyn ToSql).collect();
            let changed = stmt.execute(&refs[..])?;
            let insert_id = (changed > 0 && is_insert(&sql)).then(|| conn.last_insert_rowid());
            Ok(ResultSet::from_changes(changed, insert_id))
        })
        .await
    }
}

fn is_insert(sql: &str) -> bool {
    let head = sql.trim_start();
    ["INSERT", "REPLACE"].iter().any(|kw| {
        head.get(..kw.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(kw))
    })
}

async fn run_blocking<F, R>(conn: SharedSqliteConnection, func: F) -> Result<R, SqliteSessionError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, SqliteSessionError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        func(&mut guard)
    })
    .await?
}

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::DatabaseConfiguration;
use crate::connection::Connection;
use crate::database::Database;
use crate::error::SqliteSessionError;
use crate::session::TransactionCounter;

/// A database shared between tasks.
pub type SharedDatabase = Arc<tokio::sync::Mutex<Database>>;

/// Active databases by name, plus the transaction counter their sessions
/// share.
///
/// Owned by the application and passed to whoever needs to look databases up.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use sqlite_session::prelude::*;
///
/// # async fn demo() -> Result<(), SqliteSessionError> {
/// let registry = DatabaseRegistry::new();
/// let config = DatabaseConfiguration::builder("app").in_memory().finish();
/// let connection = Arc::new(SqliteConnection::open_in_memory()?);
/// let db = registry.open_or_create(config, connection).await?;
/// db.lock().await.run_until_idle().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct DatabaseRegistry {
    databases: Mutex<HashMap<String, SharedDatabase>>,
    counter: TransactionCounter,
}

impl DatabaseRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter handed to databases configured with a global counter scope.
    #[must_use]
    pub fn counter(&self) -> &TransactionCounter {
        &self.counter
    }

    /// Register a database for `config`, or return the one already
    /// registered under its name. The database is not opened.
    ///
    /// # Errors
    /// [`SqliteSessionError::IllegalArgument`] if the configuration has no name.
    pub fn create(
        &self,
        config: DatabaseConfiguration,
        connection: Arc<dyn Connection>,
    ) -> Result<SharedDatabase, SqliteSessionError> {
        if config.name.is_empty() {
            return Err(SqliteSessionError::IllegalArgument(
                "database name must not be empty".into(),
            ));
        }
        let mut databases = self.lock();
        if let Some(existing) = databases.get(&config.name) {
            return Ok(Arc::clone(existing));
        }
        tracing::debug!(%config, "registering database");
        let name = config.name.clone();
        let database = Database::new(config, connection).with_counter(self.counter.clone());
        let shared = Arc::new(tokio::sync::Mutex::new(database));
        databases.insert(name, Arc::clone(&shared));
        Ok(shared)
    }

    /// [`create`](Self::create) then open.
    ///
    /// # Errors
    /// Errors of [`create`](Self::create) and [`Database::open`].
    pub async fn open_or_create(
        &self,
        config: DatabaseConfiguration,
        connection: Arc<dyn Connection>,
    ) -> Result<SharedDatabase, SqliteSessionError> {
        let shared = self.create(config, connection)?;
        shared.lock().await.open()?;
        Ok(shared)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<SharedDatabase> {
        self.lock().get(name).cloned()
    }

    /// Close and forget the database registered as `name`. Returns whether
    /// one was registered.
    ///
    /// # Errors
    /// [`SqliteSessionError::IllegalArgument`] if `name` is empty.
    pub async fn delete_database(&self, name: &str) -> Result<bool, SqliteSessionError> {
        if name.is_empty() {
            return Err(SqliteSessionError::IllegalArgument(
                "file must not be null".into(),
            ));
        }
        let removed = self.lock().remove(name);
        let Some(database) = removed else {
            return Ok(false);
        };
        let mut database = database.lock().await;
        if database.is_open() {
            database.close()?;
        }
        tracing::debug!(name, "database deleted from registry");
        Ok(true)
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SharedDatabase>> {
        match self.databases.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl fmt::Debug for DatabaseRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseRegistry")
            .field("databases", &self.names())
            .field("next_transaction", &self.counter.peek())
            .finish()
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SqliteSessionError;

/// Path that selects a private in-memory database.
pub const MEMORY_DB_PATH: &str = ":memory:";
pub const MEMORY_DB_DISPLAY_NAME: &str = "memory database";

/// Which sequence a database's sessions draw transaction ids from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterScope {
    /// One sequence shared by every database of a registry.
    #[default]
    Global,
    /// Each session counts on its own.
    PerSession,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenMode {
    ReadOnly,
    #[default]
    ReadWrite,
}

fn default_size() -> u64 {
    5 * 1024 * 1024
}

fn default_version() -> u32 {
    1
}

fn default_path() -> String {
    "./".into()
}

/// Settings of one database.
///
/// `create_model` runs once, the first time the database opens;
/// `drop_model` is kept for callers that tear a schema down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfiguration {
    pub name: String,
    pub display_name: String,
    #[serde(default = "default_size")]
    pub size: u64,
    #[serde(default = "default_version")]
    pub version: u32,
    pub mode: OpenMode,
    #[serde(default = "default_path")]
    pub path: String,
    pub create_model: Vec<String>,
    pub drop_model: Vec<String>,
    pub counter_scope: CounterScope,
}

impl Default for DatabaseConfiguration {
    fn default() -> Self {
        Self {
            name: String::new(),
            display_name: String::new(),
            size: default_size(),
            version: default_version(),
            mode: OpenMode::default(),
            path: default_path(),
            create_model: Vec::new(),
            drop_model: Vec::new(),
            counter_scope: CounterScope::default(),
        }
    }
}

impl DatabaseConfiguration {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn builder(name: impl Into<String>) -> DatabaseConfigurationBuilder {
        DatabaseConfigurationBuilder::new(name)
    }

    /// Parse a configuration from JSON; missing fields take their defaults.
    ///
    /// # Errors
    /// [`SqliteSessionError::ConfigError`] if the JSON is malformed or has no name.
    pub fn from_json_str(json: &str) -> Result<Self, SqliteSessionError> {
        let config: Self = serde_json::from_str(json)?;
        if config.name.is_empty() {
            return Err(SqliteSessionError::ConfigError(
                "database configuration needs a name".into(),
            ));
        }
        Ok(config)
    }

    /// # Errors
    /// [`SqliteSessionError::ConfigError`] if serialization fails.
    pub fn to_json_string(&self) -> Result<String, SqliteSessionError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    #[must_use]
    pub fn is_in_memory_db(&self) -> bool {
        self.path == MEMORY_DB_PATH
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.mode == OpenMode::ReadOnly
    }

    /// Name used in messages: the display name, else the name.
    #[must_use]
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }

    /// Location of the database file; `path` is treated as a directory unless
    /// it selects an in-memory database.
    #[must_use]
    pub fn file_path(&self) -> String {
        if self.is_in_memory_db() {
            MEMORY_DB_PATH.to_owned()
        } else if self.path.ends_with('/') {
            format!("{}{}", self.path, self.name)
        } else {
            format!("{}/{}", self.path, self.name)
        }
    }
}

impl fmt::Display for DatabaseConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DatabaseConfiguration[name:{}, displayName:{}, size:{}, version:{}, mode:{:?}, path:{}, createModel:{} statements, dropModel:{} statements]",
            self.name,
            self.display_name,
            self.size,
            self.version,
            self.mode,
            self.path,
            self.create_model.len(),
            self.drop_model.len()
        )
    }
}

/// Fluent builder for [`DatabaseConfiguration`].
#[derive(Debug, Clone)]
pub struct DatabaseConfigurationBuilder {
    config: DatabaseConfiguration,
}

impl DatabaseConfigurationBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            config: DatabaseConfiguration::new(name),
        }
    }

    #[must_use]
    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.config.display_name = display_name.into();
        self
    }

    #[must_use]
    pub fn size(mut self, size: u64) -> Self {
        self.config.size = size;
        self
    }

    #[must_use]
    pub fn version(mut self, version: u32) -> Self {
        self.config.version = version;
        self
    }

    #[must_use]
    pub fn mode(mut self, mode: OpenMode) -> Self {
        self.config.mode = mode;
        self
    }

    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Use a private in-memory database.
    #[must_use]
    pub fn in_memory(mut self) -> Self {
        self.config.path = MEMORY_DB_PATH.into();
        if self.config.display_name.is_empty() {
            self.config.display_name = MEMORY_DB_DISPLAY_NAME.into();
        }
        self
    }

    #[must_use]
    pub fn create_model<I, S>(mut self, statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.create_model = statements.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn drop_model<I, S>(mut self, statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.drop_model = statements.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn counter_scope(mut self, counter_scope: CounterScope) -> Self {
        self.config.counter_scope = counter_scope;
        self
    }

    #[must_use]
    pub fn finish(self) -> DatabaseConfiguration {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_fills_defaults() {
        let config = DatabaseConfiguration::from_json_str(
            r#"{"name":"app.db","create_model":["CREATE TABLE a(id INTEGER)"],"counter_scope":"per_session"}"#,
        )
        .unwrap();
        assert_eq!(config.size, 5 * 1024 * 1024);
        assert_eq!(config.version, 1);
        assert_eq!(config.path, "./");
        assert_eq!(config.mode, OpenMode::ReadWrite);
        assert_eq!(config.counter_scope, CounterScope::PerSession);
        assert_eq!(config.create_model.len(), 1);
        assert_eq!(config.file_path(), "./app.db");
        assert_eq!(config.label(), "app.db");
    }

    #[test]
    fn json_without_name_is_rejected() {
        let err = DatabaseConfiguration::from_json_str("{}").unwrap_err();
        assert!(matches!(err, SqliteSessionError::ConfigError(_)));
        let err = DatabaseConfiguration::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, SqliteSessionError::ConfigError(_)));
    }

    #[test]
    fn builder_round_trips_through_json() {
        let config = DatabaseConfiguration::builder("cache")
            .in_memory()
            .version(3)
            .mode(OpenMode::ReadOnly)
            .drop_model(["DROP TABLE a"])
            .finish();
        assert!(config.is_in_memory_db());
        assert!(config.is_read_only());
        assert_eq!(config.label(), MEMORY_DB_DISPLAY_NAME);
        assert_eq!(config.file_path(), MEMORY_DB_PATH);

        let json = config.to_json_string().unwrap();
        assert_eq!(DatabaseConfiguration::from_json_str(&json).unwrap(), config);
    }
}

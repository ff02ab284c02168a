//! SQL text for the insert, update and delete data operations.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SqliteSessionError;
use crate::types::RowValues;

/// `ON CONFLICT` behavior spliced into INSERT and UPDATE statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConflictAlgorithm {
    #[default]
    None,
    Rollback,
    Abort,
    Fail,
    Ignore,
    Replace,
}

impl ConflictAlgorithm {
    /// Clause inserted after the INSERT/UPDATE keyword; empty for [`ConflictAlgorithm::None`].
    #[must_use]
    pub fn clause(self) -> &'static str {
        match self {
            ConflictAlgorithm::None => "",
            ConflictAlgorithm::Rollback => " OR ROLLBACK",
            ConflictAlgorithm::Abort => " OR ABORT",
            ConflictAlgorithm::Fail => " OR FAIL",
            ConflictAlgorithm::Ignore => " OR IGNORE",
            ConflictAlgorithm::Replace => " OR REPLACE",
        }
    }
}

/// Column/value pairs in insertion order. Putting an existing column
/// replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentValues {
    entries: Vec<(String, RowValues)>,
}

impl ContentValues {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, column: impl Into<String>, value: impl Into<RowValues>) {
        let column = column.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(name, _)| *name == column) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((column, value)),
        }
    }

    /// Builder form of [`put`](Self::put).
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<RowValues>) -> Self {
        self.put(column, value);
        self
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&RowValues> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn remove(&mut self, column: &str) -> Option<RowValues> {
        let pos = self.entries.iter().position(|(name, _)| name == column)?;
        Some(self.entries.remove(pos).1)
    }

    #[must_use]
    pub fn contains_key(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RowValues)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    fn values(&self) -> impl Iterator<Item = RowValues> + '_ {
        self.entries.iter().map(|(_, value)| value.clone())
    }
}

impl<K, V> FromIterator<(K, V)> for ContentValues
where
    K: Into<String>,
    V: Into<RowValues>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut values = ContentValues::new();
        for (column, value) in iter {
            values.put(column, value);
        }
        values
    }
}

/// A statement and the arguments to bind to it.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub sql: String,
    pub args: Vec<RowValues>,
}

impl fmt::Display for BoundStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Row insertion into `table`.
///
/// ```rust
/// use sqlite_session::prelude::*;
///
/// let stmt = InsertRequest::new("users")
///     .values(ContentValues::new().with("name", "alice").with("age", 30_i64))
///     .conflict(ConflictAlgorithm::Replace)
///     .build();
/// assert_eq!(stmt.sql, "INSERT OR REPLACE INTO users(name,age) VALUES (?,?)");
/// ```
#[derive(Debug, Clone, Default)]
pub struct InsertRequest {
    pub table: String,
    pub null_column_hack: Option<String>,
    pub values: ContentValues,
    pub conflict: ConflictAlgorithm,
}

impl InsertRequest {
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn values(mut self, values: ContentValues) -> Self {
        self.values = values;
        self
    }

    /// Column set to NULL when `values` is empty, since SQLite rejects an
    /// INSERT with no columns.
    #[must_use]
    pub fn null_column_hack(mut self, column: impl Into<String>) -> Self {
        self.null_column_hack = Some(column.into());
        self
    }

    #[must_use]
    pub fn conflict(mut self, conflict: ConflictAlgorithm) -> Self {
        self.conflict = conflict;
        self
    }

    #[must_use]
    pub fn build(&self) -> BoundStatement {
        let mut sql = format!("INSERT{} INTO {}(", self.conflict.clause(), self.table);
        if self.values.is_empty() {
            sql.push_str(self.null_column_hack.as_deref().unwrap_or_default());
            sql.push_str(") VALUES (NULL)");
            return BoundStatement {
                sql,
                args: Vec::new(),
            };
        }
        sql.push_str(&self.values.columns().collect::<Vec<_>>().join(","));
        sql.push_str(") VALUES (");
        sql.push_str(&vec!["?"; self.values.len()].join(","));
        sql.push(')');
        BoundStatement {
            sql,
            args: self.values.values().collect(),
        }
    }
}

/// Update of the rows of `table` matching `where_clause`.
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    pub table: String,
    pub values: ContentValues,
    pub where_clause: Option<String>,
    pub where_args: Vec<RowValues>,
    pub conflict: ConflictAlgorithm,
}

impl UpdateRequest {
    #[must_use]
    pub fn new(table: impl Into<String>, values: ContentValues) -> Self {
        Self {
            table: table.into(),
            values,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn filter(mut self, where_clause: impl Into<String>, where_args: Vec<RowValues>) -> Self {
        self.where_clause = Some(where_clause.into());
        self.where_args = where_args;
        self
    }

    #[must_use]
    pub fn conflict(mut self, conflict: ConflictAlgorithm) -> Self {
        self.conflict = conflict;
        self
    }

    /// Bind order is the SET values followed by `where_args`.
    ///
    /// # Errors
    /// [`SqliteSessionError::IllegalArgument`] when there is nothing to set.
    pub fn build(&self) -> Result<BoundStatement, SqliteSessionError> {
        if self.values.is_empty() {
            return Err(SqliteSessionError::IllegalArgument("Empty values".into()));
        }
        let assignments = self
            .values
            .columns()
            .map(|column| format!("{column}=?"))
            .collect::<Vec<_>>()
            .join(",");
        let mut sql = format!(
            "UPDATE{} {} SET {assignments}",
            self.conflict.clause(),
            self.table
        );
        push_where(&mut sql, self.where_clause.as_deref());

        let mut args: Vec<RowValues> = self.values.values().collect();
        args.extend(self.where_args.iter().cloned());
        Ok(BoundStatement { sql, args })
    }
}

/// Deletion of the rows of `table` matching `where_clause`, or all rows.
#[derive(Debug, Clone, Default)]
pub struct DeleteRequest {
    pub table: String,
    pub where_clause: Option<String>,
    pub where_args: Vec<RowValues>,
}

impl DeleteRequest {
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn filter(mut self, where_clause: impl Into<String>, where_args: Vec<RowValues>) -> Self {
        self.where_clause = Some(where_clause.into());
        self.where_args = where_args;
        self
    }

    #[must_use]
    pub fn build(&self) -> BoundStatement {
        let mut sql = format!("DELETE FROM {}", self.table);
        push_where(&mut sql, self.where_clause.as_deref());
        BoundStatement {
            sql,
            args: self.where_args.clone(),
        }
    }
}

fn push_where(sql: &mut String, where_clause: Option<&str>) {
    if let Some(clause) = where_clause.filter(|c| !c.trim().is_empty()) {
        sql.push_str(" WHERE ");
        sql.push_str(clause);
    }
}

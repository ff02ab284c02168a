use crate::results::{ResultSet, Row};
use crate::types::RowValues;

/// Forward-only view over the result of one executed statement, handed to
/// [`TransactionAdapter::commit`](crate::session::TransactionAdapter::commit).
#[derive(Debug, Clone)]
pub struct ExecCursor {
    table: Option<String>,
    result_set: ResultSet,
    position: Option<usize>,
}

impl ExecCursor {
    #[must_use]
    pub fn new(table: Option<String>, result_set: ResultSet) -> Self {
        Self {
            table,
            result_set,
            position: None,
        }
    }

    /// Table the statement was issued against, when the caller named one.
    #[must_use]
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.result_set.len()
    }

    #[must_use]
    pub fn rows_affected(&self) -> usize {
        self.result_set.rows_affected
    }

    #[must_use]
    pub fn insert_id(&self) -> Option<i64> {
        self.result_set.insert_id
    }

    pub fn move_to_next(&mut self) -> bool {
        let next = self.position.map_or(0, |p| p + 1);
        if next < self.count() {
            self.position = Some(next);
            true
        } else {
            self.position = Some(self.count());
            false
        }
    }

    #[must_use]
    pub fn current(&self) -> Option<&Row> {
        self.position.and_then(|p| self.result_set.results.get(p))
    }

    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&RowValues> {
        self.current().and_then(|row| row.get(column_name))
    }

    #[must_use]
    pub fn result_set(&self) -> &ResultSet {
        &self.result_set
    }

    #[must_use]
    pub fn into_result_set(self) -> ResultSet {
        self.result_set
    }
}

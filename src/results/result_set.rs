use std::collections::HashMap;
use std::sync::Arc;

use super::row::{Row, index_columns};
use crate::types::RowValues;

/// Rows and counters produced by one statement.
///
/// The shape mirrors a Web SQL result: the selected rows, the number of rows the
/// statement changed, and the rowid of the last inserted row when there was one.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub results: Vec<Row>,
    pub rows_affected: usize,
    pub insert_id: Option<i64>,
    column_names: Option<Arc<Vec<String>>>,
    column_index: Option<Arc<HashMap<String, usize>>>,
}

impl ResultSet {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> ResultSet {
        ResultSet {
            results: Vec::with_capacity(capacity),
            ..ResultSet::default()
        }
    }

    /// Result of a statement that returned no rows.
    #[must_use]
    pub fn from_changes(rows_affected: usize, insert_id: Option<i64>) -> ResultSet {
        ResultSet {
            rows_affected,
            insert_id,
            ..ResultSet::default()
        }
    }

    pub fn set_column_names(&mut self, column_names: Arc<Vec<String>>) {
        self.column_index = Some(Arc::new(index_columns(&column_names)));
        self.column_names = Some(column_names);
    }

    #[must_use]
    pub fn get_column_names(&self) -> Option<&Arc<Vec<String>>> {
        self.column_names.as_ref()
    }

    /// Append a row; ignored until column names are set.
    pub fn add_row_values(&mut self, row_values: Vec<RowValues>) {
        if let (Some(column_names), Some(column_index)) = (&self.column_names, &self.column_index)
        {
            self.results.push(Row::with_index(
                column_names.clone(),
                column_index.clone(),
                row_values,
            ));
            self.rows_affected += 1;
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    #[must_use]
    pub fn first(&self) -> Option<&Row> {
        self.results.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_share_column_lookup() {
        let mut rs = ResultSet::with_capacity(2);
        rs.add_row_values(vec![RowValues::Int(1)]);
        assert!(rs.is_empty(), "rows before column names are dropped");

        rs.set_column_names(Arc::new(vec!["id".into(), "Name".into()]));
        rs.add_row_values(vec![RowValues::Int(1), RowValues::Text("a".into())]);
        rs.add_row_values(vec![RowValues::Int(2), RowValues::Text("b".into())]);

        assert_eq!(rs.len(), 2);
        assert_eq!(rs.rows_affected, 2);
        let second = &rs.results[1];
        assert_eq!(second.get("id"), Some(&RowValues::Int(2)));
        assert_eq!(second.get("name").and_then(RowValues::as_text), Some("b"));
        assert!(second.get("missing").is_none());
    }

    #[test]
    fn change_only_results_have_no_rows() {
        let rs = ResultSet::from_changes(3, Some(9));
        assert!(rs.is_empty());
        assert_eq!(rs.rows_affected, 3);
        assert_eq!(rs.insert_id, Some(9));
        assert!(rs.get_column_names().is_none());
    }
}

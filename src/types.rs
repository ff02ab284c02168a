use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

/// Values bound to statements and returned in result rows.
///
/// ```rust
/// use sqlite_session::prelude::*;
///
/// let args: Vec<RowValues> = vec![1_i64.into(), "alice".into(), RowValues::Null];
/// assert_eq!(args[1].as_text(), Some("alice"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    Timestamp(NaiveDateTime),
    Null,
    JSON(JsonValue),
    Blob(Vec<u8>),
}

impl RowValues {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            RowValues::Float(value) => Some(*value),
            #[allow(clippy::cast_precision_loss)]
            RowValues::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }
}

impl From<i64> for RowValues {
    fn from(value: i64) -> Self {
        RowValues::Int(value)
    }
}

impl From<i32> for RowValues {
    fn from(value: i32) -> Self {
        RowValues::Int(i64::from(value))
    }
}

impl From<f64> for RowValues {
    fn from(value: f64) -> Self {
        RowValues::Float(value)
    }
}

impl From<bool> for RowValues {
    fn from(value: bool) -> Self {
        RowValues::Bool(value)
    }
}

impl From<&str> for RowValues {
    fn from(value: &str) -> Self {
        RowValues::Text(value.to_owned())
    }
}

impl From<String> for RowValues {
    fn from(value: String) -> Self {
        RowValues::Text(value)
    }
}

impl From<Vec<u8>> for RowValues {
    fn from(value: Vec<u8>) -> Self {
        RowValues::Blob(value)
    }
}

impl<T: Into<RowValues>> From<Option<T>> for RowValues {
    fn from(value: Option<T>) -> Self {
        value.map_or(RowValues::Null, Into::into)
    }
}

/// Statement category, decided from the first three letters of the trimmed SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementType {
    Select,
    /// INSERT, UPDATE, REPLACE, DELETE
    Update,
    Attach,
    Begin,
    /// COMMIT or END
    Commit,
    /// ROLLBACK
    Abort,
    Pragma,
    /// CREATE, DROP, ALTER
    Ddl,
    /// ANALYZE, DETACH
    Unprepared,
    Other,
}

impl StatementType {
    #[must_use]
    pub fn classify(sql: &str) -> Self {
        let trimmed = sql.trim();
        let Some(prefix) = trimmed.get(..3) else {
            return StatementType::Other;
        };
        match prefix.to_ascii_uppercase().as_str() {
            "SEL" => StatementType::Select,
            "INS" | "UPD" | "REP" | "DEL" => StatementType::Update,
            "ATT" => StatementType::Attach,
            "COM" | "END" => StatementType::Commit,
            "ROL" => StatementType::Abort,
            "BEG" => StatementType::Begin,
            "PRA" => StatementType::Pragma,
            "CRE" | "DRO" | "ALT" => StatementType::Ddl,
            "ANA" | "DET" => StatementType::Unprepared,
            _ => StatementType::Other,
        }
    }

    /// Statements that cannot be sent through a single-statement transaction.
    #[must_use]
    pub fn is_rejected_by_exec(self) -> bool {
        matches!(
            self,
            StatementType::Attach
                | StatementType::Begin
                | StatementType::Commit
                | StatementType::Abort
                | StatementType::Pragma
                | StatementType::Unprepared
        )
    }

    /// Transaction-control statements handled by the session itself.
    #[must_use]
    pub fn is_transaction_control(self) -> bool {
        matches!(
            self,
            StatementType::Begin | StatementType::Commit | StatementType::Abort
        )
    }
}

//! Bind and column values for the mapping layer.
//!
//! `Value` is the tagged representation of anything bound to or read from
//! the store; `ColumnType` is the declared storage type of a column and
//! carries the SQLite column type mapping.

use rusqlite::ToSql;
use rusqlite::types::{ToSqlOutput, ValueRef};

use crate::{StorageError, Timestamp};

/// A value that can be bound to a statement parameter or read from a column.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Blob(Vec<u8>),
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Timestamp(Timestamp),
    Null,
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Text(s.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Blob(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Blob(b.to_vec())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Real(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<Timestamp> for Value {
    fn from(ts: Timestamp) -> Self {
        Value::Timestamp(ts)
    }
}

impl From<&Timestamp> for Value {
    fn from(ts: &Timestamp) -> Self {
        Value::Timestamp(*ts)
    }
}

impl<V: Into<Value>> From<Option<V>> for Value {
    fn from(value: Option<V>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as Sql;

        Ok(match self {
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Value::Integer(n) => ToSqlOutput::Owned(Sql::Integer(*n)),
            Value::Real(f) => ToSqlOutput::Owned(Sql::Real(*f)),
            Value::Boolean(b) => ToSqlOutput::Owned(Sql::Integer(i64::from(*b))),
            Value::Timestamp(ts) => ToSqlOutput::Owned(Sql::Integer(ts.epoch_seconds())),
            Value::Null => ToSqlOutput::Owned(Sql::Null),
        })
    }
}

impl Value {
    /// Read a column cell into a `Value` according to its declared type.
    pub(crate) fn read(column_type: ColumnType, raw: ValueRef<'_>) -> Result<Self, StorageError> {
        Ok(match (column_type, raw) {
            (_, ValueRef::Null) => Value::Null,
            (ColumnType::Text, ValueRef::Text(t)) => Value::Text(
                std::str::from_utf8(t)
                    .map_err(|e| StorageError::Storage(format!("Invalid UTF-8 in text column: {e}")))?
                    .to_string(),
            ),
            (ColumnType::Blob, ValueRef::Blob(b)) => Value::Blob(b.to_vec()),
            (ColumnType::Integer, ValueRef::Integer(n)) => Value::Integer(n),
            (ColumnType::Real, ValueRef::Real(f)) => Value::Real(f),
            (ColumnType::Real, ValueRef::Integer(n)) => Value::Real(n as f64),
            (ColumnType::Boolean, ValueRef::Integer(n)) => Value::Boolean(n != 0),
            (ColumnType::Timestamp, ValueRef::Integer(n)) => {
                Value::Timestamp(Timestamp::from_epoch_seconds(n))
            }
            (expected, found) => {
                return Err(StorageError::Storage(format!(
                    "Column type mismatch: expected {expected:?}, found {found:?}"
                )));
            }
        })
    }
}

/// Declared storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Blob,
    Integer,
    Real,
    Boolean,
    Timestamp,
}

impl ColumnType {
    /// The SQLite column type this maps to. Booleans are stored as 0/1 in a
    /// SMALLINT column, timestamps as epoch seconds in an INTEGER column.
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Blob => "BLOB",
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Boolean => "SMALLINT",
            ColumnType::Timestamp => "INTEGER",
        }
    }
}

/// Typed extraction of a `Value` during row hydration.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, StorageError>;
}

fn mismatch<T>(expected: &str, found: &Value) -> Result<T, StorageError> {
    Err(StorageError::Storage(format!(
        "Value mismatch: expected {expected}, found {found:?}"
    )))
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, StorageError> {
        match value {
            Value::Text(s) => Ok(s),
            other => mismatch("text", &other),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self, StorageError> {
        match value {
            Value::Blob(b) => Ok(b),
            other => mismatch("blob", &other),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self, StorageError> {
        match value {
            Value::Integer(n) => Ok(n),
            other => mismatch("integer", &other),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self, StorageError> {
        match value {
            Value::Integer(n) => n
                .try_into()
                .map_err(|_| StorageError::Storage(format!("Integer {n} out of range for i32"))),
            other => mismatch("integer", &other),
        }
    }
}

impl FromValue for u32 {
    fn from_value(value: Value) -> Result<Self, StorageError> {
        match value {
            Value::Integer(n) => n
                .try_into()
                .map_err(|_| StorageError::Storage(format!("Integer {n} out of range for u32"))),
            other => mismatch("integer", &other),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, StorageError> {
        match value {
            Value::Real(f) => Ok(f),
            Value::Integer(n) => Ok(n as f64),
            other => mismatch("real", &other),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, StorageError> {
        match value {
            Value::Boolean(b) => Ok(b),
            other => mismatch("boolean", &other),
        }
    }
}

impl FromValue for Timestamp {
    fn from_value(value: Value) -> Result<Self, StorageError> {
        match value {
            Value::Timestamp(ts) => Ok(ts),
            other => mismatch("timestamp", &other),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, StorageError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_conversion() {
        assert_eq!(Value::from(None::<String>), Value::Null);
        assert_eq!(Value::from(Some(7i64)), Value::Integer(7));
    }

    #[test]
    fn boolean_binds_as_integer() {
        let out = Value::Boolean(true).to_sql().unwrap();
        assert_eq!(
            out,
            ToSqlOutput::Owned(rusqlite::types::Value::Integer(1))
        );
    }

    #[test]
    fn read_boolean_column() {
        let value = Value::read(ColumnType::Boolean, ValueRef::Integer(1)).unwrap();
        assert_eq!(value, Value::Boolean(true));
    }

    #[test]
    fn read_rejects_mismatched_cell() {
        let result = Value::read(ColumnType::Integer, ValueRef::Real(1.5));
        assert!(matches!(result, Err(StorageError::Storage(_))));
    }

    #[test]
    fn null_extracts_to_none() {
        let extracted: Option<i64> = FromValue::from_value(Value::Null).unwrap();
        assert_eq!(extracted, None);
    }
}

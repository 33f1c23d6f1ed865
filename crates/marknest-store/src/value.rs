//! Dialect-neutral SQL argument values and the Rust types that map onto them.

use sqlx::Row;
use sqlx::any::AnyRow;

use crate::error::StoreError;

/// Storage class of a column, used to type NULL arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Text,
    Bytes,
}

/// A single positional argument bound into a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL. The kind lets Postgres receive a correctly typed parameter.
    Null(ValueKind),
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// Whether the value equals its type's zero value (`omit_empty` test).
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Null(_) => true,
            Self::Bool(b) => !b,
            Self::Int(i) => *i == 0,
            Self::Float(f) => *f == 0.0,
            Self::Text(s) => s.is_empty(),
            Self::Bytes(b) => b.is_empty(),
        }
    }

    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Null(kind) => *kind,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Text(_) => ValueKind::Text,
            Self::Bytes(_) => ValueKind::Bytes,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Self::Text(v.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl<T: ColumnType + Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null(T::KIND), Into::into)
    }
}

/// A Rust field type that can live in a record column.
///
/// `decode` is where NULL handling happens: `String` reads through a
/// nullable intermediate so NULL becomes `""`; the other non-`Option` types
/// read directly and a NULL is a decode error.
pub trait ColumnType: Sized {
    const KIND: ValueKind;

    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> Result<Self, StoreError>;

    fn decode(row: &AnyRow, column: &str) -> Result<Self, sqlx::Error>;
}

fn mismatch(expected: ValueKind, got: &Value) -> StoreError {
    StoreError::InvalidInput(format!("expected {expected:?} value, got {got:?}"))
}

impl ColumnType for String {
    const KIND: ValueKind = ValueKind::Text;

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, StoreError> {
        match value {
            Value::Text(s) => Ok(s),
            Value::Null(_) => Ok(Self::new()),
            other => Err(mismatch(Self::KIND, &other)),
        }
    }

    fn decode(row: &AnyRow, column: &str) -> Result<Self, sqlx::Error> {
        Ok(row.try_get::<Option<Self>, _>(column)?.unwrap_or_default())
    }
}

impl ColumnType for i64 {
    const KIND: ValueKind = ValueKind::Int;

    fn to_value(&self) -> Value {
        Value::Int(*self)
    }

    fn from_value(value: Value) -> Result<Self, StoreError> {
        match value {
            Value::Int(i) => Ok(i),
            other => Err(mismatch(Self::KIND, &other)),
        }
    }

    fn decode(row: &AnyRow, column: &str) -> Result<Self, sqlx::Error> {
        row.try_get(column)
    }
}

impl ColumnType for bool {
    const KIND: ValueKind = ValueKind::Bool;

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(value: Value) -> Result<Self, StoreError> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::Int(i) => Ok(i != 0),
            other => Err(mismatch(Self::KIND, &other)),
        }
    }

    // SQLite flag columns are declared INTEGER 0/1.
    fn decode(row: &AnyRow, column: &str) -> Result<Self, sqlx::Error> {
        match row.try_get::<Self, _>(column) {
            Ok(b) => Ok(b),
            Err(sqlx::Error::ColumnDecode { .. }) => {
                row.try_get::<i64, _>(column).map(|i| i != 0)
            }
            Err(e) => Err(e),
        }
    }
}

impl ColumnType for f64 {
    const KIND: ValueKind = ValueKind::Float;

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    fn from_value(value: Value) -> Result<Self, StoreError> {
        match value {
            Value::Float(f) => Ok(f),
            other => Err(mismatch(Self::KIND, &other)),
        }
    }

    fn decode(row: &AnyRow, column: &str) -> Result<Self, sqlx::Error> {
        row.try_get(column)
    }
}

impl ColumnType for Vec<u8> {
    const KIND: ValueKind = ValueKind::Bytes;

    fn to_value(&self) -> Value {
        Value::Bytes(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, StoreError> {
        match value {
            Value::Bytes(b) => Ok(b),
            other => Err(mismatch(Self::KIND, &other)),
        }
    }

    fn decode(row: &AnyRow, column: &str) -> Result<Self, sqlx::Error> {
        row.try_get(column)
    }
}

impl ColumnType for Option<String> {
    const KIND: ValueKind = ValueKind::Text;

    fn to_value(&self) -> Value {
        self.as_ref()
            .map_or(Value::Null(Self::KIND), |s| Value::Text(s.clone()))
    }

    fn from_value(value: Value) -> Result<Self, StoreError> {
        match value {
            Value::Text(s) => Ok(Some(s)),
            Value::Null(_) => Ok(None),
            other => Err(mismatch(Self::KIND, &other)),
        }
    }

    fn decode(row: &AnyRow, column: &str) -> Result<Self, sqlx::Error> {
        row.try_get(column)
    }
}

impl ColumnType for Option<i64> {
    const KIND: ValueKind = ValueKind::Int;

    fn to_value(&self) -> Value {
        self.map_or(Value::Null(Self::KIND), Value::Int)
    }

    fn from_value(value: Value) -> Result<Self, StoreError> {
        match value {
            Value::Int(i) => Ok(Some(i)),
            Value::Null(_) => Ok(None),
            other => Err(mismatch(Self::KIND, &other)),
        }
    }

    fn decode(row: &AnyRow, column: &str) -> Result<Self, sqlx::Error> {
        row.try_get(column)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn zero_values() {
        assert!(Value::Null(ValueKind::Int).is_zero());
        assert!(Value::Int(0).is_zero());
        assert!(Value::Text(String::new()).is_zero());
        assert!(Value::Bool(false).is_zero());
        assert!(Value::Bytes(Vec::new()).is_zero());
        assert!(!Value::Int(3).is_zero());
        assert!(!Value::from("x").is_zero());
        assert!(!Value::Bool(true).is_zero());
    }

    #[test]
    fn option_none_becomes_typed_null() {
        assert_eq!(Value::from(None::<i64>), Value::Null(ValueKind::Int));
        assert_eq!(Value::from(None::<String>), Value::Null(ValueKind::Text));
        assert_eq!(Value::from(Some(4_i64)), Value::Int(4));
    }

    #[test]
    fn string_from_null_is_empty() {
        assert_eq!(String::from_value(Value::Null(ValueKind::Text)).unwrap(), "");
    }

    #[test]
    fn bool_accepts_integers() {
        assert!(bool::from_value(Value::Int(1)).unwrap());
        assert!(!bool::from_value(Value::Int(0)).unwrap());
    }

    #[test]
    fn mismatched_kind_is_invalid_input() {
        let err = i64::from_value(Value::from("seven")).unwrap_err();
        assert!(err.is_invalid_input());
    }
}

//! Column values and the dictionary-shaped entries built from them.

use std::collections::BTreeMap;

use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::error::{DatabaseError, Result};
use crate::schema::DataType;

/// Core value types for SQLite columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// A column-name to value mapping.
///
/// Ordered so that two conversions of the same row always produce the same
/// mapping.
pub type Entry = BTreeMap<String, Value>;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Reads a stored value back using the column's declared type.
    ///
    /// SQLite has no boolean storage class, so `Boolean` columns come back
    /// as integers and are mapped here.
    pub(crate) fn from_column(value: ValueRef<'_>, data_type: DataType) -> Result<Self> {
        Ok(match (value, data_type) {
            (ValueRef::Null, _) => Value::Null,
            (ValueRef::Integer(i), DataType::Boolean) => Value::Boolean(i != 0),
            (ValueRef::Integer(i), DataType::Real) => Value::Real(i as f64),
            (ValueRef::Integer(i), _) => Value::Integer(i),
            (ValueRef::Real(f), _) => Value::Real(f),
            (ValueRef::Text(t), _) => Value::Text(
                std::str::from_utf8(t)
                    .map_err(|e| DatabaseError::Conversion(format!("invalid utf-8 text: {e}")))?
                    .to_string(),
            ),
            (ValueRef::Blob(b), _) => Value::Blob(b.to_vec()),
        })
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Boolean(b) => ToSqlOutput::from(*b),
            Value::Integer(i) => ToSqlOutput::from(*i),
            Value::Real(f) => ToSqlOutput::from(*f),
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
            Value::Blob(b) => ToSqlOutput::from(b.as_slice()),
        })
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Builds an [`Entry`] from name/value pairs.
pub fn entry<I, K, V>(pairs: I) -> Entry
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Merges an optional base entry with overrides; overrides win.
pub fn merge_fields(entry: Option<&Entry>, overrides: Entry) -> Entry {
    let mut merged = entry.cloned().unwrap_or_default();
    merged.extend(overrides);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_fields_overrides_win() {
        let base = entry([("a", 1), ("b", 2)]);
        let merged = merge_fields(Some(&base), entry([("b", 3)]));
        assert_eq!(merged.get("a"), Some(&Value::Integer(1)));
        assert_eq!(merged.get("b"), Some(&Value::Integer(3)));
    }

    #[test]
    fn test_merge_fields_without_base() {
        let merged = merge_fields(None, entry([("name", "meta")]));
        assert_eq!(merged.len(), 1);
        assert_eq!(merged["name"].as_text(), Some("meta"));
    }

    #[test]
    fn test_boolean_column_reads_integer() {
        let value = Value::from_column(ValueRef::Integer(1), DataType::Boolean).unwrap();
        assert_eq!(value, Value::Boolean(true));
        let value = Value::from_column(ValueRef::Integer(0), DataType::Integer).unwrap();
        assert_eq!(value, Value::Integer(0));
    }

    #[test]
    fn test_invalid_utf8_is_conversion_error() {
        let err = Value::from_column(ValueRef::Text(&[0xff, 0xfe]), DataType::Text).unwrap_err();
        assert!(matches!(err, DatabaseError::Conversion(_)));
    }

    #[test]
    fn test_option_into_value() {
        let none: Option<i64> = None;
        assert!(Value::from(none).is_null());
        assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
    }
}

//! Row and Value types for QuarryDB
//!
//! A row is an ordered mapping from column name to a typed scalar. Stored
//! rows are keyed by bare column names; rows produced by a join carry
//! alias-prefixed keys (`alias.column`).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::catalog::DataType;

/// A value in the database
///
/// The derived ordering (`Null < Integer < Text`, then by content) is the
/// total order used by indexes and sorting. Predicates use [`Value::compare`],
/// which refuses to compare values of different types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Absent value; only produced by aggregates over an empty input
    Null,
    /// 64-bit integer (INT columns)
    Integer(i64),
    /// Text (TEXT columns)
    Text(String),
}

impl Value {
    /// Check if this value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to convert to i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to convert to string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Integer(_) => "INT",
            Value::Text(_) => "TEXT",
        }
    }

    /// Check whether this value may be stored in a column of `data_type`
    pub fn matches_type(&self, data_type: &DataType) -> bool {
        matches!(
            (self, data_type),
            (Value::Integer(_), DataType::Int) | (Value::Text(_), DataType::Text)
        )
    }

    /// Compare two values for predicate evaluation.
    ///
    /// Returns `None` for values of different types and whenever NULL is
    /// involved, so such comparisons never hold.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

/// A row: column name to value, in column order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(IndexMap<String, Value>);

impl Row {
    /// Create an empty row
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Builder-style insert
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(column.into(), value.into());
        self
    }

    /// Get a value by exact key
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    /// Set a value, returning the previous one
    pub fn insert(&mut self, column: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(column.into(), value)
    }

    pub fn contains_key(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    /// Column keys in order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }

    /// Values in column order
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.0.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_compare_same_type() {
        assert_eq!(
            Value::Integer(1).compare(&Value::Integer(2)),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::from("b").compare(&Value::from("a")),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn test_value_compare_mixed_types() {
        assert_eq!(Value::Integer(1).compare(&Value::from("1")), None);
        assert_eq!(Value::Null.compare(&Value::Null), None);
    }

    #[test]
    fn test_value_total_order() {
        let mut values = vec![
            Value::from("a"),
            Value::Integer(3),
            Value::Null,
            Value::Integer(-1),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Integer(-1),
                Value::Integer(3),
                Value::from("a")
            ]
        );
    }

    #[test]
    fn test_row_serializes_as_object() {
        let row = Row::new().with("name", "Bob").with("age", 21);
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"name":"Bob","age":21}"#);
    }

    #[test]
    fn test_row_preserves_order() {
        let row = Row::new().with("z", 1).with("a", 2);
        assert_eq!(row.keys().collect::<Vec<_>>(), vec!["z", "a"]);
    }
}

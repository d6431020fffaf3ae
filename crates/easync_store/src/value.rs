//! Column values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Column name to value.
pub type Values = BTreeMap<String, FieldValue>;

/// A single column value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Text string.
    Text(String),
    /// Byte string.
    Bytes(Vec<u8>),
    /// Row id produced by the insert at this index of the same batch.
    BackReference(usize),
}

impl FieldValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Get this value as a boolean. Integers are true when non-zero.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            FieldValue::Integer(n) => Some(*n != 0),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as text, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get the referenced batch index, if this is a back-reference.
    pub fn as_back_reference(&self) -> Option<usize> {
        match self {
            FieldValue::BackReference(i) => Some(*i),
            _ => None,
        }
    }

    /// Rough payload size, used by byte-bounded stores.
    pub fn estimated_size(&self) -> usize {
        match self {
            FieldValue::Null | FieldValue::Bool(_) => 1,
            FieldValue::Integer(_) | FieldValue::BackReference(_) => 8,
            FieldValue::Text(s) => s.len(),
            FieldValue::Bytes(b) => b.len(),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Integer(n)
    }
}

impl From<i32> for FieldValue {
    fn from(n: i32) -> Self {
        FieldValue::Integer(i64::from(n))
    }
}

impl From<u64> for FieldValue {
    fn from(n: u64) -> Self {
        FieldValue::Integer(i64::try_from(n).unwrap_or(i64::MAX))
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(b: Vec<u8>) -> Self {
        FieldValue::Bytes(b)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions() {
        assert_eq!(FieldValue::from(5i64), FieldValue::Integer(5));
        assert_eq!(FieldValue::from("x"), FieldValue::Text("x".into()));
        assert_eq!(FieldValue::from(None::<i64>), FieldValue::Null);
        assert_eq!(FieldValue::from(Some(true)), FieldValue::Bool(true));
    }

    #[test]
    fn accessors() {
        assert_eq!(FieldValue::Integer(0).as_bool(), Some(false));
        assert_eq!(FieldValue::Text("a".into()).as_integer(), None);
        assert_eq!(FieldValue::BackReference(2).as_back_reference(), Some(2));
        assert!(FieldValue::Null.is_null());
    }

    #[test]
    fn serde_shape() {
        let json = serde_json::to_string(&FieldValue::Text("hi".into())).unwrap();
        assert_eq!(json, r#"{"Text":"hi"}"#);
        let back: FieldValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, FieldValue::Text("hi".into()));
    }
}

//! Runtime values carried by rows, literals and parameters.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A runtime value.
///
/// Values have a total key order (see [`Value::key_cmp`]) used by indexes and
/// range sets, and a partial comparison (see [`Value::compare`]) used by
/// predicate evaluation. The two agree whenever the partial comparison is
/// defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit floating point.
    Float64(f64),
    /// UTF-8 string.
    String(String),
    /// Timestamp as microseconds since Unix epoch.
    Timestamp(i64),
}

/// Declared type of a header column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Bool,
    Int32,
    Int64,
    Float64,
    String,
    Timestamp,
}

/// Comparison class of a value.
///
/// Values of different classes are never comparable by predicates; in key
/// order they sort by class rank, with Null lowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypeClass {
    Null,
    Bool,
    Numeric,
    String,
    Timestamp,
}

impl ColumnType {
    /// Comparison class of values stored in this column.
    pub fn class(self) -> TypeClass {
        match self {
            ColumnType::Bool => TypeClass::Bool,
            ColumnType::Int32 | ColumnType::Int64 | ColumnType::Float64 => TypeClass::Numeric,
            ColumnType::String => TypeClass::String,
            ColumnType::Timestamp => TypeClass::Timestamp,
        }
    }
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(i) => Some(*i),
            Value::Int32(i) => Some(*i as i64),
            _ => None,
        }
    }

    /// Try to get as f64, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(f) => Some(*f),
            Value::Int32(i) => Some(*i as f64),
            Value::Int64(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Comparison class of this value.
    pub fn type_class(&self) -> TypeClass {
        match self {
            Value::Null => TypeClass::Null,
            Value::Bool(_) => TypeClass::Bool,
            Value::Int32(_) | Value::Int64(_) | Value::Float64(_) => TypeClass::Numeric,
            Value::String(_) => TypeClass::String,
            Value::Timestamp(_) => TypeClass::Timestamp,
        }
    }

    /// Whether a non-null value of this kind may be compared with a column
    /// of the given type.
    pub fn is_comparable_with(&self, ty: ColumnType) -> bool {
        !self.is_null() && self.type_class() == ty.class()
    }

    /// Total key order.
    ///
    /// Classes sort by rank (Null lowest). Within the numeric class integers
    /// compare exactly and anything involving a float compares by
    /// `f64::total_cmp`.
    pub fn key_cmp(&self, other: &Value) -> Ordering {
        let rank = self.type_class().cmp(&other.type_class());
        if rank != Ordering::Equal {
            return rank;
        }
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => {
                    let x = a.as_f64().unwrap_or(f64::NAN);
                    let y = b.as_f64().unwrap_or(f64::NAN);
                    x.total_cmp(&y)
                }
            },
        }
    }

    /// Predicate comparison: `None` when either side is null or the classes
    /// differ.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        if self.is_null() || other.is_null() || self.type_class() != other.type_class() {
            return None;
        }
        Some(self.key_cmp(other))
    }

    /// Equality under key order.
    pub fn key_eq(&self, other: &Value) -> bool {
        self.key_cmp(other) == Ordering::Equal
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int32(i) => write!(f, "{}", i),
            Value::Int64(i) => write!(f, "{}L", i),
            Value::Float64(v) => write!(f, "{:?}", v),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Timestamp(t) => write!(f, "@{}", t),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

/// Compare two rows column by column under key order.
pub fn rows_key_eq(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.key_eq(y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_sorts_lowest() {
        assert_eq!(Value::Null.key_cmp(&Value::Bool(false)), Ordering::Less);
        assert_eq!(Value::Null.key_cmp(&Value::Int32(i32::MIN)), Ordering::Less);
        assert_eq!(Value::Null.key_cmp(&Value::String(String::new())), Ordering::Less);
    }

    #[test]
    fn test_numeric_cross_width() {
        assert_eq!(Value::Int32(5).key_cmp(&Value::Int64(5)), Ordering::Equal);
        assert_eq!(Value::Int32(5).key_cmp(&Value::Float64(5.5)), Ordering::Less);
        assert_eq!(Value::Float64(7.0).compare(&Value::Int64(6)), Some(Ordering::Greater));
    }

    #[test]
    fn test_compare_rejects_null_and_mixed_classes() {
        assert_eq!(Value::Null.compare(&Value::Null), None);
        assert_eq!(Value::Int32(1).compare(&Value::String("1".into())), None);
        assert_eq!(Value::Bool(true).compare(&Value::Bool(false)), Some(Ordering::Greater));
    }

    #[test]
    fn test_comparable_with_column() {
        assert!(Value::Int64(3).is_comparable_with(ColumnType::Int32));
        assert!(Value::Float64(3.0).is_comparable_with(ColumnType::Int32));
        assert!(!Value::Null.is_comparable_with(ColumnType::Int32));
        assert!(!Value::String("a".into()).is_comparable_with(ColumnType::Timestamp));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::String("a".into()).to_string(), "\"a\"");
        assert_eq!(Value::Int32(4).to_string(), "4");
        assert_eq!(Value::Null.to_string(), "null");
    }
}

//! Typed cell values and semantic column types.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, SecondsFormat, Utc};

/// Semantic type of a column.
///
/// Ordered from the narrowest to the widest representation used when two
/// sources disagree on a same-named column (see [`ColumnType::widen`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ColumnType {
    Boolean,
    Integer,
    Float,
    /// Arbitrary-precision decimal (PostgreSQL `numeric`).
    Decimal,
    Timestamp,
    Text,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Boolean => "boolean",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Decimal => "decimal",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Text => "text",
        }
    }

    /// Whether the type is a plain number the binary codecs can pack.
    pub fn is_packable(&self) -> bool {
        matches!(
            self,
            ColumnType::Boolean | ColumnType::Integer | ColumnType::Float | ColumnType::Timestamp
        )
    }

    /// Widest common representation of two types.
    ///
    /// Booleans widen to integers, integers to floats, and any number to a
    /// decimal. Every other pairing (text, timestamps mixed with numbers)
    /// falls back to text.
    pub fn widen(self, other: ColumnType) -> ColumnType {
        use ColumnType::*;
        if self == other {
            return self;
        }
        match (self.min(other), self.max(other)) {
            (Boolean, Integer) => Integer,
            (Boolean | Integer, Float) => Float,
            (Boolean | Integer | Float, Decimal) => Decimal,
            _ => Text,
        }
    }
}

/// One cell of a Canonical Table.
///
/// Missing data is always the explicit [`Value::Null`] marker; no other
/// variant is ever used as a stand-in for "absent".
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Decimal(BigDecimal),
    Timestamp(DateTime<Utc>),
    Text(String),
}

impl Value {
    /// The value's type, or `None` for null.
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(ColumnType::Boolean),
            Value::Integer(_) => Some(ColumnType::Integer),
            Value::Float(_) => Some(ColumnType::Float),
            Value::Decimal(_) => Some(ColumnType::Decimal),
            Value::Timestamp(_) => Some(ColumnType::Timestamp),
            Value::Text(_) => Some(ColumnType::Text),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Converts the value to `target`, which must be at least as wide as the
    /// value's own type (as produced by [`ColumnType::widen`]).
    pub fn coerce_to(&self, target: ColumnType) -> Value {
        match (self, target) {
            (Value::Null, _) => Value::Null,
            (v, t) if v.column_type() == Some(t) => v.clone(),
            (Value::Boolean(b), ColumnType::Integer) => Value::Integer(i64::from(*b)),
            (Value::Boolean(b), ColumnType::Float) => Value::Float(if *b { 1.0 } else { 0.0 }),
            (Value::Boolean(b), ColumnType::Decimal) => Value::Decimal(BigDecimal::from(i64::from(*b))),
            (Value::Integer(i), ColumnType::Float) => Value::Float(*i as f64),
            (Value::Integer(i), ColumnType::Decimal) => Value::Decimal(BigDecimal::from(*i)),
            // NaN and infinities have no decimal form; they are missing values.
            (Value::Float(f), ColumnType::Decimal) => BigDecimal::from_str(&f.to_string())
                .map(Value::Decimal)
                .unwrap_or(Value::Null),
            (v, _) => Value::Text(v.to_string()),
        }
    }

    /// Numeric view used by the binary codecs.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Timestamp(ts) => Some(ts.timestamp_millis() as f64),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Integer(_) | Value::Float(_) | Value::Decimal(_) => 2,
            Value::Timestamp(_) => 3,
            Value::Text(_) => 4,
        }
    }

    /// Total order used for ordering keys.
    ///
    /// Nulls sort first; numbers compare numerically across integer, float
    /// and decimal; floats use IEEE total ordering; values of unrelated types
    /// are ordered by type.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Integer(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            (Value::Float(a), Value::Integer(b)) => a.total_cmp(&(*b as f64)),
            (Value::Decimal(a), Value::Decimal(b)) => a.cmp(b),
            (Value::Decimal(a), Value::Integer(b)) => a.cmp(&BigDecimal::from(*b)),
            (Value::Integer(a), Value::Decimal(b)) => BigDecimal::from(*a).cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for Value {
    /// Plain-text rendering shared by the CSV and spreadsheet sinks; null renders empty.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Timestamp(ts) => f.write_str(&format_timestamp(ts)),
            Value::Text(s) => f.write_str(s),
        }
    }
}

/// RFC 3339 UTC rendering with the shortest sub-second precision.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
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

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

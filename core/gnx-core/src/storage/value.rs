//! Value — in-memory representation of a single field value
//!
//! Every stored field decodes into exactly one [`Value`] variant. `Null` is only
//! an input convenience: it encodes as the field default and never comes back
//! out of the codec.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Record identifier: dense, assigned at insert time, never reused.
pub type RecordId = u64;

/// Typed field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int(i64),
    Double(f64),
    Bool(bool),
    /// POSIX seconds (UTC)
    DateTime(i64),
    String(String),
    /// Foreign key to another record, `None` = no parent
    Link(Option<RecordId>),
}

impl Value {
    /// LINK 필드 값 생성
    pub fn link(id: RecordId) -> Self {
        Value::Link(Some(id))
    }

    /// DATETIME 필드 값 생성 (초 단위 미만은 버림)
    pub fn datetime(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt.timestamp())
    }

    /// Short type label used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Int(_) => "INT",
            Value::Double(_) => "DOUBLE",
            Value::Bool(_) => "BOOL",
            Value::DateTime(_) => "DATETIME",
            Value::String(_) => "STRING",
            Value::Link(_) => "LINK",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) | Value::DateTime(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            Value::Int(v) | Value::DateTime(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_link(&self) -> Option<RecordId> {
        match self {
            Value::Link(id) => *id,
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::DateTime(secs) => DateTime::from_timestamp(*secs, 0),
            _ => None,
        }
    }

    /// Integer view used for LINK arithmetic and comparison (`None` → -1).
    fn link_key(id: &Option<RecordId>) -> i128 {
        id.map_or(-1, |v| v as i128)
    }

    /// Compare two values of compatible types.
    ///
    /// Numeric variants (INT, DOUBLE, DATETIME) compare across each other; other
    /// variants only compare with themselves. Returns `None` for incompatible
    /// pairs, which filter operators treat as "no match".
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        use Value::*;
        match (self, other) {
            (Null, Null) => Some(Ordering::Equal),
            (Int(a), Int(b)) | (DateTime(a), DateTime(b)) | (Int(a), DateTime(b)) | (DateTime(a), Int(b)) => {
                Some(a.cmp(b))
            }
            (Double(a), Double(b)) => a.partial_cmp(b),
            (Double(a), Int(b)) | (Double(a), DateTime(b)) => a.partial_cmp(&(*b as f64)),
            (Int(a), Double(b)) | (DateTime(a), Double(b)) => (*a as f64).partial_cmp(b),
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            (String(a), String(b)) => Some(a.as_str().cmp(b.as_str())),
            (Link(a), Link(b)) => Some(Self::link_key(a).cmp(&Self::link_key(b))),
            (Link(a), Int(b)) => Some(Self::link_key(a).cmp(&(*b as i128))),
            (Int(a), Link(b)) => Some((*a as i128).cmp(&Self::link_key(b))),
            _ => None,
        }
    }

    /// Total order used by ORDER BY: `Null` first, NaN after every other double.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::Double(a), Value::Double(b)) => a.total_cmp(b),
            _ => self.compare(other).unwrap_or(Ordering::Equal),
        }
    }
}

// ════════════════════════════════════════════
// Grouping key
// ════════════════════════════════════════════

/// Hashable wrapper used as GROUP BY key (doubles hash by bit pattern).
#[derive(Debug, Clone)]
pub(crate) struct GroupKey(pub Value);

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (a, b) => a == b,
        }
    }
}

impl Eq for GroupKey {}

impl Hash for GroupKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(&self.0).hash(state);
        match &self.0 {
            Value::Null => {}
            Value::Int(v) | Value::DateTime(v) => v.hash(state),
            Value::Double(v) => v.to_bits().hash(state),
            Value::Bool(v) => v.hash(state),
            Value::String(v) => v.hash(state),
            Value::Link(v) => v.hash(state),
        }
    }
}

// ════════════════════════════════════════════
// Conversions
// ════════════════════════════════════════════

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
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

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::datetime(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

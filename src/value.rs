//! Dynamically typed values and the record shapes that flow through shards.
//!
//! The join engine never knows key or value types at compile time. A dataset fixes one
//! concrete [`Value`] variant for its keys (and one for its values), but that choice is
//! only observable at runtime, which is why comparator selection in
//! [`comparator`](crate::comparator) inspects the first key a shard sees.
//!
//! Three row shapes exist:
//! - [`Record`]: an input `(key, value)` pair
//! - [`Joined`]: a merge-join output `(key, left?, right?)`
//! - [`Paired`]: a self-join output `(key, a, b)`

use ordered_float::OrderedFloat;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::{Display, Formatter, Result as FormatResult};
use std::hash::{Hash, Hasher};

/// A dynamically typed scalar.
///
/// Serialized untagged, so JSON `1` reads back as `Int64(1)`, `1.5` as `Float64(1.5)`
/// and `null` as `Null`.
///
/// Equality and hashing treat floats through a total order: `NaN == NaN` and
/// `-0.0 == 0.0`. This keeps `Hash` consistent with `Eq`, which the hash partitioner
/// depends on.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// Short, stable name of the variant. Used in error messages and logs.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int64(_) => "int64",
            Value::Float64(_) => "float64",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
        }
    }

    /// Whether this is the "no value" placeholder.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Position of the variant in the cross-type fallback order.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int64(_) => 2,
            Value::Float64(_) => 3,
            Value::String(_) => 4,
            Value::Bytes(_) => 5,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Float64(a), Value::Float64(b)) => OrderedFloat(*a) == OrderedFloat(*b),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int64(v) => v.hash(state),
            Value::Float64(v) => OrderedFloat(*v).hash(state),
            Value::String(s) => s.hash(state),
            Value::Bytes(b) => b.hash(state),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int64(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
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

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// One `(key, value)` element of an input dataset.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    pub key: Value,
    pub value: Value,
}

impl Record {
    pub fn new(key: impl Into<Value>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl<K: Into<Value>, V: Into<Value>> From<(K, V)> for Record {
    fn from((key, value): (K, V)) -> Self {
        Record::new(key, value)
    }
}

/// Output row of a two-sided merge join.
///
/// `left` is `None` only for right-outer rows and `right` is `None` only for
/// left-outer rows; an inner join never produces a `None`.
///
/// An absent side is left out of the serialized row, so `Some(Value::Null)` (written
/// as `null`) and `None` (not written) stay distinct.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Joined {
    pub key: Value,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub left: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub right: Option<Value>,
}

/// A side that appears in the input is present, even when its value is `null`.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl Joined {
    pub fn matched(key: impl Into<Value>, left: impl Into<Value>, right: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            left: Some(left.into()),
            right: Some(right.into()),
        }
    }

    pub fn left_only(key: impl Into<Value>, left: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            left: Some(left.into()),
            right: None,
        }
    }

    pub fn right_only(key: impl Into<Value>, right: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            left: None,
            right: Some(right.into()),
        }
    }
}

/// Output row of a self join: two values sharing one key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Paired {
    pub key: Value,
    pub a: Value,
    pub b: Value,
}

impl Paired {
    pub fn new(key: impl Into<Value>, a: impl Into<Value>, b: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            a: a.into(),
            b: b.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(v: &Value) -> u64 {
        let mut h = DefaultHasher::new();
        v.hash(&mut h);
        h.finish()
    }

    #[test]
    fn nan_is_equal_to_itself_and_hashes_stably() {
        let a = Value::Float64(f64::NAN);
        let b = Value::Float64(f64::NAN);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn variants_never_compare_equal_across_types() {
        assert_ne!(Value::Int64(1), Value::Float64(1.0));
        assert_ne!(Value::from("1"), Value::Int64(1));
    }

    #[test]
    fn untagged_json_round_trips_numbers_by_shape() -> anyhow::Result<()> {
        let parsed: Vec<Value> = serde_json::from_str(r#"[1, 1.5, "x", null, true]"#)?;
        assert_eq!(
            parsed,
            vec![
                Value::Int64(1),
                Value::Float64(1.5),
                Value::from("x"),
                Value::Null,
                Value::Bool(true),
            ]
        );
        Ok(())
    }

    #[test]
    fn joined_keeps_null_values_apart_from_absent_sides() -> anyhow::Result<()> {
        let rows = vec![
            Joined::matched(1, Value::Null, "x"),
            Joined::left_only(2, "a"),
            Joined::right_only(3, Value::Null),
        ];
        let text = serde_json::to_string(&rows)?;
        assert_eq!(
            text,
            r#"[{"key":1,"left":null,"right":"x"},{"key":2,"left":"a"},{"key":3,"right":null}]"#
        );
        let back: Vec<Joined> = serde_json::from_str(&text)?;
        assert_eq!(back, rows);
        Ok(())
    }

    #[test]
    fn option_none_becomes_null() {
        assert!(Value::from(None::<i64>).is_null());
        assert_eq!(Value::from(Some(3i64)), Value::Int64(3));
    }
}

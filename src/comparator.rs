//! Key ordering for sorted streams.
//!
//! A [`Comparator`] is a closed set of orderings: three defaults keyed on the dynamic
//! key type plus a caller-supplied [`Custom`](Comparator::Custom) function. Stages that
//! receive an explicit comparator use it unmodified. Stages without one pick a default
//! from the first key they observe (see [`Comparator::resolve`]).
//!
//! Resolution from a sample happens independently in every shard task. Two shards
//! of the same stage can therefore resolve different defaults if their inputs carry
//! different key types, so multi-shard jobs should pass an explicit comparator.
//!
//! ```
//! use ironmerge::{Comparator, Value};
//! use std::cmp::Ordering;
//!
//! let ints = Comparator::default_for(&Value::Int64(0)).unwrap();
//! assert_eq!(ints.compare(&Value::Int64(2), &Value::Int64(10)), Ordering::Less);
//!
//! let strings = Comparator::default_for(&Value::from("")).unwrap();
//! assert_eq!(strings.compare(&Value::from("10"), &Value::from("2")), Ordering::Less);
//! ```

use crate::error::JoinError;
use crate::value::Value;
use log::trace;
use ordered_float::OrderedFloat;
use std::cmp::Ordering;
use std::fmt::{Debug, Formatter, Result as FormatResult};
use std::sync::Arc;

/// Caller-supplied total order over two keys.
pub type CompareFn = Arc<dyn Fn(&Value, &Value) -> Ordering + Send + Sync>;

#[derive(Clone)]
pub enum Comparator {
    /// Numeric order over `Value::Int64`.
    Int64,
    /// Numeric order over `Value::Float64`; `NaN` sorts after every number.
    Float64,
    /// Lexical (byte-wise) order over `Value::String`.
    String,
    /// Explicit ordering. It must agree with the order the inputs were sorted in;
    /// this is never checked.
    Custom(CompareFn),
}

impl Comparator {
    /// Wrap a closure as a [`Comparator::Custom`].
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Value, &Value) -> Ordering + Send + Sync + 'static,
    {
        Comparator::Custom(Arc::new(f))
    }

    /// Default comparator for the dynamic type of `sample`.
    ///
    /// # Errors
    /// [`JoinError::UnsupportedKeyType`] unless `sample` is an `Int64`, `Float64`
    /// or `String`.
    pub fn default_for(sample: &Value) -> Result<Self, JoinError> {
        match sample {
            Value::Int64(_) => Ok(Comparator::Int64),
            Value::Float64(_) => Ok(Comparator::Float64),
            Value::String(_) => Ok(Comparator::String),
            other => Err(JoinError::UnsupportedKeyType {
                type_name: other.type_name(),
            }),
        }
    }

    /// Pick the comparator a shard task should use.
    ///
    /// `explicit` wins when present. Otherwise the default for `sample` (the first key
    /// seen on either input, left side first) is chosen. With no explicit comparator and
    /// no sample both inputs were empty, nothing will ever be compared, and `Ok(None)` is
    /// returned.
    ///
    /// # Errors
    /// [`JoinError::UnsupportedKeyType`] when defaulting from a key with no default.
    pub fn resolve(
        explicit: Option<&Comparator>,
        sample: Option<&Value>,
    ) -> Result<Option<Comparator>, JoinError> {
        if let Some(c) = explicit {
            return Ok(Some(c.clone()));
        }
        let Some(sample) = sample else {
            return Ok(None);
        };
        let resolved = Comparator::default_for(sample)?;
        trace!("resolved {resolved:?} comparator from a {} key", sample.type_name());
        Ok(Some(resolved))
    }

    /// Order two keys.
    ///
    /// A default comparator handed a key of another type falls back to
    /// [`natural_order`]. Such streams break the single-key-type precondition, so
    /// the result is deterministic but carries no meaning.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        match (self, a, b) {
            (Comparator::Int64, Value::Int64(x), Value::Int64(y)) => x.cmp(y),
            (Comparator::Float64, Value::Float64(x), Value::Float64(y)) => {
                OrderedFloat(*x).cmp(&OrderedFloat(*y))
            }
            (Comparator::String, Value::String(x), Value::String(y)) => x.cmp(y),
            (Comparator::Custom(f), _, _) => f(a, b),
            _ => natural_order(a, b),
        }
    }

    pub fn is_equal(&self, a: &Value, b: &Value) -> bool {
        self.compare(a, b) == Ordering::Equal
    }

    pub fn name(&self) -> &'static str {
        match self {
            Comparator::Int64 => "int64",
            Comparator::Float64 => "float64",
            Comparator::String => "string",
            Comparator::Custom(_) => "custom",
        }
    }
}

impl Debug for Comparator {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        write!(f, "Comparator::{}", self.name())
    }
}

/// Total order across every [`Value`]: first by variant, then within the variant.
pub fn natural_order(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Int64(x), Value::Int64(y)) => x.cmp(y),
        (Value::Float64(x), Value::Float64(y)) => OrderedFloat(*x).cmp(&OrderedFloat(*y)),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bytes(x), Value::Bytes(y)) => x.cmp(y),
        _ => a.rank().cmp(&b.rank()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_comparator_is_used_unmodified() -> anyhow::Result<()> {
        let reversed = Comparator::custom(|a, b| natural_order(b, a));
        let got = Comparator::resolve(Some(&reversed), Some(&Value::Bool(true)))?
            .expect("explicit comparator");
        assert_eq!(got.name(), "custom");
        assert_eq!(
            got.compare(&Value::Int64(1), &Value::Int64(2)),
            Ordering::Greater
        );
        Ok(())
    }

    #[test]
    fn defaults_follow_the_sample_type() -> anyhow::Result<()> {
        let c = Comparator::resolve(None, Some(&Value::Float64(0.5)))?;
        assert_eq!(c.map(|c| c.name()), Some("float64"));
        let c = Comparator::resolve(None, Some(&Value::from("k")))?;
        assert_eq!(c.map(|c| c.name()), Some("string"));
        Ok(())
    }

    #[test]
    fn no_sample_and_no_explicit_needs_nothing() -> anyhow::Result<()> {
        assert!(Comparator::resolve(None, None)?.is_none());
        Ok(())
    }

    #[test]
    fn unsupported_sample_is_a_typed_error() {
        let err = Comparator::resolve(None, Some(&Value::Bool(false))).unwrap_err();
        assert_eq!(err, JoinError::UnsupportedKeyType { type_name: "bool" });
        let err = Comparator::default_for(&Value::Bytes(vec![1])).unwrap_err();
        assert_eq!(err, JoinError::UnsupportedKeyType { type_name: "bytes" });
    }

    #[test]
    fn int64_orders_numerically_without_overflow() {
        let c = Comparator::Int64;
        assert_eq!(c.compare(&Value::Int64(2), &Value::Int64(10)), Ordering::Less);
        assert_eq!(
            c.compare(&Value::Int64(i64::MIN), &Value::Int64(i64::MAX)),
            Ordering::Less
        );
    }

    #[test]
    fn string_orders_lexically() {
        let c = Comparator::String;
        assert_eq!(
            c.compare(&Value::from("10"), &Value::from("2")),
            Ordering::Less
        );
    }

    #[test]
    fn float_nan_sorts_last_and_equals_itself() {
        let c = Comparator::Float64;
        let nan = Value::Float64(f64::NAN);
        assert_eq!(c.compare(&Value::Float64(1e300), &nan), Ordering::Less);
        assert!(c.is_equal(&nan, &nan));
    }
}

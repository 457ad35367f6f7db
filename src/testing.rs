//! Testing utilities for join pipelines.
//!
//! - [`TestPipeline`]: a [`Pipeline`] with graph introspection
//! - [`records`]: build keyed input from `(key, value)` tuples
//! - [`collect_both_modes`]: run sequentially and in parallel, assert identical shards
//! - Assertions: [`assert_collections_equal`], [`assert_collections_unordered_equal`],
//!   [`assert_keys_ascending`]
//!
//! ```no_run
//! use ironmerge::*;
//! use ironmerge::testing::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let p = TestPipeline::new();
//! let left = from_vec(&p, records(&[(1, "a"), (2, "b")]), Some(2));
//! let right = from_vec(&p, records(&[(1, "x")]), Some(3));
//! let out = collect_both_modes(&left.join(&right))?;
//! assert_collections_equal(&out, &[Joined::matched(1, "a", "x")]);
//! # Ok(())
//! # }
//! ```

use crate::comparator::Comparator;
use crate::dataset::{Dataset, Element};
use crate::runner::ExecMode;
use crate::value::{Record, Value};
use crate::Pipeline;
use anyhow::Result;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;

/// A test-focused wrapper around [`Pipeline`].
///
/// ```
/// use ironmerge::testing::{TestPipeline, records};
/// use ironmerge::from_vec;
///
/// let p = TestPipeline::new();
/// let _data = from_vec(&p, records(&[(1, "a")]), Some(1));
/// assert_eq!(p.stage_count(), 1);
/// ```
#[derive(Clone, Default)]
pub struct TestPipeline {
    pipeline: Pipeline,
}

impl TestPipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all registered stages, sorted.
    #[must_use]
    pub fn stage_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .pipeline
            .snapshot()
            .into_values()
            .map(|s| s.name)
            .collect();
        names.sort();
        names
    }
}

// Allow TestPipeline to be used wherever Pipeline is expected
impl std::ops::Deref for TestPipeline {
    type Target = Pipeline;

    fn deref(&self) -> &Self::Target {
        &self.pipeline
    }
}

impl AsRef<Pipeline> for TestPipeline {
    fn as_ref(&self) -> &Pipeline {
        &self.pipeline
    }
}

/// Build records from `(key, value)` tuples.
pub fn records<K, V>(rows: &[(K, V)]) -> Vec<Record>
where
    K: Clone + Into<Value>,
    V: Clone + Into<Value>,
{
    rows.iter()
        .map(|(k, v)| Record::new(k.clone(), v.clone()))
        .collect()
}

/// Run `ds` in both execution modes, assert they agree shard for shard, and return the
/// flattened output.
///
/// # Panics
/// Panics if the two runs produce different shards.
///
/// # Errors
/// The first failure of either run.
pub fn collect_both_modes<T>(ds: &Dataset<T>) -> Result<Vec<T>>
where
    T: Element + Debug + PartialEq,
{
    let seq = ds.collect_shards(ExecMode::Sequential)?;
    let par = ds.collect_shards(ExecMode::Parallel { capacity: Some(2) })?;
    assert_eq!(seq, par, "sequential and parallel runs disagree");
    Ok(seq.into_iter().flatten().collect())
}

/// Assert that two collections are equal in order and content.
///
/// # Panics
///
/// Panics if the collections differ in length or content.
pub fn assert_collections_equal<T: Debug + PartialEq>(actual: &[T], expected: &[T]) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "Collection length mismatch:\n  Expected length: {}\n  Actual length: {}\n  Expected: {expected:?}\n  Actual: {actual:?}",
        expected.len(),
        actual.len()
    );

    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        assert_eq!(
            a, e,
            "Collection mismatch at index {i}:\n  Expected: {e:?}\n  Actual: {a:?}\n  Full expected: {expected:?}\n  Full actual: {actual:?}"
        );
    }
}

/// Assert that two collections contain the same elements with the same multiplicity,
/// ignoring order.
///
/// # Panics
///
/// Panics if the collections differ in content (ignoring order).
pub fn assert_collections_unordered_equal<T: Debug + Eq + Hash + Clone>(actual: &[T], expected: &[T]) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "Collection length mismatch:\n  Expected length: {}\n  Actual length: {}\n  Expected: {expected:?}\n  Actual: {actual:?}",
        expected.len(),
        actual.len()
    );

    let mut remaining: Vec<T> = expected.to_vec();
    let mut extra = Vec::new();
    for a in actual {
        match remaining.iter().position(|e| e == a) {
            Some(i) => {
                remaining.swap_remove(i);
            }
            None => extra.push(a.clone()),
        }
    }
    let missing: HashSet<_> = remaining.iter().collect();
    assert!(
        extra.is_empty() && missing.is_empty(),
        "Collection content mismatch:\n  Missing elements: {missing:?}\n  Extra elements: {extra:?}\n  Expected: {expected:?}\n  Actual: {actual:?}"
    );
}

/// Assert that `key_of` yields non-decreasing keys under `comparator`.
///
/// # Panics
///
/// Panics at the first descending pair.
pub fn assert_keys_ascending<T: Debug>(rows: &[T], comparator: &Comparator, key_of: impl Fn(&T) -> &Value) {
    for (i, pair) in rows.windows(2).enumerate() {
        assert!(
            comparator.compare(key_of(&pair[0]), key_of(&pair[1])) != Ordering::Greater,
            "Keys descend at index {i}:\n  {:?}\n  {:?}",
            pair[0],
            pair[1]
        );
    }
}

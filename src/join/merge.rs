//! Two-input sort-merge join.
//!
//! [`MergeJoin`] is the per-shard engine: a state machine over two sorted record
//! streams and one [`Cursor`] per side. Each [`step`](MergeJoin::step) does one of:
//!
//! | left cursor | right cursor | action                                                |
//! |-------------|--------------|-------------------------------------------------------|
//! | holding `l` | holding `r`  | `l < r`: left-outer row, advance left                 |
//! |             |              | `l > r`: right-outer row, advance right               |
//! |             |              | `l == r`: extract both key groups, emit their product |
//! | holding     | empty        | drain one left record (left-outer row or discard)     |
//! | empty       | holding      | drain one right record (right-outer row or discard)   |
//! | empty       | empty        | done                                                  |
//!
//! Output is ascending by key; rows of a matched group are ordered by left input order,
//! then right input order.

use super::JoinOptions;
use super::group::{Cursor, extract_group};
use crate::comparator::{Comparator, natural_order};
use crate::dataset::Dataset;
use crate::stage::{InputEdge, TaskFn};
use crate::task::Task;
use crate::value::{Joined, Record};
use anyhow::Result;
use log::debug;
use std::cmp::Ordering;
use std::sync::Arc;

/// Counters for one shard's merge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Keys present on both sides.
    pub matched_groups: usize,
    /// Left records with no partner (emitted only for left-outer joins).
    pub left_unmatched: usize,
    /// Right records with no partner (emitted only for right-outer joins).
    pub right_unmatched: usize,
    /// Rows handed to the sink.
    pub emitted: usize,
}

/// What the next step does, holding the records it consumes.
enum Step {
    Match(Record, Record),
    LeftOnly(Record),
    RightOnly(Record),
    Done,
}

/// Merge-join state for one shard.
pub struct MergeJoin<L, R> {
    left: L,
    right: R,
    left_cursor: Cursor,
    right_cursor: Cursor,
    comparator: Comparator,
    left_outer: bool,
    right_outer: bool,
    stats: MergeStats,
}

impl<L, R> MergeJoin<L, R>
where
    L: Iterator<Item = Record>,
    R: Iterator<Item = Record>,
{
    /// Fetch the first record of each side and resolve the comparator.
    ///
    /// # Errors
    /// [`JoinError::UnsupportedKeyType`](crate::JoinError) when no comparator is
    /// configured and the first key (left side first) has no default.
    pub fn new(
        left: impl IntoIterator<IntoIter = L>,
        right: impl IntoIterator<IntoIter = R>,
        options: &JoinOptions,
    ) -> Result<Self> {
        let mut left = left.into_iter();
        let mut right = right.into_iter();
        let left_cursor = Cursor::fetch(&mut left);
        let right_cursor = Cursor::fetch(&mut right);
        let sample = left_cursor.key().or(right_cursor.key());
        // no comparator resolved means both sides are empty and nothing is compared
        let comparator = Comparator::resolve(options.comparator.as_ref(), sample)?
            .unwrap_or_else(|| Comparator::custom(natural_order));
        Ok(Self {
            left,
            right,
            left_cursor,
            right_cursor,
            comparator,
            left_outer: options.left_outer,
            right_outer: options.right_outer,
            stats: MergeStats::default(),
        })
    }

    pub fn cursors(&self) -> (&Cursor, &Cursor) {
        (&self.left_cursor, &self.right_cursor)
    }

    pub fn stats(&self) -> MergeStats {
        self.stats
    }

    /// Take the records the next step consumes; the other cursor keeps its record.
    fn next_step(&mut self) -> Step {
        match (self.left_cursor.take(), self.right_cursor.take()) {
            (Some(l), Some(r)) => match self.comparator.compare(&l.key, &r.key) {
                Ordering::Equal => Step::Match(l, r),
                Ordering::Less => {
                    self.right_cursor = Cursor::Holding(r);
                    Step::LeftOnly(l)
                }
                Ordering::Greater => {
                    self.left_cursor = Cursor::Holding(l);
                    Step::RightOnly(r)
                }
            },
            (Some(l), None) => Step::LeftOnly(l),
            (None, Some(r)) => Step::RightOnly(r),
            (None, None) => Step::Done,
        }
    }

    /// Advance the state machine once, handing any produced rows to `emit`.
    ///
    /// Returns `false` once both sides are exhausted.
    ///
    /// # Errors
    /// Whatever `emit` returns.
    pub fn step<E>(&mut self, emit: &mut E) -> Result<bool>
    where
        E: FnMut(Joined) -> Result<()>,
    {
        match self.next_step() {
            Step::Match(l, r) => {
                let (lg, left_next) = extract_group(&mut self.left, &self.comparator, l);
                let (rg, right_next) = extract_group(&mut self.right, &self.comparator, r);
                self.left_cursor = left_next;
                self.right_cursor = right_next;
                self.stats.matched_groups += 1;
                for a in &lg.values {
                    for b in &rg.values {
                        emit(Joined {
                            key: lg.key.clone(),
                            left: Some(a.clone()),
                            right: Some(b.clone()),
                        })?;
                        self.stats.emitted += 1;
                    }
                }
            }
            Step::LeftOnly(l) => {
                self.stats.left_unmatched += 1;
                self.left_cursor = Cursor::fetch(&mut self.left);
                if self.left_outer {
                    emit(Joined {
                        key: l.key,
                        left: Some(l.value),
                        right: None,
                    })?;
                    self.stats.emitted += 1;
                }
            }
            Step::RightOnly(r) => {
                self.stats.right_unmatched += 1;
                self.right_cursor = Cursor::fetch(&mut self.right);
                if self.right_outer {
                    emit(Joined {
                        key: r.key,
                        left: None,
                        right: Some(r.value),
                    })?;
                    self.stats.emitted += 1;
                }
            }
            Step::Done => return Ok(false),
        }
        Ok(true)
    }

    /// Step until both sides are exhausted.
    ///
    /// # Errors
    /// Whatever `emit` returns; the join stops at the first failure.
    pub fn run<E>(mut self, mut emit: E) -> Result<MergeStats>
    where
        E: FnMut(Joined) -> Result<()>,
    {
        while self.step(&mut emit)? {}
        Ok(self.stats)
    }
}

/// Merge two sorted record streams into `emit`.
///
/// # Errors
/// Comparator resolution failures and whatever `emit` returns.
pub fn merge_join<L, R, E>(left: L, right: R, options: &JoinOptions, emit: E) -> Result<MergeStats>
where
    L: IntoIterator<Item = Record>,
    R: IntoIterator<Item = Record>,
    E: FnMut(Joined) -> Result<()>,
{
    MergeJoin::new(left, right, options)?.run(emit)
}

impl Dataset<Record> {
    /// Join with `other`, both already partitioned by key into the same number of shards
    /// and sorted by key within every shard.
    ///
    /// Neither precondition is checked: unsorted or mis-partitioned inputs silently give
    /// wrong matches. The result has `self`'s shard count; a different shard count on
    /// `other` fails the run with [`JoinError::ShardMismatch`](crate::JoinError).
    #[must_use]
    pub fn join_hashed_sorted(&self, other: &Dataset<Record>, options: JoinOptions) -> Dataset<Joined> {
        let function: TaskFn = Arc::new(move |mut task: Task| -> Result<()> {
            let left = task.take_input::<Record>(0)?;
            let right = task.take_input::<Record>(1)?;
            let mut out = task.take_output::<Joined>()?;
            let stats = merge_join(left, right, &options, |row| Ok(out.send(row)?))?;
            debug!(
                "JoinHashedSorted shard {}: {} matched key(s), {} left-only, {} right-only, {} row(s) out",
                task.shard(),
                stats.matched_groups,
                stats.left_unmatched,
                stats.right_unmatched,
                stats.emitted
            );
            Ok(())
        });
        Dataset::register(
            &self.pipeline,
            "JoinHashedSorted",
            self.shards,
            vec![InputEdge::shard(self.id), InputEdge::shard(other.id)],
            function,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JoinError;
    use crate::value::Value;

    fn recs(rows: &[(i64, &str)]) -> Vec<Record> {
        rows.iter().map(|(k, v)| Record::new(*k, *v)).collect()
    }

    fn run(left: &[(i64, &str)], right: &[(i64, &str)], options: JoinOptions) -> Result<Vec<Joined>> {
        let mut out = Vec::new();
        merge_join(recs(left), recs(right), &options, |row| {
            out.push(row);
            Ok(())
        })?;
        Ok(out)
    }

    #[test]
    fn inner_join_emits_group_product_in_input_order() -> Result<()> {
        let out = run(
            &[(1, "a"), (1, "b"), (2, "c")],
            &[(1, "x"), (1, "y"), (2, "z")],
            JoinOptions::inner(),
        )?;
        assert_eq!(
            out,
            vec![
                Joined::matched(1, "a", "x"),
                Joined::matched(1, "a", "y"),
                Joined::matched(1, "b", "x"),
                Joined::matched(1, "b", "y"),
                Joined::matched(2, "c", "z"),
            ]
        );
        Ok(())
    }

    #[test]
    fn matched_rows_carry_the_group_key_not_the_lookahead() -> Result<()> {
        let out = run(&[(1, "a"), (5, "b")], &[(1, "x"), (9, "y")], JoinOptions::inner())?;
        assert_eq!(out, vec![Joined::matched(1, "a", "x")]);
        Ok(())
    }

    #[test]
    fn outer_rows_interleave_in_key_order() -> Result<()> {
        let out = run(
            &[(1, "a"), (3, "c"), (5, "e")],
            &[(2, "B"), (3, "C"), (6, "F")],
            JoinOptions::full(),
        )?;
        assert_eq!(
            out,
            vec![
                Joined::left_only(1, "a"),
                Joined::right_only(2, "B"),
                Joined::matched(3, "c", "C"),
                Joined::left_only(5, "e"),
                Joined::right_only(6, "F"),
            ]
        );
        Ok(())
    }

    #[test]
    fn drain_discards_without_outer_flag() -> Result<()> {
        let out = run(&[(1, "a"), (7, "b"), (8, "c")], &[(1, "x")], JoinOptions::right())?;
        assert_eq!(out, vec![Joined::matched(1, "a", "x")]);
        Ok(())
    }

    #[test]
    fn state_machine_drains_one_record_per_step() -> Result<()> {
        let left = recs(&[(4, "a"), (5, "b")]);
        let mut join = MergeJoin::new(left, Vec::<Record>::new(), &JoinOptions::left())?;
        let mut out = Vec::new();
        let mut sink = |row: Joined| -> Result<()> {
            out.push(row);
            Ok(())
        };
        assert!(matches!(join.cursors(), (Cursor::Holding(_), Cursor::Empty)));
        assert!(join.step(&mut sink)?);
        assert_eq!(join.cursors().0.key(), Some(&Value::Int64(5)));
        assert!(join.step(&mut sink)?);
        assert!(join.cursors().0.is_empty());
        assert!(!join.step(&mut sink)?);
        assert_eq!(join.stats().left_unmatched, 2);
        drop(sink);
        assert_eq!(out, vec![Joined::left_only(4, "a"), Joined::left_only(5, "b")]);
        Ok(())
    }

    #[test]
    fn unmatched_step_keeps_the_other_cursor() -> Result<()> {
        let mut join = MergeJoin::new(recs(&[(3, "c")]), recs(&[(1, "x"), (3, "z")]), &JoinOptions::right())?;
        let mut out = Vec::new();
        let mut sink = |row: Joined| -> Result<()> {
            out.push(row);
            Ok(())
        };
        assert!(join.step(&mut sink)?);
        assert_eq!(join.cursors().0.key(), Some(&Value::Int64(3)));
        assert_eq!(join.cursors().1.key(), Some(&Value::Int64(3)));
        assert!(join.step(&mut sink)?);
        assert!(join.cursors().0.is_empty() && join.cursors().1.is_empty());
        assert!(!join.step(&mut sink)?);
        drop(sink);
        assert_eq!(out, vec![Joined::right_only(1, "x"), Joined::matched(3, "c", "z")]);
        Ok(())
    }

    #[test]
    fn both_empty_needs_no_comparator() -> Result<()> {
        let empty: Vec<Record> = Vec::new();
        let stats = merge_join(empty.clone(), empty, &JoinOptions::full(), |_| Ok(()))?;
        assert_eq!(stats, MergeStats::default());
        Ok(())
    }

    #[test]
    fn unsupported_key_fails_even_if_only_one_side_has_rows() {
        let left = vec![Record::new(true, "a")];
        let err = merge_join(left, Vec::<Record>::new(), &JoinOptions::left(), |_| Ok(())).unwrap_err();
        assert_eq!(
            err.downcast_ref::<JoinError>(),
            Some(&JoinError::UnsupportedKeyType { type_name: "bool" })
        );
    }

    #[test]
    fn right_sample_is_used_when_left_is_empty() -> Result<()> {
        let right = vec![Record::new("k", 1i64)];
        let mut out = Vec::new();
        merge_join(Vec::<Record>::new(), right, &JoinOptions::right(), |row| {
            out.push(row);
            Ok(())
        })?;
        assert_eq!(out, vec![Joined::right_only("k", 1i64)]);
        Ok(())
    }

    #[test]
    fn sink_errors_stop_the_join() {
        let mut calls = 0;
        let res = merge_join(
            recs(&[(1, "a"), (1, "b")]),
            recs(&[(1, "x")]),
            &JoinOptions::inner(),
            |_| {
                calls += 1;
                Err(JoinError::Disconnected {
                    stage: "sink".into(),
                    shard: 0,
                }
                .into())
            },
        );
        assert!(res.is_err());
        assert_eq!(calls, 1);
    }
}

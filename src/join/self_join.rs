//! Single-input grouped cartesian join.

use super::group::{Cursor, extract_group};
use crate::comparator::Comparator;
use crate::dataset::Dataset;
use crate::stage::{InputEdge, TaskFn};
use crate::task::Task;
use crate::value::{Paired, Record};
use anyhow::Result;
use log::debug;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SelfJoinStats {
    pub groups: usize,
    pub emitted: usize,
    /// Pairs dropped because one side was `Value::Null`.
    pub suppressed: usize,
}

/// Pair every value of each key group with every value of the same group, `(a, a)`
/// included, in input order.
///
/// Pairs where either value is `Value::Null` are skipped. A key group always holds at
/// least one real record, so this only triggers when callers store `Null` values.
///
/// # Errors
/// Comparator resolution failures and whatever `emit` returns.
pub fn self_join<I, E>(input: I, comparator: Option<&Comparator>, mut emit: E) -> Result<SelfJoinStats>
where
    I: IntoIterator<Item = Record>,
    E: FnMut(Paired) -> Result<()>,
{
    let mut input = input.into_iter();
    let mut cursor = Cursor::fetch(&mut input);
    let mut stats = SelfJoinStats::default();
    let Some(comparator) = Comparator::resolve(comparator, cursor.key())? else {
        return Ok(stats);
    };
    while let Some(first) = cursor.take() {
        let (group, next) = extract_group(&mut input, &comparator, first);
        stats.groups += 1;
        for a in &group.values {
            for b in &group.values {
                if a.is_null() || b.is_null() {
                    stats.suppressed += 1;
                    continue;
                }
                emit(Paired {
                    key: group.key.clone(),
                    a: a.clone(),
                    b: b.clone(),
                })?;
                stats.emitted += 1;
            }
        }
        cursor = next;
    }
    Ok(stats)
}

impl Dataset<Record> {
    /// Self join over a dataset already sorted by key within each shard.
    #[must_use]
    pub fn self_join(&self, comparator: Option<Comparator>) -> Dataset<Paired> {
        let function: TaskFn = Arc::new(move |mut task: Task| -> Result<()> {
            let input = task.take_input::<Record>(0)?;
            let mut out = task.take_output::<Paired>()?;
            let stats = self_join(input, comparator.as_ref(), |row| Ok(out.send(row)?))?;
            debug!(
                "SelfJoin shard {}: {} group(s), {} pair(s) out, {} suppressed",
                task.shard(),
                stats.groups,
                stats.emitted,
                stats.suppressed
            );
            Ok(())
        });
        Dataset::register(
            &self.pipeline,
            "SelfJoin",
            self.shards,
            vec![InputEdge::shard(self.id)],
            function,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JoinError;
    use crate::value::Value;

    fn collect(input: Vec<Record>, comparator: Option<&Comparator>) -> Result<Vec<Paired>> {
        let mut out = Vec::new();
        self_join(input, comparator, |row| {
            out.push(row);
            Ok(())
        })?;
        Ok(out)
    }

    #[test]
    fn pairs_stay_inside_their_group() -> Result<()> {
        let input = vec![Record::new(1, "a"), Record::new(1, "b"), Record::new(2, "c")];
        assert_eq!(
            collect(input, None)?,
            vec![
                Paired::new(1, "a", "a"),
                Paired::new(1, "a", "b"),
                Paired::new(1, "b", "a"),
                Paired::new(1, "b", "b"),
                Paired::new(2, "c", "c"),
            ]
        );
        Ok(())
    }

    #[test]
    fn null_values_are_suppressed() -> Result<()> {
        let input = vec![Record::new("k", Value::Null), Record::new("k", 1i64)];
        let mut out = Vec::new();
        let stats = self_join(input, None, |row| {
            out.push(row);
            Ok(())
        })?;
        assert_eq!(out, vec![Paired::new("k", 1i64, 1i64)]);
        assert_eq!(stats.suppressed, 3);
        Ok(())
    }

    #[test]
    fn empty_input_emits_nothing() -> Result<()> {
        assert!(collect(Vec::new(), None)?.is_empty());
        Ok(())
    }

    #[test]
    fn unsupported_key_without_comparator_fails() {
        let err = collect(vec![Record::new(Value::Bytes(vec![0]), 1i64)], None).unwrap_err();
        assert_eq!(
            err.downcast_ref::<JoinError>(),
            Some(&JoinError::UnsupportedKeyType { type_name: "bytes" })
        );
    }

    #[test]
    fn explicit_comparator_allows_any_key_type() -> Result<()> {
        let by_bool = Comparator::custom(crate::comparator::natural_order);
        let input = vec![Record::new(false, 1i64), Record::new(true, 2i64)];
        let out = collect(input, Some(&by_bool))?;
        assert_eq!(out, vec![Paired::new(false, 1i64, 1i64), Paired::new(true, 2i64, 2i64)]);
        Ok(())
    }
}

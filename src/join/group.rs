//! Key-group extraction over a sorted record stream.
//!
//! Both join engines keep exactly one fetched-but-unconsumed record per input: the
//! [`Cursor`]. Deciding what to do next only ever needs the held key, and extracting a
//! group hands back the first record past the group as the new cursor.

use crate::comparator::Comparator;
use crate::value::{Record, Value};

/// Lookahead for one side of a join.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Cursor {
    /// The stream is exhausted.
    Empty,
    /// The next record, already pulled from the stream but not yet consumed.
    Holding(Record),
}

impl Cursor {
    /// Pull the next record from `input` into a cursor.
    pub fn fetch<I: Iterator<Item = Record>>(input: &mut I) -> Self {
        input.next().map_or(Cursor::Empty, Cursor::Holding)
    }

    pub fn key(&self) -> Option<&Value> {
        match self {
            Cursor::Holding(r) => Some(&r.key),
            Cursor::Empty => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cursor::Empty)
    }

    /// Consume the held record, leaving the cursor empty.
    pub fn take(&mut self) -> Option<Record> {
        match std::mem::replace(self, Cursor::Empty) {
            Cursor::Holding(r) => Some(r),
            Cursor::Empty => None,
        }
    }
}

/// A maximal run of consecutive equal-key records, keyed by its first record's key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyGroup {
    pub key: Value,
    pub values: Vec<Value>,
}

/// Collect the group that starts at `first`.
///
/// Records are pulled from `input` while `comparator` reports them equal to
/// `first.key`. Returns the group and the cursor holding the first record past the
/// group boundary (or [`Cursor::Empty`] at end of stream).
pub fn extract_group<I>(input: &mut I, comparator: &Comparator, first: Record) -> (KeyGroup, Cursor)
where
    I: Iterator<Item = Record>,
{
    let Record { key, value } = first;
    let mut values = vec![value];
    loop {
        match input.next() {
            Some(next) if comparator.is_equal(&key, &next.key) => values.push(next.value),
            Some(next) => return (KeyGroup { key, values }, Cursor::Holding(next)),
            None => return (KeyGroup { key, values }, Cursor::Empty),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(rows: &[(i64, &str)]) -> Vec<Record> {
        rows.iter().map(|(k, v)| Record::new(*k, *v)).collect()
    }

    #[test]
    fn group_stops_at_the_first_different_key() {
        let mut input = records(&[(1, "b"), (1, "c"), (2, "d"), (2, "e")]).into_iter();
        let (group, next) = extract_group(&mut input, &Comparator::Int64, Record::new(1, "a"));
        assert_eq!(group.key, Value::Int64(1));
        assert_eq!(
            group.values,
            vec![Value::from("a"), Value::from("b"), Value::from("c")]
        );
        assert_eq!(next, Cursor::Holding(Record::new(2, "d")));
        // the record after the lookahead is still in the stream
        assert_eq!(input.next(), Some(Record::new(2, "e")));
    }

    #[test]
    fn group_at_end_of_stream_leaves_cursor_empty() {
        let mut input = records(&[(7, "y")]).into_iter();
        let (group, next) = extract_group(&mut input, &Comparator::Int64, Record::new(7, "x"));
        assert_eq!(group.values.len(), 2);
        assert!(next.is_empty());
    }

    #[test]
    fn singleton_group() {
        let mut input = std::iter::empty();
        let (group, next) = extract_group(&mut input, &Comparator::Int64, Record::new(3, "z"));
        assert_eq!(group.values, vec![Value::from("z")]);
        assert_eq!(next, Cursor::Empty);
    }

    #[test]
    fn custom_comparator_decides_group_membership() {
        // groups keys by their tens digit
        let by_tens = Comparator::custom(|a, b| {
            let (a, b) = (a.as_i64().unwrap_or(0), b.as_i64().unwrap_or(0));
            (a / 10).cmp(&(b / 10))
        });
        let mut input = records(&[(15, "b"), (19, "c"), (20, "d")]).into_iter();
        let (group, next) = extract_group(&mut input, &by_tens, Record::new(11, "a"));
        assert_eq!(group.key, Value::Int64(11));
        assert_eq!(group.values.len(), 3);
        assert_eq!(next.key(), Some(&Value::Int64(20)));
    }

    #[test]
    fn cursor_take_empties_it() {
        let mut input = records(&[(1, "a")]).into_iter();
        let mut c = Cursor::fetch(&mut input);
        assert_eq!(c.key(), Some(&Value::Int64(1)));
        assert_eq!(c.take(), Some(Record::new(1, "a")));
        assert!(c.is_empty());
        assert!(Cursor::fetch(&mut input).is_empty());
    }
}

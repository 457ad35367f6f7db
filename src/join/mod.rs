//! Sort-merge joins over sharded, keyed datasets.
//!
//! Two layers are exposed:
//!
//! 1. **Orchestrated joins** make no assumptions about their inputs. They re-partition
//!    both sides into `self`'s shard count with the same key hash, sort every shard by
//!    key, and then run the engine:
//!    - [`Dataset::join`] - inner join; joining a dataset with itself runs the self join
//!    - [`Dataset::join_inner`], [`Dataset::join_left`], [`Dataset::join_right`],
//!      [`Dataset::join_full`] - explicit variants
//!    - [`Dataset::join_with`] - any [`JoinOptions`]
//! 2. **Engines on prepared inputs** trust the caller that every key sits in the same
//!    shard index on both sides and that shards are sorted by the comparator in use:
//!    - [`Dataset::join_hashed_sorted`] - two-input merge join ([`merge`])
//!    - [`Dataset::self_join`] - one-input grouped product ([`self_join`])
//!
//! Each shard runs as its own task; nothing is shared across shards. Without an
//! explicit comparator every shard resolves its own default from its first key, so
//! pass one when keys could differ in type between shards.
//!
//! ## Example
//! ```no_run
//! use ironmerge::*;
//! use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let p = Pipeline::default();
//! let users = from_vec(&p, vec![Record::new(1, "ann"), Record::new(2, "bob")], Some(4));
//! let orders = from_vec(&p, vec![Record::new(1, "book"), Record::new(3, "lamp")], Some(2));
//!
//! let inner = users.join(&orders).collect_par(None)?;
//! assert_eq!(inner, vec![Joined::matched(1, "ann", "book")]);
//!
//! let full = users.join_full(&orders).collect_seq()?;
//! assert_eq!(full.len(), 3);
//! # Ok(()) }
//! ```

pub mod group;
pub mod merge;
pub mod self_join;

use crate::comparator::Comparator;
use crate::dataset::Dataset;
use crate::value::{Joined, Paired, Record};

/// Comparator and outer-join flags for a merge join.
#[derive(Clone, Debug, Default)]
pub struct JoinOptions {
    /// Key ordering; `None` picks a default per shard from the first key seen.
    pub comparator: Option<Comparator>,
    /// Keep left records without a right partner, paired with `None`.
    pub left_outer: bool,
    /// Keep right records without a left partner, paired with `None`.
    pub right_outer: bool,
}

impl JoinOptions {
    pub fn inner() -> Self {
        Self::default()
    }

    pub fn left() -> Self {
        Self {
            left_outer: true,
            ..Self::default()
        }
    }

    pub fn right() -> Self {
        Self {
            right_outer: true,
            ..Self::default()
        }
    }

    pub fn full() -> Self {
        Self {
            left_outer: true,
            right_outer: true,
            comparator: None,
        }
    }

    #[must_use]
    pub fn with_comparator(mut self, comparator: Comparator) -> Self {
        self.comparator = Some(comparator);
        self
    }
}

impl From<Paired> for Joined {
    fn from(p: Paired) -> Self {
        Joined {
            key: p.key,
            left: Some(p.a),
            right: Some(p.b),
        }
    }
}

impl Dataset<Record> {
    /// Partition into `self`'s shard count and sort each shard by key.
    fn prepared(&self, shards: usize, comparator: Option<Comparator>) -> Dataset<Record> {
        self.partition(shards).local_sort(comparator)
    }

    /// Inner join with `other`, assuming nothing about either input.
    ///
    /// When `other` is this very dataset the self join runs instead (one partition and
    /// sort instead of two); its `(key, a, b)` rows come back as fully matched
    /// [`Joined`] rows.
    #[must_use]
    pub fn join(&self, other: &Dataset<Record>) -> Dataset<Joined> {
        if self.same_as(other) {
            return self
                .prepared(self.shards, None)
                .self_join(None)
                .map(|p: &Paired| Joined::from(p.clone()));
        }
        self.join_with(other, JoinOptions::inner())
    }

    /// Partition and sort both sides, then merge them with `options`.
    ///
    /// The comparator in `options`, if any, also drives the local sorts, so sort and
    /// merge always agree.
    #[must_use]
    pub fn join_with(&self, other: &Dataset<Record>, options: JoinOptions) -> Dataset<Joined> {
        let left = self.prepared(self.shards, options.comparator.clone());
        let right = other.prepared(self.shards, options.comparator.clone());
        left.join_hashed_sorted(&right, options)
    }

    #[must_use]
    pub fn join_inner(&self, other: &Dataset<Record>) -> Dataset<Joined> {
        self.join_with(other, JoinOptions::inner())
    }

    #[must_use]
    pub fn join_left(&self, other: &Dataset<Record>) -> Dataset<Joined> {
        self.join_with(other, JoinOptions::left())
    }

    #[must_use]
    pub fn join_right(&self, other: &Dataset<Record>) -> Dataset<Joined> {
        self.join_with(other, JoinOptions::right())
    }

    #[must_use]
    pub fn join_full(&self, other: &Dataset<Record>) -> Dataset<Joined> {
        self.join_with(other, JoinOptions::full())
    }
}

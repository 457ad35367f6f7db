//! Re-sharding and per-shard sorting of keyed datasets.
//!
//! The sort-merge joins need both inputs hash-partitioned the same way and sorted by key
//! inside every shard. These two stages establish that:
//!
//! - [`Dataset::partition`] routes each record to shard `shard_for(key, n)`. The
//!   function depends only on the key and `n`, so equal keys from different datasets
//!   land on the same shard index. Each destination shard buffers what it receives and
//!   emits it grouped by upstream shard, lowest first, so its order is the same in
//!   every run.
//! - [`Dataset::local_sort`] buffers a shard, sorts it by key (stable, so equal keys
//!   keep their arrival order), and emits it.

use crate::comparator::Comparator;
use crate::dataset::Dataset;
use crate::stage::{InputEdge, Router, TaskFn, Wiring};
use crate::task::Task;
use crate::value::{Record, Value};
use anyhow::Result;
use log::trace;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Shard index in `0..shards` for `key`.
///
/// Uses a fixed-key SipHash, so the result is identical for equal keys across every
/// dataset of a process.
pub fn shard_for(key: &Value, shards: usize) -> usize {
    let mut h = DefaultHasher::new();
    key.hash(&mut h);
    (h.finish() % shards.max(1) as u64) as usize
}

impl Dataset<Record> {
    /// Re-shard into `shards` shards (at least one) by key hash.
    ///
    /// A destination shard holds the records of upstream shard 0 first, then those of
    /// shard 1, and so on, each in its upstream order. The whole shard is buffered
    /// before the first record goes out.
    #[must_use]
    pub fn partition(&self, shards: usize) -> Dataset<Record> {
        let shards = shards.max(1);
        let router: Router<Record> = Arc::new(|r: &Record, n| shard_for(&r.key, n));
        let function: TaskFn = Arc::new(|mut task: Task| -> Result<()> {
            let mut input = task.take_input::<Record>(0)?;
            let mut out = task.take_output::<Record>()?;
            let mut by_origin: Vec<Vec<Record>> = (0..input.upstreams()).map(|_| Vec::new()).collect();
            while let Some((origin, r)) = input.next_tagged() {
                by_origin[origin].push(r);
            }
            for r in by_origin.into_iter().flatten() {
                out.send(r)?;
            }
            Ok(())
        });
        Dataset::register(
            &self.pipeline,
            "Partition",
            shards,
            vec![InputEdge {
                from: self.id,
                wiring: Wiring::exchange(router),
            }],
            function,
        )
    }

    /// Sort every shard ascending by key.
    ///
    /// Without an explicit comparator each shard picks the default for its first key.
    /// Shards fail with [`JoinError::UnsupportedKeyType`](crate::JoinError) when that
    /// key has no default.
    #[must_use]
    pub fn local_sort(&self, comparator: Option<Comparator>) -> Dataset<Record> {
        let function: TaskFn = Arc::new(move |mut task: Task| -> Result<()> {
            let mut rows: Vec<Record> = task.take_input::<Record>(0)?.collect();
            let mut out = task.take_output::<Record>()?;
            let resolved = Comparator::resolve(comparator.as_ref(), rows.first().map(|r| &r.key))?;
            if let Some(c) = resolved {
                rows.sort_by(|a, b| c.compare(&a.key, &b.key));
                trace!(
                    "shard {} sorted {} record(s) with {c:?}",
                    task.shard(),
                    rows.len()
                );
            }
            for r in rows {
                out.send(r)?;
            }
            Ok(())
        });
        Dataset::register(
            &self.pipeline,
            "LocalSort",
            self.shards,
            vec![InputEdge::shard(self.id)],
            function,
        )
    }
}

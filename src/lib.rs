//! # Ironmerge
//!
//! A **sort-merge join stage** for a small sharded dataflow engine. Datasets are
//! immutable, sharded collections of keyed [`Record`]s; joins pair up records that share
//! a key by streaming key-sorted, co-partitioned shards side by side.
//!
//! ## Key Features
//!
//! - **Inner and outer merge joins** - inner, left, right, and full outer
//! - **Self joins** - the grouped cartesian product of a dataset with itself
//! - **Comparator resolution** - built-in orderings for integer, float, and string keys,
//!   or any custom ordering
//! - **Per-shard tasks** - every shard runs independently, connected by bounded queues
//! - **Sequential and parallel execution** - same per-shard output in both modes
//! - **JSON Lines I/O** - optional via the `io-jsonl` feature (on by default)
//!
//! ## Quick Start
//!
//! ```no_run
//! use ironmerge::*;
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let p = Pipeline::default();
//!
//! let users = from_vec(&p, vec![
//!     Record::new(1, "Alice"),
//!     Record::new(2, "Bob"),
//! ], None);
//!
//! let scores = from_vec(&p, vec![
//!     Record::new(1, 95),
//!     Record::new(2, 87),
//!     Record::new(3, 92), // no matching user
//! ], None);
//!
//! let joined = users.join_left(&scores).collect_par(None)?;
//! assert_eq!(joined.len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Pipeline
//!
//! A [`Pipeline`] holds the stage graph. Every [`Dataset`] is produced by exactly one
//! registered stage; building datasets is lazy and nothing runs until a `collect_*`
//! method is called.
//!
//! ### Joins
//!
//! - [`join`](Dataset::join) - inner join; a dataset joined with itself runs the self join
//! - [`join_left`](Dataset::join_left), [`join_right`](Dataset::join_right),
//!   [`join_full`](Dataset::join_full) - outer variants
//! - [`join_hashed_sorted`](Dataset::join_hashed_sorted) - the merge engine alone, for
//!   inputs already co-partitioned and sorted
//! - [`self_join`](Dataset::self_join) - the self-join engine alone
//!
//! ### Execution Modes
//!
//! - **Sequential** - [`collect_seq()`](Dataset::collect_seq) - stage after stage on one thread
//! - **Parallel** - [`collect_par()`](Dataset::collect_par) - every shard task on its own
//!   thread of a rayon pool
//!
//! ## Module Overview
//!
//! - [`comparator`] - key orderings and default resolution
//! - [`join`] - merge join, self join, and the orchestrated join methods
//! - [`partition`] - hash re-sharding and per-shard sorting
//! - [`dataset`] - the `Dataset` handle, sources, and element-wise stages
//! - [`runner`] - wiring and execution of a stage graph
//! - [`io`] - JSON Lines reading and writing
//! - [`testing`] - helpers for pipeline tests

pub mod comparator;
pub mod dataset;
pub mod error;
pub mod io;
pub mod join;
pub mod partition;
pub mod pipeline;
pub mod runner;
pub mod stage;
pub mod stage_id;
pub mod task;
pub mod testing;
pub mod type_token;
pub mod value;

// General re-exports
pub use comparator::{Comparator, natural_order};
pub use dataset::{Dataset, Element, default_shards, from_shards, from_vec};
pub use error::JoinError;
pub use join::JoinOptions;
pub use join::group::{Cursor, KeyGroup, extract_group};
pub use join::merge::{MergeJoin, MergeStats, merge_join};
pub use join::self_join::{SelfJoinStats, self_join};
pub use partition::shard_for;
pub use pipeline::Pipeline;
pub use runner::{DEFAULT_CAPACITY, ExecMode, Runner};
pub use stage::StageInfo;
pub use stage_id::StageId;
pub use value::{Joined, Paired, Record, Value};

// Gated re-exports
#[cfg(feature = "io-jsonl")]
pub use io::jsonl::{JsonlReader, JsonlWriter, read_jsonl, read_jsonl_vec, write_jsonl_vec};

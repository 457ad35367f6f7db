//! Typed errors raised by the join stages and the runner.
//!
//! Most plumbing in the engine returns `anyhow::Result`; the variants here are the
//! failures a caller may want to match on. Recover them with
//! `err.downcast_ref::<JoinError>()`.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JoinError {
    /// No comparator was supplied and the first observed key has no default ordering.
    #[error("no default comparator for key type '{type_name}'; supply an explicit comparator")]
    UnsupportedKeyType { type_name: &'static str },

    /// A downstream queue was closed while this task was still writing to it.
    #[error("stage '{stage}' shard {shard}: downstream closed its input")]
    Disconnected { stage: String, shard: usize },

    /// A port was opened with an element type other than the one its stage declared.
    #[error("port type mismatch: expected {expected}, found {found}")]
    PortType {
        expected: &'static str,
        found: &'static str,
    },

    /// Shard-aligned inputs disagree on their shard count.
    #[error("shard count mismatch: {left} vs {right}")]
    ShardMismatch { left: usize, right: usize },

    /// A dataset or partitioning request asked for zero shards.
    #[error("a dataset needs at least one shard")]
    ZeroShards,

    /// The terminal dataset (or one of its inputs) is not registered in the pipeline.
    #[error("stage {0} is not registered in this pipeline")]
    MissingStage(u64),
}

impl JoinError {
    /// Whether the error is a side effect of another task failing first.
    #[must_use]
    pub fn is_secondary(&self) -> bool {
        matches!(self, JoinError::Disconnected { .. })
    }
}

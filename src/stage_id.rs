//! Lightweight unique identifier for stages within a [`Pipeline`](crate::pipeline::Pipeline).
//!
//! Every dataset is the output of exactly one stage, so a `StageId` doubles as the
//! dataset's identity. Ids come from a process-wide counter: a stage registered in one
//! pipeline can never be mistaken for a stage of another.

use std::fmt::{Display, Formatter, Result as FormatResult};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_STAGE: AtomicU64 = AtomicU64::new(0);

/// Unique numeric identifier for a stage in a pipeline graph.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct StageId(u64);

impl StageId {
    pub(crate) fn fresh() -> Self {
        Self(NEXT_STAGE.fetch_add(1, Ordering::Relaxed))
    }

    /// Return the underlying numeric value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Display for StageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        write!(f, "#{}", self.0)
    }
}

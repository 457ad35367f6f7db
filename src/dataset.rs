use crate::error::JoinError;
use crate::pipeline::Pipeline;
use crate::runner::{ExecMode, Runner};
use crate::stage::{InputEdge, Stage, StageInfo, TaskFn};
use crate::stage_id::StageId;
use crate::task::Task;
use crate::type_token::port_ops_for;
use anyhow::Result;
use serde::{Serialize, de::DeserializeOwned};
use std::marker::PhantomData;
use std::sync::Arc;

/// Bound for anything that can flow through a shard queue.
pub trait Element: 'static + Send + Sync + Clone + Serialize + DeserializeOwned {}
impl<T> Element for T where T: 'static + Send + Sync + Clone + Serialize + DeserializeOwned {}

/// Immutable, sharded collection of `T` produced by one stage of a [`Pipeline`].
///
/// Handles are cheap to clone; two clones refer to the same dataset instance.
/// Nothing executes until one of the `collect_*` methods runs the pipeline.
pub struct Dataset<T> {
    pub(crate) pipeline: Pipeline,
    pub(crate) id: StageId,
    pub(crate) shards: usize,
    _t: PhantomData<fn() -> T>,
}

impl<T> Clone for Dataset<T> {
    fn clone(&self) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
            id: self.id,
            shards: self.shards,
            _t: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Dataset<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("id", &self.id)
            .field("shards", &self.shards)
            .finish_non_exhaustive()
    }
}

/// Default shard count for sources created without an explicit one.
pub fn default_shards() -> usize {
    2 * num_cpus::get().max(1)
}

/// Create a dataset from an in-memory vector, split into contiguous shards.
///
/// `shards` defaults to [`default_shards`]. The dataset always has exactly that many
/// shards; trailing shards are empty when there are fewer elements than shards.
pub fn from_vec<T: Element>(p: &Pipeline, data: Vec<T>, shards: Option<usize>) -> Dataset<T> {
    let n = shards.unwrap_or_else(default_shards).max(1);
    let chunk = data.len().div_ceil(n).max(1);
    let mut parts: Vec<Vec<T>> = data.chunks(chunk).map(<[T]>::to_vec).collect();
    parts.resize_with(n, Vec::new);
    source(p, "FromVec", parts)
}

/// Create a dataset whose shard `i` is exactly `shards[i]`, in order.
///
/// # Errors
/// [`JoinError::ZeroShards`] if `shards` is empty.
pub fn from_shards<T: Element>(p: &Pipeline, shards: Vec<Vec<T>>) -> Result<Dataset<T>> {
    if shards.is_empty() {
        return Err(JoinError::ZeroShards.into());
    }
    Ok(source(p, "FromShards", shards))
}

pub(crate) fn source<T: Element>(p: &Pipeline, name: &str, parts: Vec<Vec<T>>) -> Dataset<T> {
    let shards = parts.len();
    let parts = Arc::new(parts);
    let function: TaskFn = Arc::new(move |mut task: Task| -> Result<()> {
        let mut out = task.take_output::<T>()?;
        for item in parts.get(task.shard()).into_iter().flatten() {
            out.send(item.clone())?;
        }
        Ok(())
    });
    Dataset::register(p, name, shards, Vec::new(), function)
}

impl<T: Element> Dataset<T> {
    /// Register a stage producing `T` and return its dataset.
    pub(crate) fn register(
        p: &Pipeline,
        name: &str,
        shards: usize,
        inputs: Vec<InputEdge>,
        function: TaskFn,
    ) -> Self {
        let id = p.register(Stage {
            name: name.to_string(),
            shards,
            inputs,
            ports: port_ops_for::<T>(),
            function,
        });
        Dataset {
            pipeline: p.clone(),
            id,
            shards,
            _t: PhantomData,
        }
    }

    pub fn id(&self) -> StageId {
        self.id
    }

    pub fn shard_count(&self) -> usize {
        self.shards
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Descriptor of the stage that produces this dataset.
    ///
    /// # Errors
    /// Only if the pipeline lost the stage, which cannot happen through the public API.
    pub fn stage(&self) -> Result<StageInfo> {
        Ok(self.pipeline.describe(self.id)?)
    }

    /// Whether `other` is the same dataset instance (not merely equal contents).
    pub fn same_as<U>(&self, other: &Dataset<U>) -> bool {
        self.id == other.id && self.pipeline.same_as(&other.pipeline)
    }

    /// Transform each element, shard by shard, preserving order.
    #[must_use]
    pub fn map<O, F>(&self, f: F) -> Dataset<O>
    where
        O: Element,
        F: 'static + Send + Sync + Fn(&T) -> O,
    {
        let function: TaskFn = Arc::new(move |mut task: Task| -> Result<()> {
            let input = task.take_input::<T>(0)?;
            let mut out = task.take_output::<O>()?;
            for item in input {
                out.send(f(&item))?;
            }
            Ok(())
        });
        Dataset::register(
            &self.pipeline,
            "Map",
            self.shards,
            vec![InputEdge::shard(self.id)],
            function,
        )
    }

    /// Keep the elements matching `pred`, shard by shard, preserving order.
    #[must_use]
    pub fn filter<P>(&self, pred: P) -> Dataset<T>
    where
        P: 'static + Send + Sync + Fn(&T) -> bool,
    {
        let function: TaskFn = Arc::new(move |mut task: Task| -> Result<()> {
            let input = task.take_input::<T>(0)?;
            let mut out = task.take_output::<T>()?;
            for item in input.filter(|t| pred(t)) {
                out.send(item)?;
            }
            Ok(())
        });
        Dataset::register(
            &self.pipeline,
            "Filter",
            self.shards,
            vec![InputEdge::shard(self.id)],
            function,
        )
    }

    /// Run the pipeline and return every shard's output, in shard order.
    ///
    /// # Errors
    /// The first task failure of the run (see [`Runner`]).
    pub fn collect_shards(&self, mode: ExecMode) -> Result<Vec<Vec<T>>> {
        let r = Runner {
            mode,
            ..Default::default()
        };
        r.run_shards::<T>(&self.pipeline, self.id)
    }

    /// Run single-threaded, stage after stage, and flatten shards in order.
    ///
    /// # Errors
    /// The first task failure of the run.
    pub fn collect_seq(&self) -> Result<Vec<T>> {
        Ok(self
            .collect_shards(ExecMode::Sequential)?
            .into_iter()
            .flatten()
            .collect())
    }

    /// Run every shard task concurrently over bounded queues and flatten shards in order.
    ///
    /// `capacity` bounds every queue (default 1024 elements).
    ///
    /// # Errors
    /// The first task failure of the run.
    pub fn collect_par(&self, capacity: Option<usize>) -> Result<Vec<T>> {
        Ok(self
            .collect_shards(ExecMode::Parallel { capacity })?
            .into_iter()
            .flatten()
            .collect())
    }
}

use crate::stage_id::StageId;
use crate::task::Task;
use crate::type_token::PortOps;
use std::any::Any;
use std::sync::Arc;

/// Per-shard body of a stage. Receives the shard's endpoints by value; dropping the
/// task (on any exit path) closes its outputs.
pub type TaskFn = Arc<dyn Fn(Task) -> anyhow::Result<()> + Send + Sync>;

/// Chooses the destination shard (`< shards`) for an element crossing an exchange.
pub type Router<T> = Arc<dyn Fn(&T, usize) -> usize + Send + Sync>;

/// How a stage's shards read one upstream dataset.
#[derive(Clone)]
pub enum Wiring {
    /// Shard `i` reads upstream shard `i`. Both sides must have the same shard count.
    Shard,
    /// Every upstream shard routes each element to one downstream shard; shard `j`
    /// gathers from all upstream shards. Holds a [`Router<T>`] for the upstream
    /// element type, erased.
    Exchange(Arc<dyn Any + Send + Sync>),
}

impl Wiring {
    pub fn exchange<T: 'static>(router: Router<T>) -> Self {
        Wiring::Exchange(Arc::new(router))
    }
}

#[derive(Clone)]
pub struct InputEdge {
    pub from: StageId,
    pub wiring: Wiring,
}

impl InputEdge {
    pub fn shard(from: StageId) -> Self {
        Self {
            from,
            wiring: Wiring::Shard,
        }
    }
}

/// A registered unit of the pipeline graph, executed once per shard.
#[derive(Clone)]
pub struct Stage {
    pub name: String,
    pub shards: usize,
    pub inputs: Vec<InputEdge>,
    /// Queue factory for this stage's output element type.
    pub ports: Arc<dyn PortOps>,
    pub function: TaskFn,
}

/// Read-only description of a registered stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageInfo {
    pub id: StageId,
    pub name: String,
    pub shards: usize,
    pub inputs: Vec<StageId>,
    pub output_type: &'static str,
}

impl Stage {
    pub(crate) fn info(&self, id: StageId) -> StageInfo {
        StageInfo {
            id,
            name: self.name.clone(),
            shards: self.shards,
            inputs: self.inputs.iter().map(|e| e.from).collect(),
            output_type: self.ports.elem_tag().name,
        }
    }
}

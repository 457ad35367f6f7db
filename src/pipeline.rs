use crate::error::JoinError;
use crate::stage::{Stage, StageInfo};
use crate::stage_id::StageId;
use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// -------- Pipeline + stages --------
/// Shared context every dataset registers its producing stage against. Cloning is
/// cheap and yields a handle to the same graph.
pub struct Pipeline {
    pub(crate) inner: Arc<Mutex<PipelineInner>>,
}

pub struct PipelineInner {
    pub stages: HashMap<StageId, Stage>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(PipelineInner {
                stages: HashMap::new(),
            })),
        }
    }
}

/// Allow `Pipeline` cloning.
impl Clone for Pipeline {
    fn clone(&self) -> Self {
        Pipeline {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Pipeline {
    pub(crate) fn register(&self, stage: Stage) -> StageId {
        let id = StageId::fresh();
        debug!(
            "registered stage {id} '{}' ({} shards, inputs {:?})",
            stage.name,
            stage.shards,
            stage.inputs.iter().map(|e| e.from.raw()).collect::<Vec<_>>()
        );
        self.inner.lock().stages.insert(id, stage);
        id
    }

    /// Copy of the stage table, so a run does not hold the lock.
    pub(crate) fn snapshot(&self) -> HashMap<StageId, Stage> {
        self.inner.lock().stages.clone()
    }

    /// Describe a registered stage.
    ///
    /// # Errors
    /// [`JoinError::MissingStage`] if `id` was registered in another pipeline.
    pub fn describe(&self, id: StageId) -> Result<StageInfo, JoinError> {
        self.inner
            .lock()
            .stages
            .get(&id)
            .map(|s| s.info(id))
            .ok_or(JoinError::MissingStage(id.raw()))
    }

    pub fn stage_count(&self) -> usize {
        self.inner.lock().stages.len()
    }

    /// Whether both handles refer to the same graph.
    pub fn same_as(&self, other: &Pipeline) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

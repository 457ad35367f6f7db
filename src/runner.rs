//! Execution of a pipeline graph, one task per shard.
//!
//! A run walks back from the terminal dataset to every stage it depends on, opens one
//! queue per (producer shard, consumer shard) pair an edge needs, and then executes:
//!
//! - [`ExecMode::Parallel`]: all tasks at once on a dedicated rayon pool with one
//!   thread per task, over bounded queues. A full queue blocks its producer; an empty
//!   one blocks its consumer. That is the only flow control.
//! - [`ExecMode::Sequential`]: stage after stage in dependency order on the calling
//!   thread, over unbounded queues.
//!
//! Both modes yield the same per-shard output: every stage reads its inputs in a fixed
//! order, and exchanges reorder by upstream shard (see
//! [`Dataset::partition`](crate::Dataset::partition)).
//!
//! A stage with several inputs may read one input for a long stretch while leaving the
//! others alone (a merge join inside a large key group). If two of those inputs descend
//! from a common stage, a bounded queue on the idle input would eventually block that
//! common upstream and starve the input being read. Such input edges are therefore
//! wired unbounded; all other queues keep the configured capacity.

use crate::dataset::Element;
use crate::error::JoinError;
use crate::pipeline::Pipeline;
use crate::stage::{Stage, TaskFn, Wiring};
use crate::stage_id::StageId;
use crate::task::{ErasedLane, Task, select_recv};
use crate::type_token::ErasedReceiver;
use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// Queue capacity used when none is configured.
pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Clone, Copy, Debug)]
pub enum ExecMode {
    Sequential,
    /// One pool thread per task of every reachable stage, plus one for the collector.
    ///
    /// An orchestrated join runs seven stages, most with the left side's shard count,
    /// so the default of `2 * num_cpus` shards means several hundred threads on a large
    /// machine. Pass an explicit shard count to bound it.
    Parallel { capacity: Option<usize> },
}

pub struct Runner {
    pub mode: ExecMode,
    pub default_capacity: usize,
}

impl Default for Runner {
    fn default() -> Self {
        Self {
            mode: ExecMode::Parallel { capacity: None },
            default_capacity: DEFAULT_CAPACITY,
        }
    }
}

struct Job {
    function: TaskFn,
    task: Task,
}

impl Job {
    fn run(self) -> Result<()> {
        let name = format!("stage '{}' shard {}", self.task.stage, self.task.shard);
        (self.function)(self.task).context(name)
    }
}

impl Runner {
    /// Execute everything `terminal` depends on and return its shards in order.
    ///
    /// # Errors
    /// As [`Runner::for_each`].
    pub fn run_shards<T: Element>(&self, p: &Pipeline, terminal: StageId) -> Result<Vec<Vec<T>>> {
        let shards = p.describe(terminal)?.shards;
        let mut out: Vec<Vec<T>> = (0..shards).map(|_| Vec::new()).collect();
        self.for_each(p, terminal, |shard, item: T| {
            out[shard].push(item);
            Ok(())
        })?;
        Ok(out)
    }

    /// Execute everything `terminal` depends on, handing its elements to `sink` as
    /// `(shard, element)`.
    ///
    /// Elements arrive shard by shard: all of shard 0 in order, then shard 1, and so
    /// on. Elements of a later shard that finish early are held until their turn. The
    /// sink runs on a pool thread in parallel mode.
    ///
    /// # Errors
    /// Wiring errors ([`JoinError::ShardMismatch`], [`JoinError::MissingStage`],
    /// [`JoinError::PortType`]) before any task starts, otherwise the first task
    /// failure that is not a mere [`JoinError::Disconnected`], otherwise the first
    /// error `sink` returns.
    pub fn for_each<T, S>(&self, p: &Pipeline, terminal: StageId, sink: S) -> Result<()>
    where
        T: Element,
        S: FnMut(usize, T) -> Result<()> + Send,
    {
        let stages = p.snapshot();
        let order = plan(&stages, terminal)?;
        let capacity = match self.mode {
            ExecMode::Sequential => None,
            ExecMode::Parallel { capacity } => Some(capacity.unwrap_or(self.default_capacity)),
        };
        let (jobs, terminal_rx) = wire(&stages, &order, terminal, capacity)?;
        let receivers = terminal_rx
            .into_iter()
            .map(|rx| {
                rx.downcast::<Receiver<T>>()
                    .map(|rx| *rx)
                    .map_err(|_| JoinError::PortType {
                        expected: std::any::type_name::<T>(),
                        found: "the terminal stage's element type",
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            "running {} stage(s), {} task(s), mode {:?}",
            order.len(),
            jobs.len(),
            self.mode
        );
        let started = Instant::now();
        let failures = Mutex::new(Vec::<anyhow::Error>::new());

        let delivered = match self.mode {
            ExecMode::Sequential => {
                for job in jobs {
                    if let Err(e) = job.run() {
                        let primary = !is_secondary(&e);
                        failures.lock().push(e);
                        if primary {
                            // remaining jobs drop here, closing their queues
                            break;
                        }
                    }
                }
                gather(receivers, sink)
            }
            ExecMode::Parallel { .. } => {
                // every task may block on a queue, so each needs its own thread; +1 for
                // the collector
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(jobs.len() + 1)
                    .thread_name(|i| format!("ironmerge-task-{i}"))
                    .build()
                    .context("build task pool")?;
                pool.scope(|s| {
                    for job in jobs {
                        let failures = &failures;
                        s.spawn(move |_| {
                            if let Err(e) = job.run() {
                                failures.lock().push(e);
                            }
                        });
                    }
                    gather(receivers, sink)
                })
            }
        };

        first_failure(failures.into_inner())?;
        let delivered = delivered.context("terminal sink")?;
        debug!("run finished in {:?}: {delivered} element(s)", started.elapsed());
        Ok(())
    }
}

/// Stages `terminal` depends on (itself included), producers before consumers.
fn plan(stages: &HashMap<StageId, Stage>, terminal: StageId) -> Result<Vec<StageId>> {
    fn visit(
        id: StageId,
        stages: &HashMap<StageId, Stage>,
        seen: &mut HashSet<StageId>,
        order: &mut Vec<StageId>,
    ) -> Result<(), JoinError> {
        if !seen.insert(id) {
            return Ok(());
        }
        let stage = stages.get(&id).ok_or(JoinError::MissingStage(id.raw()))?;
        for edge in &stage.inputs {
            visit(edge.from, stages, seen, order)?;
        }
        order.push(id);
        Ok(())
    }

    let mut seen = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, stages, &mut seen, &mut order)?;
    Ok(order)
}

/// Stages reachable upstream from `id`, itself included.
fn ancestors(stages: &HashMap<StageId, Stage>, id: StageId) -> Result<HashSet<StageId>, JoinError> {
    let mut seen = HashSet::new();
    let mut pending = vec![id];
    while let Some(next) = pending.pop() {
        if seen.insert(next) {
            let stage = stages.get(&next).ok_or(JoinError::MissingStage(next.raw()))?;
            pending.extend(stage.inputs.iter().map(|e| e.from));
        }
    }
    Ok(seen)
}

/// For each input edge of `consumer`, whether another input edge descends from a common
/// stage.
fn shared_inputs(stages: &HashMap<StageId, Stage>, consumer: &Stage) -> Result<Vec<bool>, JoinError> {
    let mut shared = vec![false; consumer.inputs.len()];
    if consumer.inputs.len() < 2 {
        return Ok(shared);
    }
    let upstream = consumer
        .inputs
        .iter()
        .map(|e| ancestors(stages, e.from))
        .collect::<Result<Vec<_>, _>>()?;
    for i in 0..upstream.len() {
        for j in i + 1..upstream.len() {
            if !upstream[i].is_disjoint(&upstream[j]) {
                shared[i] = true;
                shared[j] = true;
            }
        }
    }
    Ok(shared)
}

/// Open every queue the plan needs and build one job per shard.
///
/// Returns jobs in plan order (stage by stage, shard by shard) and the erased
/// receivers of the terminal stage's shards.
fn wire(
    stages: &HashMap<StageId, Stage>,
    order: &[StageId],
    terminal: StageId,
    capacity: Option<usize>,
) -> Result<(Vec<Job>, Vec<ErasedReceiver>)> {
    let stage_of = |id: StageId| stages.get(&id).ok_or(JoinError::MissingStage(id.raw()));

    let mut tasks: HashMap<StageId, Vec<Task>> = HashMap::new();
    for &id in order {
        let stage = stage_of(id)?;
        if stage.shards == 0 {
            return Err(JoinError::ZeroShards.into());
        }
        let shard_tasks = (0..stage.shards)
            .map(|shard| Task {
                stage: stage.name.clone(),
                shard,
                elem: stage.ports.elem_tag(),
                inputs: stage.inputs.iter().map(|_| Vec::new()).collect(),
                outputs: Vec::new(),
            })
            .collect();
        tasks.insert(id, shard_tasks);
    }

    for &id in order {
        let consumer = stage_of(id)?;
        let unbounded = shared_inputs(stages, consumer)?;
        for (k, edge) in consumer.inputs.iter().enumerate() {
            let producer = stage_of(edge.from)?;
            let capacity = if unbounded[k] {
                debug!(
                    "stage '{}' input #{k} shares an upstream with another input; queue unbounded",
                    consumer.name
                );
                None
            } else {
                capacity
            };
            let mut incoming: Vec<Vec<ErasedReceiver>> =
                (0..consumer.shards).map(|_| Vec::new()).collect();
            let producer_tasks = tasks
                .get_mut(&edge.from)
                .ok_or(JoinError::MissingStage(edge.from.raw()))?;
            match &edge.wiring {
                Wiring::Shard => {
                    if producer.shards != consumer.shards {
                        return Err(JoinError::ShardMismatch {
                            left: consumer.shards,
                            right: producer.shards,
                        })
                        .with_context(|| {
                            format!("stage '{}' input #{k} from '{}'", consumer.name, producer.name)
                        });
                    }
                    for (task, rx_slot) in producer_tasks.iter_mut().zip(incoming.iter_mut()) {
                        let (tx, rx) = producer.ports.channel(capacity);
                        task.outputs.push(ErasedLane {
                            senders: vec![tx],
                            router: None,
                        });
                        rx_slot.push(rx);
                    }
                }
                Wiring::Exchange(router) => {
                    for task in producer_tasks.iter_mut() {
                        let mut senders = Vec::with_capacity(consumer.shards);
                        for rx_slot in &mut incoming {
                            let (tx, rx) = producer.ports.channel(capacity);
                            senders.push(tx);
                            rx_slot.push(rx);
                        }
                        task.outputs.push(ErasedLane {
                            senders,
                            router: Some(router.clone()),
                        });
                    }
                }
            }
            let consumer_tasks = tasks
                .get_mut(&id)
                .ok_or(JoinError::MissingStage(id.raw()))?;
            for (task, rxs) in consumer_tasks.iter_mut().zip(incoming) {
                task.inputs[k] = rxs;
            }
        }
    }

    let terminal_stage = stage_of(terminal)?;
    let mut terminal_rx = Vec::with_capacity(terminal_stage.shards);
    for task in tasks
        .get_mut(&terminal)
        .ok_or(JoinError::MissingStage(terminal.raw()))?
    {
        let (tx, rx) = terminal_stage.ports.channel(capacity);
        task.outputs.push(ErasedLane {
            senders: vec![tx],
            router: None,
        });
        terminal_rx.push(rx);
    }

    let mut jobs = Vec::new();
    for id in order {
        let function = stage_of(*id)?.function.clone();
        for task in tasks.remove(id).into_iter().flatten() {
            jobs.push(Job {
                function: function.clone(),
                task,
            });
        }
    }
    Ok((jobs, terminal_rx))
}

/// Drain the terminal queues into `sink` in shard order, reading whichever queue is
/// ready and holding back elements of shards whose turn has not come.
///
/// Returns the number of elements delivered. A sink error stops the drain; dropping
/// the receivers then lets the producers finish.
fn gather<T, S>(receivers: Vec<Receiver<T>>, mut sink: S) -> Result<usize>
where
    S: FnMut(usize, T) -> Result<()>,
{
    let shards = receivers.len();
    let mut held: Vec<Vec<T>> = (0..shards).map(|_| Vec::new()).collect();
    let mut closed = vec![false; shards];
    let mut current = 0usize;
    let mut delivered = 0usize;
    let (mut shard_of, mut live): (Vec<usize>, Vec<Receiver<T>>) =
        receivers.into_iter().enumerate().unzip();
    while !live.is_empty() {
        match select_recv(&live) {
            (i, Ok(v)) if shard_of[i] == current => {
                sink(current, v)?;
                delivered += 1;
            }
            (i, Ok(v)) => held[shard_of[i]].push(v),
            (i, Err(_)) => {
                closed[shard_of[i]] = true;
                live.swap_remove(i);
                shard_of.swap_remove(i);
                while current < shards && closed[current] {
                    current += 1;
                    if current < shards {
                        for v in std::mem::take(&mut held[current]) {
                            sink(current, v)?;
                            delivered += 1;
                        }
                    }
                }
            }
        }
    }
    Ok(delivered)
}

fn is_secondary(e: &anyhow::Error) -> bool {
    e.downcast_ref::<JoinError>()
        .is_some_and(JoinError::is_secondary)
}

/// Report the root cause of a failed run.
///
/// `Disconnected` failures only mean a consumer stopped reading; on their own they do
/// not fail the run.
fn first_failure(failures: Vec<anyhow::Error>) -> Result<()> {
    let total = failures.len();
    let mut secondary = 0usize;
    for e in failures {
        if is_secondary(&e) {
            secondary += 1;
        } else {
            if total > 1 {
                warn!("{} other task(s) also failed", total - 1);
            }
            return Err(e);
        }
    }
    if secondary > 0 {
        warn!("{secondary} task(s) stopped early because a consumer closed its input");
    }
    Ok(())
}

//! Per-shard execution unit and its typed queue endpoints.
//!
//! The runner builds one [`Task`] per shard of every stage it executes. A task owns
//! exactly the endpoints wired to its shard: for each input edge, the receivers it
//! reads from, and for each consumer of its dataset, one outgoing lane. Nothing is
//! shared between tasks, so stage bodies need no locking.
//!
//! Endpoints arrive type-erased. A stage body opens them with
//! [`Task::take_input`] and [`Task::take_output`], which downcast to the element
//! types the body expects:
//!
//! ```ignore
//! let left = task.take_input::<Record>(0)?;
//! let mut out = task.take_output::<Joined>()?;
//! for r in left {
//!     out.send(convert(r))?;
//! }
//! ```
//!
//! All queues close when their sending halves drop, so a body that returns (normally,
//! with an error, or by unwinding) always signals completion downstream.

use crate::error::JoinError;
use crate::stage::Router;
use crate::type_token::{ErasedReceiver, ErasedSender, TypeTag};
use anyhow::Result;
use crossbeam_channel::{Receiver, RecvError, Select, Sender};
use std::any::{Any, type_name};
use std::sync::Arc;

/// Outgoing wiring for one consumer edge, element type erased.
pub(crate) struct ErasedLane {
    pub(crate) senders: Vec<ErasedSender>,
    pub(crate) router: Option<Arc<dyn Any + Send + Sync>>,
}

pub struct Task {
    pub(crate) stage: String,
    pub(crate) shard: usize,
    pub(crate) elem: TypeTag,
    pub(crate) inputs: Vec<Vec<ErasedReceiver>>,
    pub(crate) outputs: Vec<ErasedLane>,
}

impl Task {
    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn shard(&self) -> usize {
        self.shard
    }

    /// Number of input edges wired to this task.
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Open the `index`-th input edge as a blocking iterator of `T`.
    ///
    /// # Errors
    /// Fails if the edge does not exist or was already taken, or if its upstream
    /// produces a type other than `T`.
    pub fn take_input<T: Send + 'static>(&mut self, index: usize) -> Result<Inlet<T>> {
        let erased = self.inputs.get_mut(index).ok_or_else(|| {
            anyhow::anyhow!("stage '{}' has no input #{index}", self.stage)
        })?;
        let receivers = std::mem::take(erased)
            .into_iter()
            .map(|rx| {
                rx.downcast::<Receiver<T>>()
                    .map(|rx| *rx)
                    .map_err(|_| JoinError::PortType {
                        expected: type_name::<T>(),
                        found: "a different upstream element type",
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let upstreams = receivers.len();
        Ok(Inlet {
            receivers,
            origins: (0..upstreams).collect(),
            upstreams,
        })
    }

    /// Open this task's output as an [`Outlet`] of `T`.
    ///
    /// # Errors
    /// Fails if `T` is not the element type the stage was registered with.
    pub fn take_output<T: Send + 'static>(&mut self) -> Result<Outlet<T>> {
        if TypeTag::of::<T>() != self.elem {
            return Err(JoinError::PortType {
                expected: self.elem.name,
                found: type_name::<T>(),
            }
            .into());
        }
        let mut lanes = Vec::with_capacity(self.outputs.len());
        for lane in std::mem::take(&mut self.outputs) {
            let senders = lane
                .senders
                .into_iter()
                .map(|tx| tx.downcast::<Sender<T>>().map(|tx| *tx))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| JoinError::PortType {
                    expected: self.elem.name,
                    found: type_name::<T>(),
                })?;
            let router = match lane.router {
                Some(r) => Some(
                    r.downcast_ref::<Router<T>>()
                        .cloned()
                        .ok_or(JoinError::PortType {
                            expected: type_name::<Router<T>>(),
                            found: "a router for another element type",
                        })?,
                ),
                None => None,
            };
            lanes.push(Lane { senders, router });
        }
        Ok(Outlet {
            stage: self.stage.clone(),
            shard: self.shard,
            lanes,
            sent: 0,
        })
    }
}

/// Blocking reader over one input edge.
///
/// Yields elements until every upstream queue on the edge is closed. With several
/// upstream queues (an exchange), elements are taken from whichever queue is ready, so
/// the interleaving across upstream shards varies between runs; [`Inlet::next_tagged`]
/// reports which upstream shard each element came from.
pub struct Inlet<T> {
    receivers: Vec<Receiver<T>>,
    /// Upstream shard index of each live receiver.
    origins: Vec<usize>,
    upstreams: usize,
}

impl<T> Inlet<T> {
    /// Number of upstream shards feeding this edge.
    pub fn upstreams(&self) -> usize {
        self.upstreams
    }

    /// Next element together with the index of the upstream shard that sent it.
    pub fn next_tagged(&mut self) -> Option<(usize, T)> {
        loop {
            match self.receivers.len() {
                0 => return None,
                1 => match self.receivers[0].recv() {
                    Ok(v) => return Some((self.origins[0], v)),
                    Err(RecvError) => {
                        self.receivers.clear();
                        self.origins.clear();
                    }
                },
                _ => match select_recv(&self.receivers) {
                    (i, Ok(v)) => return Some((self.origins[i], v)),
                    (i, Err(RecvError)) => {
                        self.receivers.swap_remove(i);
                        self.origins.swap_remove(i);
                    }
                },
            }
        }
    }
}

impl<T> Iterator for Inlet<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.next_tagged().map(|(_, v)| v)
    }
}

/// Block until one of `receivers` has a message or is closed.
pub(crate) fn select_recv<T>(receivers: &[Receiver<T>]) -> (usize, Result<T, RecvError>) {
    let mut sel = Select::new();
    for rx in receivers {
        sel.recv(rx);
    }
    let op = sel.select();
    let i = op.index();
    (i, op.recv(&receivers[i]))
}

struct Lane<T> {
    senders: Vec<Sender<T>>,
    router: Option<Router<T>>,
}

/// Writer for a task's output.
///
/// Each element goes to every consumer lane (cloned for all but the last). Within a
/// lane, exchange wiring picks one destination shard through the router.
pub struct Outlet<T> {
    stage: String,
    shard: usize,
    lanes: Vec<Lane<T>>,
    sent: usize,
}

impl<T: Clone> Outlet<T> {
    /// Send one element downstream, blocking while a bounded queue is full.
    ///
    /// # Errors
    /// [`JoinError::Disconnected`] if a downstream task dropped its end.
    pub fn send(&mut self, item: T) -> Result<(), JoinError> {
        if let Some((last, rest)) = self.lanes.split_last() {
            for lane in rest {
                self.push(lane, item.clone())?;
            }
            self.push(last, item)?;
        }
        self.sent += 1;
        Ok(())
    }

    fn push(&self, lane: &Lane<T>, item: T) -> Result<(), JoinError> {
        let target = match &lane.router {
            Some(route) => route(&item, lane.senders.len()) % lane.senders.len(),
            None => 0,
        };
        lane.senders[target]
            .send(item)
            .map_err(|_| JoinError::Disconnected {
                stage: self.stage.clone(),
                shard: self.shard,
            })
    }

    /// Elements sent so far.
    pub fn sent(&self) -> usize {
        self.sent
    }
}

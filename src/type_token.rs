//! Type tags and type-erased port factories.
//!
//! This module provides:
//! - [`TypeTag`]: a lightweight runtime type identifier attached to every stage so
//!   port mismatches can be reported by name.
//! - [`PortOps`]: a type-erased interface that opens a queue for a stage's element
//!   type. Concrete implementations are produced via [`port_ops_for`].
//!
//! The runner wires stages together without knowing their element types at compile
//! time. It asks each producing stage's `PortOps` for a sender/receiver pair and hands
//! the erased halves to the tasks, which downcast them back to typed endpoints (see
//! [`Task`](crate::task::Task)).

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use std::any::{Any, TypeId, type_name};
use std::marker::PhantomData;
use std::sync::Arc;

/// Sending half of a queue with its element type erased.
pub type ErasedSender = Box<dyn Any + Send>;

/// Receiving half of a queue with its element type erased.
pub type ErasedReceiver = Box<dyn Any + Send>;

/// A lightweight runtime type tag for debugging and assertions.
///
/// ```
/// use ironmerge::type_token::TypeTag;
/// let tag = TypeTag::of::<u32>();
/// assert_eq!(tag.name, "u32");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeTag {
    /// Stable Rust type identifier.
    pub id: TypeId,
    /// Human-readable type name (best-effort).
    pub name: &'static str,
}

impl TypeTag {
    /// Construct a tag for `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }
}

/// Type-erased queue factory for one element type.
pub trait PortOps: Send + Sync {
    /// Tag of the element type carried by queues from this factory.
    fn elem_tag(&self) -> TypeTag;

    /// Open a queue. `Some(n)` bounds it to `n` in-flight elements (sends block when
    /// full); `None` makes it unbounded.
    ///
    /// The halves are a `crossbeam_channel::Sender<T>` and `Receiver<T>`, boxed.
    fn channel(&self, capacity: Option<usize>) -> (ErasedSender, ErasedReceiver);
}

/// Concrete `PortOps` for a specific `T`.
pub struct PortOpsImpl<T: Send + 'static>(PhantomData<fn() -> T>);

impl<T: Send + 'static> PortOps for PortOpsImpl<T> {
    fn elem_tag(&self) -> TypeTag {
        TypeTag::of::<T>()
    }

    fn channel(&self, capacity: Option<usize>) -> (ErasedSender, ErasedReceiver) {
        let (tx, rx): (Sender<T>, Receiver<T>) = match capacity {
            // a zero-capacity crossbeam channel is a rendezvous; keep at least one slot
            Some(n) => bounded(n.max(1)),
            None => unbounded(),
        };
        (Box::new(tx), Box::new(rx))
    }
}

/// Create a type-erased `PortOps` for queues of `T`.
///
/// ```
/// use ironmerge::type_token::{port_ops_for, PortOps};
/// use crossbeam_channel::{Receiver, Sender};
///
/// let ops = port_ops_for::<i64>();
/// let (tx, rx) = ops.channel(Some(4));
/// let tx = tx.downcast::<Sender<i64>>().unwrap();
/// let rx = rx.downcast::<Receiver<i64>>().unwrap();
/// tx.send(7).unwrap();
/// assert_eq!(rx.recv().unwrap(), 7);
/// ```
pub fn port_ops_for<T: Send + 'static>() -> Arc<dyn PortOps> {
    Arc::new(PortOpsImpl::<T>(PhantomData))
}

//! Routine handles and per-routine state

use crate::strategy::Strategy;
use coroutine_common::RoutineState;
use std::any::Any;
use std::cell::{Cell, UnsafeCell};
use std::fmt;
use std::num::NonZeroUsize;

/// Opaque identifier of a routine
///
/// Issued by one ordinator, dense and strictly increasing in creation order,
/// never reused. An id carries its ordinator's serial, so handing it to a
/// different ordinator is reported instead of hitting an unrelated routine.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoutineId {
    owner: u64,
    index: NonZeroUsize,
}

impl RoutineId {
    pub(crate) fn new(owner: u64, index: NonZeroUsize) -> Self {
        Self { owner, index }
    }

    /// 1-based position in the issuing ordinator's creation order
    #[inline]
    pub fn get(self) -> usize {
        self.index.get()
    }

    #[inline]
    pub(crate) fn owner(self) -> u64 {
        self.owner
    }

    #[inline]
    pub(crate) fn slot(self) -> usize {
        self.index.get() - 1
    }
}

impl fmt::Debug for RoutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RoutineId({}/{})", self.owner, self.index)
    }
}

impl fmt::Display for RoutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "routine#{}", self.index)
    }
}

/// The unit of work run by a routine
pub(crate) type Callable = Box<dyn FnOnce()>;

/// Panic payload caught on a routine's stack
pub(crate) type Panic = Box<dyn Any + Send + 'static>;

/// A routine as owned by its ordinator
///
/// Always boxed: the running flow and the scheduler flow both reach it
/// through a raw pointer while the ordinator's slot vector may grow.
pub(crate) struct Routine<S: Strategy> {
    id: RoutineId,
    callable: Cell<Option<Callable>>,
    state: Cell<RoutineState>,
    panic: Cell<Option<Panic>>,
    saved: UnsafeCell<S::Saved>,
}

impl<S: Strategy> Routine<S> {
    pub(crate) fn new(id: RoutineId, callable: Callable) -> Self {
        Self {
            id,
            callable: Cell::new(Some(callable)),
            state: Cell::new(RoutineState::Created),
            panic: Cell::new(None),
            saved: UnsafeCell::new(S::saved()),
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> RoutineId {
        self.id
    }

    #[inline]
    pub(crate) fn state(&self) -> RoutineState {
        self.state.get()
    }

    #[inline]
    pub(crate) fn set_state(&self, state: RoutineState) {
        self.state.set(state);
    }

    /// Take the callable; `None` after the first call
    pub(crate) fn take_callable(&self) -> Option<Callable> {
        self.callable.take()
    }

    pub(crate) fn set_panic(&self, payload: Panic) {
        self.panic.set(Some(payload));
    }

    pub(crate) fn take_panic(&self) -> Option<Panic> {
        self.panic.take()
    }

    /// Strategy state; only the flow that is not running may touch it
    #[inline]
    pub(crate) fn saved(&self) -> *mut S::Saved {
        self.saved.get()
    }
}

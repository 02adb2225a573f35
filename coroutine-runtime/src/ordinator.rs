//! The per-thread scheduler
//!
//! An [`Ordinator`] owns every routine created through it, remembers which
//! one (if any) is executing, and is the only party that ever switches
//! control. Transfers are strictly alternating: the scheduler flow calls
//! [`Ordinator::resume`], the routine runs until it calls [`yield_now`] or
//! returns, and only then does `resume` return.
//!
//! Each thread has a default ordinator behind the free functions of this
//! crate ([`create`], [`resume`], ...). Explicit instances can be built with
//! [`Builder`](crate::Builder), e.g. to pick a strategy in tests.

use crate::config::Config;
use crate::context::{self, Entry};
use crate::error::{Error, Result};
use crate::routine::{Routine, RoutineId};
use crate::stats::{Counters, Stats};
use crate::strategy::{DefaultStrategy, SharedStack, Strategy};
use coroutine_common::RoutineState;
use std::cell::{Cell, RefCell, UnsafeCell};
use std::fmt;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::process;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// Source of ordinator serials; ids embed them to catch cross-ordinator use
static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Ordinator whose routine is executing on this thread right now
    static ACTIVE: Cell<Option<NonNull<dyn Active>>> = const { Cell::new(None) };

    /// This thread's default ordinator
    static ORDINATOR: Ordinator = Ordinator::new();
}

/// What a running routine needs from its ordinator, independent of strategy
trait Active {
    fn current(&self) -> Option<RoutineId>;

    fn poll_interval(&self) -> Duration;

    /// # Safety
    /// Must be called from the flow of the routine that is `current`.
    unsafe fn suspend(&self);
}

/// Per-thread routine scheduler
///
/// `!Send` and `!Sync`: routines and their ids are only meaningful on the
/// thread that created them.
pub struct Ordinator<S: Strategy = DefaultStrategy> {
    // Boxed so running routines can keep pointing at it.
    inner: Box<Inner<S>>,
}

struct Inner<S: Strategy> {
    serial: u64,
    config: Config,
    /// Slot `i` holds the routine with index `i + 1`; destroyed slots stay `None`
    routines: RefCell<Vec<Option<Box<Routine<S>>>>>,
    current: Cell<Option<RoutineId>>,
    host: UnsafeCell<S::Host>,
    counters: Counters,
}

impl Ordinator<DefaultStrategy> {
    /// Create an ordinator with the default strategy and configuration
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }
}

impl Default for Ordinator<DefaultStrategy> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Strategy> Ordinator<S> {
    /// Create an ordinator with the given configuration
    ///
    /// Nothing is mapped until the first routine is resumed.
    pub fn with_config(config: Config) -> Self {
        let serial = NEXT_SERIAL.fetch_add(1, Ordering::Relaxed);
        Self {
            inner: Box::new(Inner {
                serial,
                config,
                routines: RefCell::new(Vec::new()),
                current: Cell::new(None),
                host: UnsafeCell::new(S::host()),
                counters: Counters::default(),
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get a snapshot of the activity counters
    pub fn stats(&self) -> Stats {
        self.inner.counters.snapshot()
    }

    /// Create a routine that will run `f` when first resumed
    pub fn create<F>(&self, f: F) -> RoutineId
    where
        F: FnOnce() + 'static,
    {
        self.inner.create(Box::new(f))
    }

    /// Transfer control into a routine until it yields or finishes
    ///
    /// Returns the routine's state once control is back: `Suspended` or
    /// `Finished`. If the routine's callable panicked, the panic continues
    /// from here after the routine has been marked finished.
    ///
    /// # Panics
    /// Panics when called from inside a running routine.
    pub fn resume(&self, id: RoutineId) -> Result<RoutineState> {
        self.inner.resume(id)
    }

    /// Release a routine and everything it owns
    ///
    /// Values living on the stack of a routine that is suspended rather than
    /// finished are not dropped; they are leaked along with its frames.
    pub fn destroy(&self, id: RoutineId) -> Result<()> {
        self.inner.destroy(id)
    }

    /// The routine executing on this ordinator, if any
    pub fn current(&self) -> Option<RoutineId> {
        self.inner.current.get()
    }

    /// Lifecycle state of a routine, `None` if unknown or destroyed
    pub fn state(&self, id: RoutineId) -> Option<RoutineState> {
        let routine = self.inner.lookup(id).ok()?;
        // SAFETY: the box stays alive while its slot is occupied
        Some(unsafe { routine.as_ref() }.state())
    }

    /// Number of routines not yet destroyed
    pub fn len(&self) -> usize {
        self.inner.routines.borrow().iter().flatten().count()
    }

    /// Check if there are no live routines
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub(crate) fn inspect<R>(&self, id: RoutineId, f: impl FnOnce(&S::Saved) -> R) -> Option<R> {
        let routine = self.inner.lookup(id).ok()?;
        // SAFETY: test helper, only called while the routine is not running
        Some(f(unsafe { &*routine.as_ref().saved() }))
    }
}

impl Ordinator<SharedStack> {
    #[cfg(test)]
    pub(crate) fn host_stack_top(&self) -> Option<*mut u8> {
        // SAFETY: test helper, only called from the scheduler flow
        let host = unsafe { &*self.inner.host.get() };
        host.stack().map(|stack| stack.top())
    }
}

impl<S: Strategy> fmt::Debug for Ordinator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ordinator")
            .field("serial", &self.inner.serial)
            .field("strategy", &S::NAME)
            .field("routines", &self.len())
            .field("current", &self.current())
            .finish()
    }
}

impl<S: Strategy> Inner<S> {
    fn as_active(&self) -> NonNull<dyn Active> {
        let active: &(dyn Active + 'static) = self;
        NonNull::from(active)
    }

    fn lookup(&self, id: RoutineId) -> Result<NonNull<Routine<S>>> {
        if id.owner() != self.serial {
            return Err(Error::Foreign(id));
        }
        match self.routines.borrow().get(id.slot()) {
            Some(Some(routine)) => Ok(NonNull::from(&**routine)),
            _ => Err(Error::NotFound(id)),
        }
    }

    fn create(&self, callable: Box<dyn FnOnce()>) -> RoutineId {
        let id = {
            let mut routines = self.routines.borrow_mut();
            let id = RoutineId::new(self.serial, NonZeroUsize::MIN.saturating_add(routines.len()));
            routines.push(Some(Box::new(Routine::new(id, callable))));
            id
        };

        Counters::bump(&self.counters.created);
        debug!(%id, strategy = S::NAME, "created routine");
        id
    }

    fn destroy(&self, id: RoutineId) -> Result<()> {
        if id.owner() != self.serial {
            return Err(Error::Foreign(id));
        }
        if self.current.get() == Some(id) {
            return Err(Error::Running(id));
        }

        let removed = self
            .routines
            .borrow_mut()
            .get_mut(id.slot())
            .and_then(Option::take);
        let Some(routine) = removed else {
            return Err(Error::NotFound(id));
        };

        // Dropped outside the borrow: captured values may call back into us.
        debug!(id = %routine.id(), state = %routine.state(), "destroying routine");
        drop(routine);
        Counters::bump(&self.counters.destroyed);
        Ok(())
    }

    fn resume(&self, id: RoutineId) -> Result<RoutineState> {
        if let Some(running) = current_routine() {
            panic!("cannot resume {id} from inside {running}: resume is only legal from the scheduler");
        }

        // SAFETY: the box stays alive until destroyed, and nothing can destroy
        // it while this call is on the stack (the running routine is refused).
        let routine = unsafe { self.lookup(id)?.as_ref() };
        let previous = routine.state();
        // Running is ruled out above, so only Finished is left.
        if !previous.is_resumable() {
            return Err(Error::AlreadyFinished(id));
        }

        let host = self.host.get();
        // SAFETY: no routine is running, the scheduler flow owns host and saved state
        unsafe {
            if previous.has_started() {
                S::restore(&*host, &*routine.saved());
            } else {
                S::prepare(&mut *host, &mut *routine.saved(), &self.config, trampoline::<S> as Entry)?;
            }
        }

        self.current.set(Some(id));
        routine.set_state(RoutineState::Running);
        Counters::bump(&self.counters.resumes);
        ACTIVE.with(|active| active.set(Some(self.as_active())));
        trace!(%id, strategy = S::NAME, "switching into routine");

        // SAFETY: the routine context was just prepared or restored
        let switched = unsafe {
            context::swap(S::host_context(&*host), S::routine_context(&*routine.saved()))
        };
        ACTIVE.with(|active| active.set(None));

        if let Err(err) = switched {
            self.current.set(None);
            routine.set_state(previous);
            return Err(Error::Context(err));
        }

        if routine.state().is_finished() {
            debug!(%id, "routine finished");
            if let Some(payload) = routine.take_panic() {
                Counters::bump(&self.counters.panicked);
                warn!(%id, "routine panicked");
                panic::resume_unwind(payload);
            }
            return Ok(RoutineState::Finished);
        }

        // SAFETY: the routine just parked itself and nothing else has run since
        unsafe { S::capture(&*host, &mut *routine.saved()) };
        Ok(RoutineState::Suspended)
    }

    /// Body of a routine's flow, run on its stack by the trampoline
    fn run_current(&self) {
        let Some(id) = self.current.get() else {
            fatal("routine entered with no current id");
        };
        let routine = match self.lookup(id) {
            // SAFETY: a running routine cannot be destroyed
            Ok(routine) => unsafe { routine.as_ref() },
            Err(err) => fatal(&err.to_string()),
        };

        if let Some(callable) = routine.take_callable() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callable)) {
                routine.set_panic(payload);
            }
        }

        routine.set_state(RoutineState::Finished);
        self.current.set(None);
        Counters::bump(&self.counters.finished);
    }
}

impl<S: Strategy> Active for Inner<S> {
    fn current(&self) -> Option<RoutineId> {
        self.current.get()
    }

    fn poll_interval(&self) -> Duration {
        self.config.poll_interval
    }

    unsafe fn suspend(&self) {
        let Some(id) = self.current.get() else {
            panic!("yield_now called outside of a routine");
        };
        let routine = match self.lookup(id) {
            Ok(routine) => routine.as_ref(),
            Err(err) => fatal(&err.to_string()),
        };

        routine.set_state(RoutineState::Suspended);
        self.current.set(None);
        Counters::bump(&self.counters.yields);
        trace!(%id, "routine yielding");

        let switched = context::swap(
            S::routine_context(&*routine.saved()),
            S::host_context(&*self.host.get()),
        );
        if let Err(err) = switched {
            error!(%id, error = %err, "failed to yield, routine keeps running");
            self.current.set(Some(id));
            routine.set_state(RoutineState::Running);
        }
    }
}

impl<S: Strategy> Drop for Inner<S> {
    fn drop(&mut self) {
        let live = self.routines.get_mut().iter().flatten().count();
        if live > 0 {
            debug!(live, serial = self.serial, "dropping ordinator with live routines");
        }
    }
}

/// First frame of every routine flow
extern "C" fn trampoline<S: Strategy>() {
    let Some(active) = ACTIVE.with(Cell::get) else {
        fatal("routine entered without an active ordinator");
    };
    // SAFETY: contexts with this entry are only prepared by `Inner<S>::resume`,
    // which installs itself as ACTIVE right before switching here.
    let inner = unsafe { active.cast::<Inner<S>>().as_ref() };
    inner.run_current();

    // SAFETY: the scheduler flow saved itself into the host context on the way in
    let err = unsafe { context::jump(S::host_context(&*inner.host.get())) };
    error!(error = %err, "failed to leave a finished routine");
    process::abort();
}

fn fatal(reason: &str) -> ! {
    error!(reason, "coroutine runtime invariant violated");
    process::abort();
}

// ============================================================================
// Thread-local default ordinator
// ============================================================================

/// Run `f` with this thread's default ordinator
///
/// The ordinator is created on first use and dropped, with all its routines,
/// when the thread exits.
pub fn with_ordinator<R>(f: impl FnOnce(&Ordinator) -> R) -> R {
    ORDINATOR.with(f)
}

/// Create a routine on this thread's default ordinator
pub fn create<F>(f: F) -> RoutineId
where
    F: FnOnce() + 'static,
{
    with_ordinator(|ordinator| ordinator.create(f))
}

/// Resume a routine of this thread's default ordinator
///
/// See [`Ordinator::resume`].
pub fn resume(id: RoutineId) -> Result<RoutineState> {
    with_ordinator(|ordinator| ordinator.resume(id))
}

/// Destroy a routine of this thread's default ordinator
///
/// Never pass the id of the routine that is calling this; it is refused with
/// [`Error::Running`].
pub fn destroy(id: RoutineId) -> Result<()> {
    with_ordinator(|ordinator| ordinator.destroy(id))
}

/// The routine executing on this thread, `None` in the scheduler flow
pub fn current_routine() -> Option<RoutineId> {
    let active = ACTIVE.with(Cell::get)?;
    // SAFETY: ACTIVE is only set while its ordinator is inside `resume`
    unsafe { active.as_ref() }.current()
}

/// Poll interval of the ordinator running the current routine
pub(crate) fn active_poll_interval() -> Option<Duration> {
    let active = ACTIVE.with(Cell::get)?;
    // SAFETY: as in `current_routine`
    Some(unsafe { active.as_ref() }.poll_interval())
}

/// Suspend the current routine and return control to its scheduler
///
/// Returns when the routine is resumed again.
///
/// # Panics
/// Panics when called outside of a routine.
pub fn yield_now() {
    let Some(active) = ACTIVE.with(Cell::get) else {
        panic!("yield_now called outside of a routine");
    };
    // SAFETY: ACTIVE is set, so we are on the current routine's flow
    unsafe { active.as_ref().suspend() }
}

//! Context-switching strategies
//!
//! A strategy decides where a routine's stack lives and what has to happen
//! around a switch so that the routine finds its frames intact:
//!
//! - [`Dedicated`]: every routine gets its own guarded stack. A switch is a
//!   bare register swap; memory cost is one stack per started routine.
//! - [`SharedStack`]: all routines of an ordinator run on one stack. The live
//!   part of it is copied out when a routine yields and copied back before it
//!   resumes; memory cost is the deepest snapshot per suspended routine.
//!
//! [`DefaultStrategy`] is `SharedStack`, or `Dedicated` when the
//! `dedicated-stacks` feature is enabled. Both are always available for
//! explicit use through `Ordinator<S>`.

mod dedicated;
mod shared;

pub use dedicated::{Dedicated, DedicatedHost, DedicatedSaved};
pub use shared::{SharedHost, SharedSaved, SharedStack};

use crate::config::Config;
use crate::context::{Context, Entry};
use crate::error::Result;

/// Strategy used by the thread-local ordinator and `Builder::build`
#[cfg(feature = "dedicated-stacks")]
pub type DefaultStrategy = Dedicated;

/// Strategy used by the thread-local ordinator and `Builder::build`
#[cfg(not(feature = "dedicated-stacks"))]
pub type DefaultStrategy = SharedStack;

mod sealed {
    pub trait Sealed {}

    impl Sealed for super::Dedicated {}
    impl Sealed for super::SharedStack {}
}

/// Low-level switching capability behind an ordinator
///
/// Sealed: the ordinator relies on the exact contract below and no other
/// implementation is supported. `prepare`, `restore` and `capture` run in
/// the scheduler's flow while no routine is executing.
pub trait Strategy: sealed::Sealed + Sized + 'static {
    /// State owned by the ordinator: the baseline context, plus the shared
    /// stack for [`SharedStack`]
    type Host: 'static;

    /// State owned by each routine
    type Saved: 'static;

    /// Short name used in log events
    const NAME: &'static str;

    /// Fresh ordinator-side state; allocates nothing that can fail
    fn host() -> Self::Host;

    /// Fresh routine-side state; allocates nothing that can fail
    fn saved() -> Self::Saved;

    /// The context the scheduler flow is saved into
    fn host_context(host: &Self::Host) -> &Context;

    /// The context a routine is saved into
    fn routine_context(saved: &Self::Saved) -> &Context;

    /// Set up a never-run routine so that switching into it calls `entry`
    ///
    /// # Safety
    /// The routine must not have been prepared before.
    unsafe fn prepare(
        host: &mut Self::Host,
        saved: &mut Self::Saved,
        config: &Config,
        entry: Entry,
    ) -> Result<()>;

    /// Make a suspended routine's frames live again before switching into it
    ///
    /// # Safety
    /// The routine must have been captured by its last suspension.
    unsafe fn restore(host: &Self::Host, saved: &Self::Saved);

    /// Preserve a routine's frames right after it suspended
    ///
    /// # Safety
    /// Must run before any other routine is switched into.
    unsafe fn capture(host: &Self::Host, saved: &mut Self::Saved);
}

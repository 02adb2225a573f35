//! One stack per ordinator, snapshotted on every suspension
//!
//! Every routine runs on the same mapping. When a routine yields, the bytes
//! between its saved stack pointer and the top of the shared stack are the
//! only ones it can still need; they are copied into a buffer the routine
//! owns. Before it resumes they are copied back to the very same addresses,
//! so pointers into its own frames stay valid. The shared mapping is created
//! once and never moves.

use super::Strategy;
use crate::config::Config;
use crate::context::{Context, Entry};
use crate::error::{Error, Result};
use crate::stack::OsStack;
use std::ptr;
use std::slice;
use tracing::debug;

/// Single shared stack with copy-out/copy-in on switch
#[derive(Debug, Clone, Copy, Default)]
pub struct SharedStack;

/// Ordinator side of [`SharedStack`]
pub struct SharedHost {
    ctx: Context,
    stack: Option<OsStack>,
}

impl SharedHost {
    /// The shared stack, once the first routine has been started
    pub fn stack(&self) -> Option<&OsStack> {
        self.stack.as_ref()
    }
}

/// Routine side of [`SharedStack`]
pub struct SharedSaved {
    ctx: Context,
    // Grows when a deeper snapshot arrives, never shrinks.
    snapshot: Vec<u8>,
}

impl SharedSaved {
    /// Bytes captured at the last suspension
    pub fn snapshot_len(&self) -> usize {
        self.snapshot.len()
    }

    /// Bytes currently reserved for snapshots
    pub fn snapshot_capacity(&self) -> usize {
        self.snapshot.capacity()
    }
}

impl Strategy for SharedStack {
    type Host = SharedHost;
    type Saved = SharedSaved;

    const NAME: &'static str = "shared";

    fn host() -> SharedHost {
        SharedHost {
            ctx: Context::new(),
            stack: None,
        }
    }

    fn saved() -> SharedSaved {
        SharedSaved {
            ctx: Context::new(),
            snapshot: Vec::new(),
        }
    }

    #[inline]
    fn host_context(host: &SharedHost) -> &Context {
        &host.ctx
    }

    #[inline]
    fn routine_context(saved: &SharedSaved) -> &Context {
        &saved.ctx
    }

    unsafe fn prepare(
        host: &mut SharedHost,
        saved: &mut SharedSaved,
        config: &Config,
        entry: Entry,
    ) -> Result<()> {
        let stack = match host.stack.take() {
            Some(stack) => stack,
            None => {
                let stack = OsStack::new(config.shared_stack_size).map_err(Error::Stack)?;
                debug!(size = stack.size(), "mapped shared stack");
                stack
            }
        };
        // Moving the OsStack handle leaves the mapping where it is.
        let stack = &*host.stack.insert(stack);

        saved.snapshot.clear();
        saved.ctx.prepare(stack, entry).map_err(Error::Context)
    }

    unsafe fn restore(host: &SharedHost, saved: &SharedSaved) {
        let Some(stack) = host.stack.as_ref() else {
            return;
        };
        let len = saved.snapshot.len();
        debug_assert!(len <= stack.size());

        ptr::copy_nonoverlapping(saved.snapshot.as_ptr(), stack.top().sub(len), len);
    }

    unsafe fn capture(host: &SharedHost, saved: &mut SharedSaved) {
        let Some(stack) = host.stack.as_ref() else {
            return;
        };
        let sp = saved.ctx.stack_pointer();
        assert!(
            stack.contains(sp),
            "suspended routine's stack pointer {sp:p} is outside the shared stack"
        );

        let len = stack.top() as usize - sp as usize;
        saved.snapshot.clear();
        saved
            .snapshot
            .extend_from_slice(slice::from_raw_parts(sp, len));
    }
}

#[cfg(test)]
mod tests {
    use crate::{yield_now, Builder, SharedStack};
    use coroutine_common::RoutineState;

    #[inline(never)]
    fn descend(depth: usize) {
        let pad = std::hint::black_box([depth as u8; 512]);
        if depth == 0 {
            yield_now();
        } else {
            descend(depth - 1);
        }
        std::hint::black_box(pad);
    }

    #[test]
    fn test_snapshot_tracks_depth_and_never_shrinks() {
        let ordinator = Builder::new().build_with::<SharedStack>();
        let id = ordinator.create(|| {
            descend(32);
            yield_now();
        });

        assert_eq!(ordinator.resume(id).unwrap(), RoutineState::Suspended);
        let (deep_len, deep_cap) = ordinator
            .inspect(id, |saved| (saved.snapshot_len(), saved.snapshot_capacity()))
            .unwrap();
        assert!(deep_len >= 32 * 512);

        assert_eq!(ordinator.resume(id).unwrap(), RoutineState::Suspended);
        let (shallow_len, shallow_cap) = ordinator
            .inspect(id, |saved| (saved.snapshot_len(), saved.snapshot_capacity()))
            .unwrap();
        assert!(shallow_len < deep_len);
        assert_eq!(shallow_cap, deep_cap);

        assert_eq!(ordinator.resume(id).unwrap(), RoutineState::Finished);
    }

    #[test]
    fn test_shared_stack_is_mapped_once() {
        let ordinator = Builder::new()
            .shared_stack_size(128 * 1024)
            .build_with::<SharedStack>();
        assert!(ordinator.host_stack_top().is_none());

        let a = ordinator.create(yield_now);
        let b = ordinator.create(yield_now);
        ordinator.resume(a).unwrap();
        let top = ordinator.host_stack_top();
        assert!(top.is_some());

        ordinator.resume(b).unwrap();
        ordinator.resume(a).unwrap();
        ordinator.resume(b).unwrap();
        assert_eq!(ordinator.host_stack_top(), top);
    }
}

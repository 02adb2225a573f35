//! One guarded stack per routine

use super::Strategy;
use crate::config::Config;
use crate::context::{Context, Entry};
use crate::error::{Error, Result};
use crate::stack::OsStack;

/// Per-routine stacks; switching never copies memory
#[derive(Debug, Clone, Copy, Default)]
pub struct Dedicated;

/// Ordinator side of [`Dedicated`]
pub struct DedicatedHost {
    ctx: Context,
}

/// Routine side of [`Dedicated`]
pub struct DedicatedSaved {
    ctx: Context,
    // Mapped on first resume, unmapped when the routine is destroyed.
    stack: Option<OsStack>,
}

impl DedicatedSaved {
    /// The routine's stack, once it has been started
    pub fn stack(&self) -> Option<&OsStack> {
        self.stack.as_ref()
    }
}

impl Strategy for Dedicated {
    type Host = DedicatedHost;
    type Saved = DedicatedSaved;

    const NAME: &'static str = "dedicated";

    fn host() -> DedicatedHost {
        DedicatedHost {
            ctx: Context::new(),
        }
    }

    fn saved() -> DedicatedSaved {
        DedicatedSaved {
            ctx: Context::new(),
            stack: None,
        }
    }

    #[inline]
    fn host_context(host: &DedicatedHost) -> &Context {
        &host.ctx
    }

    #[inline]
    fn routine_context(saved: &DedicatedSaved) -> &Context {
        &saved.ctx
    }

    unsafe fn prepare(
        _host: &mut DedicatedHost,
        saved: &mut DedicatedSaved,
        config: &Config,
        entry: Entry,
    ) -> Result<()> {
        debug_assert!(saved.stack.is_none(), "routine prepared twice");

        let stack = OsStack::new(config.stack_size).map_err(Error::Stack)?;
        saved.ctx.prepare(&stack, entry).map_err(Error::Context)?;
        saved.stack = Some(stack);
        Ok(())
    }

    #[inline]
    unsafe fn restore(_host: &DedicatedHost, _saved: &DedicatedSaved) {}

    #[inline]
    unsafe fn capture(_host: &DedicatedHost, _saved: &mut DedicatedSaved) {}
}

//! Saved execution contexts
//!
//! Thin wrapper over glibc's `ucontext` family. This is the only place where
//! control actually moves between flows; everything above it decides *when*
//! a switch is legal.

#[cfg(not(all(
    target_os = "linux",
    target_env = "gnu",
    any(target_arch = "x86_64", target_arch = "aarch64")
)))]
compile_error!("coroutine-runtime supports linux-gnu on x86_64 and aarch64 only");

use crate::stack::OsStack;
use std::cell::UnsafeCell;
use std::io;
use std::mem::MaybeUninit;
use std::ptr;

/// Entry point of a freshly prepared context
pub type Entry = extern "C" fn();

/// A saved register set
///
/// On x86_64 glibc stores a pointer into the `ucontext_t` itself (the FPU
/// save area), so the structure is boxed and never moves once captured.
pub struct Context {
    uc: Box<UnsafeCell<libc::ucontext_t>>,
}

impl Context {
    /// An empty context; only valid as the *save* side of a swap until prepared
    pub fn new() -> Self {
        // SAFETY: ucontext_t is plain old data, all-zeroes is a valid bit pattern
        let uc = unsafe { MaybeUninit::<libc::ucontext_t>::zeroed().assume_init() };
        Self {
            uc: Box::new(UnsafeCell::new(uc)),
        }
    }

    #[inline]
    fn as_ptr(&self) -> *mut libc::ucontext_t {
        self.uc.get()
    }

    /// Arrange for the next switch into this context to call `entry` on `stack`
    ///
    /// # Safety
    /// `stack` must outlive every use of this context, and `entry` must never
    /// return (it has no successor context).
    pub unsafe fn prepare(&self, stack: &OsStack, entry: Entry) -> io::Result<()> {
        let uc = self.as_ptr();
        if libc::getcontext(uc) != 0 {
            return Err(io::Error::last_os_error());
        }
        (*uc).uc_stack.ss_sp = stack.limit() as *mut libc::c_void;
        (*uc).uc_stack.ss_size = stack.size();
        (*uc).uc_stack.ss_flags = 0;
        (*uc).uc_link = ptr::null_mut();
        libc::makecontext(uc, entry, 0);
        Ok(())
    }

    /// Stack pointer recorded the last time this context was saved
    pub fn stack_pointer(&self) -> *const u8 {
        // SAFETY: the box is live for as long as `self`
        unsafe { saved_sp(&*self.as_ptr()) }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_arch = "x86_64")]
fn saved_sp(uc: &libc::ucontext_t) -> *const u8 {
    uc.uc_mcontext.gregs[libc::REG_RSP as usize] as usize as *const u8
}

#[cfg(target_arch = "aarch64")]
fn saved_sp(uc: &libc::ucontext_t) -> *const u8 {
    uc.uc_mcontext.sp as usize as *const u8
}

/// Save the current flow into `from` and continue in `to`
///
/// Returns once something switches back into `from`.
///
/// # Safety
/// `to` must hold a context that was prepared or saved earlier and whose
/// stack contents are intact.
#[inline(never)]
pub unsafe fn swap(from: &Context, to: &Context) -> io::Result<()> {
    if libc::swapcontext(from.as_ptr(), to.as_ptr()) != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Continue in `to` without saving the current flow
///
/// Only returns if the switch failed.
///
/// # Safety
/// Same as [`swap`]; in addition nothing left on the current stack may be
/// needed again.
pub unsafe fn jump(to: &Context) -> io::Error {
    libc::setcontext(to.as_ptr());
    io::Error::last_os_error()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    thread_local! {
        static HOST: Context = Context::new();
        static GUEST: Context = Context::new();
        static HITS: Cell<u32> = const { Cell::new(0) };
    }

    extern "C" fn bounce() {
        loop {
            HITS.with(|h| h.set(h.get() + 1));
            GUEST.with(|guest| HOST.with(|host| unsafe { swap(guest, host) }.unwrap()));
        }
    }

    #[test]
    fn test_swap_round_trips() {
        let stack = OsStack::new(64 * 1024).unwrap();
        GUEST.with(|guest| unsafe { guest.prepare(&stack, bounce) }.unwrap());

        for expected in 1..=3 {
            HOST.with(|host| GUEST.with(|guest| unsafe { swap(host, guest) }.unwrap()));
            assert_eq!(HITS.with(Cell::get), expected);
        }

        // The guest parked itself inside `stack`.
        let sp = GUEST.with(|guest| guest.stack_pointer());
        assert!(stack.contains(sp));
    }
}

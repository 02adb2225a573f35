//! Guarded stacks backed by anonymous memory mappings
//!
//! Both context strategies run routines on an `OsStack`: the dedicated
//! strategy maps one per routine, the shared-stack strategy maps exactly one
//! per ordinator. The lowest page is a guard page, so running off the end
//! faults instead of silently scribbling over a neighbour.

use coroutine_common::config::MIN_STACK_SIZE;
use std::io;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

/// Get the system page size (cached after the first call)
pub fn page_size() -> usize {
    match PAGE_SIZE.load(Ordering::Relaxed) {
        0 => {
            // SAFETY: sysconf has no preconditions
            let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
            PAGE_SIZE.store(size, Ordering::Relaxed);
            size
        }
        size => size,
    }
}

/// A stack with one guard page below its usable region
#[derive(Debug)]
pub struct OsStack {
    ptr: *mut u8,
    len: usize,
}

impl OsStack {
    /// Map a new stack with at least `size` usable bytes
    ///
    /// `size` is clamped to `MIN_STACK_SIZE` and rounded up to whole pages;
    /// one extra page is mapped underneath and made inaccessible.
    pub fn new(size: usize) -> io::Result<Self> {
        let page = page_size();
        // Page size is a power of two.
        let len = size
            .max(MIN_STACK_SIZE)
            .checked_add(page - 1)
            .map(|usable| usable & !(page - 1))
            .and_then(|usable| usable.checked_add(page))
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "stack size overflows"))?;

        // SAFETY: anonymous private mapping, no file descriptor involved
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_STACK,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        // From here on `stack` unmaps on drop, including the error path below.
        let stack = Self {
            ptr: ptr as *mut u8,
            len,
        };

        // SAFETY: the first page lies inside the mapping we just created
        if unsafe { libc::mprotect(ptr, page, libc::PROT_NONE) } != 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(stack)
    }

    /// Highest address of the stack (stacks grow downwards)
    #[inline]
    pub fn top(&self) -> *mut u8 {
        // SAFETY: one past the end of the mapping
        unsafe { self.ptr.add(self.len) }
    }

    /// Lowest usable address, just above the guard page
    #[inline]
    pub fn limit(&self) -> *mut u8 {
        // SAFETY: the mapping is always larger than one page
        unsafe { self.ptr.add(page_size()) }
    }

    /// Usable size in bytes
    #[inline]
    pub fn size(&self) -> usize {
        self.len - page_size()
    }

    /// Check whether `addr` lies within the usable region
    #[inline]
    pub fn contains(&self, addr: *const u8) -> bool {
        (self.limit() as *const u8) <= addr && addr <= (self.top() as *const u8)
    }
}

impl Drop for OsStack {
    fn drop(&mut self) {
        // SAFETY: ptr/len describe exactly the mapping created in `new`
        if unsafe { libc::munmap(self.ptr as *mut libc::c_void, self.len) } != 0 {
            warn!(
                error = %io::Error::last_os_error(),
                "failed to unmap routine stack"
            );
        }
    }
}

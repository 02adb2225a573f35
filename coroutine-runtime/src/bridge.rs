//! Await bridge: run blocking work on an OS thread without stalling routines
//!
//! The calling routine hands `f` to a fresh worker thread and then polls for
//! the result, yielding to its scheduler between polls so sibling routines
//! keep running. Called from the scheduler flow there is nothing to yield
//! to, so the caller simply blocks on the worker.

use crate::error::{Error, Result};
use crate::ordinator::{active_poll_interval, yield_now};
use coroutine_common::config::{AWAIT_THREAD_NAME, DEFAULT_POLL_INTERVAL_MS};
use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Result slot shared between the caller and its worker
struct Handoff<R> {
    result: Mutex<Option<thread::Result<R>>>,
    ready: Condvar,
}

impl<R> Handoff<R> {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    fn complete(&self, result: thread::Result<R>) {
        *self.result.lock() = Some(result);
        self.ready.notify_one();
    }

    /// Wait up to `interval` for the worker to finish
    fn poll(&self, interval: Duration) -> Option<thread::Result<R>> {
        let mut result = self.result.lock();
        if result.is_none() {
            self.ready.wait_for(&mut result, interval);
        }
        result.take()
    }
}

/// Run `f` on a worker thread and return its value
///
/// Inside a routine, the routine is suspended between polls and only comes
/// back when its scheduler resumes it; a routine that is never resumed again
/// never observes the result. Outside a routine the calling thread waits for
/// the worker directly.
///
/// If `f` panics, the panic is resumed on the calling flow once observed.
pub fn await_blocking<F, R>(f: F) -> Result<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let handoff = Arc::new(Handoff::new());
    let worker = {
        let handoff = Arc::clone(&handoff);
        thread::Builder::new()
            .name(AWAIT_THREAD_NAME.to_string())
            .spawn(move || handoff.complete(panic::catch_unwind(AssertUnwindSafe(f))))
            .map_err(Error::Spawn)?
    };

    let in_routine = active_poll_interval();
    let interval = in_routine.unwrap_or(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS));
    debug!(?interval, in_routine = in_routine.is_some(), "awaiting worker");

    let mut polls = 0u64;
    let result = loop {
        if let Some(result) = handoff.poll(interval) {
            break result;
        }
        polls += 1;
        trace!(polls, "await worker still busy");
        if in_routine.is_some() {
            yield_now();
        }
    };

    // The worker has stored its result; nothing left for it to do but exit.
    if worker.join().is_err() {
        warn!("await worker panicked after handing off its result");
    }
    debug!(polls, "await worker finished");

    match result {
        Ok(value) => Ok(value),
        Err(payload) => panic::resume_unwind(payload),
    }
}

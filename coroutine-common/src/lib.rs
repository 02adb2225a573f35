// SPDX-License-Identifier: GPL-2.0-only
// Copyright (C) 2024 Ankit Kumar Pandey <ankitkpandey1@gmail.com>

//! # coroutine-common
//!
//! Shared types for the cooperative coroutine runtime and its tooling.
//!
//! ## Design Principles
//!
//! - **Thread-scoped**: Nothing in here names a thread; routines never migrate
//! - **Plain data**: Types are `Copy` and carry no pointers
//! - **`no_std`**: Usable from benchmarks and tests without pulling the runtime

#![no_std]

use core::fmt;

// ============================================================================
// Routine Lifecycle State Machine
// ============================================================================

/// Routine lifecycle state
///
/// State transitions:
/// ```text
/// CREATED → RUNNING → FINISHED
///              ↑  ↓
///           SUSPENDED
/// ```
///
/// Rules:
/// - Exactly one routine per thread may be RUNNING
/// - Only CREATED and SUSPENDED routines can be resumed
/// - FINISHED is terminal; the routine can only be destroyed
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoutineState {
    /// Routine allocated, callable not started yet
    #[default]
    Created = 0,

    /// Routine is the one executing on this thread
    Running = 1,

    /// Routine started and yielded back to the scheduler
    Suspended = 2,

    /// Callable returned (or panicked)
    Finished = 3,
}

impl RoutineState {
    /// Check if `resume` may transfer control into a routine in this state
    #[inline]
    pub fn is_resumable(self) -> bool {
        matches!(self, RoutineState::Created | RoutineState::Suspended)
    }

    /// Check if the routine has completed
    #[inline]
    pub fn is_finished(self) -> bool {
        matches!(self, RoutineState::Finished)
    }

    /// Check if the routine has run at least once
    #[inline]
    pub fn has_started(self) -> bool {
        !matches!(self, RoutineState::Created)
    }
}

impl fmt::Display for RoutineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoutineState::Created => "created",
            RoutineState::Running => "running",
            RoutineState::Suspended => "suspended",
            RoutineState::Finished => "finished",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Configuration constants
// ============================================================================

/// Configuration constants
pub mod config {
    /// Default size of a dedicated per-routine stack (1MB)
    pub const DEFAULT_STACK_SIZE: usize = 1024 * 1024;

    /// Default size of the stack shared by all routines of one ordinator (1MB)
    pub const DEFAULT_SHARED_STACK_SIZE: usize = 1024 * 1024;

    /// Smallest stack the runtime will map, guard page excluded (16KB)
    ///
    /// Panic unwinding needs roughly this much headroom.
    pub const MIN_STACK_SIZE: usize = 16 * 1024;

    /// Interval at which `await` polls its worker (10ms)
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

    /// Name given to `await` worker threads
    pub const AWAIT_THREAD_NAME: &str = "coroutine-await";
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_default() {
        assert_eq!(RoutineState::default(), RoutineState::Created);
    }

    #[test]
    fn test_state_resumable() {
        assert!(RoutineState::Created.is_resumable());
        assert!(RoutineState::Suspended.is_resumable());
        assert!(!RoutineState::Running.is_resumable());
        assert!(!RoutineState::Finished.is_resumable());
    }

    #[test]
    fn test_state_started() {
        assert!(!RoutineState::Created.has_started());
        assert!(RoutineState::Running.has_started());
        assert!(RoutineState::Suspended.has_started());
        assert!(RoutineState::Finished.has_started());
        assert!(RoutineState::Finished.is_finished());
        assert!(!RoutineState::Suspended.is_finished());
    }

    #[test]
    fn test_config_sanity() {
        assert!(config::MIN_STACK_SIZE <= config::DEFAULT_STACK_SIZE);
        assert!(config::MIN_STACK_SIZE <= config::DEFAULT_SHARED_STACK_SIZE);
        assert!(config::DEFAULT_POLL_INTERVAL_MS > 0);
    }
}

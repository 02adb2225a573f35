//! Error types for the coroutine runtime

use crate::routine::RoutineId;
use thiserror::Error;

/// Alias for `Result<T, Error>`
pub type Result<T> = std::result::Result<T, Error>;

/// Coroutine runtime errors
///
/// These are the recoverable outcomes. Misuse that would corrupt execution
/// state (resuming from inside a routine, yielding outside one) panics instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Identifier was never issued or its routine was destroyed
    #[error("{0} not found")]
    NotFound(RoutineId),

    /// Routine already ran to completion
    #[error("{0} has already finished")]
    AlreadyFinished(RoutineId),

    /// Identifier was issued by a different ordinator
    #[error("{0} belongs to another ordinator")]
    Foreign(RoutineId),

    /// Routine is the one currently executing
    #[error("{0} is currently running")]
    Running(RoutineId),

    /// Failed to map or protect a stack
    #[error("stack allocation failed: {0}")]
    Stack(#[source] std::io::Error),

    /// getcontext/swapcontext reported a failure
    #[error("context switch failed: {0}")]
    Context(#[source] std::io::Error),

    /// Failed to start the await worker thread
    #[error("failed to spawn await worker: {0}")]
    Spawn(#[source] std::io::Error),
}

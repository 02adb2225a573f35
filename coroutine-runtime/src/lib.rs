//! # Coroutine Runtime
//!
//! Per-thread cooperative coroutines with explicit transfer of control.
//!
//! Each thread owns an ordinator that creates routines, resumes them and
//! takes control back when they yield. Exactly one flow runs at a time: the
//! scheduler flow (whoever calls [`resume`]) or one routine. Nothing is ever
//! preempted; a routine runs until it calls [`yield_now`] or returns.
//!
//! ## Key Components
//!
//! - **Ordinator**: Owns routines, hands out ids, performs every switch
//! - **Strategy**: Where routine stacks live ([`SharedStack`] or [`Dedicated`])
//! - **Await bridge**: [`await_blocking`] runs blocking work on an OS thread
//!   while the calling routine keeps yielding
//!
//! ## Usage
//!
//! ```rust,no_run
//! use coroutine_runtime::{create, resume, yield_now, RoutineState};
//!
//! let id = create(|| {
//!     for step in 0..3 {
//!         println!("step {step}");
//!         yield_now();
//!     }
//! });
//!
//! while resume(id).unwrap() != RoutineState::Finished {}
//! ```
//!
//! ## Blocking Work
//!
//! ```rust,no_run
//! use coroutine_runtime::{await_blocking, create, resume};
//!
//! let id = create(|| {
//!     let body = await_blocking(|| std::fs::read_to_string("/etc/hostname")).unwrap();
//!     println!("{body:?}");
//! });
//!
//! // Siblings would run in between; here we just spin the one routine.
//! while !resume(id).unwrap().is_finished() {}
//! ```

mod bridge;
pub mod config;
pub mod context;
pub mod error;
pub mod ordinator;
pub mod routine;
pub mod stack;
pub mod stats;
pub mod strategy;

pub use bridge::await_blocking;
pub use config::{Builder, Config};
pub use error::{Error, Result};
pub use ordinator::{
    create, current_routine, destroy, resume, with_ordinator, yield_now, Ordinator,
};
pub use routine::RoutineId;
pub use stats::Stats;
pub use strategy::{Dedicated, DefaultStrategy, SharedStack, Strategy};

/// Re-export common types
pub use coroutine_common::RoutineState;

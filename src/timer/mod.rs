//! Timer scheduler and worker substrate.
//!
//! - **Workers**: [`Worker`] is a logical execution context (one job at a
//!   time, submission order); [`WorkerPool`] hands them out round-robin
//! - **Timer sources**: [`TimerStream`] one-shot and periodic sources whose
//!   firings always run on the worker they were created for
//! - **Scheduler**: [`Scheduler`] id-addressed facade over timer sources
//! - **Failures**: [`FailureSink`] receives panics contained at callback
//!   boundaries
//!
//! # Architecture
//!
//! ```text
//!   any task ── arm / cancel ──► TimerStream ── clock (tokio task)
//!                                                   │ expiry
//!                                                   ▼
//!                                 Worker queue ──► handler(TimerId)
//! ```
//!
//! Arming is safe from any context; firing always happens on the bound worker.

mod failure;
mod scheduler;
mod stream;
mod worker;

pub use failure::{CallbackFailure, FailureSink};
pub use scheduler::Scheduler;
pub use stream::{TimerId, TimerKind, TimerState, TimerStream};
pub use worker::{Worker, WorkerId, WorkerPool};

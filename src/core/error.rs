//! Error types for sockjs-core.

use thiserror::Error;

/// Errors raised by timer sources and workers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// A handler is already attached; detach it first.
    #[error("a handler is already attached to this timer")]
    HandlerAlreadySet,

    /// The source fired its last time or was cancelled.
    #[error("timer is retired")]
    Retired,

    /// The worker the source is bound to no longer accepts jobs.
    #[error("worker stopped")]
    WorkerStopped,
}

/// Errors raised by session operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The session is closing or closed.
    #[error("session closed")]
    Closed,

    /// The host-imposed outbound queue cap was reached.
    #[error("outbound queue full ({cap} messages)")]
    QueueFull {
        /// Configured cap.
        cap: usize,
    },

    /// The session's worker no longer accepts jobs.
    #[error("session worker stopped")]
    WorkerStopped,
}

/// A leg refused a frame because its HTTP exchange already ended.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("leg closed")]
pub struct LegClosed;

/// Top-level sockjs-core errors.
#[derive(Debug, Error)]
pub enum SockJsError {
    /// Timer error.
    #[error("timer error: {0}")]
    Timer(#[from] TimerError),

    /// Session error.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Leg error.
    #[error("leg error: {0}")]
    Leg(#[from] LegClosed),

    /// Transport error.
    #[cfg(feature = "transport")]
    #[error("transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),
}

/// Result type for sockjs-core operations.
pub type SockJsResult<T> = Result<T, SockJsError>;

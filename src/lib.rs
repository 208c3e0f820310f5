//! # sockjs-core
//!
//! Session core for WebSocket-equivalent duplex messaging over plain HTTP.
//!
//! Clients that cannot hold a persistent socket talk through a series of
//! short-lived HTTP exchanges ("legs"). This crate multiplexes those legs
//! onto one long-lived logical session:
//!
//! - **Sessions**: survive leg churn, buffer output while no leg is attached,
//!   heartbeat attached legs, and expire when idle
//! - **Workers**: every session is bound to one logical worker; its
//!   transitions and timer firings run there, in order, without contention
//! - **Timers**: one-shot and periodic sources that always fire on the worker
//!   they were created for
//! - **Codec**: cheap decoding of client batches and encoding of the fixed
//!   protocol frames
//!
//! ## Feature Flags
//!
//! - `transport` (default): HTTP-facing helpers (CORS, sticky cookie,
//!   preflight, inbound frame handling, session path parsing)
//!
//! ## Modules
//!
//! - [`core`]: Leg trait, constants, and error types (always included)
//! - [`timer`]: Workers, timer sources, and the scheduler
//! - [`codec`]: Frame decoding and encoding
//! - [`session`]: Sessions, the registry, and the application socket
//! - [`transport`]: Transport adapter contract (requires `transport` feature)
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sockjs_core::prelude::*;
//!
//! # async fn run() {
//! let registry = SessionRegistry::new(WorkerPool::new(4, FailureSink::logging()));
//!
//! let echo: OpenHandler = Arc::new(|socket: SockJsSocket| {
//!     let out = socket.clone();
//!     socket.on_message(move |msg| {
//!         let _ = out.write(msg);
//!     });
//! });
//!
//! let session = registry.get_or_create("abc", &SessionOptions::default(), Some(echo));
//! let (leg, mut frames) = ChannelLeg::channel();
//! session.attach_leg(leg).unwrap();
//!
//! while let Some(LegEvent::Frame(frame)) = frames.recv().await {
//!     println!("{frame}");
//! }
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Worker and timer substrate
pub mod timer;

// Frame codec
pub mod codec;

// Sessions and registry
pub mod session;

// Transport adapter contract (feature-gated)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod transport;

/// Prelude module for convenient imports.
pub mod prelude {
    // Core traits and types
    pub use crate::core::*;

    pub use crate::codec::{Frame, check_json, parse_message_string};
    pub use crate::session::{
        LegId, OpenHandler, Session, SessionOptions, SessionRegistry, SessionState, SockJsSocket,
    };
    pub use crate::timer::{
        FailureSink, Scheduler, TimerId, TimerState, TimerStream, Worker, WorkerPool,
    };

    // Transport types (when enabled)
    #[cfg(feature = "transport")]
    pub use crate::transport::{
        AppConfig, BaseTransport, ChannelLeg, LegEvent, ResponseSink, SessionPath, TransportError,
        TransportKind,
    };
}

// Re-export commonly used items at crate root
pub use crate::core::{Leg, LegClosed, SessionError, SockJsError, SockJsResult, TimerError};
pub use crate::session::{Session, SessionRegistry, SockJsSocket};

#[cfg(feature = "transport")]
pub use crate::transport::{AppConfig, BaseTransport, TransportError};

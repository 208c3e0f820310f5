//! Transport adapter contract.
//!
//! Everything a concrete transport (polling, streaming, websocket) shares:
//!
//! - **Configuration**: [`AppConfig`], loadable from JSON
//! - **Responses**: [`ResponseSink`] over the host's HTTP response
//! - **Headers**: CORS, the `JSESSIONID` sticky cookie, preflight answers
//! - **Inbound frames**: [`BaseTransport`] validates, decodes and delivers
//! - **Routing input**: [`SessionPath`] extracts the session id and transport
//! - **Legs**: [`ChannelLeg`] streams frames to the host over a channel
//!
//! # Architecture
//!
//! ```text
//!   HTTP host ── request ──► SessionPath ──► BaseTransport ──► SessionRegistry
//!       ▲                                         │
//!       └──── ResponseSink / ChannelLeg ◄─────── Session
//! ```
//!
//! The listener, routing and per-transport body encodings belong to the host.

mod base;
mod config;
mod error;
mod headers;
mod leg;
mod path;
mod response;

pub use base::BaseTransport;
pub use config::AppConfig;
pub use error::TransportError;
pub use headers::{
    reject_broken_json, set_cors, set_cors_from_request, set_jsessionid, write_preflight,
};
pub use leg::{ChannelLeg, LegEvent};
pub use path::{SessionPath, TransportKind};
pub use response::ResponseSink;

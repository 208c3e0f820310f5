//! Sessions and the session registry.
//!
//! - [`Session`]: per-id state machine surviving leg churn
//! - [`SessionRegistry`]: id → live session, with race-free get-or-create
//! - [`SockJsSocket`]: the duplex handle handed to the application on open

mod registry;
#[allow(clippy::module_inception)]
mod session;
mod socket;

pub use registry::SessionRegistry;
pub use session::{LegId, OpenHandler, Session, SessionOptions, SessionState};
pub use socket::SockJsSocket;

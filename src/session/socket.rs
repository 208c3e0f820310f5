//! Application-facing duplex handle.

use std::fmt;
use std::sync::Arc;

use super::session::Session;
use crate::core::SessionError;

/// What the application sees once a session opens.
///
/// Inbound messages arrive through [`on_message`](Self::on_message);
/// [`write`](Self::write) sends, buffering while no leg is attached.
#[derive(Clone)]
pub struct SockJsSocket {
    session: Session,
}

impl fmt::Debug for SockJsSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SockJsSocket")
            .field("session_id", &self.session.id())
            .finish()
    }
}

impl SockJsSocket {
    pub(crate) fn new(session: Session) -> Self {
        Self { session }
    }

    /// Id of the underlying session.
    pub fn session_id(&self) -> &str {
        self.session.id()
    }

    /// The underlying session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Send a message to the client.
    pub fn write(&self, message: impl Into<String>) -> Result<(), SessionError> {
        self.session.send(message)
    }

    /// Close the session.
    pub fn close(&self) -> Result<(), SessionError> {
        self.session.close()
    }

    /// Receive decoded inbound messages, in order, on the session's worker.
    ///
    /// Replaces any previous handler.
    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.session.set_message_handler(Arc::new(handler));
    }

    /// Run `handler` once, on the session's worker, when the session closes.
    ///
    /// Registered after the session started closing, it still runs, queued
    /// behind the shutdown.
    pub fn on_close<F>(&self, handler: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.session.on_close(handler);
    }
}

//! Core traits for sockjs-core.
//!
//! These traits define the seam between the session core and the HTTP host.

use super::error::LegClosed;

/// One physical HTTP exchange carrying frames for a session.
///
/// A concrete transport (polling, streaming, websocket, ...) wraps its response
/// in a `Leg` and hands it to [`Session::attach_leg`]. The session owns the leg
/// exclusively until it detaches or is displaced.
///
/// # Requirements
///
/// - `write_frame` MUST NOT block; it runs on the session's worker.
/// - Neither method may call back synchronously into the owning session.
/// - `write_frame` returns [`LegClosed`] once the exchange has ended, so the
///   session can keep the frame's messages for the next leg.
///
/// # Example
///
/// ```ignore
/// struct PollLeg { body: Option<String> }
///
/// impl Leg for PollLeg {
///     fn write_frame(&mut self, frame: &str) -> Result<(), LegClosed> {
///         match self.body {
///             None => { self.body = Some(format!("{frame}\n")); Ok(()) }
///             Some(_) => Err(LegClosed),
///         }
///     }
///
///     fn close(&mut self) {}
/// }
/// ```
///
/// [`Session::attach_leg`]: crate::session::Session::attach_leg
pub trait Leg: Send + 'static {
    /// Write one encoded frame to the exchange.
    fn write_frame(&mut self, frame: &str) -> Result<(), LegClosed>;

    /// End the exchange. Called after a close frame, or when another leg
    /// takes over.
    fn close(&mut self);
}

impl<L: Leg + ?Sized> Leg for Box<L> {
    fn write_frame(&mut self, frame: &str) -> Result<(), LegClosed> {
        (**self).write_frame(frame)
    }

    fn close(&mut self) {
        (**self).close();
    }
}

//! Per-id session state machine.
//!
//! A session survives leg churn: it buffers output while no leg is attached,
//! flushes the buffer to the next leg, keeps an attached leg alive with
//! heartbeats, and expires if no leg comes back within its timeout.
//!
//! ```text
//!   create ──► Connecting ──attach──► Open ──detach──► Connecting
//!                  │                   │
//!                  │ timeout           │ close
//!                  ▼                   ▼
//!               Closing ──────────► Closed
//! ```
//!
//! Every operation is posted to the session's [`Worker`]; transitions run
//! there, one at a time, in submission order. Heartbeat and timeout timers are
//! bound to the same worker.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use super::socket::SockJsSocket;
use crate::codec::{Frame, encode_batch, parse_message_string};
use crate::core::constants::{DEFAULT_HEARTBEAT_PERIOD, DEFAULT_SESSION_TIMEOUT, OPEN_FRAME};
use crate::core::{Leg, SessionError};
use crate::timer::{TimerStream, Worker, WorkerId};

/// Invoked with the application handle when a session sees its first leg.
pub type OpenHandler = Arc<dyn Fn(SockJsSocket) + Send + Sync + 'static>;

pub(crate) type MessageHandler = Arc<dyn Fn(String) + Send + Sync + 'static>;
pub(crate) type CloseHandler = Box<dyn FnOnce() + Send + 'static>;
pub(crate) type CloseCallback = Box<dyn FnOnce(&Session) + Send + 'static>;

// =============================================================================
// STATE
// =============================================================================

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// No leg attached; output buffers.
    Connecting = 0,
    /// A leg is attached and flowing.
    Open = 1,
    /// Close initiated.
    Closing = 2,
    /// Terminal.
    Closed = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Connecting,
            1 => SessionState::Open,
            2 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }

    /// Whether the session is closing or closed.
    pub fn is_terminating(self) -> bool {
        matches!(self, SessionState::Closing | SessionState::Closed)
    }
}

/// Identifies one attach of a leg to a session.
///
/// Ids increase per session, so a late detach from a displaced leg can be
/// told apart from a detach of the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LegId(u64);

impl LegId {
    /// Numeric value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LegId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "leg-{}", self.0)
    }
}

// =============================================================================
// OPTIONS
// =============================================================================

/// Per-session timing and limits, fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// How long the session may sit without a leg.
    pub timeout: Duration,
    /// Interval between heartbeat frames on an attached leg.
    pub heartbeat_period: Duration,
    /// Outbound queue cap; `None` means unbounded.
    pub max_queued: Option<usize>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_SESSION_TIMEOUT,
            heartbeat_period: DEFAULT_HEARTBEAT_PERIOD,
            max_queued: None,
        }
    }
}

impl SessionOptions {
    /// Set the idle timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the heartbeat period.
    pub fn with_heartbeat_period(mut self, period: Duration) -> Self {
        self.heartbeat_period = period;
        self
    }

    /// Cap the outbound queue.
    pub fn with_max_queued(mut self, cap: usize) -> Self {
        self.max_queued = Some(cap);
        self
    }
}

// =============================================================================
// SESSION
// =============================================================================

struct ActiveLeg {
    id: LegId,
    leg: Box<dyn Leg>,
}

/// Locked only by jobs running on the session's worker.
struct SessionCore {
    queue: VecDeque<String>,
    leg: Option<ActiveLeg>,
    heartbeat: Option<TimerStream>,
    timeout: Option<TimerStream>,
    opened: bool,
    open_frame_sent: bool,
    message_handler: Option<MessageHandler>,
    close_handlers: Vec<CloseHandler>,
    close_callback: Option<CloseCallback>,
}

struct SessionInner {
    id: String,
    worker: Worker,
    options: SessionOptions,
    lifecycle: AtomicU8,
    next_leg: AtomicU64,
    /// Mirrors `core.queue.len()`.
    queued: AtomicUsize,
    created: Instant,
    /// Last activity, in milliseconds since `created`.
    activity_ms: AtomicU64,
    on_open: Option<OpenHandler>,
    core: Mutex<SessionCore>,
}

/// A logical session. Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("worker", &self.inner.worker.id())
            .finish()
    }
}

impl Session {
    /// Create a session bound to `worker` and arm its timeout.
    ///
    /// `on_open` runs once, when the first leg attaches.
    ///
    /// # Panics
    ///
    /// Arming the timeout spawns a Tokio task; panics outside a Tokio runtime.
    pub fn new(
        id: impl Into<String>,
        worker: &Worker,
        options: SessionOptions,
        on_open: Option<OpenHandler>,
    ) -> Self {
        Self::create(id.into(), worker, options, on_open, None)
    }

    pub(crate) fn create(
        id: String,
        worker: &Worker,
        options: SessionOptions,
        on_open: Option<OpenHandler>,
        close_callback: Option<CloseCallback>,
    ) -> Self {
        let inner = Arc::new_cyclic(|session: &Weak<SessionInner>| {
            let timeout = TimerStream::one_shot(options.timeout, worker);
            bind_timer(&timeout, session.clone(), &id, SessionInner::expire);
            SessionInner {
                id,
                worker: worker.clone(),
                options,
                lifecycle: AtomicU8::new(SessionState::Connecting as u8),
                next_leg: AtomicU64::new(1),
                queued: AtomicUsize::new(0),
                created: Instant::now(),
                activity_ms: AtomicU64::new(0),
                on_open,
                core: Mutex::new(SessionCore {
                    queue: VecDeque::new(),
                    leg: None,
                    heartbeat: None,
                    timeout: Some(timeout),
                    opened: false,
                    open_frame_sent: false,
                    message_handler: None,
                    close_handlers: Vec::new(),
                    close_callback,
                }),
            }
        });
        debug!(session_id = %inner.id, worker_id = %worker.id(), "session created");
        Self { inner }
    }

    /// The session id.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    /// The worker this session's transitions run on.
    pub fn worker_id(&self) -> WorkerId {
        self.inner.worker.id()
    }

    /// Time since the last leg attach, inbound batch, or leg loss.
    pub fn idle_time(&self) -> Duration {
        let last = Duration::from_millis(self.inner.activity_ms.load(Ordering::Acquire));
        self.inner.created.elapsed().saturating_sub(last)
    }

    /// Messages waiting for a leg, as of the last job the worker ran.
    pub fn queued(&self) -> usize {
        self.inner.queued.load(Ordering::Acquire)
    }

    /// Whether both handles refer to the same session.
    pub fn ptr_eq(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Offer a leg to the session.
    ///
    /// A leg already attached is told another connection took over and is
    /// closed. A leg offered to a closing or closed session is sent the
    /// go-away close frame and closed.
    pub fn attach_leg<L: Leg>(&self, leg: L) -> Result<LegId, SessionError> {
        let leg: Box<dyn Leg> = Box::new(leg);
        if self.state().is_terminating() {
            let session_id = self.inner.id.clone();
            self.post(move || go_away(&session_id, leg))?;
            return Err(SessionError::Closed);
        }
        let id = LegId(self.inner.next_leg.fetch_add(1, Ordering::Relaxed));
        let inner = self.inner.clone();
        self.post(move || inner.attach(id, leg))?;
        Ok(id)
    }

    /// The leg's HTTP exchange completed. Ignored unless `leg` is current.
    pub fn detach_leg(&self, leg: LegId) -> Result<(), SessionError> {
        let inner = self.inner.clone();
        self.post(move || inner.detach(leg))
    }

    /// Decode a client batch and deliver each message to the application.
    pub fn receive_batch(&self, batch: &str) -> Result<(), SessionError> {
        self.ensure_live()?;
        let messages = parse_message_string(batch);
        let inner = self.inner.clone();
        self.post(move || inner.deliver(messages))
    }

    /// Send a message to the client, buffering it while no leg is attached.
    pub fn send(&self, message: impl Into<String>) -> Result<(), SessionError> {
        self.ensure_live()?;
        if let Some(cap) = self.inner.options.max_queued {
            if self.queued() >= cap {
                return Err(SessionError::QueueFull { cap });
            }
        }
        let message = message.into();
        let inner = self.inner.clone();
        self.post(move || inner.enqueue(message))
    }

    /// Close the session: the attached leg gets the close frame, timers are
    /// cancelled, close handlers run once.
    pub fn close(&self) -> Result<(), SessionError> {
        self.ensure_live()?;
        let inner = self.inner.clone();
        self.post(move || inner.shutdown("closed by application"))
    }

    pub(crate) fn set_message_handler(&self, handler: MessageHandler) {
        let inner = self.inner.clone();
        self.run_on_worker(move || inner.core.lock().message_handler = Some(handler));
    }

    /// Run `handler` once, on the session's worker, when the session closes.
    ///
    /// Registered on a closing or closed session, it is queued to the worker
    /// behind the shutdown.
    pub fn on_close<F>(&self, handler: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.add_close_handler(Box::new(handler));
    }

    pub(crate) fn add_close_handler(&self, handler: CloseHandler) {
        if self.state().is_terminating() {
            self.inner.post_close_handler(handler);
            return;
        }
        let inner = self.inner.clone();
        self.run_on_worker(move || inner.register_close_handler(handler));
    }

    /// Apply a registration in place when already on the worker, so it takes
    /// effect before any job queued behind the current one; post it otherwise.
    fn run_on_worker<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.inner.worker.is_current() {
            job();
        } else if self.post(job).is_err() {
            debug!(session_id = %self.inner.id, "worker gone, registration dropped");
        }
    }

    fn ensure_live(&self) -> Result<(), SessionError> {
        if self.state().is_terminating() {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }

    fn post<F>(&self, job: F) -> Result<(), SessionError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner
            .worker
            .execute(job)
            .map_err(|_| SessionError::WorkerStopped)
    }
}

fn go_away(session_id: &str, mut leg: Box<dyn Leg>) {
    let _ = leg.write_frame(&Frame::go_away().encode());
    leg.close();
    debug!(session_id, "leg refused, session closed");
}

// =============================================================================
// TRANSITIONS (run on the session's worker)
// =============================================================================

impl SessionInner {
    fn state(&self) -> SessionState {
        SessionState::from_u8(self.lifecycle.load(Ordering::Acquire))
    }

    fn set_state(&self, state: SessionState) {
        self.lifecycle.store(state as u8, Ordering::Release);
    }

    /// Move to `Closing` unless already there. Returns whether this call did.
    fn begin_closing(&self) -> bool {
        let mut current = self.lifecycle.load(Ordering::Acquire);
        loop {
            if SessionState::from_u8(current).is_terminating() {
                return false;
            }
            match self.lifecycle.compare_exchange(
                current,
                SessionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    fn touch(&self) {
        let elapsed = u64::try_from(self.created.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.activity_ms.store(elapsed, Ordering::Release);
    }

    fn sync_queued(&self, core: &SessionCore) {
        self.queued.store(core.queue.len(), Ordering::Release);
    }

    fn register_close_handler(&self, handler: CloseHandler) {
        if self.state().is_terminating() {
            self.post_close_handler(handler);
        } else {
            self.core.lock().close_handlers.push(handler);
        }
    }

    /// Queue a late close handler as its own job so it never overlaps the
    /// shutdown that is running or has run.
    fn post_close_handler(&self, handler: CloseHandler) {
        let failures = self.worker.failures().clone();
        let context = format!("session {} on_close", self.id);
        let job = move || {
            let _ = failures.isolate(&context, handler);
        };
        if self.worker.execute(job).is_err() {
            debug!(session_id = %self.id, "worker gone, close handler dropped");
        }
    }

    fn handle(self: &Arc<Self>) -> Session {
        Session {
            inner: self.clone(),
        }
    }

    fn attach(self: &Arc<Self>, id: LegId, leg: Box<dyn Leg>) {
        if self.state().is_terminating() {
            go_away(&self.id, leg);
            return;
        }

        let first = {
            let mut core = self.core.lock();
            if let Some(mut displaced) = core.leg.take() {
                let _ = displaced
                    .leg
                    .write_frame(&Frame::another_connection().encode());
                displaced.leg.close();
                info!(
                    session_id = %self.id,
                    leg_id = %displaced.id,
                    "leg displaced by another connection"
                );
            }
            if let Some(timeout) = core.timeout.take() {
                timeout.cancel();
            }

            let first = !core.opened;
            core.opened = true;
            self.touch();
            core.leg = Some(ActiveLeg { id, leg });
            self.set_state(SessionState::Open);
            debug!(session_id = %self.id, leg_id = %id, first, "leg attached");

            if !core.open_frame_sent && self.write_to_leg(&mut core, OPEN_FRAME) {
                core.open_frame_sent = true;
            }
            self.flush(&mut core);
            self.sync_queued(&core);
            if core.leg.is_some() {
                self.arm_heartbeat(&mut core);
            }
            first
        };

        if first {
            if let Some(on_open) = &self.on_open {
                let socket = SockJsSocket::new(self.handle());
                let context = format!("session {} on_open", self.id);
                let _ = self.worker.failures().isolate(&context, || on_open(socket));
            }
        }
    }

    fn detach(self: &Arc<Self>, id: LegId) {
        let mut core = self.core.lock();
        if core.leg.as_ref().is_some_and(|active| active.id == id) {
            self.leg_lost(&mut core);
        } else {
            trace!(session_id = %self.id, leg_id = %id, "stale detach ignored");
        }
    }

    fn deliver(self: &Arc<Self>, messages: Vec<String>) {
        let handler = {
            let mut core = self.core.lock();
            if self.state().is_terminating() {
                debug!(session_id = %self.id, "inbound batch after close dropped");
                return;
            }
            self.touch();
            core.message_handler.clone()
        };
        let Some(handler) = handler else {
            let count = messages.len();
            debug!(session_id = %self.id, count, "no message handler, batch dropped");
            return;
        };

        let context = format!("session {} on_message", self.id);
        for message in messages {
            let _ = self
                .worker
                .failures()
                .isolate(&context, || handler(message));
        }
    }

    fn enqueue(self: &Arc<Self>, message: String) {
        let mut core = self.core.lock();
        if self.state().is_terminating() {
            debug!(session_id = %self.id, "send after close dropped");
            return;
        }
        if let Some(cap) = self.options.max_queued {
            if core.queue.len() >= cap {
                warn!(session_id = %self.id, cap, "outbound queue full, message dropped");
                return;
            }
        }
        core.queue.push_back(message);
        self.flush(&mut core);
        self.sync_queued(&core);
    }

    /// Write the whole queue as one batch frame to the attached leg.
    fn flush(self: &Arc<Self>, core: &mut SessionCore) {
        if core.queue.is_empty() || core.leg.is_none() {
            return;
        }
        let frame = encode_batch(core.queue.iter());
        if self.write_to_leg(core, &frame) {
            trace!(session_id = %self.id, count = core.queue.len(), "queue flushed");
            core.queue.clear();
        }
    }

    /// Returns `false` if there is no leg or it refused the frame; a refusing
    /// leg is dropped as if it had detached.
    fn write_to_leg(self: &Arc<Self>, core: &mut SessionCore, frame: &str) -> bool {
        let Some(active) = core.leg.as_mut() else {
            return false;
        };
        if active.leg.write_frame(frame).is_ok() {
            return true;
        }
        debug!(session_id = %self.id, leg_id = %active.id, "leg refused frame");
        self.leg_lost(core);
        false
    }

    fn leg_lost(self: &Arc<Self>, core: &mut SessionCore) {
        if let Some(active) = core.leg.take() {
            debug!(session_id = %self.id, leg_id = %active.id, "leg detached");
        }
        if let Some(heartbeat) = core.heartbeat.take() {
            heartbeat.cancel();
        }
        if self.state() == SessionState::Open {
            self.set_state(SessionState::Connecting);
            self.touch();
            self.arm_timeout(core);
        }
    }

    fn heartbeat(self: &Arc<Self>) {
        let mut core = self.core.lock();
        if self.state() != SessionState::Open {
            return;
        }
        if self.write_to_leg(&mut core, &Frame::Heartbeat.encode()) {
            trace!(session_id = %self.id, "heartbeat sent");
        }
    }

    fn expire(self: &Arc<Self>) {
        if self.state() != SessionState::Connecting {
            return;
        }
        info!(session_id = %self.id, timeout = ?self.options.timeout, "session timed out");
        self.shutdown("timed out");
    }

    fn shutdown(self: &Arc<Self>, reason: &str) {
        let (timers, leg, close_handlers, close_callback) = {
            let mut core = self.core.lock();
            if !self.begin_closing() {
                return;
            }
            core.queue.clear();
            self.sync_queued(&core);
            core.message_handler = None;
            (
                [core.heartbeat.take(), core.timeout.take()],
                core.leg.take(),
                std::mem::take(&mut core.close_handlers),
                core.close_callback.take(),
            )
        };

        for timer in timers.into_iter().flatten() {
            timer.cancel();
        }
        if let Some(mut active) = leg {
            let _ = active.leg.write_frame(&Frame::go_away().encode());
            active.leg.close();
        }

        let failures = self.worker.failures();
        let context = format!("session {} on_close", self.id);
        for handler in close_handlers {
            let _ = failures.isolate(&context, handler);
        }
        if let Some(callback) = close_callback {
            let session = self.handle();
            let _ = failures.isolate(&context, || callback(&session));
        }

        self.set_state(SessionState::Closed);
        info!(session_id = %self.id, reason, "session closed");
    }

    fn arm_timeout(self: &Arc<Self>, core: &mut SessionCore) {
        if let Some(previous) = core.timeout.take() {
            previous.cancel();
        }
        let timer = TimerStream::one_shot(self.options.timeout, &self.worker);
        bind_timer(&timer, Arc::downgrade(self), &self.id, SessionInner::expire);
        core.timeout = Some(timer);
    }

    fn arm_heartbeat(self: &Arc<Self>, core: &mut SessionCore) {
        if let Some(previous) = core.heartbeat.take() {
            previous.cancel();
        }
        let timer = TimerStream::periodic(self.options.heartbeat_period, &self.worker);
        bind_timer(&timer, Arc::downgrade(self), &self.id, SessionInner::heartbeat);
        core.heartbeat = Some(timer);
    }
}

/// Arm `timer` to run `f` on the session, if it is still alive.
fn bind_timer(
    timer: &TimerStream,
    session: Weak<SessionInner>,
    session_id: &str,
    f: fn(&Arc<SessionInner>),
) {
    let armed = timer.set_handler(move |_| {
        if let Some(inner) = session.upgrade() {
            f(&inner);
        }
    });
    if let Err(err) = armed {
        warn!(session_id, timer_id = %timer.id(), error = %err, "session timer not armed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use tokio::time;

    use crate::core::LegClosed;
    use crate::timer::FailureSink;

    /// Records frames; optionally refuses writes.
    #[derive(Clone, Default)]
    struct RecordingLeg {
        frames: Arc<Mutex<Vec<String>>>,
        closed: Arc<AtomicUsize>,
        refuse: bool,
    }

    impl RecordingLeg {
        fn refusing() -> Self {
            Self {
                refuse: true,
                ..Self::default()
            }
        }

        fn frames(&self) -> Vec<String> {
            self.frames.lock().clone()
        }

        fn closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst) > 0
        }
    }

    impl Leg for RecordingLeg {
        fn write_frame(&mut self, frame: &str) -> Result<(), LegClosed> {
            if self.refuse {
                return Err(LegClosed);
            }
            self.frames.lock().push(frame.to_string());
            Ok(())
        }

        fn close(&mut self) {
            let _ = self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn options() -> SessionOptions {
        SessionOptions::default()
            .with_timeout(Duration::from_secs(10))
            .with_heartbeat_period(Duration::from_secs(5))
    }

    fn worker() -> Worker {
        Worker::spawn(FailureSink::logging())
    }

    #[tokio::test(start_paused = true)]
    async fn first_attach_writes_open_frame_and_opens() {
        let worker = worker();
        let session = Session::new("s1", &worker, options(), None);
        assert_eq!(session.state(), SessionState::Connecting);

        let leg = RecordingLeg::default();
        session.attach_leg(leg.clone()).unwrap();
        worker.barrier().await.unwrap();

        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(leg.frames(), vec!["o"]);
    }

    #[tokio::test(start_paused = true)]
    async fn send_while_attached_writes_immediately() {
        let worker = worker();
        let session = Session::new("s1", &worker, options(), None);
        let leg = RecordingLeg::default();
        session.attach_leg(leg.clone()).unwrap();
        session.send("hello").unwrap();
        worker.barrier().await.unwrap();

        assert_eq!(leg.frames(), vec!["o", r#"a["hello"]"#]);
        assert_eq!(session.queued(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn buffered_messages_flush_as_one_batch() {
        let worker = worker();
        let session = Session::new("s1", &worker, options(), None);
        session.send("m1").unwrap();
        session.send("m2").unwrap();
        worker.barrier().await.unwrap();
        assert_eq!(session.queued(), 2);

        let leg = RecordingLeg::default();
        session.attach_leg(leg.clone()).unwrap();
        worker.barrier().await.unwrap();

        assert_eq!(leg.frames(), vec!["o", r#"a["m1","m2"]"#]);
        assert_eq!(session.queued(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn detach_returns_to_connecting_and_rearms_timeout() {
        let worker = worker();
        let session = Session::new("s1", &worker, options(), None);
        let leg = session.attach_leg(RecordingLeg::default()).unwrap();
        worker.barrier().await.unwrap();

        // Longer than the timeout while attached: nothing expires.
        time::sleep(Duration::from_secs(15)).await;
        worker.barrier().await.unwrap();
        assert_eq!(session.state(), SessionState::Open);

        session.detach_leg(leg).unwrap();
        worker.barrier().await.unwrap();
        assert_eq!(session.state(), SessionState::Connecting);

        time::sleep(Duration::from_secs(9)).await;
        worker.barrier().await.unwrap();
        assert_eq!(session.state(), SessionState::Connecting);

        time::sleep(Duration::from_secs(2)).await;
        worker.barrier().await.unwrap();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_goes_to_attached_leg() {
        let worker = worker();
        let session = Session::new("s1", &worker, options(), None);
        let leg = RecordingLeg::default();
        session.attach_leg(leg.clone()).unwrap();
        worker.barrier().await.unwrap();

        time::sleep(Duration::from_millis(10_500)).await;
        worker.barrier().await.unwrap();

        assert_eq!(leg.frames(), vec!["o", "h", "h"]);
        assert_eq!(session.state(), SessionState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_detach_is_ignored() {
        let worker = worker();
        let session = Session::new("s1", &worker, options(), None);
        let first = session.attach_leg(RecordingLeg::default()).unwrap();
        let second = session.attach_leg(RecordingLeg::default()).unwrap();
        assert_ne!(first, second);

        session.detach_leg(first).unwrap();
        worker.barrier().await.unwrap();
        assert_eq!(session.state(), SessionState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn refused_write_keeps_messages_queued() {
        let worker = worker();
        let session = Session::new("s1", &worker, options(), None);
        session.attach_leg(RecordingLeg::refusing()).unwrap();
        session.send("kept").unwrap();
        worker.barrier().await.unwrap();

        assert_eq!(session.state(), SessionState::Connecting);
        assert_eq!(session.queued(), 1);

        // The open frame never reached a client, so it leads the next leg.
        let leg = RecordingLeg::default();
        session.attach_leg(leg.clone()).unwrap();
        worker.barrier().await.unwrap();
        assert_eq!(leg.frames(), vec!["o", r#"a["kept"]"#]);
    }

    #[tokio::test(start_paused = true)]
    async fn close_sends_go_away_and_runs_handlers_once() {
        let worker = worker();
        let callbacks = Arc::new(AtomicUsize::new(0));
        let callbacks2 = callbacks.clone();
        let session = Session::create(
            "s1".into(),
            &worker,
            options(),
            None,
            Some(Box::new(move |_| {
                callbacks2.fetch_add(1, Ordering::SeqCst);
            })),
        );
        let leg = RecordingLeg::default();
        session.attach_leg(leg.clone()).unwrap();
        session.close().unwrap();
        worker.barrier().await.unwrap();

        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(leg.frames(), vec!["o", r#"c[3000,"Go away!"]"#]);
        assert!(leg.closed());
        assert_eq!(session.close(), Err(SessionError::Closed));

        time::sleep(Duration::from_secs(60)).await;
        worker.barrier().await.unwrap();
        assert_eq!(callbacks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn operations_after_close_fail() {
        let worker = worker();
        let session = Session::new("s1", &worker, options(), None);
        session.close().unwrap();
        worker.barrier().await.unwrap();

        assert_eq!(session.send("late"), Err(SessionError::Closed));
        assert_eq!(session.receive_batch(r#"["x"]"#), Err(SessionError::Closed));

        let leg = RecordingLeg::default();
        assert_eq!(session.attach_leg(leg.clone()), Err(SessionError::Closed));
        worker.barrier().await.unwrap();
        assert_eq!(leg.frames(), vec![r#"c[3000,"Go away!"]"#]);
        assert!(leg.closed());
    }

    #[tokio::test(start_paused = true)]
    async fn queue_cap_rejects_extra_messages() {
        let worker = worker();
        let session = Session::new("s1", &worker, options().with_max_queued(2), None);
        session.send("a").unwrap();
        session.send("b").unwrap();
        worker.barrier().await.unwrap();

        assert_eq!(session.send("c"), Err(SessionError::QueueFull { cap: 2 }));
        assert_eq!(session.queued(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_time_tracks_activity() {
        let worker = worker();
        let session = Session::new("s1", &worker, options(), None);
        time::sleep(Duration::from_secs(3)).await;
        assert!(session.idle_time() >= Duration::from_secs(3));

        session.attach_leg(RecordingLeg::default()).unwrap();
        worker.barrier().await.unwrap();
        assert!(session.idle_time() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn late_close_handler_runs_on_the_session_worker() {
        let worker = worker();
        let session = Session::new("s1", &worker, options(), None);
        session.close().unwrap();
        worker.barrier().await.unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        session.on_close(move || seen2.lock().push(Worker::current()));
        assert!(seen.lock().is_empty());

        worker.barrier().await.unwrap();
        assert_eq!(*seen.lock(), vec![Some(worker.id())]);
    }

    #[tokio::test(start_paused = true)]
    async fn close_handler_registered_while_closing_runs_after_the_others() {
        let worker = worker();
        let session = Session::new("s1", &worker, options(), None);
        let order = Arc::new(Mutex::new(Vec::new()));

        let (order2, handle) = (order.clone(), session.clone());
        session.on_close(move || {
            order2.lock().push("first");
            let order3 = order2.clone();
            handle.on_close(move || order3.lock().push("late"));
            order2.lock().push("first done");
        });
        session.close().unwrap();
        worker.barrier().await.unwrap();
        worker.barrier().await.unwrap();

        assert_eq!(*order.lock(), vec!["first", "first done", "late"]);
    }

    /// Blocks its first write until released.
    struct GatedLeg {
        gate: Option<(std::sync::mpsc::Sender<()>, std::sync::mpsc::Receiver<()>)>,
    }

    impl Leg for GatedLeg {
        fn write_frame(&mut self, _frame: &str) -> Result<(), LegClosed> {
            if let Some((entered, release)) = self.gate.take() {
                entered.send(()).unwrap();
                release.recv().unwrap();
            }
            Ok(())
        }

        fn close(&mut self) {}
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn callers_never_wait_on_a_leg_write() {
        let worker = worker();
        let session = Session::new("s1", &worker, options().with_max_queued(4), None);
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        session
            .attach_leg(GatedLeg {
                gate: Some((entered_tx, release_rx)),
            })
            .unwrap();

        // The worker is now inside the leg's write of the open frame.
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        session.send("m").unwrap();
        assert_eq!(session.queued(), 0);
        assert!(session.idle_time() < Duration::from_secs(5));
        session.on_close(|| {});
        SockJsSocket::new(session.clone()).on_message(|_| {});

        release_tx.send(()).unwrap();
        worker.barrier().await.unwrap();
        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(session.queued(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn handler_set_in_on_open_sees_the_first_batch() {
        let worker = worker();
        let received = Arc::new(Mutex::new(Vec::new()));
        let received2 = received.clone();
        let on_open: OpenHandler = Arc::new(move |socket: SockJsSocket| {
            let received = received2.clone();
            socket.on_message(move |msg| received.lock().push(msg));
        });
        let session = Session::new("s1", &worker, options(), Some(on_open));

        session.attach_leg(RecordingLeg::default()).unwrap();
        session.receive_batch(r#"["first"]"#).unwrap();
        worker.barrier().await.unwrap();

        assert_eq!(*received.lock(), vec!["first"]);
    }

    #[test]
    fn leg_id_display() {
        assert_eq!(LegId(3).to_string(), "leg-3");
    }
}

//! One-shot and periodic timer sources bound to a worker.
//!
//! A [`TimerStream`] is armed when its handler is attached. The clock runs on
//! a Tokio task; each expiry is re-dispatched onto the bound [`Worker`] before
//! the handler runs, so handler invocations for one source are never
//! concurrent and never reordered.
//!
//! ```text
//!            set_handler              fire (one-shot)
//!   Idle ──────────────────► Scheduled ───────────────► Retired
//!     │                      │   ▲
//!     │ pause          pause │   │ resume
//!     ▼                      ▼   │
//!   Paused ◄─────────────────────┘
//!     │
//!     └─ deadline passes (one-shot) ──► Retired, handler skipped
//!
//!   any non-terminal state ── cancel / clear_handler ──► Cancelled
//! ```

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace};

use super::worker::Worker;
use crate::core::TimerError;

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

/// Smallest period a periodic source accepts.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Process-unique timer identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    fn next() -> Self {
        Self(NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// What kind of source a timer is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Fires once, no earlier than the delay, then retires.
    OneShot(Duration),
    /// Fires every period until cancelled or its handler is cleared.
    Periodic(Duration),
}

/// Lifecycle of a timer source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// Created, no handler attached yet; not armed.
    Idle,
    /// Armed and counting down.
    Scheduled,
    /// Suspended. A periodic source re-arms a full period on `resume`; a
    /// one-shot keeps its deadline and retires without firing if it passes.
    Paused,
    /// Cancelled or handler cleared. Terminal.
    Cancelled,
    /// One-shot that fired. Terminal.
    Retired,
}

impl TimerState {
    /// Whether the source can never fire again.
    pub fn is_terminal(self) -> bool {
        matches!(self, TimerState::Cancelled | TimerState::Retired)
    }
}

type TimerHandler = Box<dyn FnMut(TimerId) + Send + 'static>;
type EndHandler = Box<dyn FnOnce() + Send + 'static>;
pub(crate) type RetireHook = Box<dyn Fn(TimerId) + Send + Sync + 'static>;

enum HandlerSlot {
    Empty,
    Attached(TimerHandler),
    /// Attached, but currently taken out to run on the worker.
    Running,
}

struct Slot {
    state: TimerState,
    handler: HandlerSlot,
    end_handler: Option<EndHandler>,
    ended: bool,
    /// Bumped on every arm, pause and retire; fires carry the generation they
    /// were dispatched under and are dropped if it moved on.
    generation: u64,
    clock: Option<JoinHandle<()>>,
}

impl Slot {
    fn take_end(&mut self) -> Option<EndHandler> {
        if self.ended {
            return None;
        }
        self.ended = true;
        self.end_handler.take()
    }

    fn stop_clock(&mut self) {
        self.generation += 1;
        if let Some(clock) = self.clock.take() {
            clock.abort();
        }
    }
}

struct Inner {
    id: TimerId,
    kind: TimerKind,
    context: Worker,
    slot: Mutex<Slot>,
    fires: AtomicU64,
    on_retire: Option<RetireHook>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(clock) = self.slot.get_mut().clock.take() {
            clock.abort();
        }
    }
}

/// A timer source. Cloning yields another handle to the same source.
///
/// Dropping every handle stops the clock.
#[derive(Clone)]
pub struct TimerStream {
    inner: Arc<Inner>,
}

impl fmt::Debug for TimerStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerStream")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("state", &self.state())
            .field("context", &self.inner.context.id())
            .finish()
    }
}

impl TimerStream {
    /// A source that fires once after `delay`.
    pub fn one_shot(delay: Duration, context: &Worker) -> Self {
        Self::build(TimerKind::OneShot(delay), context, None)
    }

    /// A source that fires every `period` (at least 1ms).
    pub fn periodic(period: Duration, context: &Worker) -> Self {
        Self::build(TimerKind::Periodic(period.max(MIN_PERIOD)), context, None)
    }

    pub(crate) fn with_retire_hook(kind: TimerKind, context: &Worker, hook: RetireHook) -> Self {
        let kind = match kind {
            TimerKind::Periodic(period) => TimerKind::Periodic(period.max(MIN_PERIOD)),
            one_shot => one_shot,
        };
        Self::build(kind, context, Some(hook))
    }

    fn build(kind: TimerKind, context: &Worker, on_retire: Option<RetireHook>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: TimerId::next(),
                kind,
                context: context.clone(),
                slot: Mutex::new(Slot {
                    state: TimerState::Idle,
                    handler: HandlerSlot::Empty,
                    end_handler: None,
                    ended: false,
                    generation: 0,
                    clock: None,
                }),
                fires: AtomicU64::new(0),
                on_retire,
            }),
        }
    }

    /// The source's id.
    pub fn id(&self) -> TimerId {
        self.inner.id
    }

    /// The source's kind.
    pub fn kind(&self) -> TimerKind {
        self.inner.kind
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TimerState {
        self.inner.slot.lock().state
    }

    /// How many times the handler has been invoked.
    pub fn fire_count(&self) -> u64 {
        self.inner.fires.load(Ordering::Relaxed)
    }

    /// Attach the handler and arm the source (unless paused).
    ///
    /// Fails with [`TimerError::HandlerAlreadySet`] if a handler is attached,
    /// leaving it and its schedule untouched.
    ///
    /// # Panics
    ///
    /// Arming spawns a Tokio task; panics if called outside a Tokio runtime.
    pub fn set_handler<F>(&self, handler: F) -> Result<(), TimerError>
    where
        F: FnMut(TimerId) + Send + 'static,
    {
        let mut slot = self.inner.slot.lock();
        if slot.state.is_terminal() {
            return Err(TimerError::Retired);
        }
        if !matches!(slot.handler, HandlerSlot::Empty) {
            return Err(TimerError::HandlerAlreadySet);
        }
        slot.handler = HandlerSlot::Attached(Box::new(handler));
        if slot.state == TimerState::Idle {
            self.arm(&mut slot);
        }
        Ok(())
    }

    /// Register the end notification, run once when the source retires,
    /// is cancelled, or has its handler cleared.
    pub fn set_end_handler<F>(&self, handler: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut slot = self.inner.slot.lock();
        if !slot.ended {
            slot.end_handler = Some(Box::new(handler));
        }
    }

    /// Detach the handler. Cancels the source and emits the end notification.
    pub fn clear_handler(&self) {
        self.retire(TimerState::Cancelled);
    }

    /// Cancel future fires. Idempotent.
    pub fn cancel(&self) {
        self.retire(TimerState::Cancelled);
    }

    /// Suspend firing. Idempotent.
    ///
    /// An armed one-shot keeps counting: if its deadline passes while paused
    /// the handler is skipped, the source retires and the end notification
    /// runs.
    pub fn pause(&self) {
        let mut slot = self.inner.slot.lock();
        match (slot.state, self.inner.kind) {
            (TimerState::Scheduled, TimerKind::OneShot(_)) => {}
            (TimerState::Idle | TimerState::Scheduled, _) => slot.stop_clock(),
            _ => return,
        }
        slot.state = TimerState::Paused;
        trace!(timer_id = %self.inner.id, "timer paused");
    }

    /// Undo [`pause`](Self::pause). Idempotent.
    ///
    /// A periodic source re-arms one full period from now; an armed one-shot
    /// goes back to waiting for its original deadline.
    pub fn resume(&self) {
        let mut slot = self.inner.slot.lock();
        if slot.state != TimerState::Paused {
            return;
        }
        if matches!(slot.handler, HandlerSlot::Empty) {
            slot.state = TimerState::Idle;
        } else if matches!(self.inner.kind, TimerKind::OneShot(_)) && slot.clock.is_some() {
            slot.state = TimerState::Scheduled;
        } else {
            self.arm(&mut slot);
        }
        trace!(timer_id = %self.inner.id, "timer resumed");
    }

    fn arm(&self, slot: &mut Slot) {
        slot.stop_clock();
        slot.state = TimerState::Scheduled;
        let generation = slot.generation;
        let timer = Arc::downgrade(&self.inner);
        let kind = self.inner.kind;
        let context = self.inner.context.clone();
        slot.clock = Some(tokio::spawn(run_clock(timer, kind, context, generation)));
    }

    fn retire(&self, final_state: TimerState) {
        let (old_handler, end) = {
            let mut slot = self.inner.slot.lock();
            if slot.state.is_terminal() {
                return;
            }
            slot.stop_clock();
            slot.state = final_state;
            let old = mem::replace(&mut slot.handler, HandlerSlot::Empty);
            (old, slot.take_end())
        };
        drop(old_handler);
        debug!(timer_id = %self.inner.id, state = ?final_state, "timer retired");

        if let Some(hook) = &self.inner.on_retire {
            hook(self.inner.id);
        }
        if let Some(end) = end {
            if self.inner.context.execute(end).is_err() {
                debug!(timer_id = %self.inner.id, "worker gone, end notification dropped");
            }
        }
    }
}

async fn run_clock(timer: Weak<Inner>, kind: TimerKind, context: Worker, generation: u64) {
    match kind {
        TimerKind::OneShot(delay) => {
            time::sleep(delay).await;
            dispatch(&timer, &context, generation);
        }
        TimerKind::Periodic(period) => {
            let mut ticks = time::interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                let _ = ticks.tick().await;
                if !dispatch(&timer, &context, generation) {
                    break;
                }
            }
        }
    }
}

fn dispatch(timer: &Weak<Inner>, context: &Worker, generation: u64) -> bool {
    let Some(inner) = timer.upgrade() else {
        return false;
    };
    context.execute(move || fire(&inner, generation)).is_ok()
}

/// Runs on the bound worker.
fn fire(inner: &Arc<Inner>, generation: u64) {
    let handler = {
        let mut slot = inner.slot.lock();
        if slot.generation != generation {
            trace!(timer_id = %inner.id, "stale fire dropped");
            return;
        }
        match (slot.state, inner.kind) {
            (TimerState::Scheduled, _) => {
                match mem::replace(&mut slot.handler, HandlerSlot::Running) {
                    HandlerSlot::Attached(handler) => Some(handler),
                    other => {
                        slot.handler = other;
                        return;
                    }
                }
            }
            (TimerState::Paused, TimerKind::OneShot(_)) => {
                trace!(timer_id = %inner.id, "paused one-shot due, handler skipped");
                None
            }
            _ => {
                trace!(timer_id = %inner.id, "stale fire dropped");
                return;
            }
        }
    };

    let id = inner.id;
    let handler = handler.map(|mut handler| {
        let _ = inner.fires.fetch_add(1, Ordering::Relaxed);
        let _ = inner
            .context
            .failures()
            .isolate(&id.to_string(), || handler(id));
        handler
    });

    match inner.kind {
        TimerKind::OneShot(_) => {
            let (end, detached) = {
                let mut slot = inner.slot.lock();
                if slot.state.is_terminal() {
                    // Cleared or cancelled from inside the handler.
                    (None, HandlerSlot::Empty)
                } else {
                    slot.stop_clock();
                    slot.state = TimerState::Retired;
                    let detached = mem::replace(&mut slot.handler, HandlerSlot::Empty);
                    (Some(slot.take_end()), detached)
                }
            };
            drop(detached);
            drop(handler);
            if let Some(end) = end {
                trace!(timer_id = %id, "one-shot retired");
                if let Some(hook) = &inner.on_retire {
                    hook(id);
                }
                if let Some(end) = end {
                    let _ = inner.context.failures().isolate(&id.to_string(), end);
                }
            }
        }
        TimerKind::Periodic(_) => {
            let Some(handler) = handler else {
                return;
            };
            let mut slot = inner.slot.lock();
            if matches!(slot.handler, HandlerSlot::Running) {
                slot.handler = HandlerSlot::Attached(handler);
            } else {
                drop(slot);
                drop(handler);
            }
        }
    }
}

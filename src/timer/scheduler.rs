//! Id-addressed timer facade.
//!
//! [`Scheduler`] keeps the sources it creates in a table so they can be
//! cancelled by [`TimerId`] from any worker. Entries leave the table when the
//! source retires.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, warn};

use super::stream::{TimerId, TimerKind, TimerStream};
use super::worker::Worker;

/// Creates and tracks timers.
#[derive(Clone, Default)]
pub struct Scheduler {
    timers: Arc<DashMap<TimerId, TimerStream>>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("active", &self.timers.len())
            .finish()
    }
}

impl Scheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire `handler` once on `context` after `delay`.
    pub fn set_timer<F>(&self, delay: Duration, context: &Worker, handler: F) -> TimerId
    where
        F: FnMut(TimerId) + Send + 'static,
    {
        self.schedule(TimerKind::OneShot(delay), context, handler)
    }

    /// Fire `handler` on `context` every `period` until cancelled.
    pub fn set_periodic<F>(&self, period: Duration, context: &Worker, handler: F) -> TimerId
    where
        F: FnMut(TimerId) + Send + 'static,
    {
        self.schedule(TimerKind::Periodic(period), context, handler)
    }

    /// Cancel a timer created by this scheduler.
    ///
    /// Returns `false` if the id is unknown, already fired (one-shot), or
    /// already cancelled.
    pub fn cancel_timer(&self, id: TimerId) -> bool {
        // Remove before cancelling: the retire hook touches the table.
        match self.timers.remove(&id) {
            Some((_, timer)) => {
                timer.cancel();
                true
            }
            None => false,
        }
    }

    /// Look up a live timer, e.g. to pause or resume it.
    pub fn get(&self, id: TimerId) -> Option<TimerStream> {
        self.timers.get(&id).map(|entry| entry.value().clone())
    }

    /// Number of live timers created through `set_timer` / `set_periodic`.
    pub fn active_count(&self) -> usize {
        self.timers.len()
    }

    /// An untracked one-shot source; arm it with [`TimerStream::set_handler`].
    pub fn timer_stream(&self, delay: Duration, context: &Worker) -> TimerStream {
        TimerStream::one_shot(delay, context)
    }

    /// An untracked periodic source; arm it with [`TimerStream::set_handler`].
    pub fn periodic_stream(&self, period: Duration, context: &Worker) -> TimerStream {
        TimerStream::periodic(period, context)
    }

    fn schedule<F>(&self, kind: TimerKind, context: &Worker, handler: F) -> TimerId
    where
        F: FnMut(TimerId) + Send + 'static,
    {
        let table = Arc::downgrade(&self.timers);
        let timer = TimerStream::with_retire_hook(
            kind,
            context,
            Box::new(move |id| {
                if let Some(table) = table.upgrade() {
                    let _ = table.remove(&id);
                }
            }),
        );
        let id = timer.id();

        // Tracked before arming so a zero delay cannot retire ahead of insert.
        let _ = self.timers.insert(id, timer.clone());
        if let Err(err) = timer.set_handler(handler) {
            warn!(timer_id = %id, error = %err, "fresh timer refused its handler");
            let _ = self.timers.remove(&id);
        }
        debug!(timer_id = %id, ?kind, worker_id = %context.id(), "timer scheduled");
        id
    }
}

//! Id → session index.
//!
//! The registry only indexes sessions; it never owns their lifetime. A
//! session deregisters itself through the close callback it was built with,
//! which holds a weak reference to the table.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use super::session::{CloseCallback, OpenHandler, Session, SessionOptions};
use crate::timer::WorkerPool;

/// Maps session ids to live sessions.
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, Session>>,
    workers: WorkerPool,
    created: AtomicU64,
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.len())
            .field("workers", &self.workers.len())
            .field("created", &self.created_count())
            .finish()
    }
}

impl SessionRegistry {
    /// Create an empty registry assigning sessions to `workers` round-robin.
    pub fn new(workers: WorkerPool) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            workers,
            created: AtomicU64::new(0),
        }
    }

    /// Return the live session for `id`, creating it if there is none.
    ///
    /// The first creator wins: for an existing session, `options` and
    /// `on_open` are ignored. Concurrent calls with one id construct exactly
    /// one session and all observe it. An entry whose session is closing or
    /// closed is replaced.
    pub fn get_or_create(
        &self,
        id: &str,
        options: &SessionOptions,
        on_open: Option<OpenHandler>,
    ) -> Session {
        let entry = self.sessions.entry(id.to_owned());
        if let Entry::Occupied(existing) = &entry {
            if !existing.get().state().is_terminating() {
                return existing.get().clone();
            }
        }

        let worker = self.workers.next();
        let session = Session::create(
            id.to_owned(),
            &worker,
            options.clone(),
            on_open,
            Some(self.deregister_on_close()),
        );
        let _ = entry.insert(session.clone());
        let _ = self.created.fetch_add(1, Ordering::Relaxed);
        session
    }

    /// Live lookup; closing or closed sessions are not returned.
    pub fn get(&self, id: &str) -> Option<Session> {
        self.sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .filter(|session| !session.state().is_terminating())
    }

    /// Number of indexed sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is indexed.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Sessions constructed over the registry's lifetime.
    pub fn created_count(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// The pool sessions are assigned from.
    pub fn workers(&self) -> &WorkerPool {
        &self.workers
    }

    fn deregister_on_close(&self) -> CloseCallback {
        let table = Arc::downgrade(&self.sessions);
        Box::new(move |closing: &Session| {
            let Some(table) = table.upgrade() else {
                return;
            };
            // Only if the entry still points at this session, never a successor.
            if table
                .remove_if(closing.id(), |_, current| current.ptr_eq(closing))
                .is_some()
            {
                debug!(session_id = %closing.id(), "session deregistered");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::time;

    use crate::session::SessionState;
    use crate::timer::FailureSink;

    fn registry(workers: usize) -> SessionRegistry {
        SessionRegistry::new(WorkerPool::new(workers, FailureSink::logging()))
    }

    fn options() -> SessionOptions {
        SessionOptions::default()
            .with_timeout(Duration::from_secs(10))
            .with_heartbeat_period(Duration::from_secs(5))
    }

    #[tokio::test(start_paused = true)]
    async fn first_creator_wins() {
        let registry = registry(2);
        let a = registry.get_or_create("s1", &options(), None);
        let b = registry.get_or_create(
            "s1",
            &SessionOptions::default().with_timeout(Duration::from_secs(1)),
            None,
        );

        assert!(a.ptr_eq(&b));
        assert_eq!(registry.created_count(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sessions_spread_over_workers() {
        let registry = registry(2);
        let a = registry.get_or_create("a", &options(), None);
        let b = registry.get_or_create("b", &options(), None);
        assert_ne!(a.worker_id(), b.worker_id());
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_session_is_deregistered() {
        let registry = registry(1);
        let session = registry.get_or_create("s1", &options(), None);

        time::sleep(Duration::from_secs(11)).await;
        for worker in registry.workers().workers() {
            worker.barrier().await.unwrap();
        }

        assert_eq!(session.state(), SessionState::Closed);
        assert!(registry.get("s1").is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn closed_entry_is_replaced_with_a_fresh_session() {
        let registry = registry(1);
        let old = registry.get_or_create("s1", &options(), None);
        old.close().unwrap();
        for worker in registry.workers().workers() {
            worker.barrier().await.unwrap();
        }

        let fresh = registry.get_or_create("s1", &options(), None);
        assert!(!fresh.ptr_eq(&old));
        assert_eq!(fresh.state(), SessionState::Connecting);
        assert_eq!(registry.created_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn late_close_callback_does_not_evict_successor() {
        let registry = Arc::new(registry(1));
        let old = registry.get_or_create("s1", &options(), None);

        // Close handlers run after the session turned Closing and before its
        // close callback; a successor created there must survive.
        let successor = Arc::new(Mutex::new(None));
        let (registry2, successor2) = (registry.clone(), successor.clone());
        old.add_close_handler(Box::new(move || {
            *successor2.lock() = Some(registry2.get_or_create("s1", &options(), None));
        }));
        old.close().unwrap();
        registry.workers().workers()[0].barrier().await.unwrap();

        let successor = successor.lock().take().unwrap();
        assert!(!successor.ptr_eq(&old));
        assert!(registry.get("s1").unwrap().ptr_eq(&successor));
        assert_eq!(registry.created_count(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_get_or_create_constructs_one_session() {
        let registry = Arc::new(registry(4));
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                registry.get_or_create("shared", &options(), None)
            }));
        }

        let mut sessions = Vec::new();
        for task in tasks {
            sessions.push(task.await.unwrap());
        }

        assert_eq!(registry.created_count(), 1);
        assert!(sessions.iter().all(|s| s.ptr_eq(&sessions[0])));
    }
}

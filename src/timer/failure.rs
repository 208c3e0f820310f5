//! Failure reporting for callbacks that run on a worker.
//!
//! A panic escaping an application or timer callback is contained at the
//! invocation boundary and handed to a [`FailureSink`]. It never unwinds the
//! worker loop, the session state machine, or timer bookkeeping.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::error;

/// A contained callback failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackFailure {
    /// Where the callback ran (e.g. `timer-7`, `session abc on_message`).
    pub context: String,
    /// Panic message, if it carried one.
    pub message: String,
}

impl fmt::Display for CallbackFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.context, self.message)
    }
}

type FailureHook = Arc<dyn Fn(&CallbackFailure) + Send + Sync>;

/// Generic failure channel shared by every worker.
///
/// Failures are always logged; an optional hook lets the host count or
/// forward them.
#[derive(Clone, Default)]
pub struct FailureSink {
    hook: Option<FailureHook>,
}

impl fmt::Debug for FailureSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureSink")
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

impl FailureSink {
    /// A sink that only logs.
    pub fn logging() -> Self {
        Self::default()
    }

    /// A sink that logs and then calls `hook`.
    pub fn with_hook<F>(hook: F) -> Self
    where
        F: Fn(&CallbackFailure) + Send + Sync + 'static,
    {
        Self {
            hook: Some(Arc::new(hook)),
        }
    }

    /// Report a failure.
    pub fn report(&self, failure: CallbackFailure) {
        error!(context = %failure.context, message = %failure.message, "callback failed");
        if let Some(hook) = &self.hook {
            hook(&failure);
        }
    }

    /// Report a caught panic payload.
    pub fn report_panic(&self, context: &str, payload: &(dyn Any + Send)) {
        self.report(CallbackFailure {
            context: context.to_string(),
            message: panic_message(payload),
        });
    }

    /// Run `f` behind an unwind boundary.
    ///
    /// Returns `false` if `f` panicked; the panic has been reported.
    pub fn isolate<F: FnOnce()>(&self, context: &str, f: F) -> bool {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(()) => true,
            Err(payload) => {
                self.report_panic(context, payload.as_ref());
                false
            }
        }
    }
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

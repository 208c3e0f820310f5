//! Behavior shared by every transport adapter.

use std::sync::Arc;

use http::StatusCode;
use tracing::{debug, info};

use super::config::AppConfig;
use super::error::TransportError;
use super::headers::reject_broken_json;
use super::response::ResponseSink;
use crate::codec;
use crate::session::{OpenHandler, Session, SessionRegistry};
use crate::timer::{FailureSink, WorkerPool};

/// Session lookup and inbound frame handling for transport adapters.
#[derive(Debug, Clone)]
pub struct BaseTransport {
    registry: Arc<SessionRegistry>,
    config: AppConfig,
}

impl BaseTransport {
    /// Wrap an existing registry.
    pub fn new(registry: Arc<SessionRegistry>, config: AppConfig) -> Self {
        Self { registry, config }
    }

    /// Validate `config` and build a registry with its own worker pool.
    ///
    /// # Panics
    ///
    /// Spawning workers panics outside a Tokio runtime.
    pub fn from_config(config: AppConfig, failures: FailureSink) -> Result<Self, TransportError> {
        config.validate()?;
        let workers = match config.workers {
            Some(n) => WorkerPool::new(n, failures),
            None => WorkerPool::with_default_size(failures),
        };
        info!(
            workers = workers.len(),
            session_timeout_ms = config.session_timeout,
            heartbeat_period_ms = config.heartbeat_period,
            "transport ready"
        );
        Ok(Self::new(Arc::new(SessionRegistry::new(workers)), config))
    }

    /// The configuration in effect.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The shared registry.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// The live session for `id`, created with the configured timing if
    /// there is none.
    pub fn get_session(&self, id: &str, on_open: Option<OpenHandler>) -> Session {
        self.registry
            .get_or_create(id, &self.config.session_options(), on_open)
    }

    /// Frame syntax gate. A rejected frame has already been answered with
    /// the 500 when this returns `false`.
    pub fn check_json<S: ResponseSink + ?Sized>(&self, body: &str, sink: &mut S) -> bool {
        if codec::check_json(body) {
            return true;
        }
        reject_broken_json(sink);
        false
    }

    /// Validate an inbound body, deliver its messages, and answer 204.
    ///
    /// Errors are scoped to this exchange; the session stays as it is.
    pub fn accept_inbound<S: ResponseSink + ?Sized>(
        &self,
        session: &Session,
        body: &str,
        sink: &mut S,
    ) -> Result<(), TransportError> {
        if !self.check_json(body, sink) {
            debug!(session_id = %session.id(), "broken JSON frame rejected");
            return Err(TransportError::BrokenJson);
        }
        session.receive_batch(body)?;
        sink.set_status(StatusCode::NO_CONTENT);
        sink.end("");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use http::Response;

    use crate::core::SessionError;
    use crate::session::SessionState;

    fn transport() -> BaseTransport {
        let config = AppConfig {
            workers: Some(1),
            ..AppConfig::default()
        };
        BaseTransport::from_config(config, FailureSink::logging()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn sessions_take_configured_timing() {
        let transport = transport();
        let a = transport.get_session("s1", None);
        let b = transport.get_session("s1", None);
        assert!(a.ptr_eq(&b));

        // Default timeout is 5s.
        tokio::time::sleep(Duration::from_secs(6)).await;
        transport.registry().workers().workers()[0]
            .barrier()
            .await
            .unwrap();
        assert_eq!(a.state(), SessionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn broken_frame_is_leg_scoped() {
        let transport = transport();
        let session = transport.get_session("s1", None);

        let mut resp = Response::new(String::new());
        let err = transport
            .accept_inbound(&session, "bogus", &mut resp)
            .unwrap_err();

        assert!(matches!(err, TransportError::BrokenJson));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resp.body(), "Broken JSON encoding.");
        assert_eq!(session.state(), SessionState::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn valid_frame_answers_no_content() {
        let transport = transport();
        let session = transport.get_session("s1", None);

        let mut resp = Response::new(String::new());
        transport
            .accept_inbound(&session, r#"["hi"]"#, &mut resp)
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_session_refuses_inbound() {
        let transport = transport();
        let session = transport.get_session("s1", None);
        session.close().unwrap();
        transport.registry().workers().workers()[0]
            .barrier()
            .await
            .unwrap();

        let mut resp = Response::new(String::new());
        let err = transport
            .accept_inbound(&session, r#"["hi"]"#, &mut resp)
            .unwrap_err();
        assert!(matches!(err, TransportError::Session(SessionError::Closed)));
    }

    #[test]
    fn invalid_config_is_refused() {
        let config = AppConfig {
            session_timeout: 0,
            ..AppConfig::default()
        };
        assert!(matches!(
            BaseTransport::from_config(config, FailureSink::logging()),
            Err(TransportError::Config(_))
        ));
    }
}

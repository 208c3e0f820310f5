//! Application configuration recognized by every transport.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::TransportError;
use crate::core::constants::{DEFAULT_HEARTBEAT_PERIOD, DEFAULT_SESSION_TIMEOUT};
use crate::session::SessionOptions;

/// Per-application transport settings.
///
/// Field names follow the JSON configuration surface
/// (`insertJSESSIONID`, `sessionTimeout`, `heartbeatPeriod`, ...).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// Emit the sticky-session cookie.
    #[serde(rename = "insertJSESSIONID")]
    pub insert_jsessionid: bool,
    /// Session idle timeout in milliseconds.
    pub session_timeout: u64,
    /// Heartbeat period in milliseconds.
    pub heartbeat_period: u64,
    /// Outbound queue cap per session.
    pub max_queued_messages: Option<usize>,
    /// Worker count; one per CPU when unset.
    pub workers: Option<usize>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            insert_jsessionid: true,
            session_timeout: DEFAULT_SESSION_TIMEOUT.as_millis() as u64,
            heartbeat_period: DEFAULT_HEARTBEAT_PERIOD.as_millis() as u64,
            max_queued_messages: None,
            workers: None,
        }
    }
}

impl AppConfig {
    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, TransportError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| TransportError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject zero durations.
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.session_timeout == 0 {
            return Err(TransportError::Config(
                "sessionTimeout must be greater than zero".into(),
            ));
        }
        if self.heartbeat_period == 0 {
            return Err(TransportError::Config(
                "heartbeatPeriod must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Session idle timeout.
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout)
    }

    /// Heartbeat period.
    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_millis(self.heartbeat_period)
    }

    /// Options for sessions created under this configuration.
    pub fn session_options(&self) -> SessionOptions {
        let options = SessionOptions::default()
            .with_timeout(self.session_timeout())
            .with_heartbeat_period(self.heartbeat_period());
        match self.max_queued_messages {
            Some(cap) => options.with_max_queued(cap),
            None => options,
        }
    }
}

//! Transport error types.

use http::header::InvalidHeaderValue;
use thiserror::Error;

use crate::core::SessionError;

/// Errors raised while answering an HTTP exchange.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The inbound frame failed the syntax check; answered with a 500.
    #[error("broken JSON encoding")]
    BrokenJson,

    /// The session refused the operation.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// A header value could not be encoded.
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

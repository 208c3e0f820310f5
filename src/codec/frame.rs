//! Outbound frames shared by every transport.
//!
//! Each transport wraps these in its own envelope (a polling body, a
//! streaming chunk, a websocket text message); the frame text itself is the
//! same everywhere.

use std::fmt;

use serde_json::Value;

use crate::core::constants::{
    BATCH_FRAME_PREFIX, CLOSE_ANOTHER_CONNECTION, CLOSE_ANOTHER_CONNECTION_REASON,
    CLOSE_FRAME_PREFIX, CLOSE_GO_AWAY, CLOSE_GO_AWAY_REASON, HEARTBEAT_FRAME, OPEN_FRAME,
};

/// A server-to-client frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// First frame a session ever sends.
    Open,
    /// Keep-alive; not an application message.
    Heartbeat,
    /// A batch of application messages, in order.
    Messages(Vec<String>),
    /// Session is over.
    Close {
        /// Close code.
        code: u16,
        /// Human readable reason.
        reason: String,
    },
}

impl Frame {
    /// Normal server-side close.
    pub fn go_away() -> Self {
        Frame::Close {
            code: CLOSE_GO_AWAY,
            reason: CLOSE_GO_AWAY_REASON.to_string(),
        }
    }

    /// Sent to a leg displaced by a newer leg.
    pub fn another_connection() -> Self {
        Frame::Close {
            code: CLOSE_ANOTHER_CONNECTION,
            reason: CLOSE_ANOTHER_CONNECTION_REASON.to_string(),
        }
    }

    /// Wire text of the frame.
    pub fn encode(&self) -> String {
        match self {
            Frame::Open => OPEN_FRAME.to_string(),
            Frame::Heartbeat => HEARTBEAT_FRAME.to_string(),
            Frame::Messages(msgs) => encode_batch(msgs),
            Frame::Close { code, reason } => close_frame(*code, reason),
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Encode messages as one batch frame: `a["m1","m2"]`.
///
/// Each message is JSON-string encoded on its own.
pub fn encode_batch<I>(msgs: I) -> String
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut out = String::new();
    out.push(BATCH_FRAME_PREFIX);
    out.push('[');
    for (i, msg) in msgs.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&json_string(msg.as_ref()));
    }
    out.push(']');
    out
}

/// Encode a close frame: `c[3000,"Go away!"]`.
pub fn close_frame(code: u16, reason: &str) -> String {
    format!("{CLOSE_FRAME_PREFIX}[{code},{}]", json_string(reason))
}

fn json_string(s: &str) -> String {
    Value::from(s).to_string()
}

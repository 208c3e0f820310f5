//! Session path parsing: `/<server>/<session>/<transport>`.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

/// Server and session segments hold neither `/` nor `.`.
static SESSION_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/[^/.]+/([^/.]+)/([a-z_]+)$").expect("session path pattern is valid")
});

/// Which transport a request addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// XHR polling receive.
    Xhr,
    /// XHR send.
    XhrSend,
    /// XHR streaming receive.
    XhrStreaming,
    /// Server-sent events.
    EventSource,
    /// Hidden iframe streaming.
    HtmlFile,
    /// JSONP polling receive.
    Jsonp,
    /// JSONP send.
    JsonpSend,
    /// Raw WebSocket.
    WebSocket,
}

impl TransportKind {
    /// Path segment naming the transport.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Xhr => "xhr",
            TransportKind::XhrSend => "xhr_send",
            TransportKind::XhrStreaming => "xhr_streaming",
            TransportKind::EventSource => "eventsource",
            TransportKind::HtmlFile => "htmlfile",
            TransportKind::Jsonp => "jsonp",
            TransportKind::JsonpSend => "jsonp_send",
            TransportKind::WebSocket => "websocket",
        }
    }

    /// Whether requests of this kind carry inbound frames rather than
    /// receiving outbound ones.
    pub fn is_send(&self) -> bool {
        matches!(self, TransportKind::XhrSend | TransportKind::JsonpSend)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "xhr" => TransportKind::Xhr,
            "xhr_send" => TransportKind::XhrSend,
            "xhr_streaming" => TransportKind::XhrStreaming,
            "eventsource" => TransportKind::EventSource,
            "htmlfile" => TransportKind::HtmlFile,
            "jsonp" => TransportKind::Jsonp,
            "jsonp_send" => TransportKind::JsonpSend,
            "websocket" => TransportKind::WebSocket,
            _ => return Err(()),
        })
    }
}

/// A parsed session path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPath {
    /// The session id segment.
    pub session_id: String,
    /// The transport segment.
    pub transport: TransportKind,
}

impl SessionPath {
    /// Parse `/<server>/<session>/<transport>`.
    pub fn parse(path: &str) -> Option<Self> {
        let caps = SESSION_PATH.captures(path)?;
        Some(Self {
            session_id: caps[1].to_string(),
            transport: caps[2].parse().ok()?,
        })
    }

    /// Parse a path mounted under an application prefix such as `/echo`.
    pub fn parse_with_prefix(prefix: &str, path: &str) -> Option<Self> {
        Self::parse(path.strip_prefix(prefix.trim_end_matches('/'))?)
    }
}

//! Protocol constants shared by every transport.
//!
//! Frame literals are fixed by the client library and MUST NOT be changed.

use std::time::Duration;

// =============================================================================
// FRAMES
// =============================================================================

/// Sent once, on the first leg a session ever sees.
pub const OPEN_FRAME: &str = "o";

/// Periodic no-op keeping idle legs alive through intermediaries.
pub const HEARTBEAT_FRAME: &str = "h";

/// Prefix of a message batch frame (`a["m1","m2"]`).
pub const BATCH_FRAME_PREFIX: char = 'a';

/// Prefix of a close frame (`c[code,"reason"]`).
pub const CLOSE_FRAME_PREFIX: char = 'c';

// =============================================================================
// CLOSE CODES
// =============================================================================

/// Normal close initiated by the server side.
pub const CLOSE_GO_AWAY: u16 = 3000;

/// Reason sent alongside [`CLOSE_GO_AWAY`].
pub const CLOSE_GO_AWAY_REASON: &str = "Go away!";

/// A leg was displaced by a newer leg of the same session.
pub const CLOSE_ANOTHER_CONNECTION: u16 = 2010;

/// Reason sent alongside [`CLOSE_ANOTHER_CONNECTION`].
pub const CLOSE_ANOTHER_CONNECTION_REASON: &str = "Another connection still open";

// =============================================================================
// SESSION TIMING
// =============================================================================

/// How long a session may sit without a leg before it expires.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Interval between heartbeat frames on an attached leg.
pub const DEFAULT_HEARTBEAT_PERIOD: Duration = Duration::from_millis(25_000);

// =============================================================================
// HTTP
// =============================================================================

/// Body of the answer to a frame that fails the syntax check.
pub const BROKEN_JSON_BODY: &str = "Broken JSON encoding.";

/// Sticky-session cookie name understood by load balancers.
pub const JSESSIONID: &str = "JSESSIONID";

/// Cookie emitted when the request carried no `JSESSIONID`.
pub const DUMMY_JSESSIONID_COOKIE: &str = "JSESSIONID=dummy; path=/";

/// Cache lifetime advertised on preflight answers (one year).
pub const PREFLIGHT_MAX_AGE_SECS: u64 = 365 * 24 * 60 * 60;

/// `Cache-Control` value of preflight answers.
pub const PREFLIGHT_CACHE_CONTROL: &str = "public,max-age=31536000";

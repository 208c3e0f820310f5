//! Cheap decoding of client-sent batches.
//!
//! Clients only ever send a JSON array of strings or a single JSON string, so
//! no JSON parser is involved. The split is positional: after cutting the
//! batch on `"`, every odd segment is a payload.
//!
//! # Known limitation
//!
//! Escape sequences are **not** unescaped, and a payload containing a quote
//! (even an escaped one, `\"`) is split in two. Clients relying on the
//! current framing depend on this exact behavior, so it is kept as is.

/// Split a client batch into raw message strings.
///
/// - `"payload"` → `["payload"]`
/// - `["a","b"]` → `["a", "b"]`
///
/// Never panics; input of any other shape yields whatever quote-delimited
/// segments it contains.
pub fn parse_message_string(batch: &str) -> Vec<String> {
    if let Some(rest) = batch.strip_prefix('"') {
        let payload = rest.strip_suffix('"').unwrap_or(rest);
        return vec![payload.to_string()];
    }

    let mut segments: Vec<&str> = batch.split('"').collect();
    // Trailing empty segments carry no payload.
    while segments.last().is_some_and(|s| s.is_empty()) {
        let _ = segments.pop();
    }
    if segments.len() < 2 {
        return Vec::new();
    }

    segments[..segments.len() - 1]
        .iter()
        .skip(1)
        .step_by(2)
        .map(|s| (*s).to_string())
        .collect()
}

/// Frame syntax check applied before decoding.
///
/// A frame is acceptable only if it starts with `["` and ends with `"]`. A
/// rejected frame is answered with a 500 and aborts only the current leg.
pub fn check_json(frame: &str) -> bool {
    frame.starts_with("[\"") && frame.ends_with("\"]")
}

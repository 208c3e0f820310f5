//! Headers every transport answers with: CORS, the sticky-session cookie,
//! preflight caching, and the fixed broken-frame answer.

use chrono::{DateTime, TimeDelta, Utc};
use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, ALLOW,
    CACHE_CONTROL, COOKIE, EXPIRES, ORIGIN, SET_COOKIE,
};
use http::{HeaderMap, HeaderValue, StatusCode};

use super::config::AppConfig;
use super::error::TransportError;
use super::response::ResponseSink;
use crate::core::constants::{
    BROKEN_JSON_BODY, DUMMY_JSESSIONID_COOKIE, JSESSIONID, PREFLIGHT_CACHE_CONTROL,
    PREFLIGHT_MAX_AGE_SECS,
};

/// `Expires` format: `Tue, 31 Dec 2024 00:00:00 GMT`.
const EXPIRES_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Allow `origin` with credentials.
pub fn set_cors<S: ResponseSink + ?Sized>(sink: &mut S, origin: HeaderValue) {
    sink.put_header(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    sink.put_header(
        ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
}

/// Echo the request's `Origin`, or `*` when it has none.
pub fn set_cors_from_request<S: ResponseSink + ?Sized>(sink: &mut S, request_headers: &HeaderMap) {
    let origin = request_headers
        .get(ORIGIN)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("*"));
    set_cors(sink, origin);
}

/// Set the sticky-session cookie when `insertJSESSIONID` is enabled.
///
/// An incoming `JSESSIONID` cookie is re-emitted with `path=/`; otherwise a
/// dummy one is synthesized so load balancers can pin the client.
pub fn set_jsessionid<S: ResponseSink + ?Sized>(
    config: &AppConfig,
    request_headers: &HeaderMap,
    sink: &mut S,
) -> Result<(), TransportError> {
    if !config.insert_jsessionid {
        return Ok(());
    }
    let cookie = request_headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .map(str::trim)
        .find(|part| part.starts_with(JSESSIONID));

    let value = match cookie {
        Some(part) => HeaderValue::from_str(&format!("{part}; path=/"))?,
        None => HeaderValue::from_static(DUMMY_JSESSIONID_COOKIE),
    };
    sink.put_header(SET_COOKIE, value);
    Ok(())
}

/// Answer a CORS preflight (`OPTIONS`) request.
///
/// `methods` is the transport's method list, e.g. `OPTIONS, POST`.
pub fn write_preflight<S: ResponseSink + ?Sized>(
    config: &AppConfig,
    methods: &str,
    request_headers: &HeaderMap,
    sink: &mut S,
) -> Result<(), TransportError> {
    sink.put_header(CACHE_CONTROL, HeaderValue::from_static(PREFLIGHT_CACHE_CONTROL));
    sink.put_header(EXPIRES, HeaderValue::from_str(&expires_at(Utc::now()))?);
    sink.put_header(ALLOW, HeaderValue::from_str(methods)?);
    sink.put_header(ACCESS_CONTROL_MAX_AGE, HeaderValue::from(PREFLIGHT_MAX_AGE_SECS));
    set_cors_from_request(sink, request_headers);
    set_jsessionid(config, request_headers, sink)?;
    sink.set_status(StatusCode::NO_CONTENT);
    sink.end("");
    Ok(())
}

/// The fixed answer to a frame that fails the syntax check.
pub fn reject_broken_json<S: ResponseSink + ?Sized>(sink: &mut S) {
    sink.set_status(StatusCode::INTERNAL_SERVER_ERROR);
    sink.end(BROKEN_JSON_BODY);
}

fn expires_at(now: DateTime<Utc>) -> String {
    let lifetime = TimeDelta::seconds(PREFLIGHT_MAX_AGE_SECS as i64);
    (now + lifetime).format(EXPIRES_FORMAT).to_string()
}

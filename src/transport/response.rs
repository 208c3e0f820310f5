//! Response sink abstraction over the host's HTTP response.

use http::{HeaderName, HeaderValue, Response, StatusCode};

/// The part of an HTTP response transports write to.
///
/// Implemented for [`http::Response<String>`]; hosts with their own response
/// type implement it directly.
pub trait ResponseSink {
    /// Set the status code.
    fn set_status(&mut self, status: StatusCode);

    /// Set a header, replacing any previous value.
    fn put_header(&mut self, name: HeaderName, value: HeaderValue);

    /// Write the body and finish the response.
    fn end(&mut self, body: &str);
}

impl ResponseSink for Response<String> {
    fn set_status(&mut self, status: StatusCode) {
        *self.status_mut() = status;
    }

    fn put_header(&mut self, name: HeaderName, value: HeaderValue) {
        let _ = self.headers_mut().insert(name, value);
    }

    fn end(&mut self, body: &str) {
        *self.body_mut() = body.to_owned();
    }
}

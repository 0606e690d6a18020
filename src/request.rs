//! Incoming HTTP request type.
//!
//! The body is buffered into [`Bytes`] before the handler runs, so a
//! `Request` is cheap to clone: the recovery middleware keeps a copy for the
//! fallback handler without touching the payload.

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};

/// An incoming HTTP request.
#[derive(Clone, Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
}

impl Request {
    /// A bodyless request with no headers. Mostly useful for exercising
    /// handlers in tests without a socket.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), headers: HeaderMap::new(), body: Bytes::new() }
    }

    /// Adds a header.
    ///
    /// # Panics
    ///
    /// Panics if `name` or `value` is not a valid header token.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        let name = HeaderName::from_bytes(name.as_bytes()).expect("invalid header name");
        let value = HeaderValue::from_str(value).expect("invalid header value");
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub(crate) fn from_parts(parts: http::request::Parts, body: Bytes) -> Self {
        Self {
            method: parts.method,
            path: parts.uri.path().to_owned(),
            headers: parts.headers,
            body,
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Case-insensitive header lookup. Non-UTF-8 values are skipped.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case() {
        let req = Request::new(Method::GET, "/foo").with_header("X-Request-Id", "abc");
        assert_eq!(req.header("x-request-id"), Some("abc"));
        assert_eq!(req.header("missing"), None);
    }

    #[test]
    fn clone_shares_the_body() {
        let req = Request::new(Method::POST, "/users").with_body("alice");
        let copy = req.clone();
        assert_eq!(copy.body(), b"alice");
        assert_eq!(*copy.method(), Method::POST);
        assert_eq!(copy.path(), "/users");
    }
}

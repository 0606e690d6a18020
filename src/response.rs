//! Outgoing HTTP response type and the [`IntoResponse`] conversion trait.
//!
//! Build a [`Response`] in your handler and return it. Fallback handlers
//! installed on the recovery middleware build theirs the same way.

use bytes::Bytes;
use http::{HeaderName, HeaderValue, StatusCode};
use http_body_util::Full;
use tracing::warn;

use crate::status::Status;

const TEXT: &str = "text/plain; charset=utf-8";
const JSON: &str = "application/json";

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`ResponseBuilder::bytes`].
pub enum ContentType {
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    OctetStream,  // application/octet-stream
    Text,         // text/plain; charset=utf-8
}

impl ContentType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => JSON,
            Self::OctetStream => "application/octet-stream",
            Self::Text        => TEXT,
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// ```rust
/// use rescue::{Response, Status};
///
/// Response::text("hello");
/// Response::status(Status::NoContent);
///
/// let res = Response::builder()
///     .status(Status::BadRequest)
///     .text("You got 400 yo!");
/// assert_eq!(res.status_code(), 400);
/// assert_eq!(res.body(), b"You got 400 yo!");
/// ```
#[derive(Clone, Debug)]
pub struct Response {
    body: Vec<u8>,
    headers: Vec<(String, String)>,
    status: u16,
}

impl Response {
    /// `200 OK` — `application/json`.
    pub fn json(body: Vec<u8>) -> Self {
        Self::builder().json(body)
    }

    /// `200 OK` — `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Response with no body.
    pub fn status(code: Status) -> Self {
        Self::builder().status(code).no_body()
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: Vec::new(), status: Status::Ok.code() }
    }

    pub fn status_code(&self) -> u16 { self.status }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Converts into the representation hyper writes to the wire.
    ///
    /// Headers that are not valid HTTP tokens are dropped with a warning
    /// instead of failing the whole response.
    pub(crate) fn into_http(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(Bytes::from(self.body)));
        *res.status_mut() = StatusCode::from_u16(self.status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let headers = res.headers_mut();
        for (name, value) in self.headers {
            match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&value)) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => warn!(header = %name, "dropping invalid response header"),
            }
        }
        res
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `Status::Ok` (200).
/// Terminated by a typed body method.
pub struct ResponseBuilder {
    headers: Vec<(String, String)>,
    status: u16,
}

impl ResponseBuilder {
    pub fn status(mut self, code: Status) -> Self {
        self.status = code.code();
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: Vec<u8>) -> Response {
        self.finish(JSON, body)
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(TEXT, body.into().into_bytes())
    }

    /// Terminate with a typed body.
    pub fn bytes(self, content_type: ContentType, body: Vec<u8>) -> Response {
        self.finish(content_type.as_str(), body)
    }

    /// Terminate with no body.
    pub fn no_body(self) -> Response {
        Response { body: Vec::new(), headers: self.headers, status: self.status }
    }

    fn finish(self, content_type: &str, body: Vec<u8>) -> Response {
        let mut headers = vec![("content-type".to_owned(), content_type.to_owned())];
        headers.extend(self.headers);
        Response { body, headers, status: self.status }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Implement on your own types to return them directly from handlers.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

/// Return a [`Status`] directly from a handler: `return Status::NotFound`
impl IntoResponse for Status {
    fn into_response(self) -> Response { Response::status(self) }
}

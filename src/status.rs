//! HTTP status codes as a typed enum.
//!
//! Use [`Status`] anywhere a status code is accepted — `Response::status()`,
//! `Response::builder().status()`, or as a bare handler return value.
//!
//! ```rust
//! use rescue::{Response, Status};
//!
//! // status-only, no body
//! Response::status(Status::NoContent);
//!
//! // the recovery middleware's default fallback body
//! assert_eq!(Status::InternalServerError.reason(), "Internal Server Error");
//!
//! // return Status directly from a handler — rescue wraps it
//! async fn delete_user(_req: rescue::Request) -> Status {
//!     Status::NoContent
//! }
//! ```

/// All IANA-registered HTTP status codes.
#[allow(clippy::enum_variant_names)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Status {
    // ── 1xx Informational ─────────────────────────────────────────────────────
    Continue,                      // 100
    SwitchingProtocols,            // 101
    Processing,                    // 102
    EarlyHints,                    // 103

    // ── 2xx Success ───────────────────────────────────────────────────────────
    Ok,                            // 200
    Created,                       // 201
    Accepted,                      // 202
    NonAuthoritativeInformation,   // 203
    NoContent,                     // 204
    ResetContent,                  // 205
    PartialContent,                // 206
    MultiStatus,                   // 207
    AlreadyReported,               // 208
    ImUsed,                        // 226

    // ── 3xx Redirection ───────────────────────────────────────────────────────
    MultipleChoices,               // 300
    MovedPermanently,              // 301
    Found,                         // 302
    SeeOther,                      // 303
    NotModified,                   // 304
    TemporaryRedirect,             // 307
    PermanentRedirect,             // 308

    // ── 4xx Client errors ─────────────────────────────────────────────────────
    BadRequest,                    // 400
    Unauthorized,                  // 401
    PaymentRequired,               // 402
    Forbidden,                     // 403
    NotFound,                      // 404
    MethodNotAllowed,              // 405
    NotAcceptable,                 // 406
    ProxyAuthenticationRequired,   // 407
    RequestTimeout,                // 408
    Conflict,                      // 409
    Gone,                          // 410
    LengthRequired,                // 411
    PreconditionFailed,            // 412
    ContentTooLarge,               // 413
    UriTooLong,                    // 414
    UnsupportedMediaType,          // 415
    RangeNotSatisfiable,           // 416
    ExpectationFailed,             // 417
    ImATeapot,                     // 418
    MisdirectedRequest,            // 421
    UnprocessableContent,          // 422
    Locked,                        // 423
    FailedDependency,              // 424
    TooEarly,                      // 425
    UpgradeRequired,               // 426
    PreconditionRequired,          // 428
    TooManyRequests,               // 429
    RequestHeaderFieldsTooLarge,   // 431
    UnavailableForLegalReasons,    // 451

    // ── 5xx Server errors ─────────────────────────────────────────────────────
    InternalServerError,           // 500
    NotImplemented,                // 501
    BadGateway,                    // 502
    ServiceUnavailable,            // 503
    GatewayTimeout,                // 504
    HttpVersionNotSupported,       // 505
    VariantAlsoNegotiates,         // 506
    InsufficientStorage,           // 507
    LoopDetected,                  // 508
    NotExtended,                   // 510
    NetworkAuthenticationRequired, // 511
}

impl Status {
    /// The numeric code, e.g. `500`.
    pub fn code(self) -> u16 {
        match self {
            Self::Continue                      => 100,
            Self::SwitchingProtocols            => 101,
            Self::Processing                    => 102,
            Self::EarlyHints                    => 103,
            Self::Ok                            => 200,
            Self::Created                       => 201,
            Self::Accepted                      => 202,
            Self::NonAuthoritativeInformation   => 203,
            Self::NoContent                     => 204,
            Self::ResetContent                  => 205,
            Self::PartialContent                => 206,
            Self::MultiStatus                   => 207,
            Self::AlreadyReported               => 208,
            Self::ImUsed                        => 226,
            Self::MultipleChoices               => 300,
            Self::MovedPermanently              => 301,
            Self::Found                         => 302,
            Self::SeeOther                      => 303,
            Self::NotModified                   => 304,
            Self::TemporaryRedirect             => 307,
            Self::PermanentRedirect             => 308,
            Self::BadRequest                    => 400,
            Self::Unauthorized                  => 401,
            Self::PaymentRequired               => 402,
            Self::Forbidden                     => 403,
            Self::NotFound                      => 404,
            Self::MethodNotAllowed              => 405,
            Self::NotAcceptable                 => 406,
            Self::ProxyAuthenticationRequired   => 407,
            Self::RequestTimeout                => 408,
            Self::Conflict                      => 409,
            Self::Gone                          => 410,
            Self::LengthRequired                => 411,
            Self::PreconditionFailed            => 412,
            Self::ContentTooLarge               => 413,
            Self::UriTooLong                    => 414,
            Self::UnsupportedMediaType          => 415,
            Self::RangeNotSatisfiable           => 416,
            Self::ExpectationFailed             => 417,
            Self::ImATeapot                     => 418,
            Self::MisdirectedRequest            => 421,
            Self::UnprocessableContent          => 422,
            Self::Locked                        => 423,
            Self::FailedDependency              => 424,
            Self::TooEarly                      => 425,
            Self::UpgradeRequired               => 426,
            Self::PreconditionRequired          => 428,
            Self::TooManyRequests               => 429,
            Self::RequestHeaderFieldsTooLarge   => 431,
            Self::UnavailableForLegalReasons    => 451,
            Self::InternalServerError           => 500,
            Self::NotImplemented                => 501,
            Self::BadGateway                    => 502,
            Self::ServiceUnavailable            => 503,
            Self::GatewayTimeout                => 504,
            Self::HttpVersionNotSupported       => 505,
            Self::VariantAlsoNegotiates         => 506,
            Self::InsufficientStorage           => 507,
            Self::LoopDetected                  => 508,
            Self::NotExtended                   => 510,
            Self::NetworkAuthenticationRequired => 511,
        }
    }

    /// The standard reason phrase, e.g. `"Internal Server Error"`.
    pub fn reason(self) -> &'static str {
        match self {
            Self::Continue                      => "Continue",
            Self::SwitchingProtocols            => "Switching Protocols",
            Self::Processing                    => "Processing",
            Self::EarlyHints                    => "Early Hints",
            Self::Ok                            => "OK",
            Self::Created                       => "Created",
            Self::Accepted                      => "Accepted",
            Self::NonAuthoritativeInformation   => "Non-Authoritative Information",
            Self::NoContent                     => "No Content",
            Self::ResetContent                  => "Reset Content",
            Self::PartialContent                => "Partial Content",
            Self::MultiStatus                   => "Multi-Status",
            Self::AlreadyReported               => "Already Reported",
            Self::ImUsed                        => "IM Used",
            Self::MultipleChoices               => "Multiple Choices",
            Self::MovedPermanently              => "Moved Permanently",
            Self::Found                         => "Found",
            Self::SeeOther                      => "See Other",
            Self::NotModified                   => "Not Modified",
            Self::TemporaryRedirect             => "Temporary Redirect",
            Self::PermanentRedirect             => "Permanent Redirect",
            Self::BadRequest                    => "Bad Request",
            Self::Unauthorized                  => "Unauthorized",
            Self::PaymentRequired               => "Payment Required",
            Self::Forbidden                     => "Forbidden",
            Self::NotFound                      => "Not Found",
            Self::MethodNotAllowed              => "Method Not Allowed",
            Self::NotAcceptable                 => "Not Acceptable",
            Self::ProxyAuthenticationRequired   => "Proxy Authentication Required",
            Self::RequestTimeout                => "Request Timeout",
            Self::Conflict                      => "Conflict",
            Self::Gone                          => "Gone",
            Self::LengthRequired                => "Length Required",
            Self::PreconditionFailed            => "Precondition Failed",
            Self::ContentTooLarge               => "Content Too Large",
            Self::UriTooLong                    => "URI Too Long",
            Self::UnsupportedMediaType          => "Unsupported Media Type",
            Self::RangeNotSatisfiable           => "Range Not Satisfiable",
            Self::ExpectationFailed             => "Expectation Failed",
            Self::ImATeapot                     => "I'm a Teapot",
            Self::MisdirectedRequest            => "Misdirected Request",
            Self::UnprocessableContent          => "Unprocessable Content",
            Self::Locked                        => "Locked",
            Self::FailedDependency              => "Failed Dependency",
            Self::TooEarly                      => "Too Early",
            Self::UpgradeRequired               => "Upgrade Required",
            Self::PreconditionRequired          => "Precondition Required",
            Self::TooManyRequests               => "Too Many Requests",
            Self::RequestHeaderFieldsTooLarge   => "Request Header Fields Too Large",
            Self::UnavailableForLegalReasons    => "Unavailable For Legal Reasons",
            Self::InternalServerError           => "Internal Server Error",
            Self::NotImplemented                => "Not Implemented",
            Self::BadGateway                    => "Bad Gateway",
            Self::ServiceUnavailable            => "Service Unavailable",
            Self::GatewayTimeout                => "Gateway Timeout",
            Self::HttpVersionNotSupported       => "HTTP Version Not Supported",
            Self::VariantAlsoNegotiates         => "Variant Also Negotiates",
            Self::InsufficientStorage           => "Insufficient Storage",
            Self::LoopDetected                  => "Loop Detected",
            Self::NotExtended                   => "Not Extended",
            Self::NetworkAuthenticationRequired => "Network Authentication Required",
        }
    }
}

impl From<Status> for u16 {
    fn from(s: Status) -> u16 { s.code() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_and_reason_agree() {
        assert_eq!(Status::InternalServerError.code(), 500);
        assert_eq!(Status::InternalServerError.reason(), "Internal Server Error");
        assert_eq!(Status::BadRequest.code(), 400);
        assert_eq!(u16::from(Status::ImATeapot), 418);
    }
}

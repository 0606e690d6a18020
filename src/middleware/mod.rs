//! Middleware layer.
//!
//! Middleware wraps a [`Handler`](crate::Handler) and hands back a
//! [`BoxHandler`](crate::BoxHandler) of the same shape, so layers stack by
//! plain function application:
//!
//! ```rust,no_run
//! # use rescue::Request;
//! # async fn app(_req: Request) -> &'static str { "ok" }
//! use rescue::middleware::recovery::Recovery;
//!
//! let recovery = Recovery::new();
//! let handler = recovery.handler(app);
//! ```
//!
//! Built-in middleware:
//! - [`recovery`] — turns a panicking handler into a fallback response plus
//!   one diagnostic log line

pub mod recovery;

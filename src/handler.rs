//! Handler trait and type erasure.
//!
//! # How handlers are stored
//!
//! Middleware has to hold handlers of *different* types behind one field and
//! hand back something with the same shape it was given. Both needs are met by
//! a **trait object** (`dyn ErasedHandler`) behind an `Arc`, wrapped in the
//! public [`BoxHandler`] newtype:
//!
//! ```text
//! async fn hello(req: Request) -> Response { … }   ← user writes this
//!        ↓ recovery.handler(hello)
//! hello.into_boxed_handler()                       ← Handler blanket impl
//!        ↓
//! BoxHandler(Arc::new(FnHandler(hello)))           ← heap-allocated wrapper
//!        ↓
//! handler.call(req)  at request time               ← one vtable dispatch
//!        ↓
//! Box::pin(async { hello(req).await.into_response() })  ← BoxFuture
//! ```
//!
//! A `BoxHandler` is itself a [`Handler`], so wrappers compose: the output of
//! one middleware is valid input to the next.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future that resolves to a [`Response`].
///
/// `Send + 'static` let tokio move the future across worker threads.
pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Internal dispatch interface.
pub(crate) trait ErasedHandler: Send + Sync + 'static {
    fn call(&self, req: Request) -> BoxFuture;
}

// ── BoxHandler ────────────────────────────────────────────────────────────────

/// A type-erased, cheaply cloneable handler.
///
/// Cloning bumps a reference count; every clone dispatches to the same
/// underlying handler.
#[derive(Clone)]
pub struct BoxHandler(Arc<dyn ErasedHandler>);

impl BoxHandler {
    pub(crate) fn from_erased(inner: impl ErasedHandler) -> Self {
        Self(Arc::new(inner))
    }

    /// Runs the handler on `req`.
    ///
    /// Useful for driving a handler in tests without binding a socket.
    pub fn call(&self, req: Request) -> impl Future<Output = Response> + Send + use<> {
        self.0.call(req)
    }
}

impl fmt::Debug for BoxHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BoxHandler")
    }
}

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid request handler.
///
/// You never implement this yourself. It is satisfied by any `async fn` (or
/// closure returning a future) with the signature:
///
/// ```text
/// async fn name(req: Request) -> impl IntoResponse
/// ```
///
/// and by [`BoxHandler`]. The trait is **sealed** (via the private `Sealed`
/// supertrait): only the impls in this module can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxHandler;
}

mod private {
    pub trait Sealed {}
}

// ── Implementations ───────────────────────────────────────────────────────────

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxHandler {
        BoxHandler::from_erased(FnHandler(self))
    }
}

impl private::Sealed for BoxHandler {}

impl Handler for BoxHandler {
    fn into_boxed_handler(self) -> BoxHandler { self }
}

/// Newtype wrapper that holds a concrete handler `F` and implements
/// [`ErasedHandler`], bridging the typed world to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}

#[cfg(test)]
mod tests {
    use http::Method;

    use super::*;
    use crate::Status;

    async fn teapot(_req: Request) -> Status {
        Status::ImATeapot
    }

    #[tokio::test]
    async fn fn_handler_converts_into_response() {
        let handler = teapot.into_boxed_handler();
        let res = handler.call(Request::new(Method::GET, "/")).await;
        assert_eq!(res.status_code(), 418);
    }

    #[tokio::test]
    async fn boxed_handler_boxes_to_itself() {
        let handler = teapot.into_boxed_handler();
        let again = handler.clone().into_boxed_handler();
        assert!(Arc::ptr_eq(&handler.0, &again.0));
        let res = again.call(Request::new(Method::GET, "/")).await;
        assert_eq!(res.status_code(), 418);
    }

    #[tokio::test]
    async fn closures_are_handlers() {
        let handler = (|req: Request| async move { format!("hi {}", req.path()) })
            .into_boxed_handler();
        let res = handler.call(Request::new(Method::GET, "/there")).await;
        assert_eq!(res.body(), b"hi /there");
    }
}

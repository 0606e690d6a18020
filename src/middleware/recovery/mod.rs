//! Panic recovery.
//!
//! [`Recovery`] wraps a handler so that a panic while handling one request
//! costs that request a fallback response and nothing more: the connection
//! task survives, the server keeps serving, and one diagnostic line with the
//! panic message and a backtrace goes to the configured sink.
//!
//! ```rust,no_run
//! use rescue::middleware::recovery::{LogFlags, Options, Recovery};
//! use rescue::{Request, Server};
//!
//! async fn flaky(_req: Request) -> &'static str {
//!     panic!("you should not have a handler that just panics ;)")
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let recovery = Recovery::with_options(Options {
//!         prefix: "MySampleWebApp".to_owned(),
//!         output_flags: LogFlags::STD,
//!         ..Options::default()
//!     });
//!
//!     Server::bind("0.0.0.0:3000")
//!         .serve(recovery.handler(flaky))
//!         .await
//!         .unwrap();
//! }
//! ```
//!
//! A request then logs:
//!
//! ```text
//! [MySampleWebApp] 2014/12/05 23:15:11 Recovering from Panic: you should not have a handler that just panics ;)
//! thread 'tokio-runtime-worker' [running]:
//!    0: std::backtrace_rs::backtrace::libunwind::trace
//! ...
//! ```
//!
//! # Ordering
//!
//! The fallback response is produced before the stack is captured or the line
//! is written, so a slow or broken sink never holds up the client.

mod logger;
mod stack;

use std::io::{self, Write};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use arc_swap::ArcSwap;
use futures::FutureExt;
use tracing::debug;

use crate::handler::{BoxHandler, Handler};
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;

pub use logger::LogFlags;

use logger::Logger;
use stack::{PanicRecord, Scope};

/// Stack text budget when [`Options::stack_size`] is left at zero.
pub const DEFAULT_STACK_SIZE: usize = 8 * 1024;

// ── Options ───────────────────────────────────────────────────────────────────

/// Configuration for [`Recovery`]. Every field has a usable zero value.
#[derive(Default)]
pub struct Options {
    /// Also describe the other execution contexts of the process, not only
    /// the thread that panicked. Default `false`.
    pub include_full_stack: bool,
    /// Maximum bytes of stack text per log line. `0` means
    /// [`DEFAULT_STACK_SIZE`]. Longer text is cut silently.
    pub stack_size: usize,
    /// Keyword in front of each log line. Wrapped as `[prefix] ` unless
    /// `disable_auto_brackets` is set. An empty prefix gets no brackets.
    pub prefix: String,
    /// Use `prefix` verbatim. Default `false`.
    pub disable_auto_brackets: bool,
    /// Destination for log lines. `None` means standard error.
    pub out: Option<Box<dyn Write + Send>>,
    /// Line metadata. Empty means [`LogFlags::STD`];
    /// [`LogFlags::DISABLED`] turns all metadata off.
    pub output_flags: LogFlags,
    /// Keep panics inside this boundary from the panic hook that was
    /// installed before the first `Recovery`. With std's default hook that
    /// hides the "thread panicked" message, which the log line repeats
    /// anyway. Reporting hooks stop seeing these panics too. Default `false`.
    pub silence_panic_hook: bool,
}

// ── Recovery ──────────────────────────────────────────────────────────────────

/// Panic-recovery middleware.
///
/// Cloning is cheap and every clone shares one configuration, one logger,
/// and one fallback handler.
#[derive(Clone)]
pub struct Recovery {
    shared: Arc<Shared>,
}

struct Shared {
    logger: Logger,
    include_full_stack: bool,
    stack_size: usize,
    silence_panic_hook: bool,
    panic_handler: ArcSwap<BoxHandler>,
}

impl Recovery {
    /// Recovery with every option at its default.
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    pub fn with_options(options: Options) -> Self {
        stack::install_hook();

        let Options {
            include_full_stack,
            stack_size,
            prefix,
            disable_auto_brackets,
            out,
            output_flags,
            silence_panic_hook,
        } = options;

        let stack_size = if stack_size == 0 { DEFAULT_STACK_SIZE } else { stack_size };
        let prefix = if !prefix.is_empty() && !disable_auto_brackets {
            format!("[{prefix}] ")
        } else {
            prefix
        };
        let out = out.unwrap_or_else(|| Box::new(io::stderr()));

        Self {
            shared: Arc::new(Shared {
                logger: Logger::new(out, prefix, output_flags.resolve()),
                include_full_stack,
                stack_size,
                silence_panic_hook,
                panic_handler: ArcSwap::from_pointee(default_panic_handler.into_boxed_handler()),
            }),
        }
    }

    /// Builds from the first of `options`; the rest are ignored. No options
    /// at all gives the defaults.
    pub fn from_options(options: impl IntoIterator<Item = Options>) -> Self {
        Self::with_options(options.into_iter().next().unwrap_or_default())
    }

    /// Replaces the handler that answers requests whose handler panicked.
    ///
    /// Takes effect for every handler wrapped by this `Recovery` or its
    /// clones, for panics recovered after the swap. Safe to call while
    /// serving traffic.
    pub fn set_panic_handler(&self, handler: impl Handler) {
        self.shared.panic_handler.store(Arc::new(handler.into_boxed_handler()));
    }

    /// Wraps `next`. The result behaves exactly like `next` unless `next`
    /// panics, in which case the fallback handler answers instead.
    pub fn handler(&self, next: impl Handler) -> BoxHandler {
        let next = next.into_boxed_handler();
        let shared = Arc::clone(&self.shared);
        (move |req: Request| {
            let next = next.clone();
            let shared = Arc::clone(&shared);
            async move { shared.serve(&next, req).await }
        })
        .into_boxed_handler()
    }
}

impl Default for Recovery {
    fn default() -> Self { Self::new() }
}

impl Shared {
    async fn serve(&self, next: &BoxHandler, req: Request) -> Response {
        let fallback_req = req.clone();

        // The call itself happens inside the first poll, so a handler that
        // panics before returning its future is caught as well.
        let mut inner = async move { next.call(req).await }.boxed();
        let silenced = self.silence_panic_hook;
        let guarded = futures::future::poll_fn(move |cx| {
            let _scope = Scope::enter(silenced);
            inner.poll_unpin(cx)
        });

        match AssertUnwindSafe(guarded).catch_unwind().await {
            Ok(res) => {
                // A panic the handler caught itself may have left a record.
                stack::discard_record();
                res
            }
            Err(payload) => {
                // The hook's record lives on this thread: collect it before
                // the next await can move the task elsewhere.
                let record = stack::take_record();
                let message = stack::payload_message(&*payload).to_owned();
                self.recover(fallback_req, message, record).await
            }
        }
    }

    async fn recover(&self, req: Request, message: String, record: Option<PanicRecord>) -> Response {
        debug!(method = %req.method(), path = req.path(), "recovering from panic");
        let panic_handler = self.panic_handler.load_full();
        let res = panic_handler.call(req).await;

        let stack = stack::snapshot(record.as_ref(), self.include_full_stack, self.stack_size);
        let msg = format!("Recovering from Panic: {message}\n{stack}");
        if let Err(e) = self.logger.output(&stack::caller_of(record.as_ref()), &msg) {
            debug!("recovery log write failed: {e}");
        }
        res
    }
}

/// `500 Internal Server Error` with the reason phrase as a plain-text body.
async fn default_panic_handler(_req: Request) -> Response {
    let status = Status::InternalServerError;
    Response::builder().status(status).text(status.reason())
}

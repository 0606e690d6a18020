//! # rescue
//!
//! Panic isolation per request for async HTTP services, plus the minimal
//! hyper-based framework it plugs into.
//!
//! ## The contract
//!
//! A panic inside one handler must never take the process down, and the
//! client must still get an answer. [`Recovery`](middleware::recovery::Recovery)
//! catches the panic at the handler boundary, answers with a fallback
//! response, then writes one log line with the panic message and a backtrace.
//!
//! Everything else is kept deliberately small:
//!
//! - One [`Handler`] per [`Server`]; no routing
//! - Async I/O on tokio and hyper, HTTP/1.1 and HTTP/2
//! - Graceful shutdown on SIGTERM / Ctrl-C, draining in-flight requests
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use rescue::middleware::recovery::{Options, Recovery};
//! use rescue::{Request, Response, Server, Status};
//!
//! #[tokio::main]
//! async fn main() {
//!     let recovery = Recovery::with_options(Options {
//!         prefix: "users".to_owned(),
//!         ..Options::default()
//!     });
//!     recovery.set_panic_handler(|_req: Request| async {
//!         Response::builder()
//!             .status(Status::ServiceUnavailable)
//!             .text("try again later")
//!     });
//!
//!     Server::bind("0.0.0.0:3000")
//!         .serve(recovery.handler(get_user))
//!         .await
//!         .unwrap();
//! }
//!
//! async fn get_user(req: Request) -> Response {
//!     let id: u64 = req.path().trim_start_matches("/users/").parse().unwrap();
//!     Response::json(format!(r#"{{"id":{id}}}"#).into_bytes())
//! }
//! ```

mod error;
mod handler;
mod request;
mod response;
mod server;
mod status;

pub mod middleware;

pub use error::Error;
pub use handler::{BoxHandler, Handler};
pub use http::Method;
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use server::Server;
pub use status::Status;

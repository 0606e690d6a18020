//! Minimal rescue example — a handler that panics on demand.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/users/42
//!   curl -i http://localhost:3000/users/nope    # panics → 500, log line on stderr
//!   curl -i http://localhost:3000/teapot        # panics → custom fallback

use rescue::middleware::recovery::{LogFlags, Options, Recovery};
use rescue::{Request, Response, Server, Status};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let recovery = Recovery::with_options(Options {
        prefix: "basic".to_owned(),
        output_flags: LogFlags::STD | LogFlags::SHORT_FILE,
        silence_panic_hook: true,
        ..Options::default()
    });

    let app = recovery.handler(app);

    // Swapping the fallback after wrapping still applies to `app`.
    recovery.set_panic_handler(|req: Request| async move {
        if req.path() == "/teapot" {
            Response::builder().status(Status::ImATeapot).text("short and stout")
        } else {
            Response::builder().status(Status::InternalServerError).text("something broke")
        }
    });

    Server::bind("0.0.0.0:3000")
        .serve(app)
        .await
        .expect("server error");
}

async fn app(req: Request) -> Response {
    match req.path() {
        "/teapot" => panic!("no tea today"),
        path => match path.strip_prefix("/users/") {
            // `parse().unwrap()` panics on a non-numeric id; the recovery
            // middleware turns that into a fallback response.
            Some(id) => {
                let id: u64 = id.parse().unwrap();
                Response::json(format!(r#"{{"id":{id},"name":"alice"}}"#).into_bytes())
            }
            None => Response::status(Status::NotFound),
        },
    }
}

use std::time::Duration;

use rescue::middleware::recovery::{Options, Recovery};
use rescue::{Request, Response, Server, Status};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;

async fn app(req: Request) -> Response {
    match req.path() {
        "/boom" => panic!("boom"),
        "/echo" => Response::builder()
            .status(Status::Created)
            .text(String::from_utf8_lossy(req.body()).into_owned()),
        _ => Response::status(Status::NotFound),
    }
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Sends one request on a fresh connection and returns the raw response.
async fn roundtrip(port: u16, raw: &str) -> String {
    let mut stream = loop {
        match TcpStream::connect(("127.0.0.1", port)).await {
            Ok(stream) => break stream,
            Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    };
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    String::from_utf8(out).unwrap()
}

#[tokio::test]
async fn server_survives_a_panicking_handler() {
    let port = free_port();
    let recovery = Recovery::with_options(Options {
        out: Some(Box::new(std::io::sink())),
        ..Options::default()
    });
    let (stop, stopped) = oneshot::channel::<()>();

    let server = tokio::spawn(
        Server::bind(&format!("127.0.0.1:{port}")).serve_with_shutdown(
            recovery.handler(app),
            async {
                let _ = stopped.await;
            },
        ),
    );

    let res = roundtrip(port, "GET /boom HTTP/1.1\r\nhost: x\r\nconnection: close\r\n\r\n").await;
    assert!(res.starts_with("HTTP/1.1 500 Internal Server Error\r\n"), "{res}");
    assert!(res.ends_with("\r\n\r\nInternal Server Error"), "{res}");

    let res = roundtrip(
        port,
        "POST /echo HTTP/1.1\r\nhost: x\r\ncontent-length: 5\r\nconnection: close\r\n\r\nhello",
    )
    .await;
    assert!(res.starts_with("HTTP/1.1 201 Created\r\n"), "{res}");
    assert!(res.contains("content-type: text/plain; charset=utf-8\r\n"), "{res}");
    assert!(res.ends_with("hello"), "{res}");

    stop.send(()).unwrap();
    server.await.unwrap().unwrap();
}

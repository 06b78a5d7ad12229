//! End-to-end tests against a local HTTP server.

use std::io::SeekFrom;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;

use icystream::{HttpInput, InputError, Reactor};

const PLAIN_BODY: &[u8] = b"0123456789";
const BIG_LEN: usize = 2 * 1024 * 1024;

struct TestServer {
    addr: SocketAddr,
    /// Range headers the server has seen, in order.
    ranges_seen: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

fn big_body() -> Vec<u8> {
    (0..BIG_LEN).map(|i| (i % 251) as u8).collect()
}

fn icy_body() -> Vec<u8> {
    let mut body = b"AAAA\x02StreamTitle='hi';".to_vec();
    body.resize(4 + 1 + 32, 0);
    body.extend_from_slice(b"BBBB");
    body
}

/// Spawn the fixture server on an ephemeral port.
fn serve() -> TestServer {
    let ranges_seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let ranges = ranges_seen.clone();

    let app = Router::new()
        .route("/plain", get(|| async { "0123456789" }))
        .route(
            "/ranged",
            get(move |headers: HeaderMap| {
                let ranges = ranges.clone();
                async move { ranged(headers, &ranges) }
            }),
        )
        .route("/icy", get(icy))
        .route("/big", get(|| async { big_body() }))
        .route("/redirect", get(|| async { Redirect::temporary("/plain") }));

    let (tx, rx) = std::sync::mpsc::channel();
    thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            tx.send(listener.local_addr().unwrap()).unwrap();
            axum::serve(listener, app).await.unwrap();
        });
    });

    TestServer {
        addr: rx.recv().unwrap(),
        ranges_seen,
    }
}

fn ranged(headers: HeaderMap, ranges: &Mutex<Vec<String>>) -> Response {
    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    match headers.get(header::RANGE).and_then(|v| v.to_str().ok()) {
        Some(range) => {
            ranges.lock().unwrap().push(range.to_string());
            let start: usize = range
                .trim_start_matches("bytes=")
                .trim_end_matches('-')
                .parse()
                .unwrap();
            (
                StatusCode::PARTIAL_CONTENT,
                response_headers,
                PLAIN_BODY[start..].to_vec(),
            )
                .into_response()
        }
        None => (StatusCode::OK, response_headers, PLAIN_BODY.to_vec()).into_response(),
    }
}

async fn icy() -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    headers.insert("icy-metaint", HeaderValue::from_static("4"));
    headers.insert("icy-name", HeaderValue::from_static("Test FM"));
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    (headers, icy_body())
}

fn drain(stream: &mut HttpInput) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 8 * 1024];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(e) => panic!("unexpected read error: {e}"),
        }
    }
    out
}

fn wait_available(stream: &HttpInput) {
    for _ in 0..500 {
        if stream.available() {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("stream never became available");
}

// --- scenarios ---

#[test]
fn plain_get_reads_everything() {
    let server = serve();
    let reactor = Reactor::new().unwrap();

    let mut stream = HttpInput::open(&reactor.handle(), &server.url("/plain"))
        .unwrap()
        .unwrap();

    assert_eq!(drain(&mut stream), PLAIN_BODY);
    assert!(stream.eof());
    assert_eq!(stream.offset(), 10);
    assert_eq!(stream.size(), Some(10));
    assert!(stream.mime().unwrap().starts_with("text/plain"));
}

#[test]
fn seek_forward_consumes_buffered_data() {
    let server = serve();
    let reactor = Reactor::new().unwrap();

    let mut stream = HttpInput::open(&reactor.handle(), &server.url("/ranged"))
        .unwrap()
        .unwrap();

    let mut buf = [0u8; 2];
    stream.read(&mut buf).unwrap();
    assert!(stream.is_seekable());

    // with the small body fully buffered by now, a forward seek must not
    // hit the server again
    thread::sleep(Duration::from_millis(100));
    assert_eq!(stream.seek(SeekFrom::Start(5)).unwrap(), 5);
    assert_eq!(drain(&mut stream), b"56789");
    assert!(server.ranges_seen.lock().unwrap().is_empty());
}

#[test]
fn seek_backward_restarts_with_range_request() {
    let server = serve();
    let reactor = Reactor::new().unwrap();

    let mut stream = HttpInput::open(&reactor.handle(), &server.url("/ranged"))
        .unwrap()
        .unwrap();

    assert_eq!(drain(&mut stream), PLAIN_BODY);
    assert_eq!(stream.offset(), 10);

    assert_eq!(stream.seek(SeekFrom::Start(5)).unwrap(), 5);
    assert_eq!(drain(&mut stream), b"56789");
    assert_eq!(stream.offset(), 10);
    assert_eq!(stream.size(), Some(10));

    let seen = server.ranges_seen.lock().unwrap();
    assert_eq!(seen.as_slice(), ["bytes=5-"]);
}

#[test]
fn seek_to_current_position_is_accepted() {
    let server = serve();
    let reactor = Reactor::new().unwrap();

    let mut stream = HttpInput::open(&reactor.handle(), &server.url("/plain"))
        .unwrap()
        .unwrap();

    let mut buf = [0u8; 4];
    let n = stream.read(&mut buf).unwrap();
    assert_eq!(stream.seek(SeekFrom::Start(n as u64)).unwrap(), n as u64);
}

#[test]
fn icy_stream_strips_metadata_and_reports_tags() {
    let server = serve();
    let reactor = Reactor::new().unwrap();

    let mut stream = HttpInput::open(&reactor.handle(), &server.url("/icy"))
        .unwrap()
        .unwrap();

    assert_eq!(drain(&mut stream), b"AAAABBBB");
    assert_eq!(stream.offset(), 8);

    // inline metadata wins over the advertised range support
    assert!(!stream.is_seekable());

    let tag = stream.tag().unwrap();
    assert_eq!(tag.title.as_deref(), Some("hi"));
    assert_eq!(tag.name.as_deref(), Some("Test FM"));
    assert_eq!(stream.tag(), None);
}

#[test]
fn http_404_surfaces_on_first_read() {
    let server = serve();
    let reactor = Reactor::new().unwrap();

    let mut stream = HttpInput::open(&reactor.handle(), &server.url("/missing"))
        .unwrap()
        .unwrap();

    match stream.read(&mut [0u8; 16]) {
        Err(InputError::HttpStatus(404)) => {}
        other => panic!("expected HTTP 404, got {other:?}"),
    }
    assert!(stream.eof());
}

#[test]
fn http_404_surfaces_through_check() {
    let server = serve();
    let reactor = Reactor::new().unwrap();

    let mut stream = HttpInput::open(&reactor.handle(), &server.url("/missing"))
        .unwrap()
        .unwrap();

    wait_available(&stream);
    match stream.check() {
        Err(InputError::HttpStatus(404)) => {}
        other => panic!("expected HTTP 404, got {other:?}"),
    }
    assert!(stream.check().is_ok());
}

#[test]
fn wrong_scheme_is_not_claimed() {
    let reactor = Reactor::new().unwrap();
    assert!(HttpInput::open(&reactor.handle(), "ftp://example.com/x")
        .unwrap()
        .is_none());
}

#[test]
fn backpressured_stream_delivers_everything() {
    let server = serve();
    let reactor = Reactor::new().unwrap();

    let mut stream = HttpInput::open(&reactor.handle(), &server.url("/big"))
        .unwrap()
        .unwrap();

    // let the producer run into the high-water mark before consuming
    thread::sleep(Duration::from_millis(400));

    let data = drain(&mut stream);
    assert_eq!(data.len(), BIG_LEN);
    assert_eq!(data, big_body());
    assert!(stream.eof());
    assert_eq!(stream.offset(), BIG_LEN as u64);
}

#[test]
fn redirects_are_followed() {
    let server = serve();
    let reactor = Reactor::new().unwrap();

    let mut stream = HttpInput::open(&reactor.handle(), &server.url("/redirect"))
        .unwrap()
        .unwrap();

    assert_eq!(drain(&mut stream), PLAIN_BODY);
}

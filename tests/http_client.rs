//! Integration tests for the stream client against a local HTTP peer.

use dualstack_transport::http::{SecureTransport, Stream};
use dualstack_transport::{ClientConfig, HttpClient, RetryPolicy, TransportError};
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tiny_http::{Header, Response, Server};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn fast_client() -> HttpClient {
    let config = ClientConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(50),
        },
        ..ClientConfig::default()
    };
    HttpClient::with_config(config).unwrap()
}

fn local_server() -> (Server, u16) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let port = server.server_addr().to_ip().unwrap().port();
    (server, port)
}

#[test]
fn test_get_roundtrip() {
    init_logging();
    let (server, port) = local_server();

    let handle = thread::spawn(move || {
        let request = server.recv().unwrap();
        assert_eq!(request.method(), &tiny_http::Method::Get);
        assert_eq!(request.url(), "/status");
        let response = Response::from_string("hello")
            .with_header(Header::from_bytes(&b"X-Server"[..], &b"tiny"[..]).unwrap());
        request.respond(response).unwrap();
    });

    let mut client = fast_client();
    client
        .open("GET", &format!("http://127.0.0.1:{}/status", port), &[])
        .unwrap();

    assert_eq!(client.status_code(), Some(200));
    assert_eq!(client.body_length(), 5);
    assert_eq!(client.response_header("x-server"), Some("tiny"));
    assert_eq!(client.body().unwrap(), b"hello");

    client.close();
    client.close(); // idempotent
    assert_eq!(client.status_code(), None);
    handle.join().unwrap();
}

#[test]
fn test_post_sends_headers_and_body() {
    init_logging();
    let (server, port) = local_server();

    let handle = thread::spawn(move || {
        let mut request = server.recv().unwrap();
        assert_eq!(request.method(), &tiny_http::Method::Post);
        assert!(request
            .headers()
            .iter()
            .any(|h| h.field.equiv("X-Device") && h.value.as_str() == "node-7"));
        let mut body = String::new();
        request.as_reader().read_to_string(&mut body).unwrap();
        assert_eq!(body, "{}");
        request.respond(Response::from_string("accepted")).unwrap();
    });

    let mut client = fast_client();
    client.set_header("X-Device", "node-7");
    client
        .open("POST", &format!("http://127.0.0.1:{}/report", port), b"{}")
        .unwrap();

    assert_eq!(client.status_code(), Some(200));
    assert_eq!(client.body().unwrap(), b"accepted");
    handle.join().unwrap();
}

#[test]
fn test_partial_reads_drain_the_body() {
    init_logging();
    let (server, port) = local_server();

    let handle = thread::spawn(move || {
        let request = server.recv().unwrap();
        request
            .respond(Response::from_string("0123456789"))
            .unwrap();
    });

    let mut client = fast_client();
    client
        .open("GET", &format!("http://127.0.0.1:{}/", port), &[])
        .unwrap();

    let mut collected = Vec::new();
    let mut buf = [0u8; 3];
    loop {
        let n = client.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        collected.extend_from_slice(&buf[..n]);
    }
    assert_eq!(collected, b"0123456789");
    handle.join().unwrap();
}

#[test]
fn test_redirect_is_followed() {
    init_logging();
    let (server, port) = local_server();

    let handle = thread::spawn(move || {
        let first = server.recv().unwrap();
        assert_eq!(first.url(), "/old");
        let response = Response::from_string("")
            .with_status_code(302)
            .with_header(Header::from_bytes(&b"Location"[..], &b"/new"[..]).unwrap());
        first.respond(response).unwrap();

        let second = server.recv().unwrap();
        assert_eq!(second.url(), "/new");
        second.respond(Response::from_string("moved")).unwrap();
    });

    let mut client = fast_client();
    client
        .open("GET", &format!("http://127.0.0.1:{}/old", port), &[])
        .unwrap();
    assert_eq!(client.status_code(), Some(200));
    assert_eq!(client.body().unwrap(), b"moved");
    handle.join().unwrap();
}

#[test]
fn test_redirect_loop_fails_after_bound() {
    init_logging();
    let (server, port) = local_server();

    // max_redirects = 2: the initial request plus two follows, then the
    // third 302 must fail the exchange instead of surfacing as success.
    let handle = thread::spawn(move || {
        for _ in 0..3 {
            let request = server.recv().unwrap();
            let response = Response::from_string("")
                .with_status_code(302)
                .with_header(Header::from_bytes(&b"Location"[..], &b"/again"[..]).unwrap());
            request.respond(response).unwrap();
        }
    });

    let config = ClientConfig {
        max_redirects: 2,
        retry: RetryPolicy {
            max_attempts: 1,
            delay: Duration::from_millis(10),
        },
        ..ClientConfig::default()
    };
    let mut client = HttpClient::with_config(config).unwrap();

    let err = client
        .open("GET", &format!("http://127.0.0.1:{}/again", port), &[])
        .unwrap_err();
    assert!(matches!(err, TransportError::HeaderFetchFailed(_)));
    assert_eq!(client.status_code(), None);
    handle.join().unwrap();
}

#[test]
fn test_303_downgrade_drops_user_content_length() {
    init_logging();
    let (server, port) = local_server();

    let handle = thread::spawn(move || {
        let first = server.recv().unwrap();
        assert_eq!(first.method(), &tiny_http::Method::Post);
        let response = Response::from_string("")
            .with_status_code(303)
            .with_header(Header::from_bytes(&b"Location"[..], &b"/done"[..]).unwrap());
        first.respond(response).unwrap();

        let second = server.recv().unwrap();
        assert_eq!(second.method(), &tiny_http::Method::Get);
        assert_eq!(second.url(), "/done");
        // The downgraded GET has no body, so no stale framing header.
        assert!(!second
            .headers()
            .iter()
            .any(|h| h.field.equiv("Content-Length")));
        second.respond(Response::from_string("done")).unwrap();
    });

    let mut client = fast_client();
    client.set_header("Content-Length", "2");
    client
        .open("POST", &format!("http://127.0.0.1:{}/submit", port), b"{}")
        .unwrap();
    assert_eq!(client.status_code(), Some(200));
    assert_eq!(client.body().unwrap(), b"done");
    handle.join().unwrap();
}

#[test]
fn test_zero_content_length_fails_header_fetch() {
    init_logging();
    let (server, port) = local_server();

    let handle = thread::spawn(move || {
        let request = server.recv().unwrap();
        request.respond(Response::from_string("")).unwrap();
    });

    let mut client = fast_client();
    let err = client
        .open("GET", &format!("http://127.0.0.1:{}/", port), &[])
        .unwrap_err();
    assert!(matches!(err, TransportError::HeaderFetchFailed(_)));
    assert_eq!(client.status_code(), None);
    handle.join().unwrap();
}

#[test]
fn test_malformed_url_is_rejected_before_any_socket() {
    init_logging();
    let mut client = fast_client();
    let err = client.open("GET", "example.com/a", &[]).unwrap_err();
    assert!(matches!(err, TransportError::InvalidAddress(_)));
}

#[test]
fn test_unrecognized_method_is_rejected() {
    init_logging();
    let mut client = fast_client();
    let err = client
        .open("PATCH", "http://127.0.0.1:1/", &[])
        .unwrap_err();
    assert!(matches!(err, TransportError::UnsupportedMethod(_)));
}

#[test]
fn test_connect_refused_is_retried_then_surfaced() {
    init_logging();
    // Grab a loopback port with no listener behind it.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let config = ClientConfig {
        retry: RetryPolicy {
            max_attempts: 2,
            delay: Duration::from_millis(50),
        },
        ..ClientConfig::default()
    };
    let mut client = HttpClient::with_config(config).unwrap();

    let start = Instant::now();
    let err = client
        .open("GET", &format!("http://127.0.0.1:{}/", port), &[])
        .unwrap_err();

    // Two attempts with one inter-attempt delay between them.
    assert!(start.elapsed() >= Duration::from_millis(50));
    assert!(err.is_connect_error(), "unexpected error: {}", err);
    assert_eq!(client.status_code(), None);
}

/// Stream whose writes always fail, standing in for a peer that drops the
/// connection right after the handshake.
struct BrokenPipeStream(TcpStream);

impl Read for BrokenPipeStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Write for BrokenPipeStream {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct FailingWrites;

impl SecureTransport for FailingWrites {
    fn wrap(&self, tcp: TcpStream, _host: &str) -> Result<Box<dyn Stream>, TransportError> {
        Ok(Box::new(BrokenPipeStream(tcp)))
    }
}

#[test]
fn test_body_write_failure_closes_without_header_fetch() {
    init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = thread::spawn(move || {
        // Accept the one connection; the client never gets a request out.
        let _ = listener.accept();
    });

    let config = ClientConfig {
        retry: RetryPolicy {
            max_attempts: 1,
            delay: Duration::from_millis(10),
        },
        ..ClientConfig::default()
    };
    let mut client = HttpClient::with_transport(config, Arc::new(FailingWrites));

    let err = client
        .open("POST", &format!("https://127.0.0.1:{}/", port), b"{}")
        .unwrap_err();

    assert!(matches!(err, TransportError::WriteFailed(_)));
    // Closed: no status, no headers, no body were ever fetched.
    assert_eq!(client.status_code(), None);
    assert_eq!(client.body_length(), 0);
    handle.join().unwrap();
}

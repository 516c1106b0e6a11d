//! Request/response client over a TLS-capable stream transport.
//!
//! Each exchange is a fresh connection: resolve (diagnostic), connect with
//! bounded retry and IPv6-first family fallback, write the request, read the
//! response head, then pull the body incrementally or all at once. There is
//! no connection pooling and no keep-alive.
//!
//! # Example
//!
//! ```no_run
//! use dualstack_transport::http::HttpClient;
//!
//! let mut client = HttpClient::new()?;
//! client.set_header("Accept", "application/json");
//! client.open("GET", "https://example.com/status", &[])?;
//! println!("status: {:?}", client.status_code());
//! let body = client.body()?;
//! client.close();
//! # Ok::<(), dualstack_transport::TransportError>(())
//! ```

mod client;
mod config;
mod request;
mod tls;

pub use client::HttpClient;
pub use config::{ClientConfig, CONNECT_TIMEOUT, IO_BUFFER_LEN, MAX_REDIRECTS};
pub use request::Method;
pub use tls::{SecureTransport, Stream, WebPkiTransport};

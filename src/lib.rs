//! Resilient dual-stack transport layer for small networked devices.
//!
//! Two capabilities over flaky radio links:
//!
//! - [`http::HttpClient`] — one request/response exchange per connection
//!   over a TLS-capable stream, with bounded connect retry and IPv6-first
//!   address-family fallback.
//! - [`udp::UdpSession`] — a connected datagram session that delivers
//!   incoming messages to a callback from a background receive loop.
//!
//! Both transports share the same establishment core: [`resolve`] orders
//! candidates IPv6-first and walks them with an injectable connect
//! primitive, and [`retry`] bounds the attempts. Everything blocks the
//! calling thread by design; the only internal thread is the per-session
//! datagram receiver.

pub mod error;
pub mod http;
pub mod resolve;
pub mod retry;
pub mod udp;

// Re-export commonly used items
pub use error::TransportError;
pub use http::{ClientConfig, HttpClient, Method, SecureTransport};
pub use resolve::{AddressFamily, Candidate};
pub use retry::RetryPolicy;
pub use udp::UdpSession;

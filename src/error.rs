//! Transport error taxonomy.
//!
//! One crate-wide error type covering address parsing, name resolution,
//! connection establishment (with differentiated connect causes so callers
//! can present useful diagnostics), and the stream/datagram I/O paths.

use std::io;

/// Errors reported by the transport layer.
#[derive(Debug)]
pub enum TransportError {
    /// The URL or host string could not be parsed.
    InvalidAddress(String),
    /// Name resolution produced no candidates for either address family.
    NameResolutionFailed(String),
    /// Connection attempt timed out.
    ConnectTimeout,
    /// Connection attempt was refused by the peer.
    ConnectRefused,
    /// Connection attempt failed for another reason.
    ConnectFailed(io::Error),
    /// Writing the request to an established connection failed.
    WriteFailed(io::Error),
    /// The response head could not be obtained or was unusable.
    HeaderFetchFailed(String),
    /// Reading from an established connection failed.
    ReadFailed(io::Error),
    /// The operation requires an open connection and none is open.
    NotConnected,
    /// The stream ended before the declared body length was delivered.
    IncompleteBody { expected: usize, got: usize },
    /// The request method is not one of GET, POST, PUT, DELETE.
    UnsupportedMethod(String),
    /// TLS setup or handshake failed.
    Tls(rustls::Error),
}

impl TransportError {
    /// Classify a connect-phase I/O error into its transport cause.
    pub fn from_connect_io(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Self::ConnectTimeout,
            io::ErrorKind::ConnectionRefused => Self::ConnectRefused,
            _ => Self::ConnectFailed(e),
        }
    }

    /// Returns true for any of the connect-failure causes.
    pub fn is_connect_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectTimeout | Self::ConnectRefused | Self::ConnectFailed(_)
        )
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAddress(s) => write!(f, "invalid address: {}", s),
            Self::NameResolutionFailed(host) => {
                write!(f, "name resolution failed for {}", host)
            }
            Self::ConnectTimeout => write!(f, "connection timed out"),
            Self::ConnectRefused => write!(f, "connection refused"),
            Self::ConnectFailed(e) => write!(f, "connection failed: {}", e),
            Self::WriteFailed(e) => write!(f, "write failed: {}", e),
            Self::HeaderFetchFailed(reason) => write!(f, "header fetch failed: {}", reason),
            Self::ReadFailed(e) => write!(f, "read failed: {}", e),
            Self::NotConnected => write!(f, "not connected"),
            Self::IncompleteBody { expected, got } => {
                write!(f, "incomplete body: expected {} bytes, got {}", expected, got)
            }
            Self::UnsupportedMethod(m) => write!(f, "unsupported method: {}", m),
            Self::Tls(e) => write!(f, "TLS error: {}", e),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConnectFailed(e) | Self::WriteFailed(e) | Self::ReadFailed(e) => Some(e),
            Self::Tls(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rustls::Error> for TransportError {
    fn from(e: rustls::Error) -> Self {
        Self::Tls(e)
    }
}

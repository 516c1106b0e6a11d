//! Stream client configuration.

use crate::retry::RetryPolicy;
use std::time::Duration;

/// Default connect timeout per candidate attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(15_000);

/// Default internal buffer size for reading the response.
pub const IO_BUFFER_LEN: usize = 4096;

/// Default bound on automatic redirect following.
pub const MAX_REDIRECTS: usize = 5;

/// Configuration for one [`HttpClient`](super::HttpClient).
///
/// The defaults mirror the device's connection constants; tests shrink the
/// retry delay through the embedded [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Timeout for each TCP connect attempt.
    pub connect_timeout: Duration,
    /// Buffer size for response head and body reads. The response head must
    /// fit within one buffer.
    pub buffer_size: usize,
    /// Maximum number of redirects followed automatically.
    pub max_redirects: usize,
    /// Bounded-retry policy for connection establishment.
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            buffer_size: IO_BUFFER_LEN,
            max_redirects: MAX_REDIRECTS,
            retry: RetryPolicy::default(),
        }
    }
}

//! The request/response stream client.

use super::config::ClientConfig;
use super::request::{request_head, Method};
use super::tls::{SecureTransport, Stream, WebPkiTransport};
use crate::error::TransportError;
use crate::resolve::{self, UrlParts};
use log::{debug, error, info, warn};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

/// One open request/response exchange.
///
/// The connection handle (and the TLS session wrapping it, for secure
/// streams) is exclusively owned here and dropped when the exchange closes.
struct Exchange {
    stream: Box<dyn Stream>,
    status: u16,
    headers: Vec<(String, String)>,
    content_length: usize,
    /// Body bytes that arrived together with the response head.
    buffered: Vec<u8>,
    cursor: usize,
    /// Total body bytes handed to the caller so far.
    delivered: usize,
}

/// Request/response client over a TLS-capable stream transport.
///
/// One exchange at a time: `open` must complete (with `close` or a terminal
/// failure) before the client is reused. Every failure path tears the
/// connection down; `close` is always safe to call again.
pub struct HttpClient {
    config: ClientConfig,
    tls: Arc<dyn SecureTransport>,
    headers: Vec<(String, String)>,
    exchange: Option<Exchange>,
}

impl HttpClient {
    /// Client with default configuration and the webpki trust bundle.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_config(ClientConfig::default())
    }

    /// Client with custom configuration and the webpki trust bundle.
    pub fn with_config(config: ClientConfig) -> Result<Self, TransportError> {
        Ok(Self::with_transport(
            config,
            Arc::new(WebPkiTransport::new()?),
        ))
    }

    /// Client with a caller-supplied secure transport provider.
    pub fn with_transport(config: ClientConfig, tls: Arc<dyn SecureTransport>) -> Self {
        Self {
            config,
            tls,
            headers: Vec::new(),
            exchange: None,
        }
    }

    /// Upsert an outgoing header. Keys are kept as set; the last write for
    /// a key wins. Callable any number of times before [`open`](Self::open).
    pub fn set_header(&mut self, key: &str, value: &str) {
        match self.headers.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.headers.push((key.to_string(), value.to_string())),
        }
    }

    /// Perform one request/response exchange.
    ///
    /// Resolves the host (diagnostic), connects with bounded retry and
    /// IPv6-first fallback, writes the request, reads the response head and
    /// leaves the body available through [`read`](Self::read) and
    /// [`body`](Self::body). Redirects are followed up to the configured
    /// bound. Any failure closes the connection before returning.
    pub fn open(&mut self, method: &str, url: &str, body: &[u8]) -> Result<(), TransportError> {
        // One exchange at a time; tear down any previous one first.
        self.close();

        let method = Method::parse(method)?;
        match self.open_exchange(method, url, body) {
            Ok(exchange) => {
                self.exchange = Some(exchange);
                Ok(())
            }
            Err(e) => {
                error!("{} {} failed: {}", method, url, e);
                self.close();
                Err(e)
            }
        }
    }

    /// Status code of the current exchange, once `open` has succeeded.
    pub fn status_code(&self) -> Option<u16> {
        self.exchange.as_ref().map(|ex| ex.status)
    }

    /// Response header lookup, case-insensitive per wire semantics.
    pub fn response_header(&self, key: &str) -> Option<&str> {
        header_value(&self.exchange.as_ref()?.headers, key)
    }

    /// Declared content length of the response body; 0 when no exchange is
    /// open.
    pub fn body_length(&self) -> usize {
        self.exchange.as_ref().map_or(0, |ex| ex.content_length)
    }

    /// Pull-style partial read of the response body.
    ///
    /// Serves bytes that arrived with the response head first, then reads
    /// from the connection. Returns `Ok(0)` at end of body and
    /// [`TransportError::NotConnected`] when no exchange is open.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let ex = self.exchange.as_mut().ok_or(TransportError::NotConnected)?;
        if buf.is_empty() {
            return Ok(0);
        }

        if ex.cursor < ex.buffered.len() {
            let n = (ex.buffered.len() - ex.cursor).min(buf.len());
            buf[..n].copy_from_slice(&ex.buffered[ex.cursor..ex.cursor + n]);
            ex.cursor += n;
            ex.delivered += n;
            return Ok(n);
        }

        if ex.delivered >= ex.content_length {
            return Ok(0);
        }
        let want = buf.len().min(ex.content_length - ex.delivered);
        let n = ex
            .stream
            .read(&mut buf[..want])
            .map_err(TransportError::ReadFailed)?;
        ex.delivered += n;
        Ok(n)
    }

    /// Materialize the rest of the body, exactly up to the declared content
    /// length.
    ///
    /// A stream that ends early yields [`TransportError::IncompleteBody`]
    /// rather than tearing the process down; the peer, not the caller, broke
    /// the contract.
    pub fn body(&mut self) -> Result<Vec<u8>, TransportError> {
        let expected = {
            let ex = self.exchange.as_ref().ok_or(TransportError::NotConnected)?;
            ex.content_length - ex.delivered
        };

        let mut out = vec![0u8; expected];
        let mut got = 0;
        while got < expected {
            let n = self.read(&mut out[got..])?;
            if n == 0 {
                break;
            }
            got += n;
        }
        if got < expected {
            return Err(TransportError::IncompleteBody { expected, got });
        }
        Ok(out)
    }

    /// Release the connection and any TLS session. Idempotent; always safe
    /// to call, including after a failed `open`.
    pub fn close(&mut self) {
        if self.exchange.take().is_some() {
            debug!("exchange closed");
        }
    }

    fn open_exchange(
        &self,
        mut method: Method,
        url: &str,
        mut body: &[u8],
    ) -> Result<Exchange, TransportError> {
        let mut parts = resolve::split_url(url)?;

        // Diagnostic resolution: logs which address families answered.
        // Never fails the exchange on its own; the connect path resolves
        // again for itself.
        if let Err(e) = resolve::candidates(&parts.host, parts.port_or_default()) {
            warn!("pre-connect resolution diagnostic: {}", e);
        }

        let mut request_headers = self.headers.clone();
        let mut redirects = 0;
        loop {
            let mut stream = self.connect(&parts)?;

            let head = request_head(method, &parts, &request_headers, body.len());
            stream
                .write_all(&head)
                .and_then(|_| stream.write_all(body))
                .and_then(|_| stream.flush())
                .map_err(TransportError::WriteFailed)?;

            let (status, headers, leftover) =
                read_head(stream.as_mut(), self.config.buffer_size)?;

            if matches!(status, 301 | 302 | 303 | 307 | 308) {
                if let Some(location) = header_value(&headers, "Location") {
                    if redirects >= self.config.max_redirects {
                        return Err(TransportError::HeaderFetchFailed(
                            "too many redirects".to_string(),
                        ));
                    }
                    let location = location.to_string();
                    info!("redirect {} -> {}", status, location);
                    if location.contains("://") {
                        parts = resolve::split_url(&location)?;
                    } else if location.starts_with('/') {
                        parts.path = location;
                    } else {
                        return Err(TransportError::HeaderFetchFailed(format!(
                            "unsupported redirect location: {}",
                            location
                        )));
                    }
                    if status == 303 {
                        // The downgraded GET carries no body; a caller-set
                        // Content-Length must not frame one.
                        method = Method::Get;
                        body = &[];
                        request_headers
                            .retain(|(k, _)| !k.eq_ignore_ascii_case("Content-Length"));
                    }
                    redirects += 1;
                    continue;
                }
            }

            let content_length = header_value(&headers, "Content-Length")
                .and_then(|v| v.trim().parse::<usize>().ok());
            let content_length = match content_length {
                Some(len) if len > 0 => len,
                _ => {
                    return Err(TransportError::HeaderFetchFailed(
                        "non-positive or missing content length".to_string(),
                    ))
                }
            };

            // Well-formed exchanges never push past the declared length.
            let mut buffered = leftover;
            buffered.truncate(content_length);

            info!(
                "{} {} -> {} ({} body bytes declared)",
                method, parts.host, status, content_length
            );
            return Ok(Exchange {
                stream,
                status,
                headers,
                content_length,
                buffered,
                cursor: 0,
                delivered: 0,
            });
        }
    }

    /// Connect with bounded retry; each attempt resolves afresh and walks
    /// the IPv6-first candidate list with a fresh socket per candidate.
    fn connect(&self, parts: &UrlParts) -> Result<Box<dyn Stream>, TransportError> {
        let port = parts.port_or_default();
        let secure = parts.scheme == "https";

        self.config.retry.run(|_| {
            let candidates = resolve::candidates(&parts.host, port)?;
            let tcp = resolve::first_reachable(&candidates, |cand| {
                TcpStream::connect_timeout(&cand.addr, self.config.connect_timeout)
                    .map_err(TransportError::from_connect_io)
            })?;

            if let Err(e) = tcp.set_nodelay(true) {
                warn!("failed to disable Nagle's algorithm: {}", e);
            }

            if secure {
                self.tls.wrap(tcp, &parts.host)
            } else {
                Ok(Box::new(tcp) as Box<dyn Stream>)
            }
        })
    }
}

fn header_value<'a>(headers: &'a [(String, String)], key: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}

/// Read and parse the response head.
///
/// The head must fit within one configured buffer. Bytes past the head
/// boundary are returned so the body accumulator can reconcile data that
/// arrived before the first explicit body read.
fn read_head(
    stream: &mut dyn Stream,
    buffer_size: usize,
) -> Result<(u16, Vec<(String, String)>, Vec<u8>), TransportError> {
    let mut raw: Vec<u8> = Vec::with_capacity(buffer_size);
    let mut chunk = vec![0u8; buffer_size];

    loop {
        if raw.len() >= buffer_size {
            return Err(TransportError::HeaderFetchFailed(
                "response head exceeds buffer".to_string(),
            ));
        }
        let n = stream
            .read(&mut chunk[..buffer_size - raw.len()])
            .map_err(TransportError::ReadFailed)?;
        if n == 0 {
            return Err(TransportError::HeaderFetchFailed(
                "connection closed before end of headers".to_string(),
            ));
        }
        raw.extend_from_slice(&chunk[..n]);

        let mut header_buf = [httparse::EMPTY_HEADER; 64];
        let mut response = httparse::Response::new(&mut header_buf);
        match response.parse(&raw) {
            Ok(httparse::Status::Complete(head_len)) => {
                let status = match response.code {
                    Some(code) => code,
                    None => {
                        return Err(TransportError::HeaderFetchFailed(
                            "response head missing status code".to_string(),
                        ))
                    }
                };
                let headers = response
                    .headers
                    .iter()
                    .map(|h| {
                        (
                            h.name.to_string(),
                            String::from_utf8_lossy(h.value).into_owned(),
                        )
                    })
                    .collect();
                return Ok((status, headers, raw[head_len..].to_vec()));
            }
            Ok(httparse::Status::Partial) => continue,
            Err(e) => {
                return Err(TransportError::HeaderFetchFailed(format!(
                    "malformed response head: {}",
                    e
                )))
            }
        }
    }
}

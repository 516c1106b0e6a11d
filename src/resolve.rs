//! Hostname resolution with IPv6-first candidate ordering.
//!
//! Resolution queries both address families and returns a preference-ordered
//! candidate list: every IPv6 candidate before every IPv4 candidate. Whether
//! the list actually contained an IPv6 address is logged as a diagnostic;
//! picking the address that finally connects is the caller's job, via
//! [`first_reachable`].
//!
//! A miss in one family is absorbed as long as the other family yields
//! candidates. Only an empty result fails, with
//! [`TransportError::NameResolutionFailed`].

use crate::error::TransportError;
use log::{debug, warn};
use std::net::{SocketAddr, ToSocketAddrs};

/// Transport-layer addressing scheme of a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    V4,
    V6,
}

/// One resolved address eligible for a connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub addr: SocketAddr,
}

impl Candidate {
    pub fn family(&self) -> AddressFamily {
        if self.addr.is_ipv6() {
            AddressFamily::V6
        } else {
            AddressFamily::V4
        }
    }
}

/// The pieces of a `scheme://host[:port][/path]` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlParts {
    pub scheme: String,
    /// Host with IPv6 brackets stripped.
    pub host: String,
    /// Explicit port, if the URL carried one.
    pub port: Option<u16>,
    /// Path including the leading `/`; defaults to `/`.
    pub path: String,
}

impl UrlParts {
    /// Explicit port, or the scheme default (80 for http, 443 for https).
    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(match self.scheme.as_str() {
            "https" => 443,
            _ => 80,
        })
    }

    /// Whether the host is an IPv6 literal (needs brackets on the wire).
    pub fn host_is_ipv6_literal(&self) -> bool {
        self.host.contains(':')
    }
}

/// Split a URL into scheme, host, port and path.
///
/// Accepts an optional bracketed IPv6 literal host
/// (`scheme://[::1]:8443/path`). A URL without the `://` delimiter, with an
/// empty host, or with an unparseable port fails with
/// [`TransportError::InvalidAddress`].
pub fn split_url(url: &str) -> Result<UrlParts, TransportError> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| TransportError::InvalidAddress(url.to_string()))?;

    let (host, after_host) = if let Some(bracketed) = rest.strip_prefix('[') {
        // Bracketed IPv6 literal: host runs to the closing bracket.
        let (host, after) = bracketed
            .split_once(']')
            .ok_or_else(|| TransportError::InvalidAddress(url.to_string()))?;
        (host, after)
    } else {
        // Host ends at the first ':' or '/', whichever comes first.
        let end = rest
            .find(|c| c == ':' || c == '/')
            .unwrap_or(rest.len());
        (&rest[..end], &rest[end..])
    };

    if host.is_empty() || scheme.is_empty() {
        return Err(TransportError::InvalidAddress(url.to_string()));
    }

    let (port, path) = match after_host.strip_prefix(':') {
        Some(port_and_path) => {
            let end = port_and_path.find('/').unwrap_or(port_and_path.len());
            let port = port_and_path[..end]
                .parse::<u16>()
                .map_err(|_| TransportError::InvalidAddress(url.to_string()))?;
            (Some(port), &port_and_path[end..])
        }
        None => (None, after_host),
    };

    let path = if path.is_empty() { "/" } else { path };

    Ok(UrlParts {
        scheme: scheme.to_string(),
        host: host.to_string(),
        port,
        path: path.to_string(),
    })
}

/// Order resolved addresses IPv6-first, preserving order within each family.
pub fn order_candidates(addrs: impl IntoIterator<Item = SocketAddr>) -> Vec<Candidate> {
    let (v6, v4): (Vec<SocketAddr>, Vec<SocketAddr>) =
        addrs.into_iter().partition(|a| a.is_ipv6());
    v6.into_iter()
        .chain(v4)
        .map(|addr| Candidate { addr })
        .collect()
}

/// Resolve a hostname to a preference-ordered candidate list.
///
/// Blocks on the platform's name-resolution call. Both families are queried
/// with an unspecified family hint; an empty result fails with
/// [`TransportError::NameResolutionFailed`].
pub fn candidates(host: &str, port: u16) -> Result<Vec<Candidate>, TransportError> {
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| {
            warn!("name resolution failed for {}: {}", host, e);
            TransportError::NameResolutionFailed(host.to_string())
        })?
        .collect::<Vec<_>>();

    if addrs.is_empty() {
        return Err(TransportError::NameResolutionFailed(host.to_string()));
    }

    let list = order_candidates(addrs);

    // Diagnostic side channel: report whether IPv6 is on the table at all.
    if list.iter().any(|c| c.family() == AddressFamily::V6) {
        debug!("{} resolved with IPv6 available, preferring IPv6", host);
    } else {
        warn!(
            "{} resolved to IPv4 only; IPv6-only peers will be unreachable",
            host
        );
    }
    for cand in &list {
        debug!("  candidate {:?}: {}", cand.family(), cand.addr);
    }

    Ok(list)
}

/// Walk an ordered candidate list with an injectable connect primitive.
///
/// Each failed attempt is logged and its resources dropped before the next
/// candidate is tried. Returns the first successful connection, or the last
/// observed error once the list is exhausted.
pub fn first_reachable<T>(
    candidates: &[Candidate],
    mut connect: impl FnMut(&Candidate) -> Result<T, TransportError>,
) -> Result<T, TransportError> {
    let mut last_err = None;
    for cand in candidates {
        match connect(cand) {
            Ok(conn) => {
                debug!("connected to {:?} candidate {}", cand.family(), cand.addr);
                return Ok(conn);
            }
            Err(e) => {
                warn!("connect to {} failed: {}", cand.addr, e);
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or(TransportError::NotConnected))
}

//! Request method and head serialization.

use crate::error::TransportError;
use crate::resolve::UrlParts;
use std::fmt;

/// Request methods accepted by the stream client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    /// Parse a method string. The match is case-sensitive and exact;
    /// anything else is rejected with [`TransportError::UnsupportedMethod`]
    /// rather than silently mapped to GET, so caller mistakes stay visible.
    pub fn parse(s: &str) -> Result<Self, TransportError> {
        match s {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            _ => Err(TransportError::UnsupportedMethod(s.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serialize the request head: request line, connection defaults, then the
/// caller's headers. A caller-set header suppresses the matching default
/// (compared case-insensitively, per wire semantics).
pub(crate) fn request_head(
    method: Method,
    parts: &UrlParts,
    user_headers: &[(String, String)],
    body_len: usize,
) -> Vec<u8> {
    let mut head = format!("{} {} HTTP/1.1\r\n", method, parts.path);

    let user_has = |name: &str| {
        user_headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case(name))
    };

    if !user_has("Host") {
        let host = if parts.host_is_ipv6_literal() {
            format!("[{}]", parts.host)
        } else {
            parts.host.clone()
        };
        match parts.port {
            Some(port) => head.push_str(&format!("Host: {}:{}\r\n", host, port)),
            None => head.push_str(&format!("Host: {}\r\n", host)),
        }
    }

    // Every exchange is a fresh connection.
    if !user_has("Connection") {
        head.push_str("Connection: close\r\n");
    }

    let needs_length = body_len > 0 || matches!(method, Method::Post | Method::Put);
    if needs_length && !user_has("Content-Length") {
        head.push_str(&format!("Content-Length: {}\r\n", body_len));
    }

    for (key, value) in user_headers {
        head.push_str(&format!("{}: {}\r\n", key, value));
    }

    head.push_str("\r\n");
    head.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::split_url;

    fn head_str(method: Method, url: &str, headers: &[(String, String)], body_len: usize) -> String {
        let parts = split_url(url).unwrap();
        String::from_utf8(request_head(method, &parts, headers, body_len)).unwrap()
    }

    #[test]
    fn test_parse_is_case_sensitive_exact() {
        assert_eq!(Method::parse("GET").unwrap(), Method::Get);
        assert_eq!(Method::parse("DELETE").unwrap(), Method::Delete);
        assert!(matches!(
            Method::parse("get"),
            Err(TransportError::UnsupportedMethod(_))
        ));
        assert!(matches!(
            Method::parse("PATCH"),
            Err(TransportError::UnsupportedMethod(_))
        ));
    }

    #[test]
    fn test_get_head_defaults() {
        let head = head_str(Method::Get, "http://example.com/a", &[], 0);
        assert!(head.starts_with("GET /a HTTP/1.1\r\n"));
        assert!(head.contains("Host: example.com\r\n"));
        assert!(head.contains("Connection: close\r\n"));
        assert!(!head.contains("Content-Length"));
        assert!(head.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_post_head_carries_content_length() {
        let head = head_str(Method::Post, "http://example.com/a", &[], 2);
        assert!(head.starts_with("POST /a HTTP/1.1\r\n"));
        assert!(head.contains("Content-Length: 2\r\n"));
    }

    #[test]
    fn test_post_with_empty_body_declares_zero_length() {
        let head = head_str(Method::Post, "http://example.com/", &[], 0);
        assert!(head.contains("Content-Length: 0\r\n"));
    }

    #[test]
    fn test_explicit_port_and_ipv6_host_header() {
        let head = head_str(Method::Get, "https://[::1]:8443/x", &[], 0);
        assert!(head.contains("Host: [::1]:8443\r\n"));
    }

    #[test]
    fn test_user_header_overrides_default() {
        let headers = vec![("host".to_string(), "other.example".to_string())];
        let head = head_str(Method::Get, "http://example.com/", &headers, 0);
        assert!(head.contains("host: other.example\r\n"));
        assert!(!head.contains("Host: example.com"));
    }
}

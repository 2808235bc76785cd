//! Client request parsing and reconstruction.
//!
//! # Responsibilities
//! - Tokenize the request line into method, target, and version
//! - Extract the header subset the proxy cares about (Host, User-Agent,
//!   Connection, If-None-Match, If-Modified-Since)
//! - Keep any body bytes that followed the head (forwarded verbatim on POST)
//! - Reconstruct an HTTP/1.1 request for the origin server
//!
//! # Design Decisions
//! - Only the header subset above is ever forwarded upstream; everything
//!   else a client sends is dropped by the reconstructor
//! - The original request line is preserved untouched for logging

use crate::http::{split_head, ParseError};

/// A parsed client request.
///
/// The validator fields start out as whatever the client sent and may be
/// overwritten by the revalidation flow before reconstruction.
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Request method as received (GET, POST, CONNECT, ...).
    pub method: String,
    /// Request target, absolute-form or origin-form.
    pub target: String,
    /// HTTP version from the request line.
    pub version: String,
    /// Host name from the Host header (or the CONNECT authority).
    pub host: String,
    /// Port suffix of the Host header; empty when the client sent none.
    pub port: String,
    /// The original request line, for logging.
    pub request_line: String,
    pub user_agent: String,
    pub connection: String,
    pub if_none_match: String,
    pub if_modified_since: String,
    /// Bytes that followed the head in the client's buffer.
    pub body: Vec<u8>,
}

impl Request {
    /// Parse one request from a raw client buffer.
    pub fn parse(raw: &[u8]) -> Result<Self, ParseError> {
        let (head, body) = split_head(raw);
        let head = std::str::from_utf8(head).map_err(|_| ParseError::Encoding)?;

        let mut lines = head.split("\r\n");
        let request_line = lines
            .next()
            .map(|l| l.trim_end_matches(|c| c == '\r' || c == '\n'))
            .filter(|l| !l.is_empty())
            .ok_or(ParseError::StartLine)?;

        let mut parts = request_line.split_whitespace();
        let method = parts.next().ok_or(ParseError::StartLine)?.to_string();
        let target = parts.next().ok_or(ParseError::StartLine)?.to_string();
        let version = parts.next().ok_or(ParseError::StartLine)?.to_string();

        let mut request = Request {
            method,
            target,
            version,
            request_line: request_line.to_string(),
            body: body.to_vec(),
            ..Request::default()
        };

        for line in lines {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                break;
            }
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim_start();
            if name.eq_ignore_ascii_case("Host") {
                match value.split_once(':') {
                    Some((host, port)) => {
                        request.host = host.to_string();
                        request.port = port.to_string();
                    }
                    None => request.host = value.to_string(),
                }
            } else if name.eq_ignore_ascii_case("User-Agent") {
                request.user_agent = value.to_string();
            } else if name.eq_ignore_ascii_case("Connection") {
                request.connection = value.to_string();
            } else if name.eq_ignore_ascii_case("If-None-Match") {
                request.if_none_match = value.to_string();
            } else if name.eq_ignore_ascii_case("If-Modified-Since") {
                request.if_modified_since = value.to_string();
            }
        }

        // CONNECT clients often send no Host header at all; the
        // authority-form target carries the same information.
        if request.host.is_empty() && !request.target.contains('/') {
            match request.target.split_once(':') {
                Some((host, port)) => {
                    request.host = host.to_string();
                    request.port = port.to_string();
                }
                None => request.host = request.target.clone(),
            }
        }

        Ok(request)
    }

    /// The path component of the target, with any absolute-form scheme and
    /// authority stripped.
    pub fn path(&self) -> &str {
        let stripped = self
            .target
            .strip_prefix("http://")
            .or_else(|| self.target.strip_prefix("https://"));
        match stripped {
            Some(rest) => match rest.find('/') {
                Some(i) => &rest[i..],
                None => "/",
            },
            None => &self.target,
        }
    }

    /// Cache key for this request: host followed by path, no scheme.
    pub fn cache_key(&self) -> String {
        format!("{}{}", self.host, self.path())
    }

    /// The numeric origin port, falling back to `default` when the client
    /// sent none or sent something unparsable.
    pub fn origin_port(&self, default: u16) -> u16 {
        self.port.parse().unwrap_or(default)
    }

    /// Reconstruct the outbound request head.
    ///
    /// Always speaks HTTP/1.1 regardless of the inbound version, and only
    /// carries the parsed header subset. The `:port` suffix is appended to
    /// Host only when it is present and not the default 80.
    pub fn to_wire(&self) -> String {
        let mut out = format!("{} {} HTTP/1.1\r\n", self.method, self.target);

        if !self.host.is_empty() {
            out.push_str("Host: ");
            out.push_str(&self.host);
            if !self.port.is_empty() && self.port != "80" {
                out.push(':');
                out.push_str(&self.port);
            }
            out.push_str("\r\n");
        }

        for (name, value) in [
            ("User-Agent", &self.user_agent),
            ("Connection", &self.connection),
            ("If-None-Match", &self.if_none_match),
            ("If-Modified-Since", &self.if_modified_since),
        ] {
            if !value.is_empty() {
                out.push_str(name);
                out.push_str(": ");
                out.push_str(value);
                out.push_str("\r\n");
            }
        }

        out.push_str("\r\n");
        out
    }
}

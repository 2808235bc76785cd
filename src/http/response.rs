//! Origin response parsing, cache metadata, and serialization.
//!
//! # Responsibilities
//! - Parse the status line and headers out of a response buffer
//! - Detect framing: `Transfer-Encoding: chunked` or `Content-Length`
//! - Derive cache metadata from `Cache-Control`, `Expires`, `Date`, and
//!   `Last-Modified`
//! - Serialize the response back to wire format for the client
//!
//! # Design Decisions
//! - Headers keep their received casing and order so serialization
//!   round-trips; lookups are case-insensitive
//! - `expire_time` is the single source of truth for freshness: an empty
//!   string means the response is already stale

use std::time::Duration;

use crate::http::{split_head, ParseError};

/// Threshold above which a response body is treated as "large" and drained
/// from the origin before the client sees any of it.
pub const LARGE_BODY_THRESHOLD: i64 = 65536;

/// How a cached response may be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Served while fresh, revalidated once expired.
    Normal,
    /// Every reuse requires revalidation with the origin.
    MustRevalidate,
    /// Must not be stored at all.
    NoStore,
    /// Never changes while fresh; served without contacting the origin.
    Immutable,
}

/// Whether the response is reusable by a shared cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheVisibility {
    Public,
    Private,
}

/// A parsed origin response together with its derived cache metadata.
#[derive(Debug, Clone)]
pub struct Response {
    pub version: String,
    pub status_code: u16,
    pub status_message: String,
    headers: Vec<(String, String)>,
    pub body: Vec<u8>,

    /// True when Transfer-Encoding contains the `chunked` token.
    pub is_chunked: bool,
    /// Declared Content-Length; -1 when the header is absent.
    pub content_length: i64,

    pub no_store: bool,
    pub no_cache: bool,
    pub must_revalidate: bool,
    /// Effective max-age in seconds; -1 when absent or unparsable.
    pub max_age: i64,
    pub cache_mode: CacheMode,
    pub cache_visibility: CacheVisibility,
    /// Absolute expiry as an HTTP-date; empty means already stale.
    pub expire_time: String,
}

impl Response {
    /// Parse a response buffer that contains at least one complete head.
    pub fn parse(raw: &[u8]) -> Result<Self, ParseError> {
        let (head, body) = split_head(raw);
        let head = std::str::from_utf8(head).map_err(|_| ParseError::Encoding)?;

        let mut lines = head.split("\r\n");
        let status_line = lines
            .next()
            .map(|l| l.trim_end_matches(|c| c == '\r' || c == '\n'))
            .filter(|l| !l.is_empty())
            .ok_or(ParseError::StartLine)?;

        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().ok_or(ParseError::StartLine)?.to_string();
        let status_code = parts
            .next()
            .ok_or(ParseError::StartLine)?
            .trim()
            .parse::<u16>()
            .map_err(|_| ParseError::StatusCode)?;
        let status_message = parts.next().unwrap_or("").to_string();

        let mut headers = Vec::new();
        let mut is_chunked = false;
        let mut content_length = -1i64;

        for line in lines {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                break;
            }
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim_start_matches(' ').trim_end_matches('\r');

            if name.eq_ignore_ascii_case("Transfer-Encoding") && value.contains("chunked") {
                is_chunked = true;
            } else if name.eq_ignore_ascii_case("Content-Length") {
                content_length = value
                    .trim()
                    .parse()
                    .map_err(|_| ParseError::ContentLength(value.to_string()))?;
            }

            headers.push((name.to_string(), value.to_string()));
        }

        let mut response = Response {
            version,
            status_code,
            status_message,
            headers,
            body: body.to_vec(),
            is_chunked,
            content_length,
            no_store: false,
            no_cache: false,
            must_revalidate: false,
            max_age: -1,
            cache_mode: CacheMode::Normal,
            cache_visibility: CacheVisibility::Public,
            expire_time: String::new(),
        };

        response.parse_cache_control();
        response.derive_expiry();
        Ok(response)
    }

    /// Look up a header value, matching the name case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn set_header(&mut self, name: &str, value: String) {
        match self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some((_, v)) => *v = value,
            None => self.headers.push((name.to_string(), value)),
        }
    }

    pub fn etag(&self) -> Option<&str> {
        self.header("ETag")
    }

    pub fn last_modified(&self) -> Option<&str> {
        self.header("Last-Modified")
    }

    pub fn cache_control(&self) -> Option<&str> {
        self.header("Cache-Control")
    }

    /// The status line without trailing whitespace, e.g. `HTTP/1.1 200 OK`.
    pub fn status_line(&self) -> String {
        format!("{} {} {}", self.version, self.status_code, self.status_message)
            .trim_end()
            .to_string()
    }

    /// Append relayed chunked data to the stored body.
    pub fn append_chunked(&mut self, data: &[u8]) {
        if self.is_chunked {
            self.body.extend_from_slice(data);
        }
    }

    /// True once the accumulated chunked body carries the final
    /// `0\r\n\r\n` terminator.
    pub fn chunked_complete(&self) -> bool {
        self.body.len() >= 5 && &self.body[self.body.len() - 5..] == b"0\r\n\r\n"
    }

    /// Append body bytes and keep the Content-Length header in step.
    pub fn append_body(&mut self, data: &[u8]) {
        self.body.extend_from_slice(data);
        self.content_length = self.body.len() as i64;
        self.set_header("Content-Length", self.body.len().to_string());
    }

    /// Whether a shared cache may store this response.
    pub fn is_cacheable(&self) -> bool {
        self.status_code == 200
            && self.cache_mode != CacheMode::NoStore
            && self.cache_visibility != CacheVisibility::Private
    }

    /// Whether reuse requires asking the origin first.
    pub fn needs_revalidation(&self) -> bool {
        self.cache_mode == CacheMode::MustRevalidate || self.no_cache
    }

    /// Serialize head and body back to wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body.len() + 256);
        out.extend_from_slice(
            format!(
                "{} {} {}\r\n",
                self.version, self.status_code, self.status_message
            )
            .as_bytes(),
        );
        for (name, value) in &self.headers {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }

    /// Tokenize Cache-Control and set the directive flags, effective
    /// max-age, mode, and visibility.
    fn parse_cache_control(&mut self) {
        let Some(value) = self.cache_control().map(str::to_owned) else {
            return;
        };

        let mut s_maxage_applied = false;
        let mut immutable = false;

        for directive in value.split(',') {
            let directive = directive.trim().to_ascii_lowercase();
            match directive.as_str() {
                "no-store" => {
                    self.no_store = true;
                    self.cache_mode = CacheMode::NoStore;
                }
                "no-cache" => {
                    self.no_cache = true;
                    self.cache_mode = CacheMode::MustRevalidate;
                }
                "must-revalidate" | "proxy-revalidate" => {
                    self.must_revalidate = true;
                    self.cache_mode = CacheMode::MustRevalidate;
                }
                "private" => self.cache_visibility = CacheVisibility::Private,
                "public" => self.cache_visibility = CacheVisibility::Public,
                "immutable" => immutable = true,
                _ => {
                    if let Some(rest) = directive.strip_prefix("max-age=") {
                        // s-maxage wins over max-age in a shared cache
                        if !s_maxage_applied {
                            self.max_age = rest.parse().unwrap_or(-1);
                        }
                    } else if let Some(rest) = directive.strip_prefix("s-maxage=") {
                        if self.cache_visibility == CacheVisibility::Public {
                            s_maxage_applied = true;
                            self.max_age = rest.parse().unwrap_or(-1);
                        }
                    }
                }
            }
        }

        if !self.no_cache && !self.no_store && !self.must_revalidate {
            self.cache_mode = if immutable {
                CacheMode::Immutable
            } else {
                CacheMode::Normal
            };
        }
    }

    /// Derive the absolute expiry time. First rule that applies wins:
    /// max-age over Date, then Expires verbatim, then Date itself when
    /// revalidation is mandatory, then the Last-Modified heuristic.
    fn derive_expiry(&mut self) {
        let date_raw = self.header("Date").map(str::to_owned);
        let date = date_raw
            .as_deref()
            .and_then(|d| httpdate::parse_http_date(d).ok());
        let expires = self.header("Expires").map(str::to_owned);
        let last_modified = self
            .last_modified()
            .and_then(|v| httpdate::parse_http_date(v).ok());

        if self.max_age > 0 {
            if let Some(date) = date {
                let expiry = date + Duration::from_secs(self.max_age as u64);
                self.expire_time = httpdate::fmt_http_date(expiry);
                return;
            }
        }

        if let Some(expires) = expires {
            self.expire_time = expires;
            return;
        }

        if self.must_revalidate {
            if let Some(date_raw) = date_raw {
                self.expire_time = date_raw;
                return;
            }
        }

        if self.cache_mode != CacheMode::NoStore {
            if let (Some(date), Some(last_modified)) = (date, last_modified) {
                // Heuristic freshness: a tenth of the Date/Last-Modified gap
                let heuristic = date
                    .duration_since(last_modified)
                    .map(|gap| gap / 10)
                    .unwrap_or_default();
                self.expire_time = httpdate::fmt_http_date(date + heuristic);
            }
        }
    }
}

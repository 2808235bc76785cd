//! HTTP/1.1 protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Client bytes
//!     → request.rs (parse request line + header subset, keep body bytes)
//!     → [handler dispatches GET / POST / CONNECT]
//!     → request.rs (reconstruct outbound request for the origin)
//!
//! Origin bytes
//!     → response.rs (status line, headers, framing, cache metadata)
//!     → [cache decides storage]
//!     → response.rs (serialize back to the client)
//! ```
//!
//! # Design Decisions
//! - Header names are matched case-insensitively but stored as received, so
//!   a re-serialized response is byte-identical to what the origin sent
//! - Bodies are raw bytes; only the head is required to be UTF-8

pub mod request;
pub mod response;

pub use request::Request;
pub use response::{CacheMode, CacheVisibility, Response};

use thiserror::Error;

/// Errors produced while parsing an HTTP message head.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The message head is not valid UTF-8.
    #[error("message head is not valid UTF-8")]
    Encoding,

    /// The request or status line is missing or incomplete.
    #[error("missing or malformed start line")]
    StartLine,

    /// The status code is not a decimal integer.
    #[error("invalid status code")]
    StatusCode,

    /// Content-Length is present but not a decimal integer.
    #[error("invalid Content-Length: {0}")]
    ContentLength(String),
}

/// Split a raw HTTP message into its head and the bytes that follow the
/// `\r\n\r\n` terminator. Messages without a terminator are treated as
/// all-head so a truncated read still parses as far as it can.
pub(crate) fn split_head(raw: &[u8]) -> (&[u8], &[u8]) {
    match raw.windows(4).position(|w| w == b"\r\n\r\n") {
        Some(i) => (&raw[..i], &raw[i + 4..]),
        None => (raw, &[]),
    }
}

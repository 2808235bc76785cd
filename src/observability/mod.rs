//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Handlers and cache produce:
//!     → request_log.rs (one line per transaction event, flushed per line)
//!     → tracing (operational diagnostics: startup, accepts, failures)
//!
//! Consumers:
//!     → the transaction log file (audit trail keyed by request id)
//!     → stdout via tracing-subscriber (operator visibility)
//! ```
//!
//! # Design Decisions
//! - The transaction log and tracing never mix: the former is a stable,
//!   line-oriented audit format, the latter is free-form diagnostics
//! - Request id -1 marks proxy-wide events (startup, eviction, sweep)

pub mod logging;
pub mod request_log;

pub use request_log::{RequestLog, PROXY_WIDE};

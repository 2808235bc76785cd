//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → Hand off to the request handler
//!
//! Outgoing origin connection
//!     → connect.rs (resolve, per-address connect, bounded burst reads)
//! ```

pub mod connect;
pub mod listener;

pub use connect::{connect_origin, receive_burst, receive_remaining, receive_until_close, RECV_CHUNK};
pub use listener::{ConnectionPermit, Listener, ListenerError};

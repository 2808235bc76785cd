//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     SIGINT received → trigger() → acceptor exits, tunnels observe the
//!     flag, in-flight handlers run to completion
//!
//! Signals (signals.rs):
//!     Ctrl+C → trigger graceful shutdown
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;

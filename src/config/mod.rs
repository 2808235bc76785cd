//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! CLI (port) + optional config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → shared by value / Arc with the server and handlers
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the listening port always comes from
//!   the command line and overrides whatever the file says
//! - All fields have defaults so the proxy runs with no config file at all
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::{CacheConfig, ListenerConfig, LogConfig, ProxyConfig, TimeoutConfig};

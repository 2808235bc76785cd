//! Caching HTTP/1.1 Forward Proxy
//!
//! A concurrent forward proxy built with Tokio. It terminates client
//! connections, relays GET / POST / CONNECT traffic to origin servers, and
//! keeps cacheable GET responses in a bounded, shared, LRU-evicted response
//! cache with RFC 7234 freshness and revalidation semantics.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌───────────────────────────────────────────────────┐
//!                       │                  FORWARD PROXY                    │
//!                       │                                                   │
//!   Client Request      │  ┌─────────┐    ┌───────────┐    ┌─────────────┐ │
//!   ────────────────────┼─▶│   net   │───▶│   http    │───▶│    proxy    │ │
//!                       │  │listener │    │  request  │    │   handler   │ │
//!                       │  └─────────┘    └───────────┘    └──────┬──────┘ │
//!                       │                                         │        │
//!                       │                   ┌─────────────────────┤        │
//!                       │                   ▼                     ▼        │
//!                       │           ┌──────────────┐     ┌──────────────┐  │
//!                       │           │    cache     │     │ net::connect │◀─┼── Origin
//!                       │           │  (RW + LRU)  │     │ + http resp. │  │   Server
//!                       │           └──────────────┘     └──────────────┘  │
//!                       │                                                   │
//!                       │  ┌─────────────────────────────────────────────┐  │
//!                       │  │           Cross-Cutting Concerns            │  │
//!                       │  │  ┌────────┐ ┌─────────────┐ ┌────────────┐  │  │
//!                       │  │  │ config │ │observability│ │ lifecycle  │  │  │
//!                       │  │  │        │ │ request log │ │ shutdown   │  │  │
//!                       │  │  └────────┘ └─────────────┘ └────────────┘  │  │
//!                       │  └─────────────────────────────────────────────┘  │
//!                       └───────────────────────────────────────────────────┘
//! ```
//!
//! CONNECT requests bypass the cache entirely: once the origin connection is
//! established the handler degrades to an opaque bidirectional byte relay
//! (`proxy::tunnel`) until either peer closes, the idle timeout fires, or
//! shutdown is triggered.

// Core subsystems
pub mod cache;
pub mod config;
pub mod http;
pub mod net;
pub mod proxy;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::ProxyConfig;
pub use lifecycle::Shutdown;
pub use proxy::ProxyServer;

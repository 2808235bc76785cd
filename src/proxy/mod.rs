//! Proxy core: accept loop and per-request protocol state machine.
//!
//! # Data Flow
//! ```text
//! Listener accept
//!     → mod.rs (assign request id, spawn handler task into the JoinSet)
//!     → handler.rs (parse, dispatch GET / POST / CONNECT, cache, relay)
//!     → tunnel.rs (CONNECT only: opaque bidirectional byte relay)
//! ```
//!
//! # Design Decisions
//! - One task per accepted connection; the JoinSet doubles as the registry
//!   drained on shutdown
//! - Request ids are assigned monotonically at accept time and appear in
//!   every transaction log line
//! - Handler failures never propagate out of their task

pub mod handler;
pub mod tunnel;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::cache::ResponseCache;
use crate::config::ProxyConfig;
use crate::lifecycle::Shutdown;
use crate::net::Listener;
use crate::observability::{RequestLog, PROXY_WIDE};
use crate::proxy::handler::Handler;

/// The proxy server: owns the cache, the transaction log, and the request
/// id counter, and runs the accept loop.
pub struct ProxyServer {
    config: ProxyConfig,
    cache: Arc<ResponseCache>,
    log: Arc<RequestLog>,
    next_request_id: AtomicI64,
}

impl ProxyServer {
    /// Build a server from configuration. Opens (and truncates) the
    /// transaction log.
    pub fn new(config: ProxyConfig) -> std::io::Result<Self> {
        let log = Arc::new(RequestLog::open(&config.log.path)?);
        let cache = Arc::new(ResponseCache::new(
            config.cache.max_entries,
            Duration::from_secs(config.cache.sweep_interval_secs),
            Arc::clone(&log),
        ));

        Ok(Self {
            config,
            cache,
            log,
            next_request_id: AtomicI64::new(0),
        })
    }

    /// The shared response cache.
    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Accept connections until shutdown is triggered, spawning one handler
    /// task per connection.
    ///
    /// On shutdown the listening socket is dropped so no new connections
    /// arrive, and the outstanding handler tasks are drained; tunnels
    /// observe the shutdown flag and exit on their own.
    pub async fn run(&self, listener: Listener, shutdown: Arc<Shutdown>) -> std::io::Result<()> {
        let port = listener.local_addr().map(|a| a.port()).unwrap_or_default();
        self.log
            .note(PROXY_WIDE, &format!("Proxy started on port {port}"));
        tracing::info!(port, "Accepting connections");

        let mut shutdown_rx = shutdown.subscribe();
        let mut tasks: JoinSet<()> = JoinSet::new();

        loop {
            // Reap handlers that finished since the last accept
            while tasks.try_join_next().is_some() {}

            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer, permit)) => {
                            let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
                            let handler = Handler::new(
                                stream,
                                peer.ip(),
                                id,
                                Arc::clone(&self.cache),
                                Arc::clone(&self.log),
                                self.config.timeouts.clone(),
                                Arc::clone(&shutdown),
                            );
                            tasks.spawn(async move {
                                let _permit = permit;
                                handler.run().await;
                            });
                        }
                        Err(e) => {
                            if shutdown.is_triggered() {
                                break;
                            }
                            self.log.error(PROXY_WIDE, "Failed to accept connection");
                            tracing::warn!(error = %e, "Accept failed");
                        }
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }

        // Stop accepting, then let in-flight handlers finish
        drop(listener);
        while tasks.join_next().await.is_some() {}

        self.log.note(PROXY_WIDE, "Proxy stopped");
        tracing::info!("Proxy stopped");
        Ok(())
    }
}

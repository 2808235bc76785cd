//! Per-connection request handler.
//!
//! # State Machine
//! ```text
//! Receive ──parse ok──▶ Dispatch ──GET────▶ Cache lookup ─▶ [revalidate] ─▶ Fetch
//!    │                     │ POST ───▶ Passthrough                          │
//!    └─parse fail─▶ 400    │ CONNECT ▶ Tunnel                     Cache + respond
//!                          └─other ──▶ 501
//! ```
//!
//! Fatal failures map to minimal HTML error pages: 400 for a malformed
//! request, 501 for an unknown method, 502 when the origin is unreachable or
//! its response cannot be parsed. Every delivered response, error pages
//! included, emits a `Responding` log line.

use std::net::IpAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::cache::{CacheLookup, ResponseCache};
use crate::config::TimeoutConfig;
use crate::http::response::LARGE_BODY_THRESHOLD;
use crate::http::{CacheMode, CacheVisibility, Request, Response};
use crate::lifecycle::Shutdown;
use crate::net::{
    connect_origin, receive_burst, receive_remaining, receive_until_close, RECV_CHUNK,
};
use crate::observability::RequestLog;
use crate::proxy::tunnel;

/// Outcome of a revalidation attempt.
enum Revalidation {
    /// The client has been answered (from cache or with an error page).
    Served,
    /// The cached copy is unusable; fetch from the origin.
    FetchRequired,
}

/// Handles one client connection from first byte to close.
pub struct Handler {
    client: TcpStream,
    peer_ip: IpAddr,
    id: i64,
    cache: Arc<ResponseCache>,
    log: Arc<RequestLog>,
    timeouts: TimeoutConfig,
    shutdown: Arc<Shutdown>,
}

impl Handler {
    pub fn new(
        client: TcpStream,
        peer_ip: IpAddr,
        id: i64,
        cache: Arc<ResponseCache>,
        log: Arc<RequestLog>,
        timeouts: TimeoutConfig,
        shutdown: Arc<Shutdown>,
    ) -> Self {
        Self {
            client,
            peer_ip,
            id,
            cache,
            log,
            timeouts,
            shutdown,
        }
    }

    /// Receive, parse, and dispatch one request, then close the connection.
    pub async fn run(mut self) {
        let raw = receive_burst(&mut self.client, self.timeouts.client_recv()).await;
        if raw.is_empty() {
            self.log.error(self.id, "Empty request received");
            return;
        }

        let request = match Request::parse(&raw) {
            Ok(request) => request,
            Err(e) => {
                self.log
                    .error(self.id, &format!("Failed to parse request: {e}"));
                self.send_error(400, "Bad Request").await;
                return;
            }
        };

        self.log
            .new_request(self.id, &request.request_line, self.peer_ip);
        tracing::debug!(
            id = self.id,
            method = %request.method,
            target = %request.target,
            "Dispatching request"
        );

        match request.method.as_str() {
            "GET" => self.process_get(request).await,
            "POST" => self.process_post(request).await,
            "CONNECT" => self.process_connect(request).await,
            other => {
                self.log
                    .error(self.id, &format!("Method {other} not implemented"));
                self.send_error(501, "Not Implemented").await;
            }
        }
    }

    /// GET: consult the cache, revalidate when required, fetch on miss.
    async fn process_get(&mut self, request: Request) {
        let key = request.cache_key();

        match self.cache.get(&key) {
            CacheLookup::Fresh(cached) => {
                self.log.in_cache_valid(self.id);
                let _ = self.client.write_all(&cached.to_bytes()).await;
                self.log.responding(self.id, &cached.status_line());
            }
            CacheLookup::RequiresValidation(cached) => {
                self.log.in_cache_requires_validation(self.id);
                if let Revalidation::FetchRequired = self.revalidate(&request, &cached).await {
                    self.fetch_and_serve(&request, &key).await;
                }
            }
            CacheLookup::Expired(cached) => {
                self.log.in_cache_expired(self.id, &cached.expire_time);
                self.fetch_and_serve(&request, &key).await;
            }
            CacheLookup::Miss => {
                self.log.not_in_cache(self.id);
                self.fetch_and_serve(&request, &key).await;
            }
        }
    }

    /// Ask the origin whether the cached copy is still usable, using the
    /// cached validators. A 304 short-circuits with the cached response.
    async fn revalidate(&mut self, request: &Request, cached: &Response) -> Revalidation {
        let etag = cached.etag().unwrap_or_default().to_string();
        let last_modified = cached.last_modified().unwrap_or_default().to_string();

        if etag.is_empty() && last_modified.is_empty() {
            self.log
                .note(self.id, "Validation not possible - no validator headers");
            return Revalidation::FetchRequired;
        }

        let port = request.origin_port(80);
        let mut origin = match connect_origin(&request.host, port).await {
            Ok(stream) => stream,
            Err(e) => {
                self.log.error(
                    self.id,
                    &format!(
                        "Failed to connect to {}:{port} for validation: {e}",
                        request.host
                    ),
                );
                self.send_error(502, "Bad Gateway").await;
                return Revalidation::Served;
            }
        };

        // The conditional request is a copy; the original stays clean for a
        // possible unconditional fetch afterwards.
        let mut conditional = request.clone();
        if !etag.is_empty() {
            conditional.if_none_match = etag.clone();
            self.log
                .note(self.id, &format!("Using ETag for validation: {etag}"));
        }
        if !last_modified.is_empty() {
            conditional.if_modified_since = last_modified.clone();
            self.log.note(
                self.id,
                &format!("Using Last-Modified for validation: {last_modified}"),
            );
        }

        self.log
            .requesting(self.id, &request.request_line, &request.host);
        if origin
            .write_all(conditional.to_wire().as_bytes())
            .await
            .is_err()
        {
            self.log.error(self.id, "Failed to send validation request");
            return Revalidation::FetchRequired;
        }

        let raw = receive_burst(&mut origin, self.timeouts.origin_recv()).await;
        if raw.is_empty() {
            self.log
                .error(self.id, "Empty validation response from server");
            return Revalidation::FetchRequired;
        }

        let validation = match Response::parse(&raw) {
            Ok(response) => response,
            Err(_) => {
                self.log
                    .error(self.id, "Failed to parse validation response");
                return Revalidation::FetchRequired;
            }
        };
        self.log
            .received(self.id, &validation.status_line(), &request.host);

        if validation.status_code == 304 {
            self.log
                .note(self.id, "Validation successful - using cached copy");
            let _ = self.client.write_all(&cached.to_bytes()).await;
            self.log.responding(self.id, &cached.status_line());
            Revalidation::Served
        } else {
            self.log.note(self.id, "Content changed - using new response");
            Revalidation::FetchRequired
        }
    }

    /// Fetch from the origin, stream or assemble the body as the framing
    /// dictates, respond to the client, and store the result when cacheable.
    async fn fetch_and_serve(&mut self, request: &Request, key: &str) {
        let port = request.origin_port(80);
        self.log
            .requesting(self.id, &request.request_line, &request.host);

        let mut origin = match connect_origin(&request.host, port).await {
            Ok(stream) => stream,
            Err(e) => {
                self.log.error(
                    self.id,
                    &format!("Failed to connect to {}:{port}: {e}", request.host),
                );
                self.send_error(502, "Bad Gateway").await;
                return;
            }
        };

        if origin.write_all(request.to_wire().as_bytes()).await.is_err() {
            self.log.error(self.id, "Failed to send request to server");
            self.send_error(502, "Bad Gateway").await;
            return;
        }

        let initial = receive_burst(&mut origin, self.timeouts.initial_response()).await;
        if initial.is_empty() {
            self.log.error(self.id, "Empty response from server");
            self.send_error(502, "Bad Gateway").await;
            return;
        }

        let mut response = match Response::parse(&initial) {
            Ok(response) => response,
            Err(e) => {
                self.log
                    .error(self.id, &format!("Malformed response from server: {e}"));
                self.send_error(502, "Bad Gateway").await;
                return;
            }
        };

        if response.is_chunked {
            self.log.note(self.id, "Detected chunked encoding");
            let _ = self.client.write_all(&initial).await;
            self.relay_chunks(&mut origin, &mut response).await;
        } else if response.content_length > LARGE_BODY_THRESHOLD {
            self.log.note(
                self.id,
                &format!("Detected large content: {} bytes", response.content_length),
            );
            let missing = (response.content_length as usize).saturating_sub(response.body.len());
            let rest = receive_remaining(&mut origin, missing, self.timeouts.origin_recv()).await;
            response.append_body(&rest);
            let _ = self.client.write_all(&response.to_bytes()).await;
        } else {
            self.complete_body(&mut origin, &mut response).await;
            let _ = self.client.write_all(&response.to_bytes()).await;
        }

        self.log
            .received(self.id, &response.status_line(), &request.host);
        if let Some(etag) = response.etag() {
            self.log.note(self.id, &format!("ETag: {etag}"));
        }
        if let Some(cache_control) = response.cache_control() {
            self.log
                .note(self.id, &format!("Cache-Control: {cache_control}"));
        }

        let status_line = response.status_line();
        if response.status_code == 200 {
            self.store_response(response, key);
        }
        self.log.responding(self.id, &status_line);
    }

    /// Drain whatever the framing says is still owed on a non-chunked,
    /// non-large response.
    async fn complete_body(&mut self, origin: &mut TcpStream, response: &mut Response) {
        if response.content_length > 0 {
            let declared = response.content_length as usize;
            if response.body.len() < declared {
                let missing = declared - response.body.len();
                let rest =
                    receive_remaining(origin, missing, self.timeouts.origin_recv()).await;
                response.append_body(&rest);
            }
        } else if response.content_length < 0 && body_allowed(response.status_code) {
            // Close-delimited body: neither chunked nor Content-Length
            let rest = receive_until_close(origin, self.timeouts.origin_recv()).await;
            if !rest.is_empty() {
                response.append_body(&rest);
            }
        }
    }

    /// Forward chunked data origin→client while accumulating it in the
    /// stored body, until the terminating `0\r\n\r\n` or the origin closes.
    async fn relay_chunks(&mut self, origin: &mut TcpStream, response: &mut Response) {
        use tokio::io::AsyncReadExt;

        let mut buf = vec![0u8; RECV_CHUNK];
        while !response.chunked_complete() {
            let n = match timeout(self.timeouts.origin_recv(), origin.read(&mut buf)).await {
                Err(_) => break,
                Ok(Err(_)) | Ok(Ok(0)) => break,
                Ok(Ok(n)) => n,
            };
            response.append_chunked(&buf[..n]);
            if self.client.write_all(&buf[..n]).await.is_err() {
                self.log.error(self.id, "Failed to forward chunk to client");
                break;
            }
        }
    }

    /// Record the storage decision and hand cacheable responses to the cache.
    fn store_response(&self, response: Response, key: &str) {
        if !response.is_cacheable() {
            let reason = if response.status_code != 200 {
                "status code is not 200 OK"
            } else if response.no_store || response.cache_mode == CacheMode::NoStore {
                "cache-control: no-store"
            } else if response.cache_visibility == CacheVisibility::Private {
                "cache-control: private"
            } else {
                "response is not reusable"
            };
            self.log.not_cacheable(self.id, reason);
            return;
        }

        if !response.expire_time.is_empty() {
            self.log.cached_until(self.id, &response.expire_time);
        } else if response.no_cache || response.must_revalidate {
            self.log.cached_needs_revalidation(self.id);
        }

        self.cache.put(key, response);
    }

    /// POST: forward the reconstructed request plus the client's body bytes,
    /// relay the response. Never cached.
    async fn process_post(&mut self, request: Request) {
        let port = request.origin_port(80);
        self.log
            .requesting(self.id, &request.request_line, &request.host);

        let mut origin = match connect_origin(&request.host, port).await {
            Ok(stream) => stream,
            Err(e) => {
                self.log.error(
                    self.id,
                    &format!("Failed to connect to {}:{port}: {e}", request.host),
                );
                self.send_error(502, "Bad Gateway").await;
                return;
            }
        };

        let mut outbound = request.to_wire().into_bytes();
        outbound.extend_from_slice(&request.body);
        if origin.write_all(&outbound).await.is_err() {
            self.log.error(self.id, "Failed to send request to server");
            self.send_error(502, "Bad Gateway").await;
            return;
        }

        let initial = receive_burst(&mut origin, self.timeouts.initial_response()).await;
        if initial.is_empty() {
            self.log.error(self.id, "Empty response from server");
            self.send_error(502, "Bad Gateway").await;
            return;
        }

        let mut response = match Response::parse(&initial) {
            Ok(response) => response,
            Err(e) => {
                self.log
                    .error(self.id, &format!("Malformed response from server: {e}"));
                self.send_error(502, "Bad Gateway").await;
                return;
            }
        };

        if response.is_chunked {
            self.log.note(self.id, "Detected chunked encoding");
            let _ = self.client.write_all(&initial).await;
            self.relay_chunks(&mut origin, &mut response).await;
        } else {
            if response.content_length > 0
                && response.body.len() < response.content_length as usize
            {
                self.log.note(self.id, "Getting remaining body data");
            }
            self.complete_body(&mut origin, &mut response).await;
            let _ = self.client.write_all(&response.to_bytes()).await;
        }

        self.log
            .received(self.id, &response.status_line(), &request.host);
        self.log.responding(self.id, &response.status_line());
    }

    /// CONNECT: open the origin connection, confirm with 200, then relay
    /// bytes both ways until a close, the idle timeout, or shutdown.
    async fn process_connect(&mut self, request: Request) {
        let port = request.origin_port(443);

        let origin = match connect_origin(&request.host, port).await {
            Ok(stream) => stream,
            Err(e) => {
                self.log.error(
                    self.id,
                    &format!("Failed to connect to {}:{port} for tunnel: {e}", request.host),
                );
                self.send_error(502, "Bad Gateway").await;
                return;
            }
        };

        if self
            .client
            .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
            .await
            .is_err()
        {
            return;
        }
        self.log
            .responding(self.id, "HTTP/1.1 200 Connection established");

        tunnel::relay(
            &mut self.client,
            origin,
            self.timeouts.tunnel_idle(),
            &self.shutdown,
            &self.log,
            self.id,
        )
        .await;

        self.log.tunnel_closed(self.id);
    }

    /// Send a minimal HTML error page and log the response.
    async fn send_error(&mut self, status: u16, reason: &str) {
        let status_line = format!("HTTP/1.1 {status} {reason}");
        let body = format!(
            "<html><head><title>{status} {reason}</title></head>\
             <body><h1>{status} {reason}</h1><p>Proxy Error</p></body></html>"
        );
        let response = format!(
            "{status_line}\r\nContent-Type: text/html\r\nConnection: close\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );

        let _ = self.client.write_all(response.as_bytes()).await;
        self.log.responding(self.id, &status_line);
    }
}

/// Whether a response with this status code may carry a body at all.
fn body_allowed(status: u16) -> bool {
    !(100..200).contains(&status) && status != 204 && status != 304
}

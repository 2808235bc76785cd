//! Shared utilities for proxy integration tests.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use caching_proxy::net::Listener;
use caching_proxy::{ProxyConfig, ProxyServer, Shutdown};

/// Start a mock origin whose response is computed from the request text.
/// Returns the origin address and a counter of accepted connections.
pub async fn start_origin<F>(respond: F) -> (SocketAddr, Arc<AtomicU32>)
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&hits);
    let respond = Arc::new(respond);
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let respond = Arc::clone(&respond);
                    tokio::spawn(async move {
                        let mut buf = vec![0u8; 16384];
                        let n = socket.read(&mut buf).await.unwrap_or(0);
                        let request = String::from_utf8_lossy(&buf[..n]).to_string();

                        let response = respond(&request);
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, hits)
}

/// Start a mock origin that answers with a chunked response written in two
/// stages, so the proxy has to relay past the initial burst.
#[allow(dead_code)]
pub async fn start_chunked_origin() -> (SocketAddr, Arc<AtomicU32>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&hits);
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(async move {
                        let mut buf = vec![0u8; 16384];
                        let _ = socket.read(&mut buf).await;

                        let date = httpdate::fmt_http_date(std::time::SystemTime::now());
                        let head = format!(
                            "HTTP/1.1 200 OK\r\nDate: {date}\r\nCache-Control: max-age=60\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n5\r\nhello\r\n"
                        );
                        let _ = socket.write_all(head.as_bytes()).await;
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        let _ = socket.write_all(b"0\r\n\r\n").await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, hits)
}

/// Start a mock origin that echoes every byte back, for tunnel tests.
#[allow(dead_code)]
pub async fn start_echo_origin() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut buf = vec![0u8; 4096];
                        loop {
                            match socket.read(&mut buf).await {
                                Ok(0) | Err(_) => break,
                                Ok(n) => {
                                    if socket.write_all(&buf[..n]).await.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// A default config with its transaction log pointed at a unique temp file.
pub fn test_config(tag: &str) -> (ProxyConfig, PathBuf) {
    let mut config = ProxyConfig::default();
    let path = std::env::temp_dir().join(format!(
        "caching-proxy-test-{tag}-{}.log",
        std::process::id()
    ));
    config.log.path = path.clone();
    (config, path)
}

/// Bind the proxy on an ephemeral port and run it in the background.
pub async fn start_proxy(mut config: ProxyConfig) -> (SocketAddr, Arc<ProxyServer>, Arc<Shutdown>) {
    config.listener.bind_address = "127.0.0.1".to_string();
    config.listener.port = 0;

    let listener = Listener::bind(&config.listener).unwrap();
    let addr = listener.local_addr().unwrap();

    let server = Arc::new(ProxyServer::new(config).unwrap());
    let shutdown = Arc::new(Shutdown::new());

    let run_server = Arc::clone(&server);
    let run_shutdown = Arc::clone(&shutdown);
    tokio::spawn(async move {
        let _ = run_server.run(listener, run_shutdown).await;
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    (addr, server, shutdown)
}

/// A reqwest client that routes everything through the proxy and never
/// reuses connections (the proxy closes after each response).
pub fn proxy_client(proxy: SocketAddr) -> reqwest::Client {
    reqwest::Client::builder()
        .proxy(reqwest::Proxy::http(format!("http://{proxy}")).unwrap())
        .pool_max_idle_per_host(0)
        .build()
        .unwrap()
}

/// Read the transaction log, tolerating a not-yet-flushed file.
pub fn read_log(path: &PathBuf) -> String {
    std::fs::read_to_string(path).unwrap_or_default()
}

//! CONNECT tunneling, POST passthrough, error responses, and shutdown.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

mod common;

async fn read_some(stream: &mut TcpStream) -> String {
    let mut buf = vec![0u8; 8192];
    match tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf)).await {
        Ok(Ok(n)) => String::from_utf8_lossy(&buf[..n]).to_string(),
        _ => String::new(),
    }
}

#[tokio::test]
async fn test_connect_tunnel_relays_bytes_both_ways() {
    let echo = common::start_echo_origin().await;
    let (config, log_path) = common::test_config("tunnel");
    let (proxy, _server, shutdown) = common::start_proxy(config).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client
        .write_all(format!("CONNECT {echo} HTTP/1.1\r\n\r\n").as_bytes())
        .await
        .unwrap();

    let established = read_some(&mut client).await;
    assert!(
        established.starts_with("HTTP/1.1 200 Connection established"),
        "got: {established:?}"
    );

    client.write_all(b"ping").await.unwrap();
    let echoed = read_some(&mut client).await;
    assert_eq!(echoed, "ping");

    client.write_all(b"opaque \x00\x01\x02 payload").await.unwrap();
    let mut buf = vec![0u8; 64];
    let n = client.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"opaque \x00\x01\x02 payload");

    drop(client);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let log = common::read_log(&log_path);
    assert!(log.contains("Responding \"HTTP/1.1 200 Connection established\""));
    assert!(log.contains("Tunnel closed"));

    shutdown.trigger();
}

#[tokio::test]
async fn test_idle_tunnel_times_out() {
    let echo = common::start_echo_origin().await;
    let (mut config, log_path) = common::test_config("tunnel-idle");
    config.timeouts.tunnel_idle_ms = 300;
    let (proxy, _server, shutdown) = common::start_proxy(config).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client
        .write_all(format!("CONNECT {echo} HTTP/1.1\r\n\r\n").as_bytes())
        .await
        .unwrap();
    let established = read_some(&mut client).await;
    assert!(established.starts_with("HTTP/1.1 200"));

    // send nothing: the relay must give up on its own
    tokio::time::sleep(Duration::from_millis(800)).await;

    let log = common::read_log(&log_path);
    assert!(log.contains("Tunnel timeout after 0.3 seconds of inactivity"));
    assert!(log.contains("Tunnel closed"));

    shutdown.trigger();
}

#[tokio::test]
async fn test_post_passes_body_through_and_is_not_cached() {
    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let requests = Arc::clone(&seen);
    let (origin, _hits) = common::start_origin(move |request| {
        requests.lock().unwrap().push(request.to_string());
        "HTTP/1.1 200 OK\r\nContent-Length: 7\r\nConnection: close\r\n\r\nposted!".to_string()
    })
    .await;
    let (config, log_path) = common::test_config("post");
    let (proxy, server, shutdown) = common::start_proxy(config).await;
    let client = common::proxy_client(proxy);

    let res = client
        .post(format!("http://{origin}/submit"))
        .body("name=x")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "posted!");
    assert_eq!(server.cache().len(), 0, "POST responses are never cached");

    let seen = seen.lock().unwrap();
    assert!(seen[0].starts_with("POST "));
    assert!(seen[0].contains("name=x"), "body must reach the origin");

    let log = common::read_log(&log_path);
    assert!(log.contains("Responding \"HTTP/1.1 200 OK\""));

    shutdown.trigger();
}

#[tokio::test]
async fn test_unknown_method_gets_501() {
    let (config, log_path) = common::test_config("unknown-method");
    let (proxy, _server, shutdown) = common::start_proxy(config).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client
        .write_all(b"DELETE http://x.test/a HTTP/1.1\r\nHost: x.test\r\n\r\n")
        .await
        .unwrap();

    let response = read_some(&mut client).await;
    assert!(response.starts_with("HTTP/1.1 501 Not Implemented"));

    let log = common::read_log(&log_path);
    assert!(log.contains("ERROR Method DELETE not implemented"));

    shutdown.trigger();
}

#[tokio::test]
async fn test_malformed_request_gets_400() {
    let (config, _log_path) = common::test_config("malformed");
    let (proxy, _server, shutdown) = common::start_proxy(config).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client.write_all(b"garbage\r\n\r\n").await.unwrap();

    let response = read_some(&mut client).await;
    assert!(response.starts_with("HTTP/1.1 400 Bad Request"));

    shutdown.trigger();
}

#[tokio::test]
async fn test_unreachable_origin_gets_502() {
    let (config, log_path) = common::test_config("unreachable");
    let (proxy, _server, shutdown) = common::start_proxy(config).await;
    let client = common::proxy_client(proxy);

    // port 1 on loopback is not listening
    let res = client.get("http://127.0.0.1:1/a").send().await.unwrap();
    assert_eq!(res.status(), 502);

    let log = common::read_log(&log_path);
    assert!(log.contains("Responding \"HTTP/1.1 502 Bad Gateway\""));

    shutdown.trigger();
}

#[tokio::test]
async fn test_shutdown_stops_the_proxy() {
    let (config, log_path) = common::test_config("shutdown");
    let (_proxy, _server, shutdown) = common::start_proxy(config).await;

    shutdown.trigger();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let log = common::read_log(&log_path);
    assert!(log.contains("NOTE Proxy started on port "));
    assert!(log.contains("NOTE Proxy stopped"));
}

//! Origin connection helper: name resolution, per-address connect, and
//! bounded socket reads.
//!
//! The read helpers here are deliberately dumb about HTTP: they return raw
//! byte bursts and leave message framing to the request handler, which knows
//! whether it is waiting on a head, a counted body, or a chunked stream.

use std::io;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;

/// Socket reads happen in chunks of at most this many bytes.
pub const RECV_CHUNK: usize = 64 * 1024;

/// Resolve `host` and connect to the first address that accepts.
///
/// Addresses are tried in resolver order with a fresh socket each; the error
/// from the last attempt is returned if none succeed.
pub async fn connect_origin(host: &str, port: u16) -> io::Result<TcpStream> {
    let addrs = lookup_host((host, port)).await?;

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses resolved for {host}:{port}"),
        )
    }))
}

/// Read one burst of data: successive reads until a read comes up short,
/// the peer closes, a read fails, or no data arrives within `idle`.
///
/// Returns whatever accumulated; an empty result means the peer sent
/// nothing inside the window.
pub async fn receive_burst(stream: &mut TcpStream, idle: Duration) -> Vec<u8> {
    let mut data = Vec::new();
    let mut buf = vec![0u8; RECV_CHUNK];

    loop {
        let n = match timeout(idle, stream.read(&mut buf)).await {
            Err(_) => break,
            Ok(Err(_)) | Ok(Ok(0)) => break,
            Ok(Ok(n)) => n,
        };
        data.extend_from_slice(&buf[..n]);
        if n < buf.len() {
            break;
        }
    }

    data
}

/// Read until `remaining` bytes arrived, the peer closes, or a read stalls
/// past `idle`.
pub async fn receive_remaining(
    stream: &mut TcpStream,
    mut remaining: usize,
    idle: Duration,
) -> Vec<u8> {
    let mut data = Vec::new();
    let mut buf = vec![0u8; RECV_CHUNK];

    while remaining > 0 {
        let want = remaining.min(buf.len());
        let n = match timeout(idle, stream.read(&mut buf[..want])).await {
            Err(_) => break,
            Ok(Err(_)) | Ok(Ok(0)) => break,
            Ok(Ok(n)) => n,
        };
        data.extend_from_slice(&buf[..n]);
        remaining -= n;
    }

    data
}

/// Read until the peer closes or a read stalls past `idle`. Used for
/// close-delimited bodies that carry neither Content-Length nor chunking.
pub async fn receive_until_close(stream: &mut TcpStream, idle: Duration) -> Vec<u8> {
    let mut data = Vec::new();
    let mut buf = vec![0u8; RECV_CHUNK];

    loop {
        let n = match timeout(idle, stream.read(&mut buf)).await {
            Err(_) => break,
            Ok(Err(_)) | Ok(Ok(0)) => break,
            Ok(Ok(n)) => n,
        };
        data.extend_from_slice(&buf[..n]);
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_refused_port_is_an_error() {
        // port 1 is essentially never listening on loopback
        assert!(connect_origin("127.0.0.1", 1).await.is_err());
    }

    #[tokio::test]
    async fn test_receive_burst_reads_short_write() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"hello burst").await.unwrap();
            socket.shutdown().await.unwrap();
        });

        let mut stream = connect_origin("127.0.0.1", addr.port()).await.unwrap();
        let data = receive_burst(&mut stream, Duration::from_secs(2)).await;
        assert_eq!(data, b"hello burst");
    }

    #[tokio::test]
    async fn test_receive_remaining_stops_at_count() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"0123456789").await.unwrap();
            // keep the socket open; the reader must not wait for close
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut stream = connect_origin("127.0.0.1", addr.port()).await.unwrap();
        let data = receive_remaining(&mut stream, 4, Duration::from_secs(2)).await;
        assert_eq!(data, b"0123");
    }

    #[tokio::test]
    async fn test_receive_until_close_drains_everything() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"part one ").await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            socket.write_all(b"part two").await.unwrap();
            socket.shutdown().await.unwrap();
        });

        let mut stream = connect_origin("127.0.0.1", addr.port()).await.unwrap();
        let data = receive_until_close(&mut stream, Duration::from_secs(2)).await;
        assert_eq!(data, b"part one part two");
    }
}

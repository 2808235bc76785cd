//! Opaque bidirectional byte relay for CONNECT tunnels.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::sleep;

use crate::lifecycle::Shutdown;
use crate::net::RECV_CHUNK;
use crate::observability::RequestLog;

/// Relay bytes between client and origin until either peer closes, a write
/// fails, nothing moves for `idle`, or shutdown is triggered.
///
/// The payload is never inspected; TLS handshakes and application data pass
/// through untouched.
pub async fn relay(
    client: &mut TcpStream,
    mut origin: TcpStream,
    idle: Duration,
    shutdown: &Shutdown,
    log: &RequestLog,
    id: i64,
) {
    let mut shutdown_rx = shutdown.subscribe();
    let (mut client_rd, mut client_wr) = client.split();
    let (mut origin_rd, mut origin_wr) = origin.split();

    let mut client_buf = vec![0u8; RECV_CHUNK];
    let mut origin_buf = vec![0u8; RECV_CHUNK];

    loop {
        if shutdown.is_triggered() {
            break;
        }

        tokio::select! {
            read = client_rd.read(&mut client_buf) => match read {
                Ok(0) | Err(_) => {
                    log.note(id, "Connection closed by client");
                    break;
                }
                Ok(n) => {
                    if origin_wr.write_all(&client_buf[..n]).await.is_err() {
                        log.error(id, "Failed to forward data to server");
                        break;
                    }
                }
            },
            read = origin_rd.read(&mut origin_buf) => match read {
                Ok(0) | Err(_) => {
                    log.note(id, "Connection closed by server");
                    break;
                }
                Ok(n) => {
                    if client_wr.write_all(&origin_buf[..n]).await.is_err() {
                        log.error(id, "Failed to forward data to client");
                        break;
                    }
                }
            },
            _ = sleep(idle) => {
                log.note(
                    id,
                    &format!(
                        "Tunnel timeout after {:.1} seconds of inactivity",
                        idle.as_secs_f64()
                    ),
                );
                break;
            }
            _ = shutdown_rx.recv() => break,
        }
    }
}

//! Per-transaction event log.
//!
//! Every client transaction appends a sequence of lines keyed by its request
//! id. The file is truncated at startup and each line is flushed as it is
//! written so the log survives a crash mid-transaction.

use std::fs::{self, File};
use std::io::{self, Write};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;

/// Request id used for events that belong to the proxy as a whole rather
/// than a single transaction.
pub const PROXY_WIDE: i64 = -1;

/// Append-only transaction log with a mutex-guarded file handle.
pub struct RequestLog {
    file: Mutex<File>,
}

impl RequestLog {
    /// Open (and truncate) the log file, creating parent directories as
    /// needed.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    fn write_line(&self, line: std::fmt::Arguments<'_>) {
        let mut file = self.file.lock().expect("request log mutex poisoned");
        let _ = writeln!(file, "{line}");
        let _ = file.flush();
    }

    /// `<id>: "<request-line>" from <ip> @ <time>`
    pub fn new_request(&self, id: i64, request_line: &str, ip: IpAddr) {
        let time = httpdate::fmt_http_date(SystemTime::now());
        self.write_line(format_args!("{id}: \"{request_line}\" from {ip} @ {time}"));
    }

    /// `<id>: Requesting "<request-line>" from <host>`
    pub fn requesting(&self, id: i64, request_line: &str, host: &str) {
        self.write_line(format_args!("{id}: Requesting \"{request_line}\" from {host}"));
    }

    /// `<id>: Received "<status-line>" from <host>`
    pub fn received(&self, id: i64, status_line: &str, host: &str) {
        self.write_line(format_args!("{id}: Received \"{status_line}\" from {host}"));
    }

    pub fn not_in_cache(&self, id: i64) {
        self.write_line(format_args!("{id}: not in cache"));
    }

    pub fn in_cache_expired(&self, id: i64, expired_at: &str) {
        self.write_line(format_args!("{id}: in cache, but expired at {expired_at}"));
    }

    pub fn in_cache_requires_validation(&self, id: i64) {
        self.write_line(format_args!("{id}: in cache, requires validation"));
    }

    pub fn in_cache_valid(&self, id: i64) {
        self.write_line(format_args!("{id}: in cache, valid"));
    }

    pub fn not_cacheable(&self, id: i64, reason: &str) {
        self.write_line(format_args!("{id}: not cacheable because {reason}"));
    }

    pub fn cached_until(&self, id: i64, expires_at: &str) {
        self.write_line(format_args!("{id}: cached, expires at {expires_at}"));
    }

    pub fn cached_needs_revalidation(&self, id: i64) {
        self.write_line(format_args!("{id}: cached, but requires re-validation"));
    }

    /// `<id>: Responding "<status-line>"`
    pub fn responding(&self, id: i64, status_line: &str) {
        self.write_line(format_args!("{id}: Responding \"{status_line}\""));
    }

    pub fn tunnel_closed(&self, id: i64) {
        self.write_line(format_args!("{id}: Tunnel closed"));
    }

    pub fn error(&self, id: i64, message: &str) {
        self.write_line(format_args!("{id}: ERROR {message}"));
    }

    pub fn note(&self, id: i64, message: &str) {
        self.write_line(format_args!("{id}: NOTE {message}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicU32, Ordering};

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    fn temp_log() -> std::path::PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!(
            "request-log-test-{}-{n}.log",
            std::process::id()
        ))
    }

    #[test]
    fn test_line_formats() {
        let path = temp_log();
        let log = RequestLog::open(&path).unwrap();

        log.new_request(0, "GET /a HTTP/1.1", IpAddr::V4(Ipv4Addr::LOCALHOST));
        log.not_in_cache(0);
        log.requesting(0, "GET /a HTTP/1.1", "x.test");
        log.received(0, "HTTP/1.1 200 OK", "x.test");
        log.cached_until(0, "Mon, 01 Jan 2024 00:01:00 GMT");
        log.responding(0, "HTTP/1.1 200 OK");
        log.error(PROXY_WIDE, "boom");
        log.note(PROXY_WIDE, "evicted x.test/a from cache");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("0: \"GET /a HTTP/1.1\" from 127.0.0.1 @ "));
        assert!(contents.contains("0: not in cache\n"));
        assert!(contents.contains("0: Requesting \"GET /a HTTP/1.1\" from x.test\n"));
        assert!(contents.contains("0: Received \"HTTP/1.1 200 OK\" from x.test\n"));
        assert!(contents.contains("0: cached, expires at Mon, 01 Jan 2024 00:01:00 GMT\n"));
        assert!(contents.contains("0: Responding \"HTTP/1.1 200 OK\"\n"));
        assert!(contents.contains("-1: ERROR boom\n"));
        assert!(contents.contains("-1: NOTE evicted x.test/a from cache\n"));

        std::fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn test_open_truncates_existing_file() {
        let path = temp_log();
        std::fs::write(&path, "stale contents\n").unwrap();

        let log = RequestLog::open(&path).unwrap();
        log.note(PROXY_WIDE, "fresh start");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("stale contents"));
        assert!(contents.contains("-1: NOTE fresh start\n"));

        std::fs::remove_file(&path).unwrap_or_default();
    }
}

//! Shared response cache with LRU eviction and RFC 7234 freshness.
//!
//! # Responsibilities
//! - Map full URLs (host + path) to stored responses
//! - Classify lookups: miss, fresh, expired, or revalidation required
//! - Evict least-recently-used entries when the cache is full
//! - Sweep expired entries on a fixed interval
//!
//! # Concurrency
//! A single reader-writer lock guards the map and the LRU list as one unit.
//! Lookups take the shared lock first; when a lookup needs to mutate state
//! (LRU touch, freshness bookkeeping) it releases the shared lock, acquires
//! the exclusive lock, and re-checks the key, because the entry may have
//! been evicted in the window between the two acquisitions. Stored responses
//! are handed out as `Arc<Response>` so callers serialize them to the socket
//! without holding the lock.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant, SystemTime};

use crate::http::{CacheMode, Response};
use crate::observability::{RequestLog, PROXY_WIDE};

/// Outcome of a cache lookup.
#[derive(Debug, Clone)]
pub enum CacheLookup {
    /// No entry for this URL.
    Miss,
    /// An entry exists but its expiry has passed; the caller may revalidate.
    Expired(Arc<Response>),
    /// The entry may only be reused after the origin confirms it.
    RequiresValidation(Arc<Response>),
    /// The entry is fresh and was promoted to most-recently-used.
    Fresh(Arc<Response>),
}

struct CacheEntry {
    response: Arc<Response>,
    /// Updated on every successful fresh read.
    last_checked: SystemTime,
}

/// Map plus LRU ordering, guarded together by one lock.
///
/// Invariant: the key set of `entries` equals the element set of `lru`
/// whenever the lock is not held for writing.
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Most-recently-used first.
    lru: VecDeque<String>,
    last_sweep: Instant,
}

/// Bounded, thread-safe response cache shared by all handlers.
pub struct ResponseCache {
    state: RwLock<CacheState>,
    max_entries: usize,
    sweep_interval: Duration,
    log: Arc<RequestLog>,
}

/// A response is expired when it carries no expiry at all or its expiry
/// lies in the past.
fn is_expired(response: &Response) -> bool {
    if response.expire_time.is_empty() {
        return true;
    }
    match httpdate::parse_http_date(&response.expire_time) {
        Ok(expiry) => SystemTime::now() > expiry,
        Err(_) => true,
    }
}

/// Move `url` to the front of the LRU order.
fn touch(lru: &mut VecDeque<String>, url: &str) {
    if let Some(pos) = lru.iter().position(|u| u == url) {
        lru.remove(pos);
    }
    lru.push_front(url.to_string());
}

impl ResponseCache {
    pub fn new(max_entries: usize, sweep_interval: Duration, log: Arc<RequestLog>) -> Self {
        Self {
            state: RwLock::new(CacheState {
                entries: HashMap::new(),
                lru: VecDeque::new(),
                last_sweep: Instant::now(),
            }),
            max_entries,
            sweep_interval,
            log,
        }
    }

    /// Look up a URL and classify the stored response.
    pub fn get(&self, url: &str) -> CacheLookup {
        let state = self.state.read().expect("cache lock poisoned");

        let Some(entry) = state.entries.get(url) else {
            return CacheLookup::Miss;
        };
        let response = Arc::clone(&entry.response);

        if is_expired(&response) {
            drop(state);
            let state = self.state.write().expect("cache lock poisoned");
            // the entry may have been evicted while the lock was released
            return match state.entries.get(url) {
                Some(entry) => CacheLookup::Expired(Arc::clone(&entry.response)),
                None => CacheLookup::Miss,
            };
        }

        if response.cache_mode == CacheMode::MustRevalidate {
            return CacheLookup::RequiresValidation(response);
        }

        // Fresh hit: upgrade to the exclusive lock for the LRU touch,
        // re-checking the key after the reacquire.
        drop(state);
        let mut state = self.state.write().expect("cache lock poisoned");
        let Some(entry) = state.entries.get_mut(url) else {
            return CacheLookup::Miss;
        };
        entry.last_checked = SystemTime::now();
        let response = Arc::clone(&entry.response);
        touch(&mut state.lru, url);
        CacheLookup::Fresh(response)
    }

    /// Insert or replace the response stored for a URL.
    ///
    /// `no-store` responses are never inserted. A full cache evicts from the
    /// LRU tail until there is room.
    pub fn put(&self, url: &str, response: Response) {
        if response.cache_mode == CacheMode::NoStore {
            return;
        }

        let mut state = self.state.write().expect("cache lock poisoned");

        if state.last_sweep.elapsed() >= self.sweep_interval {
            self.sweep(&mut state);
        }

        let response = Arc::new(response);

        if let Some(entry) = state.entries.get_mut(url) {
            entry.response = response;
            entry.last_checked = SystemTime::now();
            touch(&mut state.lru, url);
            return;
        }

        while state.entries.len() >= self.max_entries {
            let Some(oldest) = state.lru.pop_back() else {
                break;
            };
            if state.entries.remove(&oldest).is_some() {
                self.log
                    .note(PROXY_WIDE, &format!("evicted {oldest} from cache"));
            }
        }

        state.entries.insert(
            url.to_string(),
            CacheEntry {
                response,
                last_checked: SystemTime::now(),
            },
        );
        state.lru.push_front(url.to_string());
    }

    /// Current number of cached responses.
    pub fn len(&self) -> usize {
        self.state.read().expect("cache lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry. Runs under the exclusive lock.
    fn sweep(&self, state: &mut CacheState) {
        state.last_sweep = Instant::now();

        let stale: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| is_expired(&entry.response))
            .map(|(url, _)| url.clone())
            .collect();

        for url in stale {
            self.log
                .note(PROXY_WIDE, &format!("Removing expired entry: {url}"));
            state.entries.remove(&url);
            if let Some(pos) = state.lru.iter().position(|u| u == &url) {
                state.lru.remove(pos);
            }
        }
    }
}

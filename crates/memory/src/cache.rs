//! Procedural cache — fingerprint → previously produced response.
//!
//! Short-lived and dedup-oriented: entries expire after a fixed TTL and the
//! table is additionally bounded by an LRU-evicted entry cap. Concurrent
//! lookups and stores are safe; redundant stores for the same fingerprint
//! refresh the entry rather than duplicating it.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use switchyard_core::request::Turn;

/// Compute the cache fingerprint for a request.
///
/// Covers the session-independent normalized text and the active context
/// signature, so identical text under different session context does not
/// collide.
pub fn fingerprint(normalized_text: &str, context_signature: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_text.as_bytes());
    hasher.update([0x1f]);
    hasher.update(context_signature.as_bytes());
    let digest = hasher.finalize();
    // 16 hex chars is plenty for a short-lived dedup key
    hex_prefix(&digest, 16)
}

/// Signature of a session's active context, derived from its recent turns.
///
/// Two sessions whose recent turns are textually identical (including both
/// being empty) produce the same signature and may share cache hits.
pub fn context_signature(turns: &[Turn]) -> String {
    if turns.is_empty() {
        return String::new();
    }
    let mut hasher = Sha256::new();
    for turn in turns {
        hasher.update(turn.input_text.as_bytes());
        hasher.update([0x1e]);
        hasher.update(turn.output_text.as_bytes());
        hasher.update([0x1e]);
    }
    let digest = hasher.finalize();
    hex_prefix(&digest, 16)
}

fn hex_prefix(digest: &[u8], chars: usize) -> String {
    let mut out = String::with_capacity(chars);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
        if out.len() >= chars {
            break;
        }
    }
    out.truncate(chars);
    out
}

struct CacheEntry {
    response_text: String,
    created_at: Instant,
    ttl: Duration,
    hits: u32,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() >= self.ttl
    }
}

struct CacheInner {
    map: HashMap<String, CacheEntry>,
    /// Least-recently-used at the front
    order: Vec<String>,
}

impl CacheInner {
    fn touch(&mut self, fingerprint: &str) {
        if let Some(pos) = self.order.iter().position(|f| f == fingerprint) {
            let key = self.order.remove(pos);
            self.order.push(key);
        }
    }

    fn remove(&mut self, fingerprint: &str) {
        self.map.remove(fingerprint);
        if let Some(pos) = self.order.iter().position(|f| f == fingerprint) {
            self.order.remove(pos);
        }
    }
}

/// A TTL + LRU bounded response cache keyed by request fingerprint.
pub struct ProceduralCache {
    max_entries: usize,
    inner: Mutex<CacheInner>,
}

impl ProceduralCache {
    /// Create a cache bounded to `max_entries` entries.
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                order: Vec::new(),
            }),
        }
    }

    /// Look up a response by fingerprint. Expired entries are evicted on
    /// the way out.
    pub async fn lookup(&self, fingerprint: &str) -> Option<String> {
        let mut inner = self.inner.lock().await;

        let expired = match inner.map.get(fingerprint) {
            Some(entry) => entry.is_expired(),
            None => return None,
        };

        if expired {
            inner.remove(fingerprint);
            return None;
        }

        inner.touch(fingerprint);
        let entry = inner.map.get_mut(fingerprint)?;
        entry.hits += 1;
        debug!(fingerprint, hits = entry.hits, "Procedural cache hit");
        Some(entry.response_text.clone())
    }

    /// Store a response under a fingerprint with the given TTL.
    ///
    /// Storing an existing fingerprint refreshes the entry (response, TTL
    /// window, and recency) instead of duplicating it.
    pub async fn store(&self, fingerprint: &str, response: &str, ttl: Duration) {
        let mut inner = self.inner.lock().await;

        if let Some(entry) = inner.map.get_mut(fingerprint) {
            entry.response_text = response.to_string();
            entry.created_at = Instant::now();
            entry.ttl = ttl;
            inner.touch(fingerprint);
            return;
        }

        // Evict least-recently-used entries past the cap
        while inner.map.len() >= self.max_entries {
            let Some(oldest) = inner.order.first().cloned() else {
                break;
            };
            debug!(fingerprint = %oldest, "Procedural cache LRU eviction");
            inner.remove(&oldest);
        }

        inner.map.insert(
            fingerprint.to_string(),
            CacheEntry {
                response_text: response.to_string(),
                created_at: Instant::now(),
                ttl,
                hits: 0,
            },
        );
        inner.order.push(fingerprint.to_string());
    }

    /// Number of live entries (including not-yet-swept expired ones).
    pub async fn len(&self) -> usize {
        self.inner.lock().await.map.len()
    }
}

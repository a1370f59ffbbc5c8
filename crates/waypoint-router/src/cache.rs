//! Short-TTL response cache.
//!
//! Avoids duplicate provider calls for identical (task, message-set) inputs.
//! The cache is advisory: a miss never blocks, a hit returns byte-identical
//! previously stored content. Expiry is lazy — reads drop the entry they
//! find expired, and every write sweeps the rest. No background timer.

use crate::types::AgentRole;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;
use waypoint_abstraction::{ChatMessage, TokenUsage};

/// A cached response as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    /// The stored response text.
    pub content: String,
    /// The model that produced it.
    pub model: String,
    /// Token usage of the original call.
    pub usage: TokenUsage,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    content: String,
    model: String,
    usage: TokenUsage,
    created: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.created.elapsed() < ttl
    }
}

/// Cache statistics for observability.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Total number of cache hits.
    pub hits: u64,
    /// Total number of cache misses.
    pub misses: u64,
    /// Total number of evictions (lazy or sweep).
    pub evictions: u64,
    /// Current number of entries.
    pub size: usize,
}

/// TTL keyed response store.
pub struct ResponseCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ResponseCache {
    /// Creates a cache with the given time-to-live.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Deterministic key over the task role and the ordered message set.
    pub fn key(role: AgentRole, messages: &[ChatMessage]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(role.to_string().as_bytes());
        hasher.update([0]);
        for message in messages {
            hasher.update(message.role.as_bytes());
            hasher.update([0]);
            hasher.update(message.content.as_bytes());
            hasher.update([0]);
        }
        format!("{:x}", hasher.finalize())
    }

    /// Returns the entry for `key` if it exists and is still fresh.
    ///
    /// An expired entry is treated as absent and deleted lazily.
    pub fn get(&self, key: &str) -> Option<CachedResponse> {
        {
            let entries = self.entries.read().ok()?;
            if let Some(entry) = entries.get(key) {
                if entry.is_fresh(self.ttl) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(CachedResponse {
                        content: entry.content.clone(),
                        model: entry.model.clone(),
                        usage: entry.usage,
                    });
                }
            } else {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        }

        // The entry exists but expired: drop it under the write lock.
        if let Ok(mut entries) = self.entries.write() {
            if entries.get(key).is_some_and(|e| !e.is_fresh(self.ttl)) {
                entries.remove(key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key, "evicted expired cache entry");
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Stores a response and sweeps all other expired entries.
    pub fn insert(&self, key: String, content: String, model: String, usage: TokenUsage) {
        if let Ok(mut entries) = self.entries.write() {
            let before = entries.len();
            let ttl = self.ttl;
            entries.retain(|_, entry| entry.is_fresh(ttl));
            let swept = before - entries.len();
            if swept > 0 {
                self.evictions.fetch_add(swept as u64, Ordering::Relaxed);
                debug!(swept, "swept expired cache entries on write");
            }
            entries.insert(key, CacheEntry { content, model, usage, created: Instant::now() });
        }
    }

    /// Current number of stored entries, including not-yet-swept expired ones.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counter snapshot.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            size: self.len(),
        }
    }
}

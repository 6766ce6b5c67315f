//! Bounded cache of detection results.
//!
//! Entries are keyed by the BLAKE3 hex digest of the (sanitized) text and
//! evicted first-in-first-out once capacity is reached. Lookups never
//! refresh an entry, so the recency order of the underlying [`LruCache`] is
//! insertion order. A persistent cache rewrites the whole ordered entry list
//! to its [`KeyValueStore`] after every change, as a JSON array of
//! `[hash, result]` pairs.
//!
//! A cache may be scoped with a fingerprint of the detector that fills it.
//! Scoped keys are keyed hashes, so results saved under another pattern set
//! or sanitize mode are never served.
//!
//! Persistence is best effort: store failures are logged and counted but
//! never surface to callers of [`ResultCache::get`] or [`ResultCache::put`].

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::detection::DetectionResult;
use crate::error::Result;
use crate::storage::KeyValueStore;

/// Default maximum number of cached results.
pub const DEFAULT_CAPACITY: usize = 100;

/// Default store key for the persisted entry list.
pub const DEFAULT_STORAGE_KEY: &str = "sensitiveDataCache";

/// Compute the cache key for a piece of text.
#[must_use]
pub fn content_key(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

fn is_hex_key(key: &str) -> bool {
    key.len() == 64 && key.bytes().all(|b| b.is_ascii_hexdigit())
}

fn short_key(key: &str) -> &str {
    key.get(..12).unwrap_or(key)
}

/// Cache counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Entries currently held.
    pub entries: usize,
    /// Maximum number of entries.
    pub capacity: usize,
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that missed.
    pub misses: u64,
    /// Entries dropped to make room.
    pub evictions: u64,
    /// Store writes that failed.
    pub persist_failures: u64,
}

type Entries = LruCache<String, DetectionResult>;

/// Insert without changing the position of an existing key. Returns the
/// evicted key, if any.
fn insert(entries: &mut Entries, key: String, result: DetectionResult) -> Option<String> {
    if let Some(existing) = entries.peek_mut(&key) {
        *existing = result;
        return None;
    }
    entries.push(key, result).map(|(evicted, _)| evicted)
}

/// Oldest first.
fn to_json(entries: &Entries) -> serde_json::Result<String> {
    let pairs: Vec<(&String, &DetectionResult)> = entries.iter().rev().collect();
    serde_json::to_string(&pairs)
}

struct Persistence {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

/// FIFO-bounded map from content hash to [`DetectionResult`].
pub struct ResultCache {
    entries: Mutex<Entries>,
    capacity: NonZeroUsize,
    scope: Option<blake3::Hash>,
    persistence: Option<Persistence>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    persist_failures: AtomicU64,
}

impl fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCache")
            .field("capacity", &self.capacity)
            .field("scoped", &self.scope.is_some())
            .field(
                "storage_key",
                &self.persistence.as_ref().map(|p| p.key.as_str()),
            )
            .finish_non_exhaustive()
    }
}

impl ResultCache {
    fn with_persistence(capacity: usize, persistence: Option<Persistence>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            capacity,
            scope: None,
            persistence,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            persist_failures: AtomicU64::new(0),
        }
    }

    /// A cache that is never written to a store.
    #[must_use]
    pub fn in_memory(capacity: usize) -> Self {
        Self::with_persistence(capacity, None)
    }

    /// A cache that persists under `key` in `store`.
    ///
    /// Call [`load`](Self::load) to pick up previously saved entries.
    #[must_use]
    pub fn persistent(store: Arc<dyn KeyValueStore>, capacity: usize, key: &str) -> Self {
        Self::with_persistence(
            capacity,
            Some(Persistence {
                store,
                key: key.to_string(),
            }),
        )
    }

    /// Scope every key to `fingerprint`.
    ///
    /// Two caches with different fingerprints never share an entry, even
    /// when they load the same persisted list.
    #[must_use]
    pub fn scoped(mut self, fingerprint: &str) -> Self {
        self.scope = Some(blake3::hash(fingerprint.as_bytes()));
        self
    }

    /// Maximum number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// The key under which the result for `text` is stored.
    #[must_use]
    pub fn key_for(&self, text: &str) -> String {
        match &self.scope {
            Some(scope) => blake3::keyed_hash(scope.as_bytes(), text.as_bytes())
                .to_hex()
                .to_string(),
            None => content_key(text),
        }
    }

    /// Look up the result for `text`.
    pub async fn get(&self, text: &str) -> Option<DetectionResult> {
        let key = self.key_for(text);
        let entries = self.entries.lock().await;
        let found = entries.peek(&key).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Store the result for `text`.
    ///
    /// A new key on a full cache evicts the oldest entry. Replacing an
    /// existing key keeps its position.
    pub async fn put(&self, text: &str, result: DetectionResult) {
        let key = self.key_for(text);
        let mut entries = self.entries.lock().await;

        if let Some(evicted) = insert(&mut entries, key, result) {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(evicted = short_key(&evicted), "Evicted oldest cache entry");
        }

        self.persist(&entries).await;
    }

    async fn persist(&self, entries: &Entries) {
        let Some(persistence) = &self.persistence else {
            return;
        };

        let outcome = match to_json(entries) {
            Ok(payload) => persistence.store.set(&persistence.key, &payload).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = outcome {
            self.persist_failures.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, "Failed to persist detection cache");
        }
    }

    /// Load persisted entries, replacing the in-memory contents.
    ///
    /// Returns the number of entries loaded. An unreadable store or a
    /// malformed payload is logged and leaves the cache empty. Keys that are
    /// not BLAKE3 hex digests are dropped. When more entries were saved than
    /// fit, the newest ones are kept.
    pub async fn load(&self) -> usize {
        let Some(persistence) = &self.persistence else {
            return 0;
        };

        let payload = match persistence.store.get(&persistence.key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return 0,
            Err(e) => {
                warn!(error = %e, "Failed to read persisted detection cache");
                return 0;
            }
        };

        let pairs: Vec<(String, DetectionResult)> = match serde_json::from_str(&payload) {
            Ok(pairs) => pairs,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed persisted detection cache");
                return 0;
            }
        };

        let (valid, invalid): (Vec<_>, Vec<_>) =
            pairs.into_iter().partition(|(key, _)| is_hex_key(key));
        if !invalid.is_empty() {
            warn!(dropped = invalid.len(), "Ignoring persisted cache entries with invalid keys");
        }

        let mut loaded = LruCache::new(self.capacity);
        for (key, result) in valid {
            insert(&mut loaded, key, result);
        }

        let count = loaded.len();
        *self.entries.lock().await = loaded;
        info!(entries = count, "Loaded detection cache");
        count
    }

    /// Drop every entry, in memory and in the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the removal. The in-memory
    /// entries are cleared regardless.
    pub async fn clear(&self) -> Result<()> {
        self.entries.lock().await.clear();

        if let Some(persistence) = &self.persistence {
            persistence.store.remove(&persistence.key).await?;
        }
        info!("Cleared detection cache");
        Ok(())
    }

    /// Number of cached entries.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Current counters.
    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len().await,
            capacity: self.capacity.get(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
        }
    }
}

//! Bounded TTL cache
//!
//! Strict-LRU cache with per-entry expiry and hit/miss statistics. Values
//! above a configurable size threshold are stored gzip-compressed;
//! decompression on `get` is transparent to the caller. Absence is always a
//! miss, never an error.

use lru::LruCache;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Default cache capacity when none is configured
pub const CACHE_CAPACITY_DEFAULT: usize = 1024;

/// Cache behavior knobs
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries before LRU eviction
    pub capacity: usize,
    /// Serialized-size threshold above which values are stored compressed.
    /// `None` disables compression entirely.
    pub compression_threshold_bytes: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: CACHE_CAPACITY_DEFAULT,
            compression_threshold_bytes: None,
        }
    }
}

/// Point-in-time cache counters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub size: usize,
    pub capacity: usize,
    pub hit_rate: f64,
}

enum Stored<V> {
    Plain(V),
    Compressed(Vec<u8>),
}

struct CacheEntry<V> {
    stored: Stored<V>,
    inserted_at: Instant,
    ttl: Duration,
    size_bytes: usize,
}

impl<V: Clone + DeserializeOwned> CacheEntry<V> {
    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() >= self.ttl
    }

    fn decode(&self) -> Option<V> {
        match &self.stored {
            Stored::Plain(v) => Some(v.clone()),
            Stored::Compressed(bytes) => {
                let raw = decompress(bytes).ok()?;
                serde_json::from_slice(&raw).ok()
            }
        }
    }
}

enum Lookup<V> {
    Hit(V),
    Miss,
    Expired,
}

/// Bounded key/value cache with TTL expiry and LRU eviction
pub struct TtlCache<V> {
    entries: Mutex<LruCache<String, CacheEntry<V>>>,
    compression_threshold: Option<usize>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl<V> TtlCache<V>
where
    V: Clone + Serialize + DeserializeOwned,
{
    /// Create a cache with the given capacity and no compression
    pub fn new(capacity: usize) -> Self {
        Self::with_config(CacheConfig {
            capacity,
            compression_threshold_bytes: None,
        })
    }

    /// Create a cache from a full configuration
    pub fn with_config(config: CacheConfig) -> Self {
        let capacity =
            NonZeroUsize::new(config.capacity).unwrap_or_else(|| NonZeroUsize::new(1).unwrap());
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            compression_threshold: config.compression_threshold_bytes,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Insert or overwrite an entry, resetting its expiry
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let (stored, size_bytes) = self.encode(value);
        let entry = CacheEntry {
            stored,
            inserted_at: Instant::now(),
            ttl,
            size_bytes,
        };

        let mut entries = self.entries.lock();
        if entries.len() == entries.cap().get() && !entries.contains(&key) {
            entries.pop_lru();
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        entries.put(key, entry);
    }

    /// Return the value if present and unexpired, touching its recency.
    /// Expired entries are purged lazily and reported as misses.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock();
        let lookup = match entries.get(key) {
            None => Lookup::Miss,
            Some(entry) if entry.is_expired() => Lookup::Expired,
            Some(entry) => match entry.decode() {
                Some(v) => Lookup::Hit(v),
                None => Lookup::Expired,
            },
        };

        match lookup {
            Lookup::Hit(v) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(v)
            }
            Lookup::Miss => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Lookup::Expired => {
                entries.pop(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.expirations.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Remove all expired entries, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.is_expired())
            .map(|(k, _)| k.clone())
            .collect();

        for key in &expired {
            entries.pop(key);
        }
        self.expirations
            .fetch_add(expired.len() as u64, Ordering::Relaxed);
        expired.len()
    }

    /// Number of entries currently held (including not-yet-purged expired ones)
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Approximate total size of stored values in bytes
    pub fn size_bytes(&self) -> usize {
        self.entries.lock().iter().map(|(_, e)| e.size_bytes).sum()
    }

    /// Hit/miss/eviction counters
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            size: self.len(),
            capacity: self.entries.lock().cap().get(),
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }

    fn encode(&self, value: V) -> (Stored<V>, usize) {
        let Some(threshold) = self.compression_threshold else {
            return (Stored::Plain(value), std::mem::size_of::<V>());
        };

        match serde_json::to_vec(&value) {
            Ok(bytes) if bytes.len() >= threshold => match compress(&bytes) {
                Ok(packed) => {
                    let size = packed.len();
                    (Stored::Compressed(packed), size)
                }
                Err(_) => {
                    let size = bytes.len();
                    (Stored::Plain(value), size)
                }
            },
            Ok(bytes) => {
                let size = bytes.len();
                (Stored::Plain(value), size)
            }
            Err(_) => (Stored::Plain(value), std::mem::size_of::<V>()),
        }
    }
}

fn compress(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
    encoder.write_all(bytes)?;
    encoder.finish()
}

fn decompress(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    flate2::read::GzDecoder::new(bytes).read_to_end(&mut out)?;
    Ok(out)
}

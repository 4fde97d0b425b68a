//! Size- and TTL-bounded in-memory byte cache.
//!
//! Caches raw feed payloads, expensive generated responses, and per-source
//! performance snapshots so the fetch orchestrator can skip redundant work.
//! Large payloads are gzipped transparently; total resident bytes are kept
//! under a configured capacity by evicting the oldest entries first.
//!
//! ## Cache Key Strategy
//!
//! Keys are namespaced strings (see [`keys`]):
//!
//! | Namespace | Contents |
//! |-----------|----------|
//! | `rss:<id>` | Raw fetched feed content |
//! | `ai:<hash>` | Expensive generated responses |
//! | `perf:<id>` | Serialized per-source outcome history |
//!
//! Any consumer may read or write any namespace; there is no isolation
//! beyond the key string itself.
//!
//! ## Capacity
//!
//! The capacity is a soft cap by default: eviction runs before insertion,
//! so a single entry larger than the whole capacity is still admitted once
//! the cache is empty. Set [`CacheConfig::hard_cap`] to refuse such entries
//! instead.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::time::{Duration, Instant};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::{Error, Result};

/// Namespaced cache key helpers.
pub mod keys {
    /// Key for raw fetched feed content.
    pub fn rss(source_id: &str) -> String {
        format!("rss:{}", source_id)
    }

    /// Key for an expensive generated response, addressed by request hash.
    pub fn ai(hash: &str) -> String {
        format!("ai:{}", hash)
    }

    /// Key for a source's serialized outcome-history snapshot.
    pub fn perf(source_id: &str) -> String {
        format!("perf:{}", source_id)
    }
}

/// Common TTL values for the different namespaces.
pub mod ttl {
    use std::time::Duration;

    /// Raw feed content - 30 minutes.
    pub const FEED_CONTENT: Duration = Duration::from_secs(30 * 60);

    /// Generated responses - 6 hours.
    pub const GENERATED: Duration = Duration::from_secs(6 * 60 * 60);

    /// Performance snapshots - 60 minutes.
    pub const PERF_SNAPSHOT: Duration = Duration::from_secs(60 * 60);
}

/// Configuration for the byte cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Total resident-byte capacity.
    /// Default: 50 MB
    pub max_bytes: usize,

    /// Payloads larger than this are gzipped before storage.
    /// Default: 50 KB
    pub compression_threshold: usize,

    /// Refuse single entries larger than `max_bytes` instead of admitting
    /// them past the capacity.
    /// Default: false (soft cap)
    pub hard_cap: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: 50 * 1024 * 1024,
            compression_threshold: 50 * 1024,
            hard_cap: false,
        }
    }
}

/// One cached payload.
#[derive(Debug)]
struct Entry {
    /// Stored bytes, possibly gzipped.
    data: Vec<u8>,
    compressed: bool,
    inserted_at: Instant,
    ttl: Duration,
}

/// Internal mutable state for the cache.
struct CacheState {
    entries: HashMap<String, Entry>,
    /// Running total of stored (post-compression) bytes.
    total_bytes: usize,
}

/// Cache observability snapshot. For reporting dashboards, not control flow.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Number of resident entries.
    pub entries: usize,
    /// Resident size in megabytes.
    pub size_mb: f64,
}

/// TTL + capacity bounded byte cache with transparent compression.
///
/// Thread-safe: all internal state is protected by a mutex.
pub struct ByteCache {
    config: CacheConfig,
    state: Mutex<CacheState>,
}

impl ByteCache {
    /// Create an empty cache with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                total_bytes: 0,
            }),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Store a payload under `key` with the given TTL.
    ///
    /// Payloads over the compression threshold are gzipped. Before
    /// insertion, oldest-first eviction runs until the new entry fits
    /// within capacity or the cache is empty. Replacing an existing key
    /// releases its prior size first. Never fails; with `hard_cap` set, an
    /// entry larger than the whole capacity is dropped with a warning.
    pub fn set(&self, key: &str, payload: &[u8], ttl: Duration) {
        self.set_at(key, payload, ttl, Instant::now());
    }

    /// [`set`](Self::set) with an explicit insertion time, for deterministic
    /// TTL and eviction-order tests.
    pub fn set_at(&self, key: &str, payload: &[u8], ttl: Duration, now: Instant) {
        let (data, compressed) = if payload.len() > self.config.compression_threshold {
            (compress(payload), true)
        } else {
            (payload.to_vec(), false)
        };
        let size = data.len();

        if self.config.hard_cap && size > self.config.max_bytes {
            tracing::warn!(
                key = %key,
                size_bytes = size,
                capacity_bytes = self.config.max_bytes,
                "entry exceeds cache capacity, refusing under hard cap"
            );
            return;
        }

        let mut state = self.state.lock();

        // Replacing a key releases its prior size before eviction math.
        if let Some(old) = state.entries.remove(key) {
            state.total_bytes -= old.data.len();
        }

        while state.total_bytes + size > self.config.max_bytes && !state.entries.is_empty() {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest_key) = oldest {
                if let Some(evicted) = state.entries.remove(&oldest_key) {
                    state.total_bytes -= evicted.data.len();
                    counter!("feed_cache_evictions_total").increment(1);
                    tracing::debug!(key = %oldest_key, "evicted oldest cache entry for capacity");
                }
            }
        }

        state.entries.insert(
            key.to_string(),
            Entry {
                data,
                compressed,
                inserted_at: now,
                ttl,
            },
        );
        state.total_bytes += size;
        gauge!("feed_cache_size_bytes").set(state.total_bytes as f64);
    }

    /// Fetch a payload by key.
    ///
    /// Returns `Ok(None)` on a miss or an expired entry (expiry deletes the
    /// entry as a side effect). A stored entry whose compressed bytes fail
    /// to decompress is removed and surfaced as
    /// [`Error::CacheCorruption`] - that is a data-integrity problem, not a
    /// miss.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.get_at(key, Instant::now())
    }

    /// [`get`](Self::get) with an explicit read time, for deterministic
    /// TTL tests.
    pub fn get_at(&self, key: &str, now: Instant) -> Result<Option<Vec<u8>>> {
        let (data, compressed) = {
            let mut state = self.state.lock();

            let Some(entry) = state.entries.get(key) else {
                counter!("feed_cache_misses_total").increment(1);
                tracing::debug!(key = %key, "cache miss");
                return Ok(None);
            };

            if now.duration_since(entry.inserted_at) > entry.ttl {
                if let Some(expired) = state.entries.remove(key) {
                    state.total_bytes -= expired.data.len();
                }
                gauge!("feed_cache_size_bytes").set(state.total_bytes as f64);
                counter!("feed_cache_misses_total").increment(1);
                tracing::debug!(key = %key, "cache entry expired");
                return Ok(None);
            }

            (entry.data.clone(), entry.compressed)
        };

        if !compressed {
            counter!("feed_cache_hits_total").increment(1);
            return Ok(Some(data));
        }

        match decompress(&data) {
            Ok(payload) => {
                counter!("feed_cache_hits_total").increment(1);
                Ok(Some(payload))
            }
            Err(e) => {
                // Corrupted bytes: drop the entry and surface the failure.
                let mut state = self.state.lock();
                if let Some(entry) = state.entries.remove(key) {
                    state.total_bytes -= entry.data.len();
                }
                gauge!("feed_cache_size_bytes").set(state.total_bytes as f64);
                counter!("feed_cache_corruptions_total").increment(1);
                tracing::warn!(key = %key, error = %e, "corrupted cache entry removed");
                Err(Error::CacheCorruption {
                    key: key.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Remove an entry. Returns whether the key was present.
    pub fn delete(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        match state.entries.remove(key) {
            Some(entry) => {
                state.total_bytes -= entry.data.len();
                gauge!("feed_cache_size_bytes").set(state.total_bytes as f64);
                true
            }
            None => false,
        }
    }

    /// Drop all entries.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.total_bytes = 0;
        gauge!("feed_cache_size_bytes").set(0.0);
    }

    /// Current entry count and resident size.
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            entries: state.entries.len(),
            size_mb: state.total_bytes as f64 / (1024.0 * 1024.0),
        }
    }

    /// Resident stored bytes (post-compression).
    pub fn resident_bytes(&self) -> usize {
        self.state.lock().total_bytes
    }
}

impl Default for ByteCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

fn compress(payload: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    // Writing into a Vec cannot fail.
    encoder.write_all(payload).expect("write to Vec");
    encoder.finish().expect("finish gzip stream to Vec")
}

fn decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut payload = Vec::new();
    decoder.read_to_end(&mut payload)?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    /// Capacity-focused config: compression disabled by a huge threshold so
    /// stored sizes equal payload sizes.
    fn capacity_config(max_bytes: usize) -> CacheConfig {
        CacheConfig {
            max_bytes,
            compression_threshold: usize::MAX,
            hard_cap: false,
        }
    }

    #[test]
    fn test_roundtrip_uncompressed() {
        let cache = ByteCache::default();
        cache.set("rss:feed-a", b"<rss>hello</rss>", MINUTE);

        let payload = cache.get("rss:feed-a").unwrap().unwrap();
        assert_eq!(payload, b"<rss>hello</rss>");
    }

    #[test]
    fn test_roundtrip_compressed() {
        let cache = ByteCache::default();
        // Over the 50 KB threshold, so this takes the gzip path.
        let payload = "abcdefgh".repeat(10_000);
        cache.set("ai:digest", payload.as_bytes(), MINUTE);

        // Stored form is compressed and smaller than the original.
        assert!(cache.resident_bytes() < payload.len());

        let out = cache.get("ai:digest").unwrap().unwrap();
        assert_eq!(out, payload.as_bytes());
    }

    #[test]
    fn test_miss_returns_none() {
        let cache = ByteCache::default();
        assert!(cache.get("rss:absent").unwrap().is_none());
    }

    #[test]
    fn test_ttl_expiry_deletes_entry() {
        let cache = ByteCache::default();
        let now = Instant::now();
        cache.set_at("rss:feed-a", b"payload", MINUTE, now);

        // Still fresh just inside the TTL.
        let fresh = cache.get_at("rss:feed-a", now + Duration::from_secs(59));
        assert!(fresh.unwrap().is_some());

        // Expired: gone, and deleted as a side effect.
        let stale = cache.get_at("rss:feed-a", now + MINUTE + Duration::from_secs(1));
        assert!(stale.unwrap().is_none());
        assert_eq!(cache.stats().entries, 0);
        assert_eq!(cache.resident_bytes(), 0);
    }

    #[test]
    fn test_eviction_is_oldest_first() {
        // 1 MB capacity, three 400 KB entries: the third insert must evict
        // the first (oldest) entry, never a newer one.
        let cache = ByteCache::new(capacity_config(1024 * 1024));
        let payload = vec![0u8; 400 * 1024];
        let now = Instant::now();

        cache.set_at("rss:a", &payload, MINUTE, now);
        cache.set_at("rss:b", &payload, MINUTE, now + Duration::from_secs(1));
        cache.set_at("rss:c", &payload, MINUTE, now + Duration::from_secs(2));

        assert_eq!(cache.stats().entries, 2);
        assert!(cache.get_at("rss:a", now + Duration::from_secs(3)).unwrap().is_none());
        assert!(cache.get_at("rss:b", now + Duration::from_secs(3)).unwrap().is_some());
        assert!(cache.get_at("rss:c", now + Duration::from_secs(3)).unwrap().is_some());
    }

    #[test]
    fn test_eviction_cascades_until_fit() {
        let cache = ByteCache::new(capacity_config(1000));
        let now = Instant::now();

        cache.set_at("a", &[0u8; 400], MINUTE, now);
        cache.set_at("b", &[0u8; 400], MINUTE, now + Duration::from_secs(1));

        // 900 bytes only fit alone: both residents must go, oldest first.
        cache.set_at("c", &[0u8; 900], MINUTE, now + Duration::from_secs(2));
        assert_eq!(cache.stats().entries, 1);
        assert_eq!(cache.resident_bytes(), 900);
    }

    #[test]
    fn test_replacing_key_releases_prior_size() {
        let cache = ByteCache::new(capacity_config(1000));
        let now = Instant::now();

        cache.set_at("a", &[0u8; 600], MINUTE, now);
        // Same key again: prior 600 bytes are released first, so no
        // eviction is needed and nothing else is disturbed.
        cache.set_at("a", &[1u8; 700], MINUTE, now + Duration::from_secs(1));

        assert_eq!(cache.stats().entries, 1);
        assert_eq!(cache.resident_bytes(), 700);
        assert_eq!(cache.get("a").unwrap().unwrap(), vec![1u8; 700]);
    }

    #[test]
    fn test_soft_cap_admits_oversized_entry() {
        let cache = ByteCache::new(capacity_config(100));
        cache.set("big", &[0u8; 500], MINUTE);

        // Capacity is advisory: once the cache is empty, the entry lands.
        assert_eq!(cache.stats().entries, 1);
        assert_eq!(cache.resident_bytes(), 500);
    }

    #[test]
    fn test_hard_cap_refuses_oversized_entry() {
        let cache = ByteCache::new(CacheConfig {
            max_bytes: 100,
            compression_threshold: usize::MAX,
            hard_cap: true,
        });
        cache.set("big", &[0u8; 500], MINUTE);

        assert_eq!(cache.stats().entries, 0);
        assert_eq!(cache.resident_bytes(), 0);
    }

    #[test]
    fn test_corrupted_compressed_entry_surfaces_error() {
        let cache = ByteCache::default();
        let payload = "x".repeat(100_000);
        cache.set("ai:digest", payload.as_bytes(), MINUTE);

        // Poison the stored bytes in place, length-preservingly, so the
        // `total_bytes` accounting invariant stays intact.
        {
            let mut state = cache.state.lock();
            let entry = state.entries.get_mut("ai:digest").unwrap();
            entry.data.fill(0);
        }

        let err = cache.get("ai:digest").unwrap_err();
        assert!(matches!(err, Error::CacheCorruption { ref key, .. } if key == "ai:digest"));

        // The poisoned entry was dropped and its size released; the next
        // read is a clean miss.
        assert!(cache.get("ai:digest").unwrap().is_none());
        assert_eq!(cache.stats().entries, 0);
        assert_eq!(cache.resident_bytes(), 0);
    }

    #[test]
    fn test_delete_and_clear_adjust_size() {
        let cache = ByteCache::new(capacity_config(10_000));
        cache.set("a", &[0u8; 100], MINUTE);
        cache.set("b", &[0u8; 200], MINUTE);
        assert_eq!(cache.resident_bytes(), 300);

        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        assert_eq!(cache.resident_bytes(), 200);

        cache.clear();
        assert_eq!(cache.stats().entries, 0);
        assert_eq!(cache.resident_bytes(), 0);
    }

    #[test]
    fn test_stats_reports_megabytes() {
        let cache = ByteCache::new(capacity_config(10 * 1024 * 1024));
        cache.set("a", &vec![0u8; 1024 * 1024], MINUTE);

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert!((stats.size_mb - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_key_helpers() {
        assert_eq!(keys::rss("feed-a"), "rss:feed-a");
        assert_eq!(keys::ai("abc123"), "ai:abc123");
        assert_eq!(keys::perf("feed-a"), "perf:feed-a");
    }
}

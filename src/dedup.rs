// =============================================================================
// dedup.rs — BLOOM FILTER + LRU DEDUPLICATION
// =============================================================================
//
// Downstream consumers deduplicate gazettes by `(territoryId, date,
// fileUrl)` (see `Gazette::dedup_key`). A plain `HashSet` would do it,
// but at-least-once queue delivery means this engine is checked on
// every OCR handoff, so a Bloom filter answers "definitely new" in
// O(k) before ever touching a lock-protected cache: only the rare
// "maybe seen" case falls through to the LRU for a definitive answer.
// The Bloom filter rotates periodically since a long-lived one only
// ever grows more saturated, never shrinks.
// =============================================================================

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use bloomfilter::Bloom;
use lru::LruCache;
use parking_lot::RwLock;
use portable_atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

pub struct DedupEngine {
    bloom: RwLock<Bloom<String>>,
    lru_cache: RwLock<LruCache<String, bool>>,
    last_rotation: RwLock<Instant>,
    rotation_interval_secs: u64,
    bloom_expected_items: u64,
    bloom_fp_rate: f64,
    pub stats: Arc<DedupStats>,
}

pub struct DedupStats {
    pub checks: AtomicU64,
    pub unique: AtomicU64,
    pub duplicates: AtomicU64,
    pub rotations: AtomicU64,
    pub bloom_false_positive_rescues: AtomicU64,
}

impl DedupStats {
    fn new() -> Self {
        Self {
            checks: AtomicU64::new(0),
            unique: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
            rotations: AtomicU64::new(0),
            bloom_false_positive_rescues: AtomicU64::new(0),
        }
    }
}

impl DedupEngine {
    pub fn new(expected_items: u64, fp_rate: f64, lru_capacity: usize, rotation_interval_secs: u64) -> Self {
        info!(expected_items, fp_rate, lru_capacity, rotation_interval_secs, "deduplication engine online");

        let bloom = Bloom::new_for_fp_rate(expected_items as usize, fp_rate);
        let lru_size = NonZeroUsize::new(lru_capacity).unwrap_or(NonZeroUsize::new(1000).unwrap());

        Self {
            bloom: RwLock::new(bloom),
            lru_cache: RwLock::new(LruCache::new(lru_size)),
            last_rotation: RwLock::new(Instant::now()),
            rotation_interval_secs,
            bloom_expected_items: expected_items,
            bloom_fp_rate: fp_rate,
            stats: Arc::new(DedupStats::new()),
        }
    }

    /// Returns `true` if `key` (a `Gazette::dedup_key()`) is new, and
    /// records it as seen either way this call returns `false`.
    pub fn check_and_insert(&self, key: &str) -> bool {
        self.stats.checks.fetch_add(1, Ordering::Relaxed);
        self.maybe_rotate();

        let bloom_says_maybe_seen = self.bloom.read().check(&key.to_string());

        if bloom_says_maybe_seen {
            self.stats.bloom_false_positive_rescues.fetch_add(1, Ordering::Relaxed);
            let mut lru = self.lru_cache.write();
            if lru.get(&key.to_string()).is_some() {
                self.stats.duplicates.fetch_add(1, Ordering::Relaxed);
                debug!(key, "duplicate gazette, bloom + lru confirmed");
                return false;
            }
            debug!(key, "bloom false positive rescued by lru, gazette is actually new");
        }

        self.bloom.write().set(&key.to_string());
        self.lru_cache.write().put(key.to_string(), true);
        self.stats.unique.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn maybe_rotate(&self) {
        let should_rotate = self.last_rotation.read().elapsed().as_secs() >= self.rotation_interval_secs;
        if !should_rotate {
            return;
        }

        let mut bloom = self.bloom.write();
        let mut last = self.last_rotation.write();
        if last.elapsed().as_secs() >= self.rotation_interval_secs {
            *bloom = Bloom::new_for_fp_rate(self.bloom_expected_items as usize, self.bloom_fp_rate);
            *last = Instant::now();
            self.stats.rotations.fetch_add(1, Ordering::Relaxed);
            info!("bloom filter rotated");
        }
    }

    pub fn snapshot(&self) -> DedupSnapshot {
        DedupSnapshot {
            total_checks: self.stats.checks.load(Ordering::Relaxed),
            unique_items: self.stats.unique.load(Ordering::Relaxed),
            duplicates_caught: self.stats.duplicates.load(Ordering::Relaxed),
            bloom_rotations: self.stats.rotations.load(Ordering::Relaxed),
            bloom_false_positive_rescues: self.stats.bloom_false_positive_rescues.load(Ordering::Relaxed),
            lru_cache_size: self.lru_cache.read().len(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DedupSnapshot {
    pub total_checks: u64,
    pub unique_items: u64,
    pub duplicates_caught: u64,
    pub bloom_rotations: u64,
    pub bloom_false_positive_rescues: u64,
    pub lru_cache_size: usize,
}

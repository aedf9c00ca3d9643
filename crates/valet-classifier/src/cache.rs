use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use valet_core::types::ClassificationResult;
use valet_store::KvStore;

/// Fraction of entries evicted when the local tier overflows.
const EVICT_FRACTION: usize = 5; // oldest 20%

/// Two-tier classification cache.
///
/// Local tier: bounded insertion-ordered map with time-based expiry.
/// Shared tier: the KV accelerator, written fire-and-forget and read
/// best-effort — a KV failure degrades to local-only and never fails the
/// request.
pub struct ClassificationCache {
    local: Mutex<LocalTier>,
    kv: Option<Arc<dyn KvStore>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

struct LocalTier {
    capacity: usize,
    entries: HashMap<String, (ClassificationResult, Instant)>,
    order: VecDeque<String>,
}

/// Collision-resistant fingerprint of the classification inputs.
pub fn fingerprint(text: &str, user_id: &str, session_id: &str, use_context: bool) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update([0]);
    hasher.update(user_id.as_bytes());
    hasher.update([0]);
    hasher.update(session_id.as_bytes());
    hasher.update([0]);
    hasher.update([use_context as u8]);
    hex::encode(hasher.finalize())
}

impl ClassificationCache {
    pub fn new(capacity: usize, ttl: Duration, kv: Option<Arc<dyn KvStore>>) -> Self {
        Self {
            local: Mutex::new(LocalTier {
                capacity: capacity.max(1),
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            kv,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a cached result. On any hit the returned result's raw text
    /// matches `text` exactly; a digest collision therefore reads as a miss.
    pub fn get(
        &self,
        text: &str,
        user_id: &str,
        session_id: &str,
        use_context: bool,
    ) -> Option<ClassificationResult> {
        let key = fingerprint(text, user_id, session_id, use_context);

        if let Some(result) = self.local_get(&key) {
            if result.raw_text == text {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %&key[..12], "local cache hit");
                return Some(result);
            }
        }

        // local miss: consult the shared tier and backfill on success
        if let Some(kv) = &self.kv {
            match kv.get(&format!("classify:{key}")) {
                Ok(Some(blob)) => {
                    if let Ok(result) = serde_json::from_str::<ClassificationResult>(&blob) {
                        if result.raw_text == text {
                            self.local_put(&key, result.clone());
                            self.hits.fetch_add(1, Ordering::Relaxed);
                            debug!(key = %&key[..12], "shared cache hit");
                            return Some(result);
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(err = %e, "shared cache read failed, degrading to local"),
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a result in both tiers. The shared-tier write is
    /// fire-and-forget.
    pub fn put(
        &self,
        text: &str,
        user_id: &str,
        session_id: &str,
        use_context: bool,
        result: &ClassificationResult,
    ) {
        let key = fingerprint(text, user_id, session_id, use_context);
        self.local_put(&key, result.clone());

        if let Some(kv) = &self.kv {
            match serde_json::to_string(result) {
                Ok(blob) => {
                    if let Err(e) = kv.set(&format!("classify:{key}"), &blob, Some(self.ttl)) {
                        warn!(err = %e, "shared cache write failed");
                    }
                }
                Err(e) => warn!(err = %e, "cache serialization failed"),
            }
        }
    }

    fn local_get(&self, key: &str) -> Option<ClassificationResult> {
        let mut tier = self.local.lock().ok()?;
        let expired = match tier.entries.get(key) {
            Some((_, inserted)) => inserted.elapsed() >= self.ttl,
            None => return None,
        };
        if expired {
            tier.entries.remove(key);
            tier.order.retain(|k| k != key);
            return None;
        }
        tier.entries.get(key).map(|(result, _)| result.clone())
    }

    fn local_put(&self, key: &str, result: ClassificationResult) {
        let Ok(mut tier) = self.local.lock() else {
            return;
        };
        if !tier.entries.contains_key(key) && tier.entries.len() >= tier.capacity {
            let drop_count = (tier.capacity / EVICT_FRACTION).max(1);
            for _ in 0..drop_count {
                if let Some(oldest) = tier.order.pop_front() {
                    tier.entries.remove(&oldest);
                }
            }
        }
        if tier.entries.insert(key.to_string(), (result, Instant::now())).is_none() {
            tier.order.push_back(key.to_string());
        }
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let local_entries = self.local.lock().map(|t| t.entries.len()).unwrap_or(0);
        CacheStats {
            hits,
            misses,
            hit_rate: if hits + misses > 0 {
                hits as f64 / (hits + misses) as f64
            } else {
                0.0
            },
            local_entries,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub local_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;
    use valet_core::types::CommandCategory;
    use valet_store::MemoryKv;

    fn result(text: &str) -> ClassificationResult {
        ClassificationResult {
            category: CommandCategory::Email,
            intent: CommandCategory::Email.intent(),
            confidence: 0.9,
            parameters: StdHashMap::new(),
            raw_text: text.to_string(),
            normalized_text: text.to_lowercase(),
            context_used: false,
            preprocessing_ms: 0.1,
            classification_ms: 0.2,
            suggestions: Vec::new(),
        }
    }

    #[test]
    fn hit_returns_identical_result() {
        let cache = ClassificationCache::new(10, Duration::from_secs(60), None);
        let r = result("send mail");
        cache.put("send mail", "u", "s", true, &r);

        let hit = cache.get("send mail", "u", "s", true).unwrap();
        assert_eq!(hit.raw_text, r.raw_text);
        assert_eq!(hit.confidence, r.confidence);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn key_varies_with_all_inputs() {
        let cache = ClassificationCache::new(10, Duration::from_secs(60), None);
        cache.put("text", "u", "s", true, &result("text"));

        assert!(cache.get("text", "u", "s", false).is_none());
        assert!(cache.get("text", "u2", "s", true).is_none());
        assert!(cache.get("text", "u", "s2", true).is_none());
        assert!(cache.get("text", "u", "s", true).is_some());
    }

    #[test]
    fn overflow_evicts_oldest_fifth() {
        let cache = ClassificationCache::new(10, Duration::from_secs(60), None);
        for i in 0..10 {
            let text = format!("t{i}");
            cache.put(&text, "u", "s", true, &result(&text));
        }
        cache.put("t10", "u", "s", true, &result("t10"));

        // the two oldest entries are gone, the newest present
        assert!(cache.get("t0", "u", "s", true).is_none());
        assert!(cache.get("t1", "u", "s", true).is_none());
        assert!(cache.get("t2", "u", "s", true).is_some());
        assert!(cache.get("t10", "u", "s", true).is_some());
    }

    #[test]
    fn shared_tier_backfills_local() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let warm = ClassificationCache::new(10, Duration::from_secs(60), Some(kv.clone()));
        warm.put("hello", "u", "s", false, &result("hello"));

        // a fresh cache with an empty local tier sees the shared entry
        let cold = ClassificationCache::new(10, Duration::from_secs(60), Some(kv));
        assert!(cold.get("hello", "u", "s", false).is_some());
        assert_eq!(cold.stats().hits, 1);
    }

    #[test]
    fn ttl_expires_local_entries() {
        let cache = ClassificationCache::new(10, Duration::from_millis(0), None);
        cache.put("x", "u", "s", true, &result("x"));
        assert!(cache.get("x", "u", "s", true).is_none());
    }

    #[test]
    fn hit_rate_is_hits_over_total() {
        let cache = ClassificationCache::new(10, Duration::from_secs(60), None);
        cache.put("a", "u", "s", true, &result("a"));
        cache.get("a", "u", "s", true);
        cache.get("b", "u", "s", true);
        let stats = cache.stats();
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }
}

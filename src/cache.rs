//! Caching for remote nutrition lookups
//!
//! The remote nutrition API is slow and rate limited, and menus repeat the same
//! dishes constantly. Lookups are cached by food name, misses included, so a
//! dish the API does not know is not asked about again on every upload.
//!
//! ## Usage Examples
//!
//! ```rust
//! use menu_nutrition::cache::{Cache, MemoryCache};
//! use std::time::Duration;
//!
//! let cache: MemoryCache<String, u32> = MemoryCache::new();
//! cache.insert("김치찌개".to_string(), 350, Duration::from_secs(300));
//! assert_eq!(cache.get(&"김치찌개".to_string()), Some(350));
//! ```

use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use crate::nutrition::NutritionLookup;

/// Generic cache entry with expiration time
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    /// The cached value
    pub value: T,
    /// When this entry was stored
    pub inserted_at: Instant,
    /// When this entry expires
    pub expires_at: Instant,
}

impl<T> CacheEntry<T> {
    /// Create a new cache entry
    pub fn new(value: T, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            inserted_at: now,
            expires_at: now + ttl,
        }
    }

    /// Check if this entry has expired
    pub fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// Generic cache trait. Implementations are shared between tasks, so every
/// operation takes `&self`.
pub trait Cache<K, V> {
    /// Get a value from the cache
    fn get(&self, key: &K) -> Option<V>;

    /// Insert a value into the cache
    fn insert(&self, key: K, value: V, ttl: Duration);

    /// Remove a value from the cache
    fn remove(&self, key: &K) -> Option<V>;

    /// Clear all expired entries
    fn cleanup(&self);

    /// Get cache statistics
    fn stats(&self) -> CacheStats;

    /// Clear all entries
    fn clear(&self);
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Total number of entries
    pub entries: usize,
    /// Number of hits
    pub hits: u64,
    /// Number of misses
    pub misses: u64,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

/// Thread-safe in-memory TTL cache with an optional entry bound
pub struct MemoryCache<K, V> {
    data: RwLock<HashMap<K, CacheEntry<V>>>,
    stats: RwLock<CacheStats>,
    max_entries: Option<usize>,
}

impl<K, V> MemoryCache<K, V>
where
    K: Clone + Eq + Hash + std::fmt::Debug,
    V: Clone + std::fmt::Debug,
{
    /// Create an unbounded memory cache
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            stats: RwLock::new(CacheStats::default()),
            max_entries: None,
        }
    }

    /// Create a cache holding at most `max_entries` entries
    pub fn with_capacity_limit(max_entries: usize) -> Self {
        Self {
            max_entries: Some(max_entries.max(1)),
            ..Self::new()
        }
    }

    /// Get cache size
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    // Drop expired entries first, then the oldest ones until there is room
    fn make_room(data: &mut HashMap<K, CacheEntry<V>>, max_entries: usize) {
        if data.len() < max_entries {
            return;
        }
        data.retain(|_, entry| !entry.is_expired());

        while data.len() >= max_entries {
            let oldest = data
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    data.remove(&key);
                }
                None => break,
            }
        }
    }
}

impl<K, V> Cache<K, V> for MemoryCache<K, V>
where
    K: Clone + Eq + Hash + std::fmt::Debug,
    V: Clone + std::fmt::Debug,
{
    fn get(&self, key: &K) -> Option<V> {
        let data = self.data.read();
        let mut stats = self.stats.write();

        match data.get(key) {
            Some(entry) if !entry.is_expired() => {
                stats.hits += 1;
                Some(entry.value.clone())
            }
            _ => {
                stats.misses += 1;
                None
            }
        }
    }

    fn insert(&self, key: K, value: V, ttl: Duration) {
        let entry = CacheEntry::new(value, ttl);
        let mut data = self.data.write();
        if let Some(max_entries) = self.max_entries {
            if !data.contains_key(&key) {
                Self::make_room(&mut data, max_entries);
            }
        }
        data.insert(key, entry);
    }

    fn remove(&self, key: &K) -> Option<V> {
        self.data.write().remove(key).map(|entry| entry.value)
    }

    fn cleanup(&self) {
        let mut data = self.data.write();
        let initial_len = data.len();

        data.retain(|_, entry| !entry.is_expired());

        let removed = initial_len - data.len();
        if removed > 0 {
            tracing::debug!("Cache cleanup removed {} expired entries", removed);
        }
    }

    fn stats(&self) -> CacheStats {
        let mut stats = self.stats.read().clone();
        stats.entries = self.data.read().len();

        let total_requests = stats.hits + stats.misses;
        if total_requests > 0 {
            stats.hit_rate = stats.hits as f64 / total_requests as f64;
        }

        stats
    }

    fn clear(&self) {
        self.data.write().clear();
        *self.stats.write() = CacheStats::default();
    }
}

impl<K, V> Default for MemoryCache<K, V>
where
    K: Clone + Eq + Hash + std::fmt::Debug,
    V: Clone + std::fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Cache of remote nutrition lookups keyed by the queried food name
///
/// `Some(None)` from [`NutritionCache::get`] is a cached miss.
pub struct NutritionCache {
    inner: MemoryCache<String, Option<NutritionLookup>>,
    hit_ttl: Duration,
    miss_ttl: Duration,
}

impl NutritionCache {
    /// Misses are kept for a tenth of the hit TTL
    pub fn new(hit_ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner: MemoryCache::with_capacity_limit(max_entries),
            hit_ttl,
            miss_ttl: hit_ttl / 10,
        }
    }

    pub fn get(&self, food_name: &str) -> Option<Option<NutritionLookup>> {
        self.inner.get(&food_name.to_string())
    }

    pub fn insert(&self, food_name: &str, lookup: Option<NutritionLookup>) {
        let ttl = if lookup.is_some() {
            self.hit_ttl
        } else {
            self.miss_ttl
        };
        self.inner.insert(food_name.to_string(), lookup, ttl);
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }

    pub fn clear(&self) {
        self.inner.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nutrition::{NutritionBasis, NutritionFacts};
    use std::thread;

    #[test]
    fn test_memory_cache_basic_operations() {
        let cache = MemoryCache::new();

        cache.insert("key1", "value1", Duration::from_secs(60));
        assert_eq!(cache.get(&"key1"), Some("value1"));
        assert_eq!(cache.get(&"missing"), None);

        assert_eq!(cache.remove(&"key1"), Some("value1"));
        assert!(cache.is_empty());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_memory_cache_expiration() {
        let cache = MemoryCache::new();

        cache.insert("key1", "value1", Duration::from_millis(10));
        assert_eq!(cache.get(&"key1"), Some("value1"));

        thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get(&"key1"), None);
    }

    #[test]
    fn test_memory_cache_cleanup() {
        let cache = MemoryCache::new();

        cache.insert("key1", "value1", Duration::from_millis(10));
        cache.insert("key2", "value2", Duration::from_secs(60));

        thread::sleep(Duration::from_millis(20));
        cache.cleanup();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"key2"), Some("value2"));
    }

    #[test]
    fn test_capacity_limit_evicts_oldest() {
        let cache = MemoryCache::with_capacity_limit(2);
        cache.insert("a", 1, Duration::from_secs(60));
        thread::sleep(Duration::from_millis(2));
        cache.insert("b", 2, Duration::from_secs(60));
        thread::sleep(Duration::from_millis(2));
        cache.insert("c", 3, Duration::from_secs(60));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[test]
    fn test_nutrition_cache_remembers_misses() {
        let cache = NutritionCache::new(Duration::from_secs(600), 16);
        assert_eq!(cache.get("김치찌개"), None);

        cache.insert("없는메뉴", None);
        assert_eq!(cache.get("없는메뉴"), Some(None));

        let lookup = NutritionLookup {
            reference_name: "김치찌개".to_string(),
            facts: NutritionFacts {
                calories: 157.5,
                carbohydrates: 10.9,
                protein: 12.3,
                fat: 8.4,
            },
            basis: NutritionBasis::PerServing {
                serving_size_g: Some(350.0),
            },
            source: "food_safety_api",
        };
        cache.insert("김치찌개", Some(lookup.clone()));
        assert_eq!(cache.get("김치찌개"), Some(Some(lookup)));
    }
}

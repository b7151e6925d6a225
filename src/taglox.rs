//! Simple public API for the Taglox tag-aware cache
//!
//! Wraps the byte-level `TagAwareCache` core with typed values: users
//! pick a value type `Taglox<V>` and the facade handles serialization.
//! The core itself stays available through [`Taglox::core`] for callers
//! that manage their own encoding or need the full item lifecycle.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};

use crate::cache::config::{CacheConfig, RetryConfig};
use crate::cache::core::TagAwareCache;
use crate::cache::pool::MemoryPool;
use crate::cache::retry::RetryProxy;
use crate::cache::traits::pool::CachePool;
use crate::cache::traits::types_and_enums::CacheOperationError;

fn encode<V: Serialize>(value: &V) -> Result<Vec<u8>, CacheOperationError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| CacheOperationError::serialization_failed(e.to_string()))
}

fn decode<V: DeserializeOwned>(bytes: &[u8]) -> Result<V, CacheOperationError> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map(|(value, _)| value)
        .map_err(|e| CacheOperationError::deserialization_failed(e.to_string()))
}

/// Typed, cheaply clonable handle over a tag-aware cache
pub struct Taglox<V>
where
    V: Serialize + DeserializeOwned + Send + 'static,
{
    core: Arc<TagAwareCache>,
    _value: PhantomData<fn() -> V>,
}

impl<V> Clone for Taglox<V>
where
    V: Serialize + DeserializeOwned + Send + 'static,
{
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            _value: PhantomData,
        }
    }
}

impl<V> Taglox<V>
where
    V: Serialize + DeserializeOwned + Send + 'static,
{
    /// Create new cache builder with fluent configuration
    pub fn builder() -> TagloxBuilder<V> {
        TagloxBuilder::new()
    }

    /// Create new cache over an in-process pool with default settings
    pub fn new() -> Result<Self, CacheOperationError> {
        Self::builder().build()
    }

    /// The byte-level adapter underneath this facade
    pub fn core(&self) -> &TagAwareCache {
        &self.core
    }

    /// Read and decode a value; `Ok(None)` is a miss
    pub fn get(&self, key: &str) -> Result<Option<V>, CacheOperationError> {
        let item = self.core.get_item(key);
        match item.value() {
            Some(bytes) if item.is_hit() => decode(bytes).map(Some),
            _ => Ok(None),
        }
    }

    /// Whether `key` currently holds a valid value
    pub fn has(&self, key: &str) -> bool {
        self.core.has_item(key)
    }

    /// Store a value under `key`, stamped with `tags`
    pub fn put(
        &self,
        key: &str,
        value: &V,
        tags: &[&str],
        ttl: Option<Duration>,
    ) -> Result<bool, CacheOperationError> {
        let item = self.build_item(key, value, tags, ttl)?;
        Ok(self.core.save(item))
    }

    /// Stage a value for the next [`Taglox::commit`]
    pub fn put_deferred(
        &self,
        key: &str,
        value: &V,
        tags: &[&str],
        ttl: Option<Duration>,
    ) -> Result<bool, CacheOperationError> {
        let item = self.build_item(key, value, tags, ttl)?;
        Ok(self.core.save_deferred(item))
    }

    /// Flush staged values; true when every one reached the pool
    pub fn commit(&self) -> bool {
        self.core.commit()
    }

    /// Read `key`, computing and caching the value on a miss
    ///
    /// The computation runs after tag versions are acquired, so an
    /// invalidation racing it wins. When the value cannot be cached (a
    /// tag version vanished mid-flight, the pool is down) the computed
    /// value is still returned and the caller has effectively gone to
    /// the origin.
    pub fn get_or_compute<F>(
        &self,
        key: &str,
        tags: &[&str],
        ttl: Option<Duration>,
        produce: F,
    ) -> Result<V, CacheOperationError>
    where
        F: FnOnce() -> V + Send + 'static,
    {
        let mut item = self.core.get_item(key);
        if item.is_hit() {
            if let Some(bytes) = item.value() {
                return decode(bytes);
            }
        }

        let produce_slot = Arc::new(Mutex::new(Some(produce)));
        let value_slot: Arc<Mutex<Option<V>>> = Arc::new(Mutex::new(None));
        let producer_produce = produce_slot.clone();
        let producer_value = value_slot.clone();
        let producer_key = key.to_string();
        item.set_producer(Box::new(move || {
            let produce = producer_produce.lock().take()?;
            let value = produce();
            let bytes = match encode(&value) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    log::warn!("value for {:?} cannot be cached: {}", producer_key, e);
                    None
                }
            };
            *producer_value.lock() = Some(value);
            bytes
        }));
        for tag in tags {
            item.tag(*tag)?;
        }
        item.expires_after(ttl);
        self.core.save(item);

        if let Some(value) = value_slot.lock().take() {
            return Ok(value);
        }
        // Rejected before the producer ran: serve the origin directly
        let taken = produce_slot.lock().take();
        match taken {
            Some(produce) => Ok(produce()),
            None => Err(CacheOperationError::invalid_item_state(
                "producer consumed without yielding a value",
            )),
        }
    }

    /// Invalidate every value stamped with any of `tags`
    pub fn invalidate_tags(&self, tags: &[&str]) -> bool {
        self.core.invalidate_tags(tags)
    }

    /// Delete one value
    pub fn delete(&self, key: &str) -> bool {
        self.core.delete_item(key)
    }

    /// Drop values whose key starts with `prefix`; all on empty prefix
    pub fn clear(&self, prefix: &str) -> bool {
        self.core.clear(prefix)
    }

    fn build_item(
        &self,
        key: &str,
        value: &V,
        tags: &[&str],
        ttl: Option<Duration>,
    ) -> Result<crate::cache::item::CacheItem, CacheOperationError> {
        let bytes = encode(value)?;
        let mut item = self.core.get_item(key);
        item.set_value(bytes);
        for tag in tags {
            item.tag(*tag)?;
        }
        item.expires_after(ttl);
        Ok(item)
    }
}

/// Fluent builder for [`Taglox`]
pub struct TagloxBuilder<V>
where
    V: Serialize + DeserializeOwned + Send + 'static,
{
    config: CacheConfig,
    item_pool: Option<Arc<dyn CachePool>>,
    tag_pool: Option<Arc<dyn CachePool>>,
    retry: bool,
    _value: PhantomData<fn() -> V>,
}

impl<V> TagloxBuilder<V>
where
    V: Serialize + DeserializeOwned + Send + 'static,
{
    /// Create new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: CacheConfig::default(),
            item_pool: None,
            tag_pool: None,
            retry: false,
            _value: PhantomData,
        }
    }

    /// Set the key prefix partition (charset `[-+_.A-Za-z0-9]*`)
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    /// Set the default item lifetime hint; 0 keeps items and tags
    /// unbounded
    pub fn default_lifetime_secs(mut self, secs: u64) -> Self {
        self.config.default_lifetime_secs = secs;
        self
    }

    /// Set the reuse window for freshly read tag versions
    pub fn known_tag_versions_ttl_ms(mut self, ms: u64) -> Self {
        self.config.known_tag_versions_ttl_ms = ms;
        self
    }

    /// Wrap the item pool in a retry proxy with the given settings
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self.retry = true;
        self
    }

    /// Set the backing pool for item records
    pub fn item_pool(mut self, pool: Arc<dyn CachePool>) -> Self {
        self.item_pool = Some(pool);
        self
    }

    /// Set the backing pool for tag records; defaults to the item pool
    pub fn tag_pool(mut self, pool: Arc<dyn CachePool>) -> Self {
        self.tag_pool = Some(pool);
        self
    }

    /// Build the cache with the configured settings
    pub fn build(self) -> Result<Taglox<V>, CacheOperationError> {
        let item_pool = self
            .item_pool
            .unwrap_or_else(|| Arc::new(MemoryPool::new()));
        let tag_pool = self.tag_pool.unwrap_or_else(|| item_pool.clone());
        let item_pool: Arc<dyn CachePool> = if self.retry {
            Arc::new(RetryProxy::new(item_pool, &self.config.retry))
        } else {
            item_pool
        };
        let core = TagAwareCache::new(self.config, item_pool, tag_pool)?;
        Ok(Taglox {
            core: Arc::new(core),
            _value: PhantomData,
        })
    }
}

impl<V> Default for TagloxBuilder<V>
where
    V: Serialize + DeserializeOwned + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Profile {
        name: String,
        score: u32,
    }

    fn profile() -> Profile {
        Profile {
            name: "ada".to_string(),
            score: 42,
        }
    }

    #[test]
    fn test_typed_round_trip() {
        let cache: Taglox<Profile> = Taglox::builder().namespace("app").build().unwrap();

        assert!(cache.put("p.1", &profile(), &["profiles"], None).unwrap());
        assert_eq!(cache.get("p.1").unwrap(), Some(profile()));

        cache.invalidate_tags(&["profiles"]);
        assert_eq!(cache.get("p.1").unwrap(), None);
    }

    #[test]
    fn test_clones_share_state() {
        let cache: Taglox<u64> = Taglox::new().unwrap();
        let other = cache.clone();

        cache.put("n", &7, &[], None).unwrap();
        assert_eq!(other.get("n").unwrap(), Some(7));
    }

    #[test]
    fn test_get_or_compute_computes_once() {
        let cache: Taglox<String> = Taglox::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = calls.clone();
            let value = cache
                .get_or_compute("greeting", &["greetings"], None, move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                    "hello".to_string()
                })
                .unwrap();
            assert_eq!(value, "hello");
        }
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_get_or_compute_recomputes_after_invalidation() {
        let cache: Taglox<String> = Taglox::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut compute = || {
            let counter = calls.clone();
            cache
                .get_or_compute("greeting", &["greetings"], None, move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                    "hello".to_string()
                })
                .unwrap()
        };
        compute();
        compute();
        assert_eq!(calls.load(Ordering::Relaxed), 1);

        cache.invalidate_tags(&["greetings"]);
        compute();
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_deferred_puts_flush_on_commit() {
        let cache: Taglox<u64> = Taglox::new().unwrap();

        cache.put_deferred("a", &1, &["batch"], None).unwrap();
        cache.put_deferred("b", &2, &["batch"], None).unwrap();
        assert!(cache.commit());

        assert_eq!(cache.get("a").unwrap(), Some(1));
        assert_eq!(cache.get("b").unwrap(), Some(2));

        cache.invalidate_tags(&["batch"]);
        assert_eq!(cache.get("a").unwrap(), None);
        assert_eq!(cache.get("b").unwrap(), None);
    }
}

//! Tag-aware adapter core
//!
//! Orchestrates read validation, deferred writes and tag-version
//! acquisition ordering over two backing pools (items and tags, possibly
//! the same pool).
//!
//! The correctness story is passive optimistic concurrency: `commit`
//! acquires tag versions *before* any deferred value producer runs, so an
//! invalidation racing the computation leaves the stored item carrying an
//! already-stale version, and the next reader misses. The core takes no
//! locks against other processes; one logical caller drives an instance
//! at a time.
//!
//! Pool I/O failures are swallowed into `false` returns so callers can
//! degrade to the origin data source.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::cache::codec;
use crate::cache::config::CacheConfig;
use crate::cache::item::CacheItem;
use crate::cache::tag::{KnownTagVersions, TagVersionStore};
use crate::cache::traits::pool::{CachePool, PoolCommand};
use crate::cache::traits::types_and_enums::CacheOperationError;

/// Mutable state behind one adapter instance
struct CoreState {
    /// Writes staged by `save_deferred`, at most one per key
    deferred: BTreeMap<String, CacheItem>,
    known_versions: KnownTagVersions,
}

/// Tag-aware cache adapter over a pair of backing pools
pub struct TagAwareCache {
    config: CacheConfig,
    item_pool: Arc<dyn CachePool>,
    tag_store: TagVersionStore,
    state: Mutex<CoreState>,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl TagAwareCache {
    /// Build an adapter over `item_pool` and `tag_pool`
    ///
    /// The pools may be the same object. Fails only on configuration
    /// errors (bad namespace charset).
    pub fn new(
        config: CacheConfig,
        item_pool: Arc<dyn CachePool>,
        tag_pool: Arc<dyn CachePool>,
    ) -> Result<Self, CacheOperationError> {
        config.validate()?;
        let tag_store = TagVersionStore::new(tag_pool, config.tags_lifetime());
        let known_versions = KnownTagVersions::new(Duration::from_millis(
            config.known_tag_versions_ttl_ms,
        ));
        Ok(Self {
            config,
            item_pool,
            tag_store,
            state: Mutex::new(CoreState {
                deferred: BTreeMap::new(),
                known_versions,
            }),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Whether `key` currently holds a valid, tag-current value
    pub fn has_item(&self, key: &str) -> bool {
        self.get_item(key).is_hit()
    }

    /// Read one item; a miss yields a fresh, populatable carrier
    pub fn get_item(&self, key: &str) -> CacheItem {
        self.get_items(&[key])
            .remove(key)
            .unwrap_or_else(|| CacheItem::miss(key.to_string()))
    }

    /// Read a batch of items, validating each against current tag versions
    pub fn get_items(&self, keys: &[&str]) -> BTreeMap<String, CacheItem> {
        // Read-your-writes: a staged key flushes the deferred queue first
        let must_flush = {
            let state = self.state.lock();
            keys.iter().any(|key| state.deferred.contains_key(*key))
        };
        if must_flush {
            self.commit();
        }

        // Hits must be validated against fresh versions, not the memo
        self.state.lock().known_versions.clear();

        let ids: Vec<String> = keys.iter().map(|key| self.config.item_id(key)).collect();
        let payloads = match self.item_pool.get(&ids) {
            Ok(payloads) => payloads,
            Err(e) => {
                log::debug!("item pool read failed: {}", e);
                HashMap::new()
            }
        };

        let now = now_secs();
        let mut evict: Vec<String> = Vec::new();
        let mut candidates: Vec<(String, String, codec::PackedItem)> = Vec::new();
        for (key, id) in keys.iter().zip(&ids) {
            let payload = match payloads.get(id) {
                Some(payload) => payload,
                None => continue,
            };
            match codec::unpack(payload) {
                Ok(packed) => {
                    if packed.expiry.map_or(false, |expiry| expiry as u64 <= now) {
                        evict.push(id.clone());
                    } else {
                        candidates.push((key.to_string(), id.clone(), packed));
                    }
                }
                Err(e) => {
                    log::debug!("evicting {}: invalid payload ({})", id, e);
                    evict.push(id.clone());
                }
            }
        }

        let tag_union: BTreeSet<String> = candidates
            .iter()
            .flat_map(|(_, _, packed)| packed.tag_versions.keys().cloned())
            .collect();
        let current = if tag_union.is_empty() {
            Some(BTreeMap::new())
        } else {
            let mut state = self.state.lock();
            self.fetch_tag_versions(&mut state, &tag_union)
        };

        let mut items = BTreeMap::new();
        for (key, id, packed) in candidates {
            let valid = match &current {
                Some(versions) => packed
                    .tag_versions
                    .iter()
                    .all(|(tag, stored)| versions.get(tag) == Some(stored)),
                // Tag store unreachable: report misses but keep the
                // records, they may validate once it recovers
                None => false,
            };
            if valid {
                items.insert(
                    key.clone(),
                    CacheItem::hit(
                        key,
                        packed.value,
                        packed.tag_versions,
                        packed.expiry,
                        packed.ctime_ms,
                    ),
                );
            } else {
                if current.is_some() {
                    evict.push(id);
                }
                items.insert(key.clone(), CacheItem::miss(key));
            }
        }
        for key in keys {
            items
                .entry(key.to_string())
                .or_insert_with(|| CacheItem::miss(key.to_string()));
        }

        if !evict.is_empty() {
            if let Err(e) = self.item_pool.delete(&evict) {
                log::debug!("eviction of {} stale item(s) failed: {}", evict.len(), e);
            }
        }
        items
    }

    /// Stage an item and flush the whole deferred queue immediately
    pub fn save(&self, item: CacheItem) -> bool {
        self.save_deferred(item) && self.commit()
    }

    /// Stage an item for the next `commit`; a later save of the same key
    /// supersedes an earlier one
    pub fn save_deferred(&self, item: CacheItem) -> bool {
        if !item.has_payload() {
            log::debug!("refusing to stage {:?}: neither value nor producer", item.key());
            return false;
        }
        self.state
            .lock()
            .deferred
            .insert(item.key().to_string(), item);
        true
    }

    /// Flush deferred items to the pool
    ///
    /// Returns true only when every staged item reached the pool; items
    /// rejected for missing tag versions count as failures and their
    /// producers never run.
    pub fn commit(&self) -> bool {
        let (items, versions) = {
            let mut state = self.state.lock();
            if state.deferred.is_empty() {
                return true;
            }
            let items = mem::take(&mut state.deferred);
            let tag_union: BTreeSet<String> = items
                .values()
                .flat_map(|item| item.staged_tags.iter().cloned())
                .collect();
            // The critical ordering point: versions are acquired before
            // any producer runs
            let versions = if tag_union.is_empty() {
                Some(BTreeMap::new())
            } else {
                self.fetch_tag_versions(&mut state, &tag_union)
            };
            (items, versions)
        };

        let versions = match versions {
            Some(versions) => versions,
            None => {
                log::debug!(
                    "dropping {} deferred item(s): tag store unavailable",
                    items.len()
                );
                self.state.lock().known_versions.clear();
                return false;
            }
        };

        let now = now_secs();
        let mut every_item_persisted = true;
        let mut writes = Vec::new();
        for (key, mut item) in items {
            let attached: BTreeMap<String, Vec<u8>> = item
                .staged_tags
                .iter()
                .filter_map(|tag| {
                    versions
                        .get(tag)
                        .map(|version| (tag.clone(), version.clone()))
                })
                .collect();
            if attached.len() != item.staged_tags.len() {
                log::debug!("rejecting {:?}: a staged tag has no current version", key);
                every_item_persisted = false;
                continue;
            }

            if let Some(producer) = item.producer.take() {
                let started = Instant::now();
                item.value = producer();
                let cost = started.elapsed().as_millis().min(u32::MAX as u128) as u32;
                item.ctime_ms = item.ctime_ms.saturating_add(cost);
            }
            let value = match item.value.take() {
                Some(value) => value,
                None => {
                    log::debug!("dropping {:?}: no value after production", key);
                    every_item_persisted = false;
                    continue;
                }
            };

            let expiry = item.expiry.or_else(|| {
                (self.config.default_lifetime_secs > 0).then(|| {
                    now.saturating_add(self.config.default_lifetime_secs)
                        .min(u32::MAX as u64) as u32
                })
            });
            if expiry.map_or(false, |expiry| expiry as u64 <= now) {
                // Already expired; there is nothing worth persisting
                continue;
            }

            match codec::pack(&value, &attached, expiry, item.ctime_ms) {
                Ok(payload) => writes.push(PoolCommand::Set {
                    key: self.config.item_id(&key),
                    value: payload,
                    ttl: expiry.map(|expiry| Duration::from_secs(expiry as u64 - now)),
                }),
                Err(e) => {
                    log::debug!("dropping {:?}: {}", key, e);
                    every_item_persisted = false;
                }
            }
        }

        let pool_ok = if writes.is_empty() {
            true
        } else {
            match self.item_pool.pipeline(writes) {
                Ok(responses) => responses.iter().all(|response| response.is_ok()),
                Err(e) => {
                    log::debug!("commit flush failed: {}", e);
                    false
                }
            }
        };

        self.state.lock().known_versions.clear();
        pool_ok && every_item_persisted
    }

    /// Delete one item record
    pub fn delete_item(&self, key: &str) -> bool {
        self.delete_items(&[key])
    }

    /// Delete a batch of item records, including staged ones
    pub fn delete_items(&self, keys: &[&str]) -> bool {
        {
            let mut state = self.state.lock();
            for key in keys {
                state.deferred.remove(*key);
            }
        }
        let ids: Vec<String> = keys.iter().map(|key| self.config.item_id(key)).collect();
        match self.item_pool.delete(&ids) {
            Ok(ok) => ok,
            Err(e) => {
                log::debug!("item deletion failed: {}", e);
                false
            }
        }
    }

    /// Invalidate every item stamped with any of `tags`
    ///
    /// Implemented as deletion of the tag records; the next
    /// `get_or_create` installs fresh tokens no existing item can match.
    /// Idempotent.
    pub fn invalidate_tags(&self, tags: &[&str]) -> bool {
        self.state.lock().known_versions.clear();
        let tag_ids: BTreeSet<String> = tags.iter().map(|tag| self.config.tag_id(tag)).collect();
        match self.tag_store.delete(&tag_ids) {
            Ok(ok) => ok,
            Err(e) => {
                log::debug!("tag invalidation failed: {}", e);
                false
            }
        }
    }

    /// Drop items whose user key starts with `prefix` (all on empty),
    /// including staged ones; tag records are left alone
    pub fn clear(&self, prefix: &str) -> bool {
        {
            let mut state = self.state.lock();
            if prefix.is_empty() {
                state.deferred.clear();
            } else {
                state.deferred.retain(|key, _| !key.starts_with(prefix));
            }
            state.known_versions.clear();
        }
        match self.item_pool.clear(&self.config.item_id(prefix)) {
            Ok(ok) => ok,
            Err(e) => {
                log::debug!("clear failed: {}", e);
                false
            }
        }
    }

    /// Resolve current versions for tag *names*, via the memo when fresh
    ///
    /// `None` means the tag store was unreachable. Tags that lost a
    /// create race are silently absent from the result.
    fn fetch_tag_versions(
        &self,
        state: &mut CoreState,
        tags: &BTreeSet<String>,
    ) -> Option<BTreeMap<String, Vec<u8>>> {
        let mut versions = state.known_versions.lookup(tags);
        let missing: BTreeSet<String> = tags
            .iter()
            .filter(|tag| !versions.contains_key(*tag))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Some(versions);
        }

        let tag_ids: BTreeSet<String> = missing
            .iter()
            .map(|tag| self.config.tag_id(tag))
            .collect();
        match self.tag_store.get_or_create(&tag_ids) {
            Ok(by_id) => {
                let mut fetched = BTreeMap::new();
                for tag in &missing {
                    if let Some(version) = by_id.get(&self.config.tag_id(tag)) {
                        fetched.insert(tag.clone(), version.clone());
                    }
                }
                state.known_versions.record(&fetched);
                versions.extend(fetched);
                Some(versions)
            }
            Err(e) => {
                log::debug!("tag store read failed: {}", e);
                None
            }
        }
    }
}

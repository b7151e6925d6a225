//! Tag-version store protocol
//!
//! Answers `get_or_create` and `delete` for tag ids against the tag pool.
//! Version tokens are only ever produced through the create-if-absent
//! path; a concurrent `delete` therefore always wins: whichever writer
//! recreates the record afterwards installs a token no in-flight item can
//! match.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;

use crate::cache::traits::pool::{CachePool, PoolCommand, PoolResponse, PoolResult};

/// Chance that a fully-hit read refreshes the tag TTLs
///
/// Tags read at least once a minute on average stay alive indefinitely;
/// cold tags are left to expire.
const REFRESH_PROBABILITY: f64 = 60.0 / 86_400.0;

/// Stable per-process discriminator baked into every version token,
/// reducing the odds of token reuse across process restarts
static INSTANCE_ID: Lazy<u32> = Lazy::new(|| {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".to_string());
    crc32fast::hash(format!("{}@{}", std::process::id(), host).as_bytes())
});

/// Generate a fresh 8-byte version token: `random_u32 || instance_id`
pub(crate) fn new_version_token() -> Vec<u8> {
    let mut token = Vec::with_capacity(8);
    token.extend_from_slice(&rand::random::<u32>().to_be_bytes());
    token.extend_from_slice(&INSTANCE_ID.to_be_bytes());
    token
}

/// Store of per-tag version tokens over a backing pool
pub(crate) struct TagVersionStore {
    pool: Arc<dyn CachePool>,
    tags_lifetime: Option<Duration>,
}

impl TagVersionStore {
    pub(crate) fn new(pool: Arc<dyn CachePool>, tags_lifetime: Option<Duration>) -> Self {
        Self {
            pool,
            tags_lifetime,
        }
    }

    /// Read current versions, creating tokens for absent tags
    ///
    /// The result may contain fewer entries than requested: a tag whose
    /// conditional create lost against a concurrent writer is omitted,
    /// and callers treat the omission as an invalidation.
    pub(crate) fn get_or_create(
        &self,
        tag_ids: &BTreeSet<String>,
    ) -> PoolResult<BTreeMap<String, Vec<u8>>> {
        if tag_ids.is_empty() {
            return Ok(BTreeMap::new());
        }

        // BTreeSet iteration is the canonical order; backends that
        // serialise writes see every process lock tags identically.
        let ids: Vec<String> = tag_ids.iter().cloned().collect();
        let found = self.pool.get(&ids)?;

        let mut versions = BTreeMap::new();
        let mut created: Vec<(String, Vec<u8>)> = Vec::new();
        for id in &ids {
            match found.get(id) {
                Some(version) => {
                    versions.insert(id.clone(), version.clone());
                }
                None => created.push((id.clone(), new_version_token())),
            }
        }

        if created.is_empty() {
            self.maybe_refresh(&ids);
            return Ok(versions);
        }

        let commands = created
            .iter()
            .map(|(id, token)| PoolCommand::SetIfAbsent {
                key: id.clone(),
                value: token.clone(),
                ttl: self.tags_lifetime,
            })
            .collect();
        let responses = self.pool.pipeline(commands)?;

        for ((id, token), response) in created.into_iter().zip(responses) {
            match response {
                PoolResponse::Status(true) => {
                    versions.insert(id, token);
                }
                // Lost the create race; the tag stays unknown for this
                // operation and whatever the other writer placed wins.
                _ => log::trace!("tag {} created concurrently, omitting", id),
            }
        }
        Ok(versions)
    }

    /// Invalidate tags by deleting their records
    pub(crate) fn delete(&self, tag_ids: &BTreeSet<String>) -> PoolResult<bool> {
        if tag_ids.is_empty() {
            return Ok(true);
        }
        let ids: Vec<String> = tag_ids.iter().cloned().collect();
        self.pool.delete(&ids)
    }

    /// Occasionally push the TTL of fully-hit tags forward
    ///
    /// Best effort: a failed refresh only means the tags expire on their
    /// original schedule.
    fn maybe_refresh(&self, ids: &[String]) {
        let lifetime = match self.tags_lifetime {
            Some(lifetime) => lifetime,
            None => return,
        };
        if rand::random::<f64>() >= REFRESH_PROBABILITY {
            return;
        }
        log::trace!("refreshing ttl of {} tag record(s)", ids.len());
        let commands = ids
            .iter()
            .map(|id| PoolCommand::Expire {
                key: id.clone(),
                ttl: lifetime,
            })
            .collect();
        if let Err(e) = self.pool.pipeline(commands) {
            log::debug!("tag ttl refresh failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::pool::MemoryPool;
    use crate::cache::traits::types_and_enums::CacheOperationError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ids(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_token_shape() {
        let token = new_version_token();
        assert_eq!(token.len(), 8);
        assert_eq!(&token[4..], &INSTANCE_ID.to_be_bytes());
    }

    #[test]
    fn test_creates_absent_tags() {
        let pool = Arc::new(MemoryPool::new());
        let store = TagVersionStore::new(pool.clone(), None);

        let versions = store.get_or_create(&ids(&["t:a", "t:b"])).unwrap();
        assert_eq!(versions.len(), 2);

        // The adopted tokens are what actually landed in the pool
        let stored = pool
            .get(&["t:a".to_string(), "t:b".to_string()])
            .unwrap();
        assert_eq!(stored.get("t:a"), versions.get("t:a"));
        assert_eq!(stored.get("t:b"), versions.get("t:b"));
    }

    #[test]
    fn test_existing_tags_keep_their_token() {
        let pool = Arc::new(MemoryPool::new());
        pool.set("t:a", b"frozen!!", None).unwrap();
        let store = TagVersionStore::new(pool, None);

        let versions = store.get_or_create(&ids(&["t:a"])).unwrap();
        assert_eq!(versions.get("t:a").map(Vec::as_slice), Some(&b"frozen!!"[..]));
    }

    #[test]
    fn test_delete_then_recreate_changes_token() {
        let pool = Arc::new(MemoryPool::new());
        let store = TagVersionStore::new(pool, None);

        let before = store.get_or_create(&ids(&["t:a"])).unwrap();
        assert!(store.delete(&ids(&["t:a"])).unwrap());
        let after = store.get_or_create(&ids(&["t:a"])).unwrap();

        assert_ne!(before.get("t:a"), after.get("t:a"));
    }

    /// Pool whose conditional sets always lose, as if another writer beat
    /// every create
    struct LosingPool {
        inner: MemoryPool,
        lost: AtomicUsize,
    }

    impl CachePool for LosingPool {
        fn get(&self, keys: &[String]) -> PoolResult<HashMap<String, Vec<u8>>> {
            self.inner.get(keys)
        }
        fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> PoolResult<bool> {
            self.inner.set(key, value, ttl)
        }
        fn set_if_absent(&self, _: &str, _: &[u8], _: Option<Duration>) -> PoolResult<bool> {
            self.lost.fetch_add(1, Ordering::Relaxed);
            Ok(false)
        }
        fn delete(&self, keys: &[String]) -> PoolResult<bool> {
            self.inner.delete(keys)
        }
        fn expire(&self, key: &str, ttl: Duration) -> PoolResult<bool> {
            self.inner.expire(key, ttl)
        }
        fn clear(&self, prefix: &str) -> PoolResult<bool> {
            self.inner.clear(prefix)
        }
    }

    #[test]
    fn test_lost_race_omits_tag_without_reread() {
        let pool = Arc::new(LosingPool {
            inner: MemoryPool::new(),
            lost: AtomicUsize::new(0),
        });
        let store = TagVersionStore::new(pool.clone(), None);

        let versions = store.get_or_create(&ids(&["t:a"])).unwrap();
        assert!(versions.is_empty());
        assert_eq!(pool.lost.load(Ordering::Relaxed), 1);
    }

    /// Pool that errors on everything
    struct BrokenPool;

    impl CachePool for BrokenPool {
        fn get(&self, _: &[String]) -> PoolResult<HashMap<String, Vec<u8>>> {
            Err(CacheOperationError::pool_failed("down"))
        }
        fn set(&self, _: &str, _: &[u8], _: Option<Duration>) -> PoolResult<bool> {
            Err(CacheOperationError::pool_failed("down"))
        }
        fn set_if_absent(&self, _: &str, _: &[u8], _: Option<Duration>) -> PoolResult<bool> {
            Err(CacheOperationError::pool_failed("down"))
        }
        fn delete(&self, _: &[String]) -> PoolResult<bool> {
            Err(CacheOperationError::pool_failed("down"))
        }
        fn expire(&self, _: &str, _: Duration) -> PoolResult<bool> {
            Err(CacheOperationError::pool_failed("down"))
        }
        fn clear(&self, _: &str) -> PoolResult<bool> {
            Err(CacheOperationError::pool_failed("down"))
        }
    }

    #[test]
    fn test_pool_failure_propagates() {
        let store = TagVersionStore::new(Arc::new(BrokenPool), None);
        assert!(store.get_or_create(&ids(&["t:a"])).is_err());
        assert!(store.delete(&ids(&["t:a"])).is_err());
    }
}

//! In-process reference pool
//!
//! Dashmap-backed implementation of the pool contract with per-entry
//! expiry. Serves as the builder's default backend and as the test
//! harness; production backends (Redis, filesystem) plug in through the
//! same trait.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::cache::traits::pool::{CachePool, PoolResult};

#[derive(Clone)]
struct MemoryEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn new(value: &[u8], ttl: Option<Duration>) -> Self {
        Self {
            value: value.to_vec(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn live(&self) -> bool {
        match self.expires_at {
            Some(at) => Instant::now() < at,
            None => true,
        }
    }
}

/// Volatile in-memory pool with TTL support
#[derive(Default)]
pub struct MemoryPool {
    entries: DashMap<String, MemoryEntry>,
}

impl MemoryPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries, counting lazily-expired ones
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CachePool for MemoryPool {
    fn get(&self, keys: &[String]) -> PoolResult<HashMap<String, Vec<u8>>> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            let dead = match self.entries.get(key) {
                Some(entry) if entry.live() => {
                    found.insert(key.clone(), entry.value.clone());
                    false
                }
                Some(_) => true,
                None => false,
            };
            if dead {
                self.entries.remove(key);
            }
        }
        Ok(found)
    }

    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> PoolResult<bool> {
        self.entries
            .insert(key.to_string(), MemoryEntry::new(value, ttl));
        Ok(true)
    }

    fn set_if_absent(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> PoolResult<bool> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().live() {
                    Ok(false)
                } else {
                    occupied.insert(MemoryEntry::new(value, ttl));
                    Ok(true)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(MemoryEntry::new(value, ttl));
                Ok(true)
            }
        }
    }

    fn delete(&self, keys: &[String]) -> PoolResult<bool> {
        for key in keys {
            self.entries.remove(key);
        }
        Ok(true)
    }

    fn expire(&self, key: &str, ttl: Duration) -> PoolResult<bool> {
        match self.entries.get_mut(key) {
            Some(mut entry) if entry.live() => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn clear(&self, prefix: &str) -> PoolResult<bool> {
        if prefix.is_empty() {
            self.entries.clear();
        } else {
            self.entries.retain(|key, _| !key.starts_with(prefix));
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_get_set_delete() {
        let pool = MemoryPool::new();
        pool.set("a", b"1", None).unwrap();
        pool.set("b", b"2", None).unwrap();

        let found = pool.get(&keys(&["a", "b", "c"])).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found.get("a").map(Vec::as_slice), Some(&b"1"[..]));

        pool.delete(&keys(&["a", "c"])).unwrap();
        assert!(pool.get(&keys(&["a"])).unwrap().is_empty());
    }

    #[test]
    fn test_ttl_expiry() {
        let pool = MemoryPool::new();
        pool.set("a", b"1", Some(Duration::from_millis(20))).unwrap();
        assert_eq!(pool.get(&keys(&["a"])).unwrap().len(), 1);

        std::thread::sleep(Duration::from_millis(35));
        assert!(pool.get(&keys(&["a"])).unwrap().is_empty());
    }

    #[test]
    fn test_set_if_absent() {
        let pool = MemoryPool::new();
        assert!(pool.set_if_absent("a", b"1", None).unwrap());
        assert!(!pool.set_if_absent("a", b"2", None).unwrap());

        let found = pool.get(&keys(&["a"])).unwrap();
        assert_eq!(found.get("a").map(Vec::as_slice), Some(&b"1"[..]));
    }

    #[test]
    fn test_set_if_absent_reclaims_expired() {
        let pool = MemoryPool::new();
        pool.set("a", b"1", Some(Duration::from_millis(10))).unwrap();
        std::thread::sleep(Duration::from_millis(25));
        assert!(pool.set_if_absent("a", b"2", None).unwrap());
    }

    #[test]
    fn test_expire() {
        let pool = MemoryPool::new();
        pool.set("a", b"1", None).unwrap();
        assert!(pool.expire("a", Duration::from_millis(10)).unwrap());
        assert!(!pool.expire("missing", Duration::from_secs(1)).unwrap());

        std::thread::sleep(Duration::from_millis(25));
        assert!(pool.get(&keys(&["a"])).unwrap().is_empty());
    }

    #[test]
    fn test_clear_prefix() {
        let pool = MemoryPool::new();
        pool.set("ns:$a", b"1", None).unwrap();
        pool.set("ns:$b", b"2", None).unwrap();
        pool.set("other", b"3", None).unwrap();

        pool.clear("ns:$").unwrap();
        assert!(pool.get(&keys(&["ns:$a", "ns:$b"])).unwrap().is_empty());
        assert_eq!(pool.get(&keys(&["other"])).unwrap().len(), 1);

        pool.clear("").unwrap();
        assert!(pool.is_empty());
    }
}

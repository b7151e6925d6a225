//! Retry proxy pool decorator
//!
//! Wraps any pool and re-reads missing single keys according to a
//! statistical distribution over a bounded budget, so that when many
//! callers miss the same key at once, one proceeds to compute the value
//! and the rest pick up its result instead of stampeding the origin.
//!
//! Multi-key reads, writes, deletes and TTL operations forward untouched.

pub(crate) mod strategy;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::config::types::RetryConfig;
use crate::cache::traits::pool::{CachePool, PoolCommand, PoolResponse, PoolResult};

use strategy::{adjust_interval, RetryPlanner};
pub use types::RetryStrategyKind;

/// Pool decorator retrying single-key misses
pub struct RetryProxy {
    inner: Arc<dyn CachePool>,
    planner: RetryPlanner,
}

impl RetryProxy {
    /// Wrap `inner`; invalid retry parameters degrade to no retries
    pub fn new(inner: Arc<dyn CachePool>, config: &RetryConfig) -> Self {
        Self {
            inner,
            planner: RetryPlanner::validated(config),
        }
    }
}

impl CachePool for RetryProxy {
    fn get(&self, keys: &[String]) -> PoolResult<HashMap<String, Vec<u8>>> {
        let found = self.inner.get(keys)?;
        if keys.len() != 1 || !found.is_empty() {
            return Ok(found);
        }

        let started = Instant::now();
        for (retry_no, planned) in self.planner.plan().into_iter().enumerate() {
            let sleep = match adjust_interval(planned, started, self.planner.timeout()) {
                Some(sleep) => sleep,
                None => {
                    log::warn!(
                        "retry budget exhausted before retry {}; check retry timeout configuration",
                        retry_no + 1
                    );
                    break;
                }
            };
            if !sleep.is_zero() {
                std::thread::sleep(sleep);
            }
            let found = self.inner.get(keys)?;
            if !found.is_empty() {
                return Ok(found);
            }
        }
        Ok(HashMap::new())
    }

    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> PoolResult<bool> {
        self.inner.set(key, value, ttl)
    }

    fn set_if_absent(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> PoolResult<bool> {
        self.inner.set_if_absent(key, value, ttl)
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

    fn pipeline(&self, commands: Vec<PoolCommand>) -> PoolResult<Vec<PoolResponse>> {
        self.inner.pipeline(commands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::pool::MemoryPool;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    /// Pool counting reads, serving `key` only from the `warm_after`-th
    /// read onward
    struct ColdPool {
        reads: AtomicUsize,
        warm_after: usize,
    }

    impl CachePool for ColdPool {
        fn get(&self, keys: &[String]) -> PoolResult<HashMap<String, Vec<u8>>> {
            let read_no = self.reads.fetch_add(1, Ordering::Relaxed) + 1;
            let mut found = HashMap::new();
            if read_no >= self.warm_after {
                for key in keys {
                    found.insert(key.clone(), b"warm".to_vec());
                }
            }
            Ok(found)
        }
        fn set(&self, _: &str, _: &[u8], _: Option<Duration>) -> PoolResult<bool> {
            Ok(true)
        }
        fn set_if_absent(&self, _: &str, _: &[u8], _: Option<Duration>) -> PoolResult<bool> {
            Ok(true)
        }
        fn delete(&self, _: &[String]) -> PoolResult<bool> {
            Ok(true)
        }
        fn expire(&self, _: &str, _: Duration) -> PoolResult<bool> {
            Ok(true)
        }
        fn clear(&self, _: &str) -> PoolResult<bool> {
            Ok(true)
        }
    }

    fn delta_config(timeout_ms: u64, max_retries: u32) -> RetryConfig {
        RetryConfig {
            timeout_ms,
            max_retries,
            strategy: RetryStrategyKind::DeltaEvenIntervals,
            factor: 2.0,
        }
    }

    #[test]
    fn test_retries_until_warm() {
        let pool = Arc::new(ColdPool {
            reads: AtomicUsize::new(0),
            warm_after: 3,
        });
        let proxy = RetryProxy::new(pool.clone(), &delta_config(100, 4));

        let found = proxy.get(&keys(&["k"])).unwrap();
        assert_eq!(found.get("k").map(Vec::as_slice), Some(&b"warm"[..]));
        assert_eq!(pool.reads.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_budget_bounds_total_sleep() {
        let pool = Arc::new(ColdPool {
            reads: AtomicUsize::new(0),
            warm_after: usize::MAX,
        });
        let proxy = RetryProxy::new(pool, &delta_config(100, 4));

        let started = Instant::now();
        let found = proxy.get(&keys(&["k"])).unwrap();
        assert!(found.is_empty());
        assert!(started.elapsed() < Duration::from_millis(150));
    }

    #[test]
    fn test_key_populated_mid_budget_is_served() {
        // A key cold for ~60ms under a 100ms budget: the caller gets the
        // hit without exceeding its budget
        let pool = Arc::new(MemoryPool::new());
        let writer = pool.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(60));
            writer.set("k", b"1", None).unwrap();
        });

        let proxy = RetryProxy::new(pool, &delta_config(100, 4));

        let started = Instant::now();
        let found = proxy.get(&keys(&["k"])).unwrap();
        handle.join().unwrap();

        assert_eq!(found.get("k").map(Vec::as_slice), Some(&b"1"[..]));
        assert!(started.elapsed() <= Duration::from_millis(130));
    }

    #[test]
    fn test_multi_get_is_not_retried() {
        let pool = Arc::new(ColdPool {
            reads: AtomicUsize::new(0),
            warm_after: usize::MAX,
        });
        let proxy = RetryProxy::new(pool.clone(), &delta_config(100, 4));

        let found = proxy.get(&keys(&["a", "b"])).unwrap();
        assert!(found.is_empty());
        assert_eq!(pool.reads.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_no_retry_reads_once() {
        let pool = Arc::new(ColdPool {
            reads: AtomicUsize::new(0),
            warm_after: usize::MAX,
        });
        let mut config = delta_config(100, 4);
        config.strategy = RetryStrategyKind::NoRetry;
        let proxy = RetryProxy::new(pool.clone(), &config);

        proxy.get(&keys(&["k"])).unwrap();
        assert_eq!(pool.reads.load(Ordering::Relaxed), 1);
    }
}

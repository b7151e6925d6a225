//! Taglox - tag-aware cache facade
//!
//! Layers safe, guaranteed tag-based invalidation on top of any key/value
//! cache pool, including volatile pools subject to LRU eviction or OOM.
//!
//! # Features
//!
//! - **Versioned tags**: items store the versions of the tags they were
//!   saved with; a read is a hit only while every stored version is still
//!   current
//! - **Passive optimistic concurrency**: tag versions are acquired before
//!   a deferred value is computed, so a concurrent invalidation makes the
//!   freshly written item miss on the next read
//! - **Eviction-safe**: an evicted tag record invalidates its items
//!   instead of faking hits
//! - **Stampede mitigation**: a retry proxy spreads cold readers in time
//!   with pluggable statistical distributions
//! - **Pool-agnostic**: everything runs against a small `CachePool`
//!   contract with an optional pipelining hook

// Public API modules
pub mod prelude;
pub mod taglox;

// Cache implementation modules - traits are public for user implementations
pub mod cache;

// Re-export the public API at the crate root for convenience
pub use cache::core::TagAwareCache;
pub use cache::item::CacheItem;
pub use cache::retry::RetryProxy;
pub use prelude::*;
pub use taglox::{Taglox, TagloxBuilder};

// Public cache traits and types that users need to implement
pub mod traits {
    pub use crate::cache::traits::pool::{CachePool, PoolCommand, PoolResponse, PoolResult};
    pub use crate::cache::traits::types_and_enums::CacheOperationError;
}

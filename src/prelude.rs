//! Taglox prelude - convenient imports for users
//!
//! This module provides everything users need to work with the tag-aware
//! cache.

// Re-export the public API
pub use crate::taglox::{Taglox, TagloxBuilder};

// Re-export essential error types that users might need
pub use crate::cache::traits::types_and_enums::CacheOperationError;

// Re-export configuration types
pub use crate::cache::config::{CacheConfig, RetryConfig};
pub use crate::cache::retry::types::RetryStrategyKind;

// Re-export the byte-level adapter surface for custom-codec callers
pub use crate::cache::core::TagAwareCache;
pub use crate::cache::item::{CacheItem, ValueProducer};

// Reference backend, also handy in tests
pub use crate::cache::pool::MemoryPool;

// Re-export serde traits that users' value types need to implement
pub use serde::{Deserialize, Serialize};
